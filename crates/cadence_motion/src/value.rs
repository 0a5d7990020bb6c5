//! Animatable value types
//!
//! Property values as they appear in stage / motion configurations, the
//! channel model they are resolved into once per compile call, time values
//! with percentage support, and the [`Animatable`] trait used by runtime
//! motion values.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::css::format_number;
use crate::error::{MotionError, Result};

// ============================================================================
// Property Values
// ============================================================================

/// A single property value: a number, or opaque CSS text such as a transform
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, PropertyValue::Number(_))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

/// Property name → value, in declaration order
pub type PropertyMap = IndexMap<String, PropertyValue>;

/// Build a [`PropertyMap`] from `(name, value)` pairs
pub fn props<K, V, I>(pairs: I) -> PropertyMap
where
    K: Into<String>,
    V: Into<PropertyValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

// ============================================================================
// Channels
// ============================================================================

/// One animated property with its endpoints, classified once at compile time
#[derive(Clone, Debug, PartialEq)]
pub enum Channel {
    /// Both endpoints numeric, interpolated linearly
    Numeric { from: f64, to: f64 },
    /// At least one endpoint is text; holds `from` until the stage completes
    Opaque { from: PropertyValue, to: PropertyValue },
}

impl Channel {
    /// Value at local progress `t` (0.0 to 1.0)
    pub fn sample(&self, t: f64) -> PropertyValue {
        match self {
            Channel::Numeric { from, to } => PropertyValue::Number(from + (to - from) * t),
            Channel::Opaque { from, to } => {
                if t >= 1.0 {
                    to.clone()
                } else {
                    from.clone()
                }
            }
        }
    }

    pub fn from_value(&self) -> PropertyValue {
        self.sample(0.0)
    }

    pub fn to_value(&self) -> PropertyValue {
        self.sample(1.0)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Channel::Numeric { .. })
    }
}

/// Resolve a from/to map pair into channels
///
/// A property missing on one side holds the value of the other side.
/// Properties keep the order they first appear in (`from` first, then `to`).
pub fn resolve_channels(from: &PropertyMap, to: &PropertyMap) -> Result<IndexMap<String, Channel>> {
    let mut channels = IndexMap::with_capacity(from.len().max(to.len()));
    let names = from.keys().chain(to.keys().filter(|k| !from.contains_key(*k)));

    for name in names {
        let start = from.get(name).or_else(|| to.get(name));
        let end = to.get(name).or_else(|| from.get(name));
        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };

        let channel = match (start, end) {
            (PropertyValue::Number(a), PropertyValue::Number(b)) => {
                check_finite("from", *a)?;
                check_finite("to", *b)?;
                Channel::Numeric { from: *a, to: *b }
            }
            _ => Channel::Opaque {
                from: start.clone(),
                to: end.clone(),
            },
        };
        channels.insert(name.clone(), channel);
    }

    Ok(channels)
}

pub(crate) fn check_finite(channel: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MotionError::NonFiniteEndpoint { channel, value })
    }
}

// ============================================================================
// Time
// ============================================================================

/// A point or span on a timeline: absolute milliseconds or a percentage
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimeRepr", into = "String")]
pub enum Time {
    Ms(f64),
    Percent(f64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeRepr {
    Number(f64),
    Text(String),
}

impl Time {
    /// Resolve against a reference span in milliseconds
    pub fn resolve(&self, reference_ms: f64) -> f64 {
        match *self {
            Time::Ms(ms) => ms,
            Time::Percent(p) => reference_ms * p / 100.0,
        }
    }

    /// Milliseconds if this is a literal time
    pub fn as_ms(&self) -> Option<f64> {
        match *self {
            Time::Ms(ms) => Some(ms),
            Time::Percent(_) => None,
        }
    }

    pub fn is_percent(&self) -> bool {
        matches!(self, Time::Percent(_))
    }
}

impl From<f64> for Time {
    fn from(ms: f64) -> Self {
        Time::Ms(ms)
    }
}

impl FromStr for Time {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let invalid = || MotionError::InvalidTime(s.to_string());
        let parse = |n: &str| n.trim().parse::<f64>().ok().filter(|v| v.is_finite());

        let time = if let Some(n) = text.strip_suffix('%') {
            Time::Percent(parse(n).ok_or_else(invalid)?)
        } else if let Some(n) = text.strip_suffix("ms") {
            Time::Ms(parse(n).ok_or_else(invalid)?)
        } else if let Some(n) = text.strip_suffix('s') {
            Time::Ms(parse(n).ok_or_else(invalid)? * 1000.0)
        } else {
            Time::Ms(parse(text).ok_or_else(invalid)?)
        };
        Ok(time)
    }
}

impl TryFrom<TimeRepr> for Time {
    type Error = MotionError;

    fn try_from(repr: TimeRepr) -> Result<Self> {
        match repr {
            TimeRepr::Number(ms) if ms.is_finite() => Ok(Time::Ms(ms)),
            TimeRepr::Number(ms) => Err(MotionError::InvalidTime(ms.to_string())),
            TimeRepr::Text(text) => text.parse(),
        }
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Time::Ms(ms) => write!(f, "{}ms", format_number(ms)),
            Time::Percent(p) => write!(f, "{}%", format_number(p)),
        }
    }
}

impl From<Time> for String {
    fn from(time: Time) -> Self {
        time.to_string()
    }
}

// ============================================================================
// Runtime Animatable Values
// ============================================================================

/// Values a runtime [`MotionValue`](crate::motion_value::MotionValue) can hold
///
/// Spring-driven animation works per component, so every implementation
/// exposes a flat list of `f64` components.
pub trait Animatable: Clone + PartialEq + fmt::Debug + 'static {
    /// Linearly interpolate between self and other by factor t (0.0 to 1.0)
    fn lerp(&self, other: &Self, t: f64) -> Self;

    fn components(&self) -> SmallVec<[f64; 4]>;

    /// Rebuild from components; missing components are zero
    fn from_components(components: &[f64]) -> Self;

    /// CSS text written to a mirrored custom property
    fn to_css(&self) -> String;

    /// Check if two values are approximately equal (for settling detection)
    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.components()
            .iter()
            .zip(other.components().iter())
            .all(|(a, b)| (a - b).abs() < epsilon)
    }
}

impl Animatable for f64 {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }

    fn components(&self) -> SmallVec<[f64; 4]> {
        smallvec::smallvec![*self]
    }

    fn from_components(components: &[f64]) -> Self {
        components.first().copied().unwrap_or(0.0)
    }

    fn to_css(&self) -> String {
        format_number(*self)
    }
}

macro_rules! impl_animatable_array {
    ($n:literal) => {
        impl Animatable for [f64; $n] {
            fn lerp(&self, other: &Self, t: f64) -> Self {
                let mut out = *self;
                for (o, (a, b)) in out.iter_mut().zip(self.iter().zip(other.iter())) {
                    *o = a + (b - a) * t;
                }
                out
            }

            fn components(&self) -> SmallVec<[f64; 4]> {
                SmallVec::from_slice(self)
            }

            fn from_components(components: &[f64]) -> Self {
                let mut out = [0.0; $n];
                for (o, c) in out.iter_mut().zip(components) {
                    *o = *c;
                }
                out
            }

            fn to_css(&self) -> String {
                self.iter()
                    .map(|c| format_number(*c))
                    .collect::<Vec<_>>()
                    .join(" ")
            }
        }
    };
}

impl_animatable_array!(2);
impl_animatable_array!(3);
impl_animatable_array!(4);
