//! Easing functions
//!
//! CSS timing functions that can be parsed from CSS text, written back out
//! verbatim into generated `animation` rules, and evaluated numerically for
//! runtime interpolation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::css::format_number;
use crate::error::{MotionError, Result};

/// Jump position for `steps()` easing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StepPosition {
    Start,
    #[default]
    End,
}

/// A CSS timing function
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Easing {
    Linear,
    #[default]
    Ease,
    EaseIn,
    EaseOut,
    EaseInOut,
    CubicBezier(f64, f64, f64, f64),
    Steps(u32, StepPosition),
}

impl Easing {
    /// Material "standard" curve, the default for FLIP transitions
    pub const STANDARD: Easing = Easing::CubicBezier(0.4, 0.0, 0.2, 1.0);

    /// Create a cubic bezier easing, validating the x control points
    pub fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        let finite = [x1, y1, x2, y2].iter().all(|v| v.is_finite());
        if !finite || !(0.0..=1.0).contains(&x1) || !(0.0..=1.0).contains(&x2) {
            return Err(MotionError::InvalidEasing(format!(
                "cubic-bezier({x1}, {y1}, {x2}, {y2})"
            )));
        }
        Ok(Easing::CubicBezier(x1, y1, x2, y2))
    }

    /// Apply easing to a linear progress value (0.0 to 1.0)
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::Ease => cubic_bezier(0.25, 0.1, 0.25, 1.0, t),
            Easing::EaseIn => cubic_bezier(0.42, 0.0, 1.0, 1.0, t),
            Easing::EaseOut => cubic_bezier(0.0, 0.0, 0.58, 1.0, t),
            Easing::EaseInOut => cubic_bezier(0.42, 0.0, 0.58, 1.0, t),
            Easing::CubicBezier(x1, y1, x2, y2) => cubic_bezier(x1, y1, x2, y2, t),
            Easing::Steps(count, position) => stepped(count, position, t),
        }
    }

    /// CSS text for this timing function
    pub fn to_css(&self) -> String {
        match *self {
            Easing::Linear => "linear".to_string(),
            Easing::Ease => "ease".to_string(),
            Easing::EaseIn => "ease-in".to_string(),
            Easing::EaseOut => "ease-out".to_string(),
            Easing::EaseInOut => "ease-in-out".to_string(),
            Easing::CubicBezier(x1, y1, x2, y2) => format!(
                "cubic-bezier({},{},{},{})",
                format_number(x1),
                format_number(y1),
                format_number(x2),
                format_number(y2)
            ),
            Easing::Steps(count, StepPosition::End) => format!("steps({count}, end)"),
            Easing::Steps(count, StepPosition::Start) => format!("steps({count}, start)"),
        }
    }
}

impl FromStr for Easing {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().to_ascii_lowercase();
        let invalid = || MotionError::InvalidEasing(s.to_string());

        match text.as_str() {
            "linear" => return Ok(Easing::Linear),
            "ease" => return Ok(Easing::Ease),
            "ease-in" => return Ok(Easing::EaseIn),
            "ease-out" => return Ok(Easing::EaseOut),
            "ease-in-out" => return Ok(Easing::EaseInOut),
            "step-start" => return Ok(Easing::Steps(1, StepPosition::Start)),
            "step-end" => return Ok(Easing::Steps(1, StepPosition::End)),
            _ => {}
        }

        if let Some(args) = function_args(&text, "cubic-bezier") {
            let values = args
                .iter()
                .map(|a| a.parse::<f64>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>>>()?;
            if values.len() != 4 {
                return Err(invalid());
            }
            return Easing::cubic_bezier(values[0], values[1], values[2], values[3])
                .map_err(|_| invalid());
        }

        if let Some(args) = function_args(&text, "steps") {
            let count = args
                .first()
                .and_then(|c| c.parse::<u32>().ok())
                .filter(|c| *c >= 1)
                .ok_or_else(invalid)?;
            let position = match args.get(1).map(String::as_str) {
                None | Some("end") | Some("jump-end") => StepPosition::End,
                Some("start") | Some("jump-start") => StepPosition::Start,
                Some(_) => return Err(invalid()),
            };
            if args.len() > 2 {
                return Err(invalid());
            }
            return Ok(Easing::Steps(count, position));
        }

        Err(invalid())
    }
}

impl TryFrom<String> for Easing {
    type Error = MotionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Easing> for String {
    fn from(easing: Easing) -> Self {
        easing.to_css()
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_css())
    }
}

/// Split `name(a, b, c)` into its trimmed arguments
fn function_args(text: &str, name: &str) -> Option<Vec<String>> {
    let inner = text.strip_prefix(name)?.trim_start();
    let inner = inner.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.split(',').map(|a| a.trim().to_string()).collect())
}

fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64, progress: f64) -> f64 {
    if progress <= 0.0 {
        return 0.0;
    }
    if progress >= 1.0 {
        return 1.0;
    }
    let t = solve_bezier_x(x1, x2, progress);
    bezier_component(y1, y2, t)
}

/// Newton-Raphson with a bisection fallback when the slope flattens out
fn solve_bezier_x(x1: f64, x2: f64, target: f64) -> f64 {
    let mut t = target;
    for _ in 0..8 {
        let err = bezier_component(x1, x2, t) - target;
        if err.abs() < 1e-7 {
            return t;
        }
        let slope = bezier_derivative(x1, x2, t);
        if slope.abs() < 1e-6 {
            break;
        }
        t = (t - err / slope).clamp(0.0, 1.0);
    }

    let (mut lo, mut hi) = (0.0, 1.0);
    t = target;
    for _ in 0..32 {
        let x = bezier_component(x1, x2, t);
        if (x - target).abs() < 1e-7 {
            break;
        }
        if x < target {
            lo = t;
        } else {
            hi = t;
        }
        t = (lo + hi) * 0.5;
    }
    t
}

#[inline]
fn bezier_component(p1: f64, p2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * t * p1 + 3.0 * mt * t * t * p2 + t * t * t
}

#[inline]
fn bezier_derivative(p1: f64, p2: f64, t: f64) -> f64 {
    let mt = 1.0 - t;
    3.0 * mt * mt * p1 + 6.0 * mt * t * (p2 - p1) + 3.0 * t * t * (1.0 - p2)
}

fn stepped(count: u32, position: StepPosition, t: f64) -> f64 {
    let n = count.max(1) as f64;
    match position {
        StepPosition::Start => ((t * n).ceil() / n).min(1.0),
        StepPosition::End => ((t * n).floor() / n).min(1.0),
    }
}
