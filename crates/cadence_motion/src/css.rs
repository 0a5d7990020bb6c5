//! Keyframe emitter
//!
//! Pure string formatting: percentage → property maps become a named
//! `@keyframes` rule plus a class rule that plays it.
//!
//! ```text
//! @keyframes cadence-fade-1 {
//!   0% { opacity: 0; }
//!   100% { opacity: 1; }
//! }
//! .cadence-fade-1 { animation: cadence-fade-1 200ms ease; animation-fill-mode: both; }
//! ```
//!
//! Transform shorthand keys (`x`, `y`, `z`, `scale`, `scaleX`, `scaleY`,
//! `rotate`) are folded into a single `transform` declaration, always composed
//! in the order `translate3d(..) scale(..) rotate(..)`, and written after all
//! other declarations of the frame.

use std::cell::Cell;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::value::{PropertyMap, PropertyValue};

// ============================================================================
// Number Formatting
// ============================================================================

/// Format a number for CSS: at most four decimals, no trailing zeros, no `-0`
pub fn format_number(value: f64) -> String {
    let rounded = (value * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 || !rounded.is_finite() {
        return "0".to_string();
    }
    format!("{rounded}")
}

/// Format a keyframe offset (0 to 100) with at most four decimals
pub fn format_percent(value: f64) -> String {
    let rounded = (value.clamp(0.0, 100.0) * 10_000.0).round() / 10_000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{rounded}")
}

// ============================================================================
// Fill Mode
// ============================================================================

/// CSS `animation-fill-mode`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    None,
    Forwards,
    Backwards,
    #[default]
    Both,
}

impl FillMode {
    pub fn as_css(&self) -> &'static str {
        match self {
            FillMode::None => "none",
            FillMode::Forwards => "forwards",
            FillMode::Backwards => "backwards",
            FillMode::Both => "both",
        }
    }
}

// ============================================================================
// Keyframe Blocks
// ============================================================================

/// One keyframe: an offset in percent and the property values at that offset
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyframeRule {
    pub offset: f64,
    pub properties: PropertyMap,
}

impl KeyframeRule {
    pub fn new(offset: f64, properties: PropertyMap) -> Self {
        Self { offset, properties }
    }
}

/// How the generated class plays its keyframes
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationSpec {
    pub duration_ms: f64,
    pub easing: Easing,
    pub delay_ms: f64,
    pub fill_mode: FillMode,
    /// Extra declarations appended to the class rule
    pub extra: Vec<(String, String)>,
}

impl AnimationSpec {
    pub fn new(duration_ms: f64, easing: Easing) -> Self {
        Self {
            duration_ms,
            easing,
            delay_ms: 0.0,
            fill_mode: FillMode::default(),
            extra: Vec::new(),
        }
    }

    pub fn delay(mut self, delay_ms: f64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    pub fn declaration(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((property.into(), value.into()));
        self
    }
}

/// A named `@keyframes` rule and the class that plays it
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KeyframeBlock {
    pub name: String,
    pub rules: Vec<KeyframeRule>,
    pub css: String,
    pub class_name: String,
}

/// Render keyframes and their class rule
///
/// Rules whose offsets print to the same selector are collapsed first, see
/// [`collapse_offsets`].
pub fn emit_keyframes(name: &str, rules: Vec<KeyframeRule>, spec: &AnimationSpec) -> KeyframeBlock {
    let rules = collapse_offsets(rules);
    let mut css = String::with_capacity(64 + rules.len() * 48);

    let _ = writeln!(css, "@keyframes {name} {{");
    for rule in &rules {
        let body = declarations(&rule.properties)
            .iter()
            .map(|(p, v)| format!("{p}: {v};"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(css, "  {}% {{ {} }}", format_percent(rule.offset), body);
    }
    css.push_str("}\n");

    let _ = write!(
        css,
        ".{name} {{ animation: {name} {}ms {};",
        format_number(spec.duration_ms),
        spec.easing.to_css()
    );
    if spec.delay_ms > 0.0 {
        let _ = write!(css, " animation-delay: {}ms;", format_number(spec.delay_ms));
    }
    if spec.fill_mode != FillMode::None {
        let _ = write!(css, " animation-fill-mode: {};", spec.fill_mode.as_css());
    }
    for (property, value) in &spec.extra {
        let _ = write!(css, " {property}: {value};");
    }
    css.push_str(" }\n");

    KeyframeBlock {
        name: name.to_string(),
        rules,
        css,
        class_name: name.to_string(),
    }
}

/// Merge adjacent rules that would print under the same percentage
///
/// The rule closest to the printed offset keeps its values; the others only
/// contribute properties it does not set.
pub fn collapse_offsets(rules: Vec<KeyframeRule>) -> Vec<KeyframeRule> {
    let mut groups: Vec<(String, Vec<KeyframeRule>)> = Vec::with_capacity(rules.len());
    for rule in rules {
        let label = format_percent(rule.offset);
        match groups.last_mut() {
            Some((last, group)) if *last == label => group.push(rule),
            _ => groups.push((label, vec![rule])),
        }
    }

    groups
        .into_iter()
        .filter_map(|(label, group)| {
            if group.len() == 1 {
                return group.into_iter().next();
            }
            let printed: f64 = label.parse().unwrap_or(0.0);
            let nearest = group
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    (a.offset - printed).abs().total_cmp(&(b.offset - printed).abs())
                })
                .map_or(0, |(i, _)| i);

            tracing::debug!(offset = %label, rules = group.len(), "collapsing colliding keyframes");

            let mut kept = None;
            let mut rest = Vec::with_capacity(group.len() - 1);
            for (i, rule) in group.into_iter().enumerate() {
                if i == nearest {
                    kept = Some(rule);
                } else {
                    rest.push(rule);
                }
            }
            kept.map(|mut kept| {
                for rule in rest {
                    for (property, value) in rule.properties {
                        kept.properties.entry(property).or_insert(value);
                    }
                }
                kept
            })
        })
        .collect()
}

// ============================================================================
// Declarations
// ============================================================================

const UNITLESS: &[&str] = &[
    "opacity",
    "z-index",
    "font-weight",
    "line-height",
    "flex-grow",
    "flex-shrink",
    "order",
    "scale",
];

#[derive(Default)]
struct TransformParts {
    translate: [Option<String>; 3],
    scale: [Option<String>; 2],
    rotate: Option<String>,
    raw: Option<String>,
}

impl TransformParts {
    fn is_empty(&self) -> bool {
        self.translate.iter().all(Option::is_none)
            && self.scale.iter().all(Option::is_none)
            && self.rotate.is_none()
            && self.raw.is_none()
    }

    fn compose(self) -> String {
        let mut parts = Vec::with_capacity(4);
        if self.translate.iter().any(Option::is_some) {
            let [x, y, z] = self.translate.map(|c| c.unwrap_or_else(|| "0px".to_string()));
            parts.push(format!("translate3d({x}, {y}, {z})"));
        }
        if self.scale.iter().any(Option::is_some) {
            let [sx, sy] = self.scale.map(|c| c.unwrap_or_else(|| "1".to_string()));
            parts.push(format!("scale({sx}, {sy})"));
        }
        if let Some(r) = self.rotate {
            parts.push(format!("rotate({r})"));
        }
        if let Some(raw) = self.raw {
            parts.push(raw);
        }
        parts.join(" ")
    }
}

/// Turn a property map into ordered CSS `(property, value)` declarations
pub fn declarations(properties: &PropertyMap) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(properties.len());
    let mut transform = TransformParts::default();

    for (name, value) in properties {
        match name.as_str() {
            "x" => transform.translate[0] = Some(with_unit(value, "px")),
            "y" => transform.translate[1] = Some(with_unit(value, "px")),
            "z" => transform.translate[2] = Some(with_unit(value, "px")),
            "scale" => {
                let s = with_unit(value, "");
                transform.scale = [Some(s.clone()), Some(s)];
            }
            "scaleX" => transform.scale[0] = Some(with_unit(value, "")),
            "scaleY" => transform.scale[1] = Some(with_unit(value, "")),
            "rotate" => transform.rotate = Some(with_unit(value, "deg")),
            "transform" => transform.raw = Some(with_unit(value, "")),
            _ => {
                let property = kebab_case(name);
                let unit = if property.starts_with("--") || UNITLESS.contains(&property.as_str()) {
                    ""
                } else {
                    "px"
                };
                out.push((property, with_unit(value, unit)));
            }
        }
    }

    if !transform.is_empty() {
        out.push(("transform".to_string(), transform.compose()));
    }
    out
}

fn with_unit(value: &PropertyValue, unit: &str) -> String {
    match value {
        PropertyValue::Number(n) => format!("{}{unit}", format_number(*n)),
        PropertyValue::Text(text) => text.clone(),
    }
}

/// `backgroundColor` → `background-color`; custom properties pass through
pub fn kebab_case(name: &str) -> String {
    if name.starts_with("--") {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Name Allocation
// ============================================================================

/// Deterministic class / keyframe name source scoped to one engine
///
/// Names are `<prefix>-<base>-<n>` with a monotonically increasing `n`, so
/// output is reproducible for a given call order.
#[derive(Debug)]
pub struct NameAllocator {
    prefix: String,
    counter: Cell<u64>,
}

impl NameAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: css_ident(&prefix.into()),
            counter: Cell::new(0),
        }
    }

    /// Allocate the next unique name for `base`
    pub fn next(&self, base: &str) -> String {
        let n = self.counter.get() + 1;
        self.counter.set(n);
        let base = css_ident(base);
        if base.is_empty() {
            format!("{}-{n}", self.prefix)
        } else {
            format!("{}-{base}-{n}", self.prefix)
        }
    }

    /// Number of names handed out so far
    pub fn allocated(&self) -> u64 {
        self.counter.get()
    }
}

/// Reduce arbitrary text to a safe CSS identifier fragment
fn css_ident(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("n{trimmed}")
    } else {
        trimmed.to_string()
    }
}
