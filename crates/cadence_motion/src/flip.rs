//! FLIP keyframes
//!
//! First, Last, Invert, Play for layout jumps:
//! - **F**irst: the element's box before the layout change
//! - **L**ast: its box after the change
//! - **I**nvert: a translate/scale that makes the last box look like the first
//! - **P**lay: animate that transform back to identity
//!
//! The transform math is memoized in a [`FlipCache`] keyed by geometry,
//! duration, easing and origin. Names only pick the generated class, so two
//! names over the same geometry share one cache entry but get their own rule.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::css::{emit_keyframes, format_number, AnimationSpec, FillMode, KeyframeRule, NameAllocator};
use crate::easing::Easing;
use crate::error::{MotionError, Result};
use crate::value::{PropertyMap, PropertyValue};

// ============================================================================
// Geometry
// ============================================================================

/// Axis-aligned rectangle; both boxes of a transition share one coordinate space
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !value.is_finite() {
                return Err(MotionError::InvalidGeometry { field, value });
            }
        }
        Ok(())
    }

    /// Largest absolute difference of any edge or size against `other`
    pub fn max_delta(&self, other: &BoundingBox) -> f64 {
        [
            self.x - other.x,
            self.y - other.y,
            self.width - other.width,
            self.height - other.height,
        ]
        .iter()
        .fold(0.0_f64, |acc, d| acc.max(d.abs()))
    }
}

/// Pivot for the inverted scale
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformOrigin {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl TransformOrigin {
    /// Origin as fractions of the box size
    pub fn fractions(&self) -> (f64, f64) {
        match self {
            TransformOrigin::Center => (0.5, 0.5),
            TransformOrigin::TopLeft => (0.0, 0.0),
            TransformOrigin::TopRight => (1.0, 0.0),
            TransformOrigin::BottomLeft => (0.0, 1.0),
            TransformOrigin::BottomRight => (1.0, 1.0),
        }
    }

    pub fn as_css(&self) -> &'static str {
        match self {
            TransformOrigin::Center => "center",
            TransformOrigin::TopLeft => "top left",
            TransformOrigin::TopRight => "top right",
            TransformOrigin::BottomLeft => "bottom left",
            TransformOrigin::BottomRight => "bottom right",
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

fn default_duration() -> f64 {
    300.0
}

fn default_easing() -> Easing {
    Easing::STANDARD
}

/// Input to one FLIP generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlipConfig {
    pub from: BoundingBox,
    pub to: BoundingBox,
    #[serde(default = "default_duration", alias = "duration")]
    pub duration_ms: f64,
    #[serde(default = "default_easing")]
    pub easing: Easing,
    #[serde(default)]
    pub origin: TransformOrigin,
}

impl FlipConfig {
    pub fn new(from: BoundingBox, to: BoundingBox) -> Self {
        Self {
            from,
            to,
            duration_ms: default_duration(),
            easing: default_easing(),
            origin: TransformOrigin::default(),
        }
    }

    pub fn duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn origin(mut self, origin: TransformOrigin) -> Self {
        self.origin = origin;
        self
    }

    fn validate(&self) -> Result<()> {
        self.from.validate()?;
        self.to.validate()?;
        if !(self.duration_ms.is_finite() && self.duration_ms > 0.0) {
            return Err(MotionError::InvalidDuration(self.duration_ms));
        }
        Ok(())
    }
}

// ============================================================================
// Transform Derivation
// ============================================================================

/// The inverse transform applied at 0%
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipTransform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl FlipTransform {
    pub const IDENTITY: FlipTransform = FlipTransform {
        translate_x: 0.0,
        translate_y: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
    };

    /// Derive the transform that maps `to` visually onto `from`
    pub fn between(from: &BoundingBox, to: &BoundingBox, origin: TransformOrigin) -> Self {
        let (fx, fy) = origin.fractions();
        let scale_x = axis_scale(from.width, to.width);
        let scale_y = axis_scale(from.height, to.height);

        // Scaling about the origin moves the box's leading edge by
        // fx * width * (1 - s); the translation compensates for it.
        FlipTransform {
            translate_x: (from.x - to.x) + fx * to.width * (scale_x - 1.0),
            translate_y: (from.y - to.y) + fy * to.height * (scale_y - 1.0),
            scale_x,
            scale_y,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl fmt::Display for FlipTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "translate3d({}px, {}px, 0) scale({}, {})",
            format_number(self.translate_x),
            format_number(self.translate_y),
            format_number(self.scale_x),
            format_number(self.scale_y)
        )
    }
}

/// Zero-sized boxes can't be inverted by scale; that axis stays at 1
fn axis_scale(from: f64, to: f64) -> f64 {
    if from == 0.0 || to == 0.0 {
        return 1.0;
    }
    let scale = from / to;
    if scale.is_finite() {
        scale
    } else {
        1.0
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Structural key: exact input bits, so equal inputs always share an entry
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct FlipKey {
    from: [u64; 4],
    to: [u64; 4],
    duration: u64,
    easing: String,
    origin: TransformOrigin,
}

impl FlipKey {
    fn new(config: &FlipConfig) -> Self {
        let rect = |b: &BoundingBox| [bits(b.x), bits(b.y), bits(b.width), bits(b.height)];
        Self {
            from: rect(&config.from),
            to: rect(&config.to),
            duration: bits(config.duration_ms),
            easing: config.easing.to_css(),
            origin: config.origin,
        }
    }
}

/// `0.0` and `-0.0` hash the same
fn bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

struct FlipEntry {
    transform: FlipTransform,
    outputs: FxHashMap<String, FlipOutput>,
}

/// Hit / miss counters for a [`FlipCache`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Memo table for FLIP transforms and the rules generated from them
///
/// Purely a cost saver: clearing it never changes what gets generated for a
/// given input, apart from fresh class names.
#[derive(Default)]
pub struct FlipCache {
    entries: FxHashMap<FlipKey, FlipEntry>,
    hits: u64,
    misses: u64,
}

impl FlipCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct geometry keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    fn entry(&mut self, config: &FlipConfig) -> &mut FlipEntry {
        let key = FlipKey::new(config);
        if self.entries.contains_key(&key) {
            self.hits += 1;
            tracing::trace!(origin = ?config.origin, "flip cache hit");
        } else {
            self.misses += 1;
            tracing::trace!(origin = ?config.origin, "flip cache miss");
        }
        self.entries.entry(key).or_insert_with(|| FlipEntry {
            transform: FlipTransform::between(&config.from, &config.to, config.origin),
            outputs: FxHashMap::default(),
        })
    }
}

impl fmt::Debug for FlipCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlipCache")
            .field("entries", &self.entries.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Generated FLIP rule
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipOutput {
    pub css: String,
    pub class_name: String,
    pub transform: FlipTransform,
}

/// Generates FLIP keyframes through a cache
pub struct FlipGenerator<'a> {
    cache: &'a mut FlipCache,
    names: &'a NameAllocator,
    fill_mode: FillMode,
}

impl<'a> FlipGenerator<'a> {
    pub fn new(cache: &'a mut FlipCache, names: &'a NameAllocator) -> Self {
        Self {
            cache,
            names,
            fill_mode: FillMode::default(),
        }
    }

    pub fn with_fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    /// Two-frame animation from the inverted transform to identity
    pub fn generate(&mut self, name: &str, config: &FlipConfig) -> Result<FlipOutput> {
        config.validate()?;

        let entry = self.cache.entry(config);
        if let Some(output) = entry.outputs.get(name) {
            return Ok(output.clone());
        }

        let rules = vec![
            KeyframeRule::new(0.0, transform_frame(&entry.transform)),
            KeyframeRule::new(100.0, transform_frame(&FlipTransform::IDENTITY)),
        ];
        let spec = AnimationSpec::new(config.duration_ms, config.easing)
            .fill_mode(self.fill_mode)
            .declaration("transform-origin", config.origin.as_css());
        let block = emit_keyframes(&self.names.next(name), rules, &spec);

        let output = FlipOutput {
            css: block.css,
            class_name: block.class_name,
            transform: entry.transform,
        };
        entry.outputs.insert(name.to_string(), output.clone());
        Ok(output)
    }
}

fn transform_frame(transform: &FlipTransform) -> PropertyMap {
    let mut frame = PropertyMap::new();
    frame.insert(
        "transform".to_string(),
        PropertyValue::Text(transform.to_string()),
    );
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shrink() -> FlipConfig {
        FlipConfig::new(
            BoundingBox::new(0.0, 0.0, 200.0, 100.0),
            BoundingBox::new(50.0, 20.0, 100.0, 50.0),
        )
    }

    #[test]
    fn test_center_origin_transform() {
        let t = FlipTransform::between(
            &BoundingBox::new(0.0, 0.0, 200.0, 100.0),
            &BoundingBox::new(50.0, 20.0, 100.0, 50.0),
            TransformOrigin::Center,
        );
        assert_eq!(t.scale_x, 2.0);
        assert_eq!(t.scale_y, 2.0);
        // centers: from (100, 50), to (100, 45)
        assert_eq!(t.translate_x, 0.0);
        assert_eq!(t.translate_y, 5.0);
    }

    #[test]
    fn test_top_left_origin_is_plain_offset() {
        let t = FlipTransform::between(
            &BoundingBox::new(10.0, 30.0, 200.0, 100.0),
            &BoundingBox::new(50.0, 20.0, 100.0, 50.0),
            TransformOrigin::TopLeft,
        );
        assert_eq!(t.translate_x, -40.0);
        assert_eq!(t.translate_y, 10.0);
    }

    #[test]
    fn test_bottom_right_origin_maps_corner() {
        let from = BoundingBox::new(0.0, 0.0, 40.0, 40.0);
        let to = BoundingBox::new(100.0, 100.0, 20.0, 20.0);
        let t = FlipTransform::between(&from, &to, TransformOrigin::BottomRight);
        // pivot at to's bottom-right (120, 120); from's bottom-right is (40, 40)
        assert_eq!(t.translate_x, -80.0);
        assert_eq!(t.translate_y, -80.0);
        // left edge after transform: pivot + t + s * (to.x - pivot)
        let left = 120.0 + t.translate_x + t.scale_x * (100.0 - 120.0);
        assert_eq!(left, from.x);
    }

    #[test]
    fn test_degenerate_box() {
        let mut cache = FlipCache::new();
        let names = NameAllocator::new("t");
        let config = FlipConfig::new(
            BoundingBox::new(0.0, 0.0, 0.0, 0.0),
            BoundingBox::new(0.0, 0.0, 100.0, 100.0),
        );
        let out = FlipGenerator::new(&mut cache, &names)
            .generate("grow", &config)
            .unwrap();

        assert!(!out.css.is_empty());
        assert!(!out.css.contains("NaN"));
        assert!(!out.css.contains("inf"));
        assert_eq!(out.transform.scale_x, 1.0);
        assert_eq!(out.transform.scale_y, 1.0);
    }

    #[test]
    fn test_css_shape() {
        let mut cache = FlipCache::new();
        let names = NameAllocator::new("t");
        let out = FlipGenerator::new(&mut cache, &names)
            .generate("card", &shrink())
            .unwrap();

        assert_eq!(out.class_name, "t-card-1");
        assert!(out
            .css
            .contains("0% { transform: translate3d(0px, 5px, 0) scale(2, 2); }"));
        assert!(out
            .css
            .contains("100% { transform: translate3d(0px, 0px, 0) scale(1, 1); }"));
        assert!(out.css.contains("300ms cubic-bezier(0.4,0,0.2,1)"));
        assert!(out.css.contains("transform-origin: center;"));
    }

    #[test]
    fn test_cache_shared_across_names() {
        let mut cache = FlipCache::new();
        let names = NameAllocator::new("t");
        let config = shrink();

        let a = FlipGenerator::new(&mut cache, &names).generate("a", &config).unwrap();
        assert_eq!(cache.len(), 1);
        let b = FlipGenerator::new(&mut cache, &names).generate("b", &config).unwrap();
        assert_eq!(cache.len(), 1);

        assert_ne!(a.class_name, b.class_name);
        assert_eq!(a.transform, b.transform);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_same_name_reuses_rule() {
        let mut cache = FlipCache::new();
        let names = NameAllocator::new("t");
        let mut generator = FlipGenerator::new(&mut cache, &names);

        let first = generator.generate("card", &shrink()).unwrap();
        let second = generator.generate("card", &shrink()).unwrap();
        assert_eq!(first, second);
        assert_eq!(names.allocated(), 1);
    }

    #[test]
    fn test_clear_does_not_change_output() {
        let mut cache = FlipCache::new();
        let names = NameAllocator::new("t");
        let before = FlipGenerator::new(&mut cache, &names)
            .generate("a", &shrink())
            .unwrap();
        cache.clear();
        assert!(cache.is_empty());
        let after = FlipGenerator::new(&mut cache, &names)
            .generate("a", &shrink())
            .unwrap();

        assert_eq!(before.transform, after.transform);
        assert_eq!(
            before.css.replace(&before.class_name, "NAME"),
            after.css.replace(&after.class_name, "NAME")
        );
    }

    #[test]
    fn test_config_differences_miss() {
        let mut cache = FlipCache::new();
        let names = NameAllocator::new("t");
        let mut generator = FlipGenerator::new(&mut cache, &names);
        generator.generate("a", &shrink()).unwrap();
        generator.generate("a", &shrink().duration(500.0)).unwrap();
        generator
            .generate("a", &shrink().origin(TransformOrigin::TopLeft))
            .unwrap();
        generator.generate("a", &shrink().easing(Easing::Linear)).unwrap();
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_invalid_geometry() {
        let mut cache = FlipCache::new();
        let names = NameAllocator::new("t");
        let config = FlipConfig::new(
            BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0),
            BoundingBox::default(),
        );
        let result = FlipGenerator::new(&mut cache, &names).generate("a", &config);
        assert!(matches!(
            result,
            Err(MotionError::InvalidGeometry { field: "x", .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let config: FlipConfig = serde_json::from_str(
            r#"{"from": {"x": 0, "y": 0, "width": 10, "height": 10},
                "to": {"x": 5, "y": 5, "width": 20, "height": 20},
                "origin": "top-left"}"#,
        )
        .unwrap();
        assert_eq!(config.duration_ms, 300.0);
        assert_eq!(config.easing, Easing::STANDARD);
        assert_eq!(config.origin, TransformOrigin::TopLeft);
    }
}
