//! Spring motion compiler
//!
//! Bakes a spring transition into CSS keyframes by integrating every numeric
//! property ahead of time. Sample `i` of `n` lands at `i / n * 100%`; the
//! class plays the result with `linear` timing since the curve is already in
//! the frames.
//!
//! Motions with any non-numeric endpoint can't be integrated and go through
//! the single-stage timeline path with `ease-out` instead.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::css::{emit_keyframes, AnimationSpec, KeyframeBlock, KeyframeRule, NameAllocator};
use crate::easing::Easing;
use crate::error::{MotionError, Result};
use crate::spring::{integrate, SpringChannelConfig, SpringConfig};
use crate::timeline::{SequenceConfig, Stage, TimelineCompiler};
use crate::value::{resolve_channels, Channel, PropertyMap, PropertyValue};

/// Fallback easing when a motion can't be spring-integrated
pub const DEGRADED_EASING: Easing = Easing::EaseOut;

/// A spring transition between two property sets
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringMotionConfig {
    pub name: String,
    #[serde(default)]
    pub from: PropertyMap,
    #[serde(default)]
    pub to: PropertyMap,
    pub stiffness: f64,
    pub damping: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Total duration; estimated from the spring when omitted
    #[serde(default, alias = "duration")]
    pub duration_ms: Option<f64>,
    /// Keyframe sample count; engine default when omitted
    #[serde(default)]
    pub steps: Option<usize>,
    #[serde(default, alias = "initialVelocity")]
    pub initial_velocity: f64,
}

fn default_mass() -> f64 {
    1.0
}

impl SpringMotionConfig {
    pub fn new(name: impl Into<String>, spring: SpringConfig) -> Self {
        Self {
            name: name.into(),
            from: PropertyMap::new(),
            to: PropertyMap::new(),
            stiffness: spring.stiffness,
            damping: spring.damping,
            mass: spring.mass,
            duration_ms: None,
            steps: None,
            initial_velocity: 0.0,
        }
    }

    pub fn from(mut self, from: PropertyMap) -> Self {
        self.from = from;
        self
    }

    pub fn to(mut self, to: PropertyMap) -> Self {
        self.to = to;
        self
    }

    pub fn duration(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn velocity(mut self, velocity: f64) -> Self {
        self.initial_velocity = velocity;
        self
    }

    pub fn spring(&self) -> SpringConfig {
        SpringConfig::new(self.stiffness, self.damping, self.mass)
    }
}

/// Lightweight control descriptor for motions long enough to coordinate at runtime
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeDescriptor {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub class_name: String,
    pub duration: f64,
}

/// Result of compiling a spring motion
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MotionOutput {
    pub css: String,
    pub class_name: String,
    pub duration_ms: f64,
    /// Present only when the motion is not build-time only
    pub js_config: Option<RuntimeDescriptor>,
    pub precomputed: bool,
    /// True when a non-numeric endpoint forced the eased fallback
    pub degraded: bool,
    #[serde(skip)]
    pub block: Option<KeyframeBlock>,
}

/// Compiles spring motions using an engine's name allocator and settings
pub struct MotionCompiler<'a> {
    names: &'a NameAllocator,
    config: &'a EngineConfig,
}

impl<'a> MotionCompiler<'a> {
    pub fn new(names: &'a NameAllocator, config: &'a EngineConfig) -> Self {
        Self { names, config }
    }

    /// Compile a spring motion into keyframes
    pub fn compile(&self, motion: &SpringMotionConfig) -> Result<MotionOutput> {
        let spring = motion.spring();
        spring.validate()?;
        let channels = resolve_channels(&motion.from, &motion.to)?;

        let steps = motion.steps.unwrap_or(self.config.default_spring_steps);
        if steps == 0 {
            return Err(MotionError::InvalidStepCount(steps));
        }

        let distance = channels
            .values()
            .map(|ch| match ch {
                Channel::Numeric { from, to } => (to - from).abs(),
                Channel::Opaque { .. } => 1.0,
            })
            .fold(0.0_f64, f64::max);
        let duration_ms = motion
            .duration_ms
            .unwrap_or_else(|| spring.settle_duration_ms(distance));
        if !(duration_ms.is_finite() && duration_ms > 0.0) {
            return Err(MotionError::InvalidDuration(duration_ms));
        }

        if channels.values().any(|ch| !ch.is_numeric()) {
            tracing::debug!(motion = %motion.name, "non-numeric endpoint, using eased transition");
            return self.compile_degraded(motion, duration_ms);
        }

        if channels.is_empty() {
            return Ok(self.finish(duration_ms, None, false));
        }

        let mut trajectories = Vec::with_capacity(channels.len());
        for (name, channel) in &channels {
            if let Channel::Numeric { from, to } = *channel {
                let channel_config =
                    SpringChannelConfig::new(spring, from, to).with_velocity(motion.initial_velocity);
                trajectories.push((name.as_str(), integrate(&channel_config, duration_ms, steps)?));
            }
        }

        let rules = (0..=steps)
            .map(|i| {
                let properties = trajectories
                    .iter()
                    .map(|(name, t)| (name.to_string(), PropertyValue::Number(t.samples()[i])))
                    .collect();
                KeyframeRule::new(i as f64 / steps as f64 * 100.0, properties)
            })
            .collect();

        let spec = AnimationSpec::new(duration_ms, Easing::Linear).fill_mode(self.config.fill_mode);
        let block = emit_keyframes(&self.names.next(&motion.name), rules, &spec);
        Ok(self.finish(duration_ms, Some(block), false))
    }

    fn compile_degraded(&self, motion: &SpringMotionConfig, duration_ms: f64) -> Result<MotionOutput> {
        let stage = Stage::new(motion.name.clone(), duration_ms)
            .from(motion.from.clone())
            .to(motion.to.clone())
            .easing(DEGRADED_EASING);
        let sequence = TimelineCompiler::new(self.names)
            .with_fill_mode(self.config.fill_mode)
            .compile(&SequenceConfig::new(vec![stage]))?;
        let block = sequence.blocks.into_iter().next();
        Ok(self.finish(duration_ms, block, true))
    }

    fn finish(&self, duration_ms: f64, block: Option<KeyframeBlock>, degraded: bool) -> MotionOutput {
        let precomputed = duration_ms < self.config.precompute_threshold_ms;
        let (css, class_name) = block
            .as_ref()
            .map(|b| (b.css.clone(), b.class_name.clone()))
            .unwrap_or_default();
        let js_config = (!precomputed).then(|| RuntimeDescriptor {
            kind: "css",
            class_name: class_name.clone(),
            duration: duration_ms,
        });

        tracing::debug!(class = %class_name, duration_ms, precomputed, degraded, "compiled spring motion");

        MotionOutput {
            css,
            class_name,
            duration_ms,
            js_config,
            precomputed,
            degraded,
            block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::props;

    fn fade_in(duration: f64) -> SpringMotionConfig {
        SpringMotionConfig::new("fade", SpringConfig::stiff())
            .from(props([("opacity", 0.0)]))
            .to(props([("opacity", 1.0)]))
            .duration(duration)
            .steps(10)
    }

    #[test]
    fn test_precompute_threshold() {
        let names = NameAllocator::new("t");
        let config = EngineConfig::default();
        let compiler = MotionCompiler::new(&names, &config);

        let short = compiler.compile(&fade_in(299.0)).unwrap();
        assert!(short.precomputed);
        assert!(short.js_config.is_none());

        let long = compiler.compile(&fade_in(300.0)).unwrap();
        assert!(!long.precomputed);
        let js = long.js_config.unwrap();
        assert_eq!(js.kind, "css");
        assert_eq!(js.class_name, long.class_name);
        assert_eq!(js.duration, 300.0);
    }

    #[test]
    fn test_frames_follow_trajectory() {
        let names = NameAllocator::new("t");
        let config = EngineConfig::default();
        let out = MotionCompiler::new(&names, &config)
            .compile(&fade_in(400.0))
            .unwrap();
        let block = out.block.unwrap();

        assert_eq!(block.rules.len(), 11);
        assert_eq!(block.rules[0].offset, 0.0);
        assert!((block.rules[5].offset - 50.0).abs() < 1e-9);
        assert_eq!(block.rules[10].offset, 100.0);
        assert_eq!(block.rules[0].properties["opacity"], PropertyValue::Number(0.0));
        assert!(out.css.contains("400ms linear"));
        assert!(!out.degraded);
    }

    #[test]
    fn test_non_numeric_degrades_to_ease_out() {
        let names = NameAllocator::new("t");
        let config = EngineConfig::default();
        let motion = SpringMotionConfig::new("spin", SpringConfig::wobbly())
            .from(props([("transform", "rotate(0deg)")]))
            .to(props([("transform", "rotate(180deg)")]))
            .duration(250.0);
        let out = MotionCompiler::new(&names, &config).compile(&motion).unwrap();

        assert!(out.degraded);
        assert!(out.css.contains("250ms ease-out"));
        assert_eq!(out.block.unwrap().rules.len(), 2);
    }

    #[test]
    fn test_invalid_spring_fails_before_css() {
        let names = NameAllocator::new("t");
        let config = EngineConfig::default();
        let mut motion = fade_in(200.0);
        motion.stiffness = 0.0;

        let result = MotionCompiler::new(&names, &config).compile(&motion);
        assert!(matches!(
            result,
            Err(MotionError::InvalidSpring { parameter: "stiffness", .. })
        ));
        assert_eq!(names.allocated(), 0);
    }

    #[test]
    fn test_estimated_duration() {
        let names = NameAllocator::new("t");
        let config = EngineConfig::default();
        let motion = SpringMotionConfig::new("slide", SpringConfig::gentle())
            .from(props([("x", 0.0)]))
            .to(props([("x", 200.0)]));
        let out = MotionCompiler::new(&names, &config).compile(&motion).unwrap();

        assert!((100.0..=3000.0).contains(&out.duration_ms));
        assert_eq!(out.block.unwrap().rules.len(), config.default_spring_steps + 1);
    }

    #[test]
    fn test_very_stiff_spring_emits_bounded_frames() {
        let names = NameAllocator::new("t");
        let config = EngineConfig::default();
        let motion = SpringMotionConfig::new("snap", SpringConfig::new(1e9, 0.0, 1.0))
            .from(props([("opacity", 0.0)]))
            .to(props([("opacity", 1.0)]))
            .duration(1000.0)
            .steps(60);
        let out = MotionCompiler::new(&names, &config).compile(&motion).unwrap();

        let block = out.block.unwrap();
        assert_eq!(block.rules.len(), 61);
        for rule in &block.rules {
            let PropertyValue::Number(opacity) = rule.properties["opacity"] else {
                panic!("opacity should stay numeric");
            };
            assert!((-1.0..=3.0).contains(&opacity), "opacity {opacity} escaped");
        }
        assert!(out.css.lines().all(|l| l.len() < 200));
    }

    #[test]
    fn test_zero_steps_rejected() {
        let names = NameAllocator::new("t");
        let config = EngineConfig::default();
        let result = MotionCompiler::new(&names, &config).compile(&fade_in(200.0).steps(0));
        assert_eq!(result, Err(MotionError::InvalidStepCount(0)));
    }

    #[test]
    fn test_descriptor_json_shape() {
        let descriptor = RuntimeDescriptor {
            kind: "css",
            class_name: "t-fade-1".to_string(),
            duration: 320.0,
        };
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["type"], "css");
        assert_eq!(json["className"], "t-fade-1");
    }
}
