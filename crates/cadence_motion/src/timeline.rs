//! Timeline compiler
//!
//! Turns an ordered list of [`Stage`]s into CSS. Stage timing is resolved in
//! declaration order against a running cursor; if any stage starts before its
//! predecessor ends, all stages are merged into a single re-sampled
//! `@keyframes` rule, otherwise each stage gets its own block.
//!
//! # Example
//!
//! ```
//! use cadence_motion::css::NameAllocator;
//! use cadence_motion::timeline::{SequenceConfig, Stage, TimelineCompiler};
//! use cadence_motion::value::props;
//!
//! let names = NameAllocator::new("demo");
//! let sequence = SequenceConfig::new(vec![
//!     Stage::new("a", 200.0).from(props([("opacity", 0.0)])).to(props([("opacity", 1.0)])),
//!     Stage::new("b", 200.0)
//!         .from(props([("opacity", 1.0)]))
//!         .to(props([("opacity", 0.0)]))
//!         .start_at(100.0),
//! ]);
//!
//! let output = TimelineCompiler::new(&names).compile(&sequence).unwrap();
//! assert!(output.overlapping);
//! assert_eq!(output.total_duration, 300.0);
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::css::{emit_keyframes, AnimationSpec, FillMode, KeyframeBlock, KeyframeRule, NameAllocator};
use crate::easing::Easing;
use crate::error::{MotionError, Result};
use crate::value::{resolve_channels, Channel, PropertyMap, Time};

// ============================================================================
// Configuration
// ============================================================================

/// One step of a sequence
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    #[serde(default)]
    pub from: PropertyMap,
    #[serde(default)]
    pub to: PropertyMap,
    pub duration: Time,
    #[serde(default)]
    pub easing: Option<Easing>,
    #[serde(default, alias = "startAt")]
    pub start_at: Option<Time>,
}

impl Stage {
    pub fn new(name: impl Into<String>, duration: impl Into<Time>) -> Self {
        Self {
            name: name.into(),
            from: PropertyMap::new(),
            to: PropertyMap::new(),
            duration: duration.into(),
            easing: None,
            start_at: None,
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

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = Some(easing);
        self
    }

    pub fn start_at(mut self, start_at: impl Into<Time>) -> Self {
        self.start_at = Some(start_at.into());
        self
    }
}

/// An ordered list of stages plus an optional completion marker
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "stage")]
    pub stages: Vec<Stage>,
    #[serde(default, alias = "onComplete")]
    pub on_complete: Option<String>,
}

impl SequenceConfig {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            name: None,
            stages,
            on_complete: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_complete(mut self, marker: impl Into<String>) -> Self {
        self.on_complete = Some(marker.into());
        self
    }
}

// ============================================================================
// Timing Resolution
// ============================================================================

/// Absolute timing of one stage, valid for a single compile call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedStageTiming<'a> {
    pub stage: &'a Stage,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub end_ms: f64,
}

/// Resolve every stage's start and duration; returns the timings and the
/// final cursor (total duration)
pub fn resolve_timings(stages: &[Stage]) -> Result<(Vec<ResolvedStageTiming<'_>>, f64)> {
    for stage in stages {
        validate_stage(stage)?;
    }

    // Percentages resolve against zero for the estimate
    let estimated_total = stages
        .iter()
        .map(|s| s.duration.as_ms().unwrap_or(0.0))
        .fold(0.0_f64, f64::max);

    let mut timings: Vec<ResolvedStageTiming<'_>> = Vec::with_capacity(stages.len());
    let mut cursor = 0.0_f64;

    for stage in stages {
        let duration_ms = stage.duration.resolve(estimated_total);
        let start_ms = match (stage.start_at, timings.last()) {
            (None, _) => cursor,
            (Some(Time::Ms(ms)), _) => ms,
            (Some(Time::Percent(p)), Some(prev)) => prev.start_ms + prev.duration_ms * p / 100.0,
            (Some(Time::Percent(p)), None) => estimated_total * p / 100.0,
        };
        let end_ms = start_ms + duration_ms;
        cursor = cursor.max(end_ms);

        timings.push(ResolvedStageTiming {
            stage,
            start_ms,
            duration_ms,
            end_ms,
        });
    }

    Ok((timings, cursor))
}

/// Adjacent-pair overlap check in declaration order
///
/// A stage overlaps when it starts strictly before the previous stage ends.
/// Out-of-order stages are compared only with their declared predecessor.
pub fn detect_overlap(timings: &[ResolvedStageTiming<'_>]) -> bool {
    timings
        .windows(2)
        .any(|pair| pair[1].start_ms < pair[0].end_ms)
}

fn validate_stage(stage: &Stage) -> Result<()> {
    match stage.duration {
        Time::Ms(ms) if !(ms.is_finite() && ms > 0.0) => {
            return Err(MotionError::InvalidDuration(ms));
        }
        Time::Percent(p) if !(p.is_finite() && p > 0.0) => {
            return Err(MotionError::InvalidTime(stage.duration.to_string()));
        }
        _ => {}
    }
    if let Some(start) = stage.start_at {
        let value = match start {
            Time::Ms(v) | Time::Percent(v) => v,
        };
        if !(value.is_finite() && value >= 0.0) {
            return Err(MotionError::InvalidTime(start.to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

/// Per-stage timing and the class that animates it
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutput {
    pub name: String,
    pub start_at: f64,
    pub duration: f64,
    pub class_name: String,
}

/// Named marker that fires when the whole sequence finishes
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionMarker {
    pub name: String,
    pub at_ms: f64,
}

/// Result of compiling a sequence
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceOutput {
    pub css: String,
    /// Sequence-level class. Owns the merged rule when stages overlap; a
    /// scoping marker without a rule otherwise.
    pub class_name: String,
    pub stages: Vec<StageOutput>,
    pub total_duration: f64,
    pub overlapping: bool,
    pub blocks: Vec<KeyframeBlock>,
    pub completion: Option<CompletionMarker>,
}

impl SequenceOutput {
    fn empty(on_complete: Option<&str>) -> Self {
        Self {
            css: String::new(),
            class_name: String::new(),
            stages: Vec::new(),
            total_duration: 0.0,
            overlapping: false,
            blocks: Vec::new(),
            completion: on_complete.map(|name| CompletionMarker {
                name: name.to_string(),
                at_ms: 0.0,
            }),
        }
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles sequences using an engine's name allocator
pub struct TimelineCompiler<'a> {
    names: &'a NameAllocator,
    fill_mode: FillMode,
}

impl<'a> TimelineCompiler<'a> {
    pub fn new(names: &'a NameAllocator) -> Self {
        Self {
            names,
            fill_mode: FillMode::default(),
        }
    }

    pub fn with_fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    /// Compile a sequence into CSS
    pub fn compile(&self, config: &SequenceConfig) -> Result<SequenceOutput> {
        if config.stages.is_empty() {
            return Ok(SequenceOutput::empty(config.on_complete.as_deref()));
        }

        let (timings, total) = resolve_timings(&config.stages)?;
        let channels = timings
            .iter()
            .map(|t| resolve_channels(&t.stage.from, &t.stage.to))
            .collect::<Result<Vec<_>>>()?;
        let overlapping = detect_overlap(&timings);

        tracing::debug!(
            stages = timings.len(),
            total_ms = total,
            overlapping,
            "compiling sequence"
        );

        let base = config
            .name
            .as_deref()
            .unwrap_or(timings[0].stage.name.as_str());

        let mut output = if overlapping {
            self.compile_merged(base, &timings, &channels, total)
        } else {
            self.compile_independent(base, &timings, &channels)
        };
        output.total_duration = total;
        output.overlapping = overlapping;
        output.completion = config.on_complete.as_ref().map(|name| CompletionMarker {
            name: name.clone(),
            at_ms: total,
        });
        Ok(output)
    }

    fn compile_independent(
        &self,
        base: &str,
        timings: &[ResolvedStageTiming<'_>],
        channels: &[IndexMap<String, Channel>],
    ) -> SequenceOutput {
        let class_name = self.names.next(base);
        let mut blocks = Vec::with_capacity(timings.len());
        let mut stages = Vec::with_capacity(timings.len());

        for (timing, stage_channels) in timings.iter().zip(channels) {
            let from = stage_channels
                .iter()
                .map(|(name, ch)| (name.clone(), ch.from_value()))
                .collect();
            let to = stage_channels
                .iter()
                .map(|(name, ch)| (name.clone(), ch.to_value()))
                .collect();

            let spec = AnimationSpec::new(timing.duration_ms, timing.stage.easing.unwrap_or_default())
                .delay(timing.start_ms)
                .fill_mode(self.fill_mode);
            let block = emit_keyframes(
                &self.names.next(&timing.stage.name),
                vec![KeyframeRule::new(0.0, from), KeyframeRule::new(100.0, to)],
                &spec,
            );

            stages.push(StageOutput {
                name: timing.stage.name.clone(),
                start_at: timing.start_ms,
                duration: timing.duration_ms,
                class_name: block.class_name.clone(),
            });
            blocks.push(block);
        }

        SequenceOutput {
            css: blocks.iter().map(|b| b.css.as_str()).collect(),
            class_name,
            stages,
            total_duration: 0.0,
            overlapping: false,
            blocks,
            completion: None,
        }
    }

    fn compile_merged(
        &self,
        base: &str,
        timings: &[ResolvedStageTiming<'_>],
        channels: &[IndexMap<String, Channel>],
        total: f64,
    ) -> SequenceOutput {
        let rules = merged_rules(timings, channels, total);
        let spec = AnimationSpec::new(total, Easing::Linear).fill_mode(self.fill_mode);
        let block = emit_keyframes(&self.names.next(base), rules, &spec);

        let stages = timings
            .iter()
            .map(|t| StageOutput {
                name: t.stage.name.clone(),
                start_at: t.start_ms,
                duration: t.duration_ms,
                class_name: block.class_name.clone(),
            })
            .collect();

        SequenceOutput {
            css: block.css.clone(),
            class_name: block.class_name.clone(),
            stages,
            total_duration: 0.0,
            overlapping: true,
            blocks: vec![block],
            completion: None,
        }
    }
}

/// Sorted, de-duplicated break-point times: 0, every start and end, total
pub fn break_points(timings: &[ResolvedStageTiming<'_>], total: f64) -> Vec<f64> {
    let mut times = Vec::with_capacity(timings.len() * 2 + 2);
    times.push(0.0);
    for t in timings {
        times.push(t.start_ms);
        times.push(t.end_ms);
    }
    times.push(total);

    times.retain(|t| (0.0..=total).contains(t));
    times.sort_by(f64::total_cmp);
    times.dedup();
    times
}

fn merged_rules(
    timings: &[ResolvedStageTiming<'_>],
    channels: &[IndexMap<String, Channel>],
    total: f64,
) -> Vec<KeyframeRule> {
    break_points(timings, total)
        .into_iter()
        .map(|time| {
            let mut frame = PropertyMap::new();

            // The first stage's starting values seed every frame
            if let Some(first) = channels.first() {
                for (name, ch) in first {
                    frame.insert(name.clone(), ch.from_value());
                }
            }

            // Declaration order: later stages overwrite earlier ones
            for (timing, stage_channels) in timings.iter().zip(channels) {
                if time < timing.start_ms {
                    continue;
                }
                let progress = if timing.duration_ms > 0.0 {
                    ((time - timing.start_ms) / timing.duration_ms).min(1.0)
                } else {
                    1.0
                };
                for (name, ch) in stage_channels {
                    frame.insert(name.clone(), ch.sample(progress));
                }
            }

            let offset = if total > 0.0 { time / total * 100.0 } else { 0.0 };
            KeyframeRule::new(offset, frame)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{props, PropertyValue};

    fn fade(name: &str, from: f64, to: f64, duration: f64) -> Stage {
        Stage::new(name, duration)
            .from(props([("opacity", from)]))
            .to(props([("opacity", to)]))
    }

    /// Strip generated names so two compiles can be compared
    fn normalize(css: &str, names: &[&str]) -> String {
        names
            .iter()
            .fold(css.to_string(), |acc, name| acc.replace(name, "NAME"))
    }

    #[test]
    fn test_overlapping_sequence_merges() {
        let names = NameAllocator::new("t");
        let config = SequenceConfig::new(vec![
            fade("a", 0.0, 1.0, 200.0),
            fade("b", 1.0, 0.0, 200.0).start_at(100.0),
        ]);
        let out = TimelineCompiler::new(&names).compile(&config).unwrap();

        assert!(out.overlapping);
        assert_eq!(out.total_duration, 300.0);
        assert_eq!(out.blocks.len(), 1);

        let offsets: Vec<f64> = out.blocks[0].rules.iter().map(|r| r.offset).collect();
        assert_eq!(offsets.len(), 4);
        assert_eq!(offsets[0], 0.0);
        assert!((offsets[1] - 100.0 / 3.0).abs() < 1e-9);
        assert!((offsets[2] - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(offsets[3], 100.0);

        assert!(out.css.contains("33.3333% {"));
        assert!(out.css.contains("66.6667% {"));
        assert!(out.css.contains(&format!("animation: {} 300ms linear", out.class_name)));
        assert!(out.stages.iter().all(|s| s.class_name == out.class_name));
    }

    #[test]
    fn test_merged_values_follow_declaration_order() {
        let names = NameAllocator::new("t");
        let config = SequenceConfig::new(vec![
            fade("a", 0.0, 1.0, 200.0),
            fade("b", 1.0, 0.0, 200.0).start_at(100.0),
        ]);
        let out = TimelineCompiler::new(&names).compile(&config).unwrap();
        let opacity = |i: usize| out.blocks[0].rules[i].properties["opacity"].clone();

        assert_eq!(opacity(0), PropertyValue::Number(0.0));
        // b has started at 100ms and overrides a's midpoint
        assert_eq!(opacity(1), PropertyValue::Number(1.0));
        assert_eq!(opacity(2), PropertyValue::Number(0.5));
        assert_eq!(opacity(3), PropertyValue::Number(0.0));
    }

    #[test]
    fn test_touching_stages_do_not_overlap() {
        let names = NameAllocator::new("t");
        let config = SequenceConfig::new(vec![
            fade("a", 0.0, 1.0, 200.0),
            fade("b", 1.0, 0.0, 200.0).start_at(200.0),
        ]);
        let out = TimelineCompiler::new(&names).compile(&config).unwrap();

        assert!(!out.overlapping);
        assert_eq!(out.blocks.len(), 2);
        assert_ne!(out.stages[0].class_name, out.stages[1].class_name);
        assert!(out.css.contains(&format!(".{} {{", out.stages[0].class_name)));
        assert!(out.css.contains(&format!(".{} {{", out.stages[1].class_name)));
        assert!(out.css.contains("animation-delay: 200ms"));
        assert_eq!(out.total_duration, 400.0);
    }

    #[test]
    fn test_omitted_offsets_chain() {
        let stages = vec![fade("a", 0.0, 1.0, 100.0), fade("b", 1.0, 0.0, 150.0)];
        let (timings, total) = resolve_timings(&stages).unwrap();
        assert_eq!(timings[1].start_ms, 100.0);
        assert_eq!(total, 250.0);
        assert!(!detect_overlap(&timings));
    }

    #[test]
    fn test_percentage_offsets_use_previous_window() {
        let stages = vec![
            fade("a", 0.0, 1.0, 200.0).start_at(50.0),
            fade("b", 1.0, 0.0, 100.0).start_at(Time::Percent(50.0)),
            fade("c", 0.0, 1.0, 10.0).start_at(Time::Percent(0.0)),
        ];
        let (timings, _) = resolve_timings(&stages).unwrap();
        // 50 + 200 * 50%
        assert_eq!(timings[1].start_ms, 150.0);
        assert_eq!(timings[2].start_ms, 150.0);
    }

    #[test]
    fn test_percentage_duration_resolves_against_estimate() {
        let stages = vec![
            fade("a", 0.0, 1.0, 400.0),
            Stage::new("b", Time::Percent(50.0)).to(props([("x", 10.0)])),
        ];
        let (timings, total) = resolve_timings(&stages).unwrap();
        assert_eq!(timings[1].duration_ms, 200.0);
        assert_eq!(total, 600.0);
    }

    #[test]
    fn test_stage_before_predecessor_counts_as_overlap() {
        let stages = vec![
            fade("a", 0.0, 1.0, 100.0).start_at(200.0),
            fade("b", 0.0, 1.0, 100.0).start_at(0.0),
        ];
        let (timings, total) = resolve_timings(&stages).unwrap();
        assert!(detect_overlap(&timings));
        assert_eq!(total, 300.0);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let config = SequenceConfig::new(vec![
            fade("a", 0.0, 1.0, 170.0),
            Stage::new("b", 230.0)
                .from(props([("x", PropertyValue::from(0.0)), ("transform", "none".into())]))
                .to(props([("x", PropertyValue::from(33.0)), ("transform", "rotate(3deg)".into())]))
                .start_at(45.0),
            fade("c", 1.0, 0.2, 90.0).start_at(Time::Percent(30.0)),
        ]);

        let first_names = NameAllocator::new("t");
        let second_names = NameAllocator::new("t");
        let _ = second_names.next("offset the counter");

        let first = TimelineCompiler::new(&first_names).compile(&config).unwrap();
        let second = TimelineCompiler::new(&second_names).compile(&config).unwrap();

        assert_ne!(first.class_name, second.class_name);
        assert_eq!(
            normalize(&first.css, &[&first.class_name]),
            normalize(&second.css, &[&second.class_name])
        );
        assert_eq!(first.blocks[0].rules, second.blocks[0].rules);
    }

    #[test]
    fn test_opaque_values_snap_at_stage_end() {
        let names = NameAllocator::new("t");
        let config = SequenceConfig::new(vec![
            fade("a", 0.0, 1.0, 200.0),
            Stage::new("spin", 100.0)
                .from(props([("transform", "rotate(0deg)")]))
                .to(props([("transform", "rotate(90deg)")]))
                .start_at(50.0),
        ]);
        let out = TimelineCompiler::new(&names).compile(&config).unwrap();
        let rules = &out.blocks[0].rules;
        // break-points: 0, 50, 150, 200
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[1].properties["transform"], PropertyValue::from("rotate(0deg)"));
        assert_eq!(rules[2].properties["transform"], PropertyValue::from("rotate(90deg)"));
        assert_eq!(rules[3].properties["transform"], PropertyValue::from("rotate(90deg)"));
    }

    #[test]
    fn test_empty_sequence_is_noop() {
        let names = NameAllocator::new("t");
        let out = TimelineCompiler::new(&names)
            .compile(&SequenceConfig::default().on_complete("done"))
            .unwrap();
        assert!(out.css.is_empty());
        assert_eq!(out.total_duration, 0.0);
        assert!(out.stages.is_empty());
        assert_eq!(out.completion.unwrap().at_ms, 0.0);
        assert_eq!(names.allocated(), 0);
    }

    #[test]
    fn test_completion_marker_fires_at_end() {
        let names = NameAllocator::new("t");
        let config = SequenceConfig::new(vec![fade("a", 0.0, 1.0, 120.0)]).on_complete("shown");
        let out = TimelineCompiler::new(&names).compile(&config).unwrap();
        let marker = out.completion.unwrap();
        assert_eq!(marker.name, "shown");
        assert_eq!(marker.at_ms, 120.0);
    }

    #[test]
    fn test_invalid_stage_duration() {
        let names = NameAllocator::new("t");
        let config = SequenceConfig::new(vec![fade("a", 0.0, 1.0, 0.0)]);
        assert_eq!(
            TimelineCompiler::new(&names).compile(&config),
            Err(MotionError::InvalidDuration(0.0))
        );
    }

    #[test]
    fn test_stage_from_json() {
        let json = r#"{
            "stages": [
                {"name": "a", "from": {"opacity": 0}, "to": {"opacity": 1}, "duration": "0.2s"},
                {"name": "b", "to": {"x": 12}, "duration": 100, "startAt": "50%", "easing": "ease-in"}
            ],
            "onComplete": "done"
        }"#;
        let config: SequenceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.stages[0].duration, Time::Ms(200.0));
        assert_eq!(config.stages[1].start_at, Some(Time::Percent(50.0)));
        assert_eq!(config.stages[1].easing, Some(Easing::EaseIn));
        assert_eq!(config.on_complete.as_deref(), Some("done"));
    }
}
