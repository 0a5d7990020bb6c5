//! Manifest compilation
//!
//! Runs every entry of a manifest through one engine so class names stay
//! unique across the whole stylesheet.

use anyhow::{Context, Result};
use cadence_motion::{
    create_engine, FlipOutput, ManualFrameHost, MotionOutput, RuntimeDescriptor, SequenceOutput,
};
use serde::Serialize;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::config::Manifest;

/// An output tagged with the manifest entry it came from
#[derive(Debug, Serialize)]
pub struct Named<T> {
    pub name: String,
    #[serde(flatten)]
    pub output: T,
}

/// Everything produced from one manifest
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub sequences: Vec<Named<SequenceOutput>>,
    pub springs: Vec<MotionOutput>,
    pub flips: Vec<Named<FlipOutput>>,
}

/// Compile every entry, failing on the first invalid one
pub fn compile_manifest(manifest: &Manifest) -> Result<BuildReport> {
    let engine = create_engine(manifest.engine.clone(), Rc::new(ManualFrameHost::new()));
    let mut report = BuildReport::default();

    for (index, sequence) in manifest.sequences.iter().enumerate() {
        let name = sequence
            .name
            .clone()
            .unwrap_or_else(|| format!("sequence[{index}]"));
        let output = engine
            .compile_sequence(sequence)
            .with_context(|| format!("Failed to compile sequence '{}'", name))?;
        if output.overlapping {
            debug!(sequence = %name, "stages overlap, merged into one rule");
        }
        report.sequences.push(Named { name, output });
    }

    for spring in &manifest.springs {
        let output = engine
            .compile_spring_motion(spring)
            .with_context(|| format!("Failed to compile spring '{}'", spring.name))?;
        if output.degraded {
            warn!(spring = %spring.name, "non-numeric endpoint, fell back to eased keyframes");
        }
        report.springs.push(output);
    }

    for flip in &manifest.flips {
        let output = engine
            .generate_flip_keyframes(&flip.name, &flip.config)
            .with_context(|| format!("Failed to generate flip '{}'", flip.name))?;
        report.flips.push(Named {
            name: flip.name.clone(),
            output,
        });
    }

    let stats = engine.flip_cache_stats();
    debug!(
        classes = engine.names_allocated(),
        flip_hits = stats.hits,
        flip_misses = stats.misses,
        "manifest compiled"
    );

    Ok(report)
}

impl BuildReport {
    /// All generated CSS as one stylesheet
    pub fn stylesheet(&self) -> String {
        let mut sections = Vec::new();
        for sequence in &self.sequences {
            if !sequence.output.css.is_empty() {
                sections.push(format!("/* sequence: {} */\n{}", sequence.name, sequence.output.css));
            }
        }
        for spring in &self.springs {
            if !spring.css.is_empty() {
                sections.push(format!("/* spring: {} */\n{}", spring.class_name, spring.css));
            }
        }
        for flip in &self.flips {
            sections.push(format!("/* flip: {} */\n{}", flip.name, flip.output.css));
        }

        let mut css = sections.join("\n\n");
        if !css.is_empty() && !css.ends_with('\n') {
            css.push('\n');
        }
        css
    }

    /// Descriptors for motions that need runtime coordination
    pub fn runtime_descriptors(&self) -> Vec<&RuntimeDescriptor> {
        self.springs
            .iter()
            .filter_map(|spring| spring.js_config.as_ref())
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.sequences.len() + self.springs.len() + self.flips.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(toml: &str) -> Manifest {
        Manifest::from_toml(toml).unwrap()
    }

    #[test]
    fn test_compile_manifest() {
        let report = compile_manifest(&manifest(
            r#"
[engine]
class_prefix = "ui"

[[sequence]]
name = "intro"
[[sequence.stages]]
name = "fade"
duration = 200
from = { opacity = 0 }
to = { opacity = 1 }

[[spring]]
name = "pop"
stiffness = 170
damping = 26
duration = 500
steps = 10
from = { scale = 0.5 }
to = { scale = 1 }

[[flip]]
name = "card"
from = { x = 0, y = 0, width = 10, height = 10 }
to = { x = 30, y = 0, width = 10, height = 10 }
"#,
        ))
        .unwrap();

        assert_eq!(report.entry_count(), 3);
        let css = report.stylesheet();
        assert!(css.contains("/* sequence: intro */"));
        assert!(css.contains("@keyframes ui-fade-"));
        assert!(css.contains("@keyframes ui-pop-"));
        assert!(css.contains("/* flip: card */"));
        assert!(css.ends_with('\n'));

        let descriptors = report.runtime_descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].duration, 500.0);
    }

    #[test]
    fn test_short_springs_have_no_descriptor() {
        let report = compile_manifest(&manifest(
            r#"
[[spring]]
name = "tap"
stiffness = 400
damping = 30
duration = 120
from = { opacity = 0 }
to = { opacity = 1 }
"#,
        ))
        .unwrap();
        assert!(report.springs[0].precomputed);
        assert!(report.runtime_descriptors().is_empty());
    }

    #[test]
    fn test_error_names_the_entry() {
        let err = compile_manifest(&manifest(
            r#"
[[spring]]
name = "broken"
stiffness = -1
damping = 10
from = { x = 0 }
to = { x = 1 }
"#,
        ))
        .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("Failed to compile spring 'broken'"));
        assert!(message.contains("stiffness"));
    }

    #[test]
    fn test_unnamed_sequence_label() {
        let report = compile_manifest(&manifest(
            r#"
[[sequence]]
[[sequence.stages]]
name = "a"
duration = 100
to = { x = 10 }
"#,
        ))
        .unwrap();
        assert_eq!(report.sequences[0].name, "sequence[0]");
    }

    #[test]
    fn test_report_json_shape() {
        let report = compile_manifest(&manifest(
            r#"
[[flip]]
name = "card"
from = { x = 0, y = 0, width = 10, height = 10 }
to = { x = 0, y = 20, width = 10, height = 10 }
"#,
        ))
        .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["flips"][0]["name"], "card");
        assert_eq!(json["flips"][0]["transform"]["translateY"], -20.0);
        assert!(json["sequences"].as_array().unwrap().is_empty());
    }
}
