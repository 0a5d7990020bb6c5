//! Cadence manifest handling
//!
//! A `cadence.toml` manifest lists everything to pre-compute:
//! - `[engine]` - engine settings (class prefix, thresholds, fill mode)
//! - `[[sequence]]` - multi-stage timelines
//! - `[[spring]]` - spring motions
//! - `[[flip]]` - FLIP transitions between two known boxes

use anyhow::{Context, Result};
use cadence_motion::{EngineConfig, FlipConfig, SequenceConfig, SpringMotionConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default manifest file name
pub const MANIFEST_FILE: &str = "cadence.toml";

/// Parsed `cadence.toml`
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Manifest {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default, rename = "sequence")]
    pub sequences: Vec<SequenceConfig>,
    #[serde(default, rename = "spring")]
    pub springs: Vec<SpringMotionConfig>,
    #[serde(default, rename = "flip")]
    pub flips: Vec<FlipEntry>,
}

/// A named FLIP transition
#[derive(Debug, Deserialize, Serialize)]
pub struct FlipEntry {
    pub name: String,
    #[serde(flatten)]
    pub config: FlipConfig,
}

impl Manifest {
    /// Load a manifest from a file, or from `cadence.toml` inside a directory
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.is_dir() {
            path.join(MANIFEST_FILE)
        } else {
            path.to_path_buf()
        };

        if !file.exists() {
            anyhow::bail!("No {} found at {}", MANIFEST_FILE, file.display());
        }

        let content = fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", file.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(content)?;
        Ok(manifest)
    }

    /// Total number of entries to compile
    pub fn entry_count(&self) -> usize {
        self.sequences.len() + self.springs.len() + self.flips.len()
    }
}
