//! Engine configuration
//!
//! Loaded from the `[engine]` table of a `cadence.toml` manifest, or built in
//! code with [`EngineConfig::default`] and the `with_*` helpers.

use serde::{Deserialize, Serialize};

use crate::css::FillMode;

/// Tunables shared by every compiler and runtime object of one engine
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Prefix for every generated class / `@keyframes` name
    #[serde(default = "default_class_prefix")]
    pub class_prefix: String,
    /// Spring motions shorter than this are build-time only (no runtime descriptor)
    #[serde(default = "default_precompute_threshold")]
    pub precompute_threshold_ms: f64,
    /// Sample count for spring motions that don't specify one
    #[serde(default = "default_spring_steps")]
    pub default_spring_steps: usize,
    /// Upper bound on the per-frame time delta fed to runtime springs
    #[serde(default = "default_max_frame_delta")]
    pub max_frame_delta_ms: f64,
    /// Layout deltas smaller than this (in px) don't start a FLIP transition
    #[serde(default = "default_flip_threshold")]
    pub flip_threshold_px: f64,
    /// `animation-fill-mode` written on generated class rules
    #[serde(default)]
    pub fill_mode: FillMode,
}

fn default_class_prefix() -> String {
    "cadence".to_string()
}

fn default_precompute_threshold() -> f64 {
    300.0
}

fn default_spring_steps() -> usize {
    60
}

fn default_max_frame_delta() -> f64 {
    64.0
}

fn default_flip_threshold() -> f64 {
    0.5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            class_prefix: default_class_prefix(),
            precompute_threshold_ms: default_precompute_threshold(),
            default_spring_steps: default_spring_steps(),
            max_frame_delta_ms: default_max_frame_delta(),
            flip_threshold_px: default_flip_threshold(),
            fill_mode: FillMode::default(),
        }
    }
}

impl EngineConfig {
    /// Set the class name prefix
    pub fn with_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.class_prefix = prefix.into();
        self
    }

    /// Set the fill mode written on class rules
    pub fn with_fill_mode(mut self, fill_mode: FillMode) -> Self {
        self.fill_mode = fill_mode;
        self
    }

    /// Set the minimum layout delta for FLIP transitions
    pub fn with_flip_threshold(mut self, px: f64) -> Self {
        self.flip_threshold_px = px;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.class_prefix, "cadence");
        assert_eq!(config.precompute_threshold_ms, 300.0);
        assert_eq!(config.fill_mode, FillMode::Both);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"class_prefix": "ui", "fill_mode": "forwards"}"#).unwrap();
        assert_eq!(config.class_prefix, "ui");
        assert_eq!(config.fill_mode, FillMode::Forwards);
        assert_eq!(config.default_spring_steps, 60);
    }
}
