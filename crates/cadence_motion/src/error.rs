//! Error types for cadence_motion

use thiserror::Error;

/// Errors reported by the motion compilers and the runtime
///
/// Every variant describes a caller-visible contract violation. Numerical
/// instability and degenerate geometry are recovered internally and never
/// show up here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MotionError {
    /// A physical spring constant is out of range or not finite
    #[error("invalid spring {parameter}: {value}")]
    InvalidSpring { parameter: &'static str, value: f64 },

    /// A channel endpoint (`from`, `to` or initial velocity) is not finite
    #[error("non-finite {channel} value: {value}")]
    NonFiniteEndpoint { channel: &'static str, value: f64 },

    /// Duration must be finite and strictly positive
    #[error("invalid duration: {0}ms")]
    InvalidDuration(f64),

    /// Step count must be at least one
    #[error("invalid step count: {0}")]
    InvalidStepCount(usize),

    /// Easing text could not be parsed as a CSS timing function
    #[error("invalid easing: {0}")]
    InvalidEasing(String),

    /// Time text could not be parsed (`200ms`, `0.2s`, `50%`)
    #[error("invalid time value: {0}")]
    InvalidTime(String),

    /// Bounding box component is not finite
    #[error("invalid geometry {field}: {value}")]
    InvalidGeometry { field: &'static str, value: f64 },

    /// The engine that owned a handle has been dropped
    #[error("motion engine has been dropped")]
    EngineDropped,
}

/// Result type for cadence_motion operations
pub type Result<T> = std::result::Result<T, MotionError>;
