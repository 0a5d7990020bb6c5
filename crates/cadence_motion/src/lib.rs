//! Cadence Motion
//!
//! Declarative motion compiled to CSS, plus a frame-batched runtime.
//!
//! # Features
//!
//! - **Spring Physics**: RK4-integrated springs with adaptive sub-stepping
//! - **Timelines**: Multi-stage sequences, merged into one re-sampled rule when stages overlap
//! - **Spring Motions**: Spring curves baked into percentage keyframes at build time
//! - **FLIP**: Inverted translate/scale keyframes for layout jumps, memoized by geometry
//! - **Motion Values**: Reactive values with CSS variable mirroring and interruptible animation
//! - **Frame Batching**: One write pass per frame, however many values changed
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use cadence_motion::{create_engine, EngineConfig, ManualFrameHost, SequenceConfig, Stage};
//! use cadence_motion::value::props;
//!
//! let engine = create_engine(EngineConfig::default(), Rc::new(ManualFrameHost::new()));
//! let output = engine
//!     .compile_sequence(&SequenceConfig::new(vec![Stage::new("fade", 200.0)
//!         .from(props([("opacity", 0.0)]))
//!         .to(props([("opacity", 1.0)]))]))
//!     .unwrap();
//! assert!(output.css.starts_with("@keyframes cadence-fade-"));
//! ```

pub mod config;
pub mod css;
pub mod easing;
pub mod engine;
pub mod error;
pub mod flip;
pub mod layout;
pub mod motion;
pub mod motion_value;
pub mod scheduler;
pub mod spring;
pub mod style;
pub mod timeline;
pub mod value;

pub use config::EngineConfig;
pub use css::{
    emit_keyframes, AnimationSpec, FillMode, KeyframeBlock, KeyframeRule, NameAllocator,
};
pub use easing::{Easing, StepPosition};
pub use engine::{create_engine, MotionEngine};
pub use error::{MotionError, Result};
pub use flip::{
    BoundingBox, CacheStats, FlipCache, FlipConfig, FlipGenerator, FlipOutput, FlipTransform,
    TransformOrigin,
};
pub use layout::LayoutTransition;
pub use motion::{MotionCompiler, MotionOutput, RuntimeDescriptor, SpringMotionConfig};
pub use motion_value::{AnimationOutcome, Completion, MotionValue, Subscription, Transition};
pub use scheduler::{
    BatcherHandle, FrameBatcher, FrameHost, FrameStatus, FrameWork, ManualFrameHost, WorkId,
};
pub use spring::{integrate, Spring, SpringChannelConfig, SpringConfig, Trajectory};
pub use style::{RecordingStyleTarget, StyleTarget, StyleWrite};
pub use timeline::{
    detect_overlap, resolve_timings, CompletionMarker, ResolvedStageTiming, SequenceConfig,
    SequenceOutput, Stage, StageOutput, TimelineCompiler,
};
pub use value::{Animatable, Channel, PropertyMap, PropertyValue, Time};
