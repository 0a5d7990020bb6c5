//! Motion engine
//!
//! Owns the state shared by every compiler and runtime object: the engine
//! configuration, the class name allocator, the FLIP cache and the frame
//! batcher. Create one per document (or per test) with [`create_engine`];
//! nothing here is global.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::css::NameAllocator;
use crate::error::Result;
use crate::flip::{BoundingBox, CacheStats, FlipCache, FlipConfig, FlipGenerator, FlipOutput};
use crate::layout::LayoutTransition;
use crate::motion::{MotionCompiler, MotionOutput, SpringMotionConfig};
use crate::motion_value::MotionValue;
use crate::scheduler::{FrameBatcher, FrameHost};
use crate::style::StyleTarget;
use crate::timeline::{SequenceConfig, SequenceOutput, TimelineCompiler};
use crate::value::Animatable;

pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) names: NameAllocator,
    pub(crate) flip_cache: RefCell<FlipCache>,
    pub(crate) batcher: FrameBatcher,
}

impl EngineShared {
    pub(crate) fn generate_flip(&self, name: &str, config: &FlipConfig) -> Result<FlipOutput> {
        let mut cache = self.flip_cache.borrow_mut();
        FlipGenerator::new(&mut cache, &self.names)
            .with_fill_mode(self.config.fill_mode)
            .generate(name, config)
    }
}

/// Create an engine driven by `host`'s frame callbacks
pub fn create_engine(config: EngineConfig, host: Rc<dyn FrameHost>) -> MotionEngine {
    MotionEngine::new(config, host)
}

/// Entry point for compiling motion and driving runtime values
pub struct MotionEngine {
    shared: Rc<EngineShared>,
}

impl MotionEngine {
    pub fn new(config: EngineConfig, host: Rc<dyn FrameHost>) -> Self {
        tracing::debug!(prefix = %config.class_prefix, "creating motion engine");
        Self {
            shared: Rc::new(EngineShared {
                names: NameAllocator::new(config.class_prefix.clone()),
                flip_cache: RefCell::new(FlipCache::new()),
                batcher: FrameBatcher::new(host),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    // =========================================================================
    // Build-time Compilers
    // =========================================================================

    /// Compile a multi-stage sequence
    pub fn compile_sequence(&self, sequence: &SequenceConfig) -> Result<SequenceOutput> {
        TimelineCompiler::new(&self.shared.names)
            .with_fill_mode(self.shared.config.fill_mode)
            .compile(sequence)
    }

    /// Compile a spring motion into keyframes
    pub fn compile_spring_motion(&self, motion: &SpringMotionConfig) -> Result<MotionOutput> {
        MotionCompiler::new(&self.shared.names, &self.shared.config).compile(motion)
    }

    /// Generate (or reuse) FLIP keyframes for a layout jump
    pub fn generate_flip_keyframes(&self, name: &str, config: &FlipConfig) -> Result<FlipOutput> {
        self.shared.generate_flip(name, config)
    }

    /// Number of distinct geometry keys in the FLIP cache
    pub fn flip_cache_size(&self) -> usize {
        self.shared.flip_cache.borrow().len()
    }

    pub fn flip_cache_stats(&self) -> CacheStats {
        self.shared.flip_cache.borrow().stats()
    }

    pub fn clear_flip_cache(&self) {
        self.shared.flip_cache.borrow_mut().clear();
    }

    /// Number of class names handed out so far
    pub fn names_allocated(&self) -> u64 {
        self.shared.names.allocated()
    }

    // =========================================================================
    // Runtime
    // =========================================================================

    /// Create a motion value driven by this engine's frames
    pub fn create_value<T: Animatable>(&self, initial: T) -> MotionValue<T> {
        MotionValue::new(
            self.shared.batcher.handle(),
            initial,
            self.shared.config.max_frame_delta_ms,
        )
    }

    /// Create a layout transition for one element
    ///
    /// `measure` returns the element's current box in a fixed coordinate space.
    pub fn layout_transition<F>(
        &self,
        name: &str,
        target: Rc<dyn StyleTarget>,
        measure: F,
    ) -> LayoutTransition
    where
        F: Fn() -> BoundingBox + 'static,
    {
        LayoutTransition::new(&self.shared, name, target, Box::new(measure))
    }

    /// Answer a frame request from the host
    pub fn run_frame(&self, now_ms: f64) -> usize {
        self.shared.batcher.run_frame(now_ms)
    }

    pub fn batcher(&self) -> &FrameBatcher {
        &self.shared.batcher
    }
}
