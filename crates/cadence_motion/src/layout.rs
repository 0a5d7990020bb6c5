//! Layout transitions
//!
//! Glue between layout changes and FLIP keyframes. The host captures the
//! element's box before it mutates layout, then schedules the transition.
//! On the next frame the batcher measures the box again and, when it moved or
//! resized by more than the engine's threshold, applies a FLIP animation to
//! the element.
//!
//! ```text
//! capture_first()      measure, remember "first"
//! <host mutates layout>
//! schedule()           queue for the next frame
//! frame                measure "last", generate + apply FLIP
//! ```

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::easing::Easing;
use crate::engine::EngineShared;
use crate::flip::{BoundingBox, FlipConfig, FlipOutput, TransformOrigin};
use crate::scheduler::{FrameStatus, FrameWork, WorkId};
use crate::style::StyleTarget;

type Measure = Box<dyn Fn() -> BoundingBox>;

struct LayoutShared {
    name: String,
    engine: Weak<EngineShared>,
    target: Rc<dyn StyleTarget>,
    measure: Measure,
    first: Cell<Option<BoundingBox>>,
    duration_ms: Cell<f64>,
    easing: Cell<Easing>,
    origin: Cell<TransformOrigin>,
    last_output: RefCell<Option<FlipOutput>>,
    work_id: Cell<Option<WorkId>>,
}

impl FrameWork for LayoutShared {
    fn on_frame(&self, _now_ms: f64) -> FrameStatus {
        let Some(first) = self.first.take() else {
            return FrameStatus::Idle;
        };
        let Some(engine) = self.engine.upgrade() else {
            return FrameStatus::Idle;
        };

        let last = (self.measure)();
        let delta = first.max_delta(&last);
        if delta <= engine.config.flip_threshold_px {
            tracing::trace!(name = %self.name, delta, "layout change below threshold");
            return FrameStatus::Idle;
        }

        let config = FlipConfig::new(first, last)
            .duration(self.duration_ms.get())
            .easing(self.easing.get())
            .origin(self.origin.get());
        match engine.generate_flip(&self.name, &config) {
            Ok(output) => {
                self.target.apply_animation(&output.class_name, &output.css);
                *self.last_output.borrow_mut() = Some(output);
            }
            Err(err) => {
                tracing::warn!(name = %self.name, error = %err, "skipping layout transition");
            }
        }
        FrameStatus::Idle
    }
}

/// A FLIP transition bound to one element
pub struct LayoutTransition {
    shared: Rc<LayoutShared>,
}

impl LayoutTransition {
    pub(crate) fn new(
        engine: &Rc<EngineShared>,
        name: &str,
        target: Rc<dyn StyleTarget>,
        measure: Measure,
    ) -> Self {
        let shared = Rc::new(LayoutShared {
            name: name.to_string(),
            engine: Rc::downgrade(engine),
            target,
            measure,
            first: Cell::new(None),
            duration_ms: Cell::new(300.0),
            easing: Cell::new(Easing::STANDARD),
            origin: Cell::new(TransformOrigin::Center),
            last_output: RefCell::new(None),
            work_id: Cell::new(None),
        });
        let work: Weak<dyn FrameWork> = Rc::downgrade(&shared) as Weak<dyn FrameWork>;
        shared.work_id.set(engine.batcher.handle().register(work));
        Self { shared }
    }

    pub fn with_duration(self, duration_ms: f64) -> Self {
        self.shared.duration_ms.set(duration_ms);
        self
    }

    pub fn with_easing(self, easing: Easing) -> Self {
        self.shared.easing.set(easing);
        self
    }

    pub fn with_origin(self, origin: TransformOrigin) -> Self {
        self.shared.origin.set(origin);
        self
    }

    /// Measure and remember the "first" box
    pub fn capture_first(&self) {
        self.shared.first.set(Some((self.shared.measure)()));
    }

    /// Queue the "last" measurement for the next frame
    ///
    /// Returns false if nothing was captured or the engine is gone.
    pub fn schedule(&self) -> bool {
        if self.shared.first.get().is_none() {
            return false;
        }
        let (Some(engine), Some(id)) = (self.shared.engine.upgrade(), self.shared.work_id.get()) else {
            return false;
        };
        engine.batcher.handle().schedule(id)
    }

    /// The FLIP rule most recently applied
    pub fn last_output(&self) -> Option<FlipOutput> {
        self.shared.last_output.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.shared.first.get().is_some()
    }
}

impl Drop for LayoutTransition {
    fn drop(&mut self) {
        if let (Some(engine), Some(id)) = (self.shared.engine.upgrade(), self.shared.work_id.take()) {
            engine.batcher.handle().unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::MotionEngine;
    use crate::scheduler::ManualFrameHost;
    use crate::style::RecordingStyleTarget;

    fn setup() -> (Rc<ManualFrameHost>, MotionEngine, Rc<RecordingStyleTarget>, Rc<Cell<BoundingBox>>) {
        let host = Rc::new(ManualFrameHost::new());
        let engine = MotionEngine::new(EngineConfig::default().with_class_prefix("t"), host.clone());
        let target = Rc::new(RecordingStyleTarget::new());
        let rect = Rc::new(Cell::new(BoundingBox::new(0.0, 0.0, 100.0, 100.0)));
        (host, engine, target, rect)
    }

    fn measure(rect: &Rc<Cell<BoundingBox>>) -> impl Fn() -> BoundingBox + 'static {
        let rect = rect.clone();
        move || rect.get()
    }

    #[test]
    fn test_layout_jump_applies_flip() {
        let (host, engine, target, rect) = setup();
        let transition = engine.layout_transition("card", target.clone(), measure(&rect));

        transition.capture_first();
        rect.set(BoundingBox::new(40.0, 0.0, 100.0, 100.0));
        assert!(transition.schedule());
        assert_eq!(host.request_count(), 1);
        assert!(target.applied_classes().is_empty());

        engine.run_frame(16.0);
        assert_eq!(target.applied_classes(), vec!["t-card-1".to_string()]);
        let output = transition.last_output().unwrap();
        assert_eq!(output.transform.translate_x, -40.0);
        assert!(!transition.is_pending());
    }

    #[test]
    fn test_small_delta_is_ignored() {
        let (_host, engine, target, rect) = setup();
        let transition = engine.layout_transition("card", target.clone(), measure(&rect));

        transition.capture_first();
        rect.set(BoundingBox::new(0.25, 0.0, 100.0, 100.0));
        transition.schedule();
        engine.run_frame(16.0);

        assert!(target.applied_classes().is_empty());
        assert!(transition.last_output().is_none());
    }

    #[test]
    fn test_schedule_without_capture() {
        let (host, engine, target, rect) = setup();
        let transition = engine.layout_transition("card", target, measure(&rect));
        assert!(!transition.schedule());
        assert_eq!(host.request_count(), 0);
    }

    #[test]
    fn test_shares_frame_with_motion_values() {
        let (host, engine, target, rect) = setup();
        let transition = engine.layout_transition("card", target.clone(), measure(&rect));
        let value = engine.create_value(0.0);
        value.bind_css_variable(target.clone(), "--o");

        transition.capture_first();
        rect.set(BoundingBox::new(0.0, 0.0, 50.0, 50.0));
        transition.schedule();
        value.set(1.0);

        assert_eq!(host.request_count(), 1);
        assert_eq!(engine.run_frame(0.0), 2);
        assert_eq!(target.property("--o").as_deref(), Some("1"));
        assert_eq!(target.applied_classes().len(), 1);
    }

    #[test]
    fn test_repeated_jump_reuses_rule() {
        let (_host, engine, target, rect) = setup();
        let transition = engine
            .layout_transition("card", target.clone(), measure(&rect))
            .with_origin(TransformOrigin::TopLeft)
            .with_duration(200.0);

        for _ in 0..2 {
            rect.set(BoundingBox::new(0.0, 0.0, 100.0, 100.0));
            transition.capture_first();
            rect.set(BoundingBox::new(0.0, 60.0, 100.0, 100.0));
            transition.schedule();
            engine.run_frame(0.0);
        }

        let classes = target.applied_classes();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0], classes[1]);
        assert_eq!(engine.flip_cache_size(), 1);
    }

    #[test]
    fn test_drop_unregisters() {
        let (_host, engine, target, rect) = setup();
        let transition = engine.layout_transition("card", target, measure(&rect));
        transition.capture_first();
        transition.schedule();
        assert_eq!(engine.batcher().participant_count(), 1);

        drop(transition);
        assert_eq!(engine.batcher().participant_count(), 0);
        assert_eq!(engine.run_frame(0.0), 0);
    }
}
