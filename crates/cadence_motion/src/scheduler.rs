//! Frame batcher
//!
//! Coalesces per-frame work from every live motion value and layout
//! transition into a single host frame callback:
//! - Participants register once and get a [`WorkId`]
//! - `schedule` marks a participant dirty; repeated calls are no-ops
//! - At most one frame request is outstanding at any time
//! - `run_frame` drains the pending set once; work scheduled while the frame
//!   runs lands in the next frame
//!
//! Everything here is single-threaded. Participants are held weakly so a
//! dropped motion value can never be called back.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to a registered frame participant
    pub struct WorkId;
}

// ============================================================================
// Host Seams
// ============================================================================

/// The host's `requestAnimationFrame`
///
/// The host answers a request by calling [`FrameBatcher::run_frame`] once,
/// on its next rendered frame.
pub trait FrameHost {
    fn request_frame(&self);
}

/// Frame host that only counts requests; the caller drives frames by hand
#[derive(Debug, Default)]
pub struct ManualFrameHost {
    requests: Cell<usize>,
}

impl ManualFrameHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total frame requests received
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }
}

impl FrameHost for ManualFrameHost {
    fn request_frame(&self) {
        self.requests.set(self.requests.get() + 1);
    }
}

/// Whether a participant wants another frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Idle,
    Continue,
}

/// Something with visual updates to flush inside a frame
pub trait FrameWork {
    fn on_frame(&self, now_ms: f64) -> FrameStatus;
}

// ============================================================================
// Batcher
// ============================================================================

struct BatcherInner {
    participants: SlotMap<WorkId, Weak<dyn FrameWork>>,
    pending: IndexSet<WorkId>,
    host: Rc<dyn FrameHost>,
    frame_requested: bool,
    in_frame: bool,
    frames_run: u64,
}

impl BatcherInner {
    /// Mark the frame as requested; true if the caller must tell the host
    fn claim_frame(&mut self) -> bool {
        if self.frame_requested || self.in_frame || self.pending.is_empty() {
            return false;
        }
        self.frame_requested = true;
        true
    }
}

/// Owner of the pending-work set, held by the engine
pub struct FrameBatcher {
    inner: Rc<RefCell<BatcherInner>>,
}

impl FrameBatcher {
    pub fn new(host: Rc<dyn FrameHost>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BatcherInner {
                participants: SlotMap::with_key(),
                pending: IndexSet::new(),
                host,
                frame_requested: false,
                in_frame: false,
                frames_run: 0,
            })),
        }
    }

    /// Get a weak handle for registering participants
    pub fn handle(&self) -> BatcherHandle {
        BatcherHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Process every pending participant once; returns how many ran
    pub fn run_frame(&self, now_ms: f64) -> usize {
        let batch: Vec<WorkId> = {
            let mut inner = self.inner.borrow_mut();
            inner.frame_requested = false;
            inner.in_frame = true;
            inner.frames_run += 1;
            inner.pending.drain(..).collect()
        };

        let mut processed = 0;
        let mut again = Vec::new();
        for id in batch {
            // Looked up per item: earlier work may have unregistered it
            let work = self.inner.borrow().participants.get(id).and_then(Weak::upgrade);
            let Some(work) = work else {
                self.inner.borrow_mut().participants.remove(id);
                continue;
            };
            processed += 1;
            if work.on_frame(now_ms) == FrameStatus::Continue {
                again.push(id);
            }
        }

        let (host, request) = {
            let mut inner = self.inner.borrow_mut();
            inner.in_frame = false;
            for id in again {
                if inner.participants.contains_key(id) {
                    inner.pending.insert(id);
                }
            }
            (inner.host.clone(), inner.claim_frame())
        };
        if request {
            host.request_frame();
        }

        tracing::trace!(processed, now_ms, "frame flushed");
        processed
    }

    pub fn pending_count(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    pub fn participant_count(&self) -> usize {
        self.inner.borrow().participants.len()
    }

    pub fn is_frame_requested(&self) -> bool {
        self.inner.borrow().frame_requested
    }

    pub fn frames_run(&self) -> u64 {
        self.inner.borrow().frames_run
    }
}

/// A weak handle to the frame batcher
///
/// Held by motion values and layout transitions. It won't keep the batcher
/// alive; every operation is a no-op once the batcher is gone.
#[derive(Clone)]
pub struct BatcherHandle {
    inner: Weak<RefCell<BatcherInner>>,
}

impl BatcherHandle {
    /// Register a participant
    pub fn register(&self, work: Weak<dyn FrameWork>) -> Option<WorkId> {
        self.inner
            .upgrade()
            .map(|inner| inner.borrow_mut().participants.insert(work))
    }

    /// Drop a participant and any pending work it had
    pub fn unregister(&self, id: WorkId) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.borrow_mut();
            inner.participants.remove(id);
            inner.pending.shift_remove(&id);
        }
    }

    /// Queue a participant for the next frame
    ///
    /// Idempotent: a participant is pending at most once and at most one
    /// frame request is outstanding.
    pub fn schedule(&self, id: WorkId) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let (host, request) = {
            let mut inner = inner.borrow_mut();
            if !inner.participants.contains_key(id) {
                return false;
            }
            inner.pending.insert(id);
            (inner.host.clone(), inner.claim_frame())
        };
        if request {
            host.request_frame();
        }
        true
    }

    pub fn is_pending(&self, id: WorkId) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.borrow().pending.contains(&id))
            .unwrap_or(false)
    }

    /// Check if the batcher is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        runs: Cell<u32>,
        frames_wanted: Cell<u32>,
    }

    impl Counter {
        fn new(frames_wanted: u32) -> Rc<Self> {
            Rc::new(Self {
                runs: Cell::new(0),
                frames_wanted: Cell::new(frames_wanted),
            })
        }
    }

    impl FrameWork for Counter {
        fn on_frame(&self, _now_ms: f64) -> FrameStatus {
            self.runs.set(self.runs.get() + 1);
            let left = self.frames_wanted.get().saturating_sub(1);
            self.frames_wanted.set(left);
            if left > 0 {
                FrameStatus::Continue
            } else {
                FrameStatus::Idle
            }
        }
    }

    fn setup() -> (Rc<ManualFrameHost>, FrameBatcher) {
        let host = Rc::new(ManualFrameHost::new());
        let batcher = FrameBatcher::new(host.clone());
        (host, batcher)
    }

    fn register(handle: &BatcherHandle, work: &Rc<Counter>) -> WorkId {
        let weak: Weak<dyn FrameWork> = Rc::downgrade(work) as Weak<dyn FrameWork>;
        handle.register(weak).unwrap()
    }

    #[test]
    fn test_one_request_for_many_schedules() {
        let (host, batcher) = setup();
        let handle = batcher.handle();
        let works: Vec<_> = (0..3).map(|_| Counter::new(1)).collect();
        let ids: Vec<_> = works.iter().map(|w| register(&handle, w)).collect();

        for id in &ids {
            handle.schedule(*id);
            handle.schedule(*id);
        }
        assert_eq!(host.request_count(), 1);
        assert_eq!(batcher.pending_count(), 3);

        assert_eq!(batcher.run_frame(16.0), 3);
        assert!(works.iter().all(|w| w.runs.get() == 1));
        assert_eq!(batcher.pending_count(), 0);
        assert!(!batcher.is_frame_requested());
        assert_eq!(host.request_count(), 1);
    }

    #[test]
    fn test_continue_requests_next_frame() {
        let (host, batcher) = setup();
        let handle = batcher.handle();
        let work = Counter::new(3);
        let id = register(&handle, &work);

        handle.schedule(id);
        batcher.run_frame(0.0);
        assert_eq!(host.request_count(), 2);
        assert!(handle.is_pending(id));

        batcher.run_frame(16.0);
        batcher.run_frame(32.0);
        assert_eq!(work.runs.get(), 3);
        assert!(!handle.is_pending(id));
        assert_eq!(host.request_count(), 3);
    }

    #[test]
    fn test_unregister_removes_pending() {
        let (_host, batcher) = setup();
        let handle = batcher.handle();
        let work = Counter::new(1);
        let id = register(&handle, &work);

        handle.schedule(id);
        handle.unregister(id);
        assert_eq!(batcher.run_frame(0.0), 0);
        assert_eq!(work.runs.get(), 0);
        assert!(!handle.schedule(id));
    }

    #[test]
    fn test_dropped_participant_is_skipped() {
        let (_host, batcher) = setup();
        let handle = batcher.handle();
        let work = Counter::new(1);
        let id = register(&handle, &work);

        handle.schedule(id);
        drop(work);
        assert_eq!(batcher.run_frame(0.0), 0);
        assert_eq!(batcher.participant_count(), 0);
    }

    #[test]
    fn test_handle_weak_reference() {
        let handle = {
            let (_host, batcher) = setup();
            batcher.handle()
        };
        assert!(!handle.is_alive());

        let work = Counter::new(1);
        let weak: Weak<dyn FrameWork> = Rc::downgrade(&work) as Weak<dyn FrameWork>;
        assert!(handle.register(weak).is_none());
    }

    struct Rescheduler {
        handle: BatcherHandle,
        id: Cell<Option<WorkId>>,
        runs: Cell<u32>,
    }

    impl FrameWork for Rescheduler {
        fn on_frame(&self, _now_ms: f64) -> FrameStatus {
            self.runs.set(self.runs.get() + 1);
            if let Some(id) = self.id.get() {
                if self.runs.get() == 1 {
                    self.handle.schedule(id);
                }
            }
            FrameStatus::Idle
        }
    }

    #[test]
    fn test_schedule_during_frame_goes_to_next_frame() {
        let (host, batcher) = setup();
        let handle = batcher.handle();
        let work = Rc::new(Rescheduler {
            handle: handle.clone(),
            id: Cell::new(None),
            runs: Cell::new(0),
        });
        let weak: Weak<dyn FrameWork> = Rc::downgrade(&work) as Weak<dyn FrameWork>;
        let id = handle.register(weak).unwrap();
        work.id.set(Some(id));

        handle.schedule(id);
        assert_eq!(batcher.run_frame(0.0), 1);
        assert_eq!(work.runs.get(), 1);
        assert!(handle.is_pending(id));
        assert_eq!(host.request_count(), 2);

        batcher.run_frame(16.0);
        assert_eq!(work.runs.get(), 2);
        assert_eq!(batcher.frames_run(), 2);
    }
}
