//! Runtime motion values
//!
//! A [`MotionValue`] is a reactive cell for one animated visual property:
//!
//! - `set` is synchronous; `get` sees the new value immediately and
//!   subscribers are notified before `set` returns
//! - An optional CSS custom property mirrors the value, written only from
//!   the frame batcher so visual mutation is frame-coherent
//! - `animate_to` drives the value by a fixed-duration tween or an
//!   incremental spring; a newer call supersedes the older one
//!
//! Motion values have a single owner. Dropping (or `destroy`ing) one
//! unregisters its frame work, clears subscribers and removes the mirror.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use cadence_motion::motion_value::{MotionValue, Transition};
//! use cadence_motion::scheduler::{FrameBatcher, ManualFrameHost};
//! use cadence_motion::easing::Easing;
//!
//! let batcher = FrameBatcher::new(Rc::new(ManualFrameHost::new()));
//! let opacity = MotionValue::new(batcher.handle(), 0.0, 64.0);
//!
//! let done = opacity.animate_to(1.0, Transition::tween(100.0, Easing::Linear)).unwrap();
//! batcher.run_frame(0.0);
//! batcher.run_frame(100.0);
//! assert_eq!(opacity.get(), 1.0);
//! assert!(!done.is_running());
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::easing::Easing;
use crate::error::{MotionError, Result};
use crate::scheduler::{BatcherHandle, FrameStatus, FrameWork, WorkId};
use crate::spring::{Spring, SpringConfig};
use crate::style::StyleTarget;
use crate::value::{check_finite, Animatable};

new_key_type! {
    /// Handle to a change subscriber
    pub struct SubscriberId;
}

// ============================================================================
// Completion
// ============================================================================

/// How an animation ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationOutcome {
    /// Reached its target
    Finished,
    /// Replaced by a newer `animate_to` on the same value
    Superseded,
    /// Stopped by `set` or by destroying the value
    Cancelled,
}

type SettleCallback = Box<dyn FnOnce(AnimationOutcome)>;

#[derive(Default)]
struct CompletionInner {
    outcome: Option<AnimationOutcome>,
    waker: Option<Waker>,
    callbacks: Vec<SettleCallback>,
}

/// Handle returned by [`MotionValue::animate_to`]
///
/// Resolves exactly once. Await it, poll [`Completion::outcome`], or register
/// a callback with [`Completion::on_settle`].
#[derive(Clone, Default)]
pub struct Completion {
    inner: Rc<RefCell<CompletionInner>>,
}

impl Completion {
    fn new() -> Self {
        Self::default()
    }

    /// The outcome, or `None` while still running
    pub fn outcome(&self) -> Option<AnimationOutcome> {
        self.inner.borrow().outcome
    }

    pub fn is_running(&self) -> bool {
        self.outcome().is_none()
    }

    /// Run `callback` when the animation ends (immediately if it already has)
    pub fn on_settle<F>(&self, callback: F)
    where
        F: FnOnce(AnimationOutcome) + 'static,
    {
        let outcome = self.outcome();
        match outcome {
            Some(outcome) => callback(outcome),
            None => self.inner.borrow_mut().callbacks.push(Box::new(callback)),
        }
    }

    fn resolve(&self, outcome: AnimationOutcome) {
        let (waker, callbacks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return;
            }
            inner.outcome = Some(outcome);
            (inner.waker.take(), std::mem::take(&mut inner.callbacks))
        };
        for callback in callbacks {
            callback(outcome);
        }
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl Future for Completion {
    type Output = AnimationOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match inner.outcome {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("outcome", &self.outcome())
            .finish()
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// How `animate_to` moves toward its target
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Transition {
    /// Fixed-duration eased interpolation
    Tween { duration_ms: f64, easing: Easing },
    /// Incremental spring that tracks the target frame by frame
    Spring(SpringConfig),
}

impl Transition {
    pub fn tween(duration_ms: f64, easing: Easing) -> Self {
        Transition::Tween {
            duration_ms,
            easing,
        }
    }

    pub fn spring(config: SpringConfig) -> Self {
        Transition::Spring(config)
    }

    fn validate(&self) -> Result<()> {
        match self {
            Transition::Tween { duration_ms, .. } => {
                if duration_ms.is_finite() && *duration_ms > 0.0 {
                    Ok(())
                } else {
                    Err(MotionError::InvalidDuration(*duration_ms))
                }
            }
            Transition::Spring(config) => config.validate(),
        }
    }
}

impl Default for Transition {
    fn default() -> Self {
        Transition::Spring(SpringConfig::default())
    }
}

enum Driver<T> {
    Tween {
        from: T,
        to: T,
        duration_ms: f64,
        easing: Easing,
        started_at: Option<f64>,
    },
    Spring {
        springs: SmallVec<[Spring; 4]>,
        target: T,
        last_frame: Option<f64>,
    },
}

impl<T: Animatable> Driver<T> {
    /// Advance to `now_ms`; returns the new value and whether the animation is done
    fn advance(&mut self, now_ms: f64, max_delta_ms: f64) -> (T, bool) {
        match self {
            Driver::Tween {
                from,
                to,
                duration_ms,
                easing,
                started_at,
            } => {
                // The first frame defines t = 0
                let start = *started_at.get_or_insert(now_ms);
                let progress = ((now_ms - start) / *duration_ms).clamp(0.0, 1.0);
                if progress >= 1.0 {
                    (to.clone(), true)
                } else {
                    (from.lerp(to, easing.apply(progress)), false)
                }
            }
            Driver::Spring {
                springs,
                target,
                last_frame,
            } => {
                let dt_ms = last_frame
                    .map(|last| (now_ms - last).clamp(0.0, max_delta_ms))
                    .unwrap_or(0.0);
                *last_frame = Some(now_ms);

                for spring in springs.iter_mut() {
                    spring.step(dt_ms / 1000.0);
                }
                if springs.iter().all(Spring::is_settled) {
                    (target.clone(), true)
                } else {
                    let components: SmallVec<[f64; 4]> = springs.iter().map(Spring::value).collect();
                    (T::from_components(&components), false)
                }
            }
        }
    }

    fn velocities(&self) -> Option<SmallVec<[f64; 4]>> {
        match self {
            Driver::Spring { springs, .. } => Some(springs.iter().map(Spring::velocity).collect()),
            Driver::Tween { .. } => None,
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

struct Mirror {
    target: Rc<dyn StyleTarget>,
    property: String,
}

struct Animation<T> {
    driver: Driver<T>,
    completion: Completion,
}

struct MotionState<T> {
    value: T,
    mirror: Option<Mirror>,
    mirror_dirty: bool,
    animation: Option<Animation<T>>,
    destroyed: bool,
}

type Subscriber<T> = Rc<dyn Fn(&T)>;

struct MotionShared<T: Animatable> {
    state: RefCell<MotionState<T>>,
    subscribers: RefCell<SlotMap<SubscriberId, Subscriber<T>>>,
    batcher: BatcherHandle,
    work_id: Cell<Option<WorkId>>,
    max_frame_delta_ms: f64,
}

impl<T: Animatable> MotionShared<T> {
    fn notify(&self, value: &T) {
        // Cloned out so subscribers may subscribe, unsubscribe or set
        let subscribers: Vec<Subscriber<T>> = self.subscribers.borrow().values().cloned().collect();
        for subscriber in subscribers {
            subscriber(value);
        }
    }

    fn schedule(&self) -> bool {
        self.work_id
            .get()
            .map(|id| self.batcher.schedule(id))
            .unwrap_or(false)
    }

    fn teardown(&self) {
        let (mirror, animation) = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            (state.mirror.take(), state.animation.take())
        };

        if let Some(id) = self.work_id.take() {
            self.batcher.unregister(id);
        }
        self.subscribers.borrow_mut().clear();
        if let Some(mirror) = mirror {
            mirror.target.remove_property(&mirror.property);
        }
        if let Some(animation) = animation {
            animation.completion.resolve(AnimationOutcome::Cancelled);
        }
    }
}

impl<T: Animatable> FrameWork for MotionShared<T> {
    fn on_frame(&self, now_ms: f64) -> FrameStatus {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.destroyed {
            return FrameStatus::Idle;
        }

        let step = state
            .animation
            .as_mut()
            .map(|a| a.driver.advance(now_ms, self.max_frame_delta_ms));

        let mut changed = false;
        let mut finished = None;
        if let Some((value, done)) = step {
            if value != state.value {
                state.value = value;
                changed = true;
            }
            if done {
                finished = state.animation.take().map(|a| a.completion);
            }
        }

        if let Some(mirror) = &state.mirror {
            if changed || state.mirror_dirty {
                mirror.target.set_property(&mirror.property, &state.value.to_css());
            }
        }
        state.mirror_dirty = false;

        let status = if state.animation.is_some() {
            FrameStatus::Continue
        } else {
            FrameStatus::Idle
        };
        let changed_value = changed.then(|| state.value.clone());
        drop(guard);

        if let Some(value) = changed_value {
            self.notify(&value);
        }
        if let Some(completion) = finished {
            completion.resolve(AnimationOutcome::Finished);
        }
        status
    }
}

// ============================================================================
// Motion Value
// ============================================================================

/// A reactive, animatable value
pub struct MotionValue<T: Animatable> {
    shared: Rc<MotionShared<T>>,
}

impl<T: Animatable> MotionValue<T> {
    /// Create a value registered with a frame batcher
    ///
    /// `max_frame_delta_ms` bounds the time step fed to springs after a
    /// long gap between frames.
    pub fn new(batcher: BatcherHandle, initial: T, max_frame_delta_ms: f64) -> Self {
        let shared = Rc::new(MotionShared {
            state: RefCell::new(MotionState {
                value: initial,
                mirror: None,
                mirror_dirty: false,
                animation: None,
                destroyed: false,
            }),
            subscribers: RefCell::new(SlotMap::with_key()),
            batcher,
            work_id: Cell::new(None),
            max_frame_delta_ms,
        });
        let work: Weak<dyn FrameWork> = Rc::downgrade(&shared) as Weak<dyn FrameWork>;
        shared.work_id.set(shared.batcher.register(work));
        Self { shared }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.shared.state.borrow().value.clone()
    }

    /// Replace the value immediately, cancelling any running animation
    pub fn set(&self, value: T) {
        let (cancelled, mirrored) = {
            let mut state = self.shared.state.borrow_mut();
            state.value = value.clone();
            state.mirror_dirty = state.mirror.is_some();
            (state.animation.take(), state.mirror_dirty)
        };

        if mirrored {
            self.shared.schedule();
        }
        self.shared.notify(&value);
        if let Some(animation) = cancelled {
            animation.completion.resolve(AnimationOutcome::Cancelled);
        }
    }

    /// Subscribe to value changes
    pub fn on_change<F>(&self, callback: F) -> Subscription<T>
    where
        F: Fn(&T) + 'static,
    {
        let id = self.shared.subscribers.borrow_mut().insert(Rc::new(callback));
        Subscription {
            shared: Rc::downgrade(&self.shared),
            id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.borrow().len()
    }

    /// Mirror the value into a CSS custom property on `target`
    ///
    /// The first write happens on the next frame.
    pub fn bind_css_variable(&self, target: Rc<dyn StyleTarget>, name: &str) {
        let property = if name.starts_with("--") {
            name.to_string()
        } else {
            format!("--{name}")
        };
        let previous = {
            let mut state = self.shared.state.borrow_mut();
            state.mirror_dirty = true;
            state.mirror.replace(Mirror { target, property })
        };
        if let Some(previous) = previous {
            previous.target.remove_property(&previous.property);
        }
        self.shared.schedule();
    }

    /// Stop mirroring and remove the custom property
    pub fn unbind_css_variable(&self) {
        let mirror = {
            let mut state = self.shared.state.borrow_mut();
            state.mirror_dirty = false;
            state.mirror.take()
        };
        if let Some(mirror) = mirror {
            mirror.target.remove_property(&mirror.property);
        }
    }

    /// Animate toward `target`
    ///
    /// Supersedes any running animation. A spring replacing a spring keeps
    /// the current velocity.
    pub fn animate_to(&self, target: T, transition: Transition) -> Result<Completion> {
        transition.validate()?;
        for component in target.components() {
            check_finite("target", component)?;
        }
        if self.shared.work_id.get().is_none() || !self.shared.batcher.is_alive() {
            return Err(MotionError::EngineDropped);
        }

        let completion = Completion::new();
        let superseded = {
            let mut guard = self.shared.state.borrow_mut();
            let state = &mut *guard;
            let previous = state.animation.take();
            let velocities = previous
                .as_ref()
                .and_then(|a| a.driver.velocities())
                .unwrap_or_default();

            let driver = match transition {
                Transition::Tween {
                    duration_ms,
                    easing,
                } => Driver::Tween {
                    from: state.value.clone(),
                    to: target,
                    duration_ms,
                    easing,
                    started_at: None,
                },
                Transition::Spring(config) => {
                    let start = state.value.components();
                    let goal = target.components();
                    let springs = start
                        .iter()
                        .zip(goal.iter())
                        .enumerate()
                        .map(|(i, (from, to))| {
                            let velocity = velocities.get(i).copied().unwrap_or(0.0);
                            let mut spring = Spring::new(config, *from).with_velocity(velocity);
                            spring.set_target(*to);
                            spring
                        })
                        .collect();
                    Driver::Spring {
                        springs,
                        target,
                        last_frame: None,
                    }
                }
            };

            state.animation = Some(Animation {
                driver,
                completion: completion.clone(),
            });
            previous.map(|a| a.completion)
        };

        if let Some(previous) = superseded {
            tracing::trace!("animation superseded");
            previous.resolve(AnimationOutcome::Superseded);
        }
        self.shared.schedule();
        Ok(completion)
    }

    /// True while an animation is in flight
    pub fn is_animating(&self) -> bool {
        self.shared.state.borrow().animation.is_some()
    }

    /// Per-component spring velocity (units per second), if spring-driven
    pub fn velocity(&self) -> Option<T> {
        self.shared
            .state
            .borrow()
            .animation
            .as_ref()
            .and_then(|a| a.driver.velocities())
            .map(|v| T::from_components(&v))
    }

    /// Tear down now: unregister frame work, drop subscribers, remove the mirror
    pub fn destroy(self) {
        drop(self);
    }
}

impl<T: Animatable> Drop for MotionValue<T> {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl<T: Animatable> fmt::Debug for MotionValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionValue")
            .field("value", &self.shared.state.borrow().value)
            .field("animating", &self.is_animating())
            .finish()
    }
}

/// Returned by [`MotionValue::on_change`]
pub struct Subscription<T: Animatable> {
    shared: Weak<MotionShared<T>>,
    id: SubscriberId,
}

impl<T: Animatable> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Stop receiving changes
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.borrow_mut().remove(self.id);
        }
    }
}
