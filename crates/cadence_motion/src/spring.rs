//! Spring physics
//!
//! RK4-integrated damped harmonic oscillator, in two flavours:
//!
//! - [`integrate`] solves one channel ahead of time into a fixed-size
//!   [`Trajectory`], used by the build-time motion compiler.
//! - [`Spring`] steps incrementally with a live target, used by runtime
//!   motion values so targets can change mid-flight.
//!
//! Time inside the ODE is in seconds; public APIs take milliseconds.

use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};
use crate::value::check_finite;

/// Distance and velocity under which a spring counts as at rest
const REST_EPSILON: f64 = 0.001;
/// Consecutive at-rest steps before integration stops early
const SETTLE_STEPS: u32 = 5;
/// Smallest integration step the stability control will choose
const MIN_STEP_MS: f64 = 0.1;
/// How far past its starting energy envelope a state may swing before it counts as diverged
const DIVERGENCE_FACTOR: f64 = 2.0;

/// Configuration for a spring animation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    pub stiffness: f64,
    pub damping: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
}

fn default_mass() -> f64 {
    1.0
}

impl SpringConfig {
    /// Create a new spring configuration
    pub fn new(stiffness: f64, damping: f64, mass: f64) -> Self {
        Self {
            stiffness,
            damping,
            mass,
        }
    }

    /// A gentle, slow spring (good for page transitions)
    pub fn gentle() -> Self {
        Self::new(120.0, 14.0, 1.0)
    }

    /// A wobbly spring with overshoot (good for playful UI)
    pub fn wobbly() -> Self {
        Self::new(180.0, 12.0, 1.0)
    }

    /// A stiff, snappy spring (good for buttons)
    pub fn stiff() -> Self {
        Self::new(400.0, 30.0, 1.0)
    }

    /// A very stiff spring with minimal oscillation (good for quick responses)
    pub fn snappy() -> Self {
        Self::new(600.0, 40.0, 1.0)
    }

    /// A slow spring with no overshoot (critically damped)
    pub fn molasses() -> Self {
        Self::new(100.0, 20.0, 1.0)
    }

    /// Reject non-physical constants
    pub fn validate(&self) -> Result<()> {
        if !(self.stiffness.is_finite() && self.stiffness > 0.0) {
            return Err(MotionError::InvalidSpring {
                parameter: "stiffness",
                value: self.stiffness,
            });
        }
        if !(self.damping.is_finite() && self.damping >= 0.0) {
            return Err(MotionError::InvalidSpring {
                parameter: "damping",
                value: self.damping,
            });
        }
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(MotionError::InvalidSpring {
                parameter: "mass",
                value: self.mass,
            });
        }
        Ok(())
    }

    /// Calculate critical damping for this spring's stiffness and mass
    pub fn critical_damping(&self) -> f64 {
        2.0 * (self.stiffness * self.mass).sqrt()
    }

    /// Natural angular frequency ω in rad/s
    pub fn natural_frequency(&self) -> f64 {
        (self.stiffness / self.mass).sqrt()
    }

    /// Damping ratio ζ (<1 underdamped, 1 critical, >1 overdamped)
    pub fn damping_ratio(&self) -> f64 {
        self.damping / self.critical_damping()
    }

    /// Check if the spring is underdamped (will oscillate)
    pub fn is_underdamped(&self) -> bool {
        self.damping < self.critical_damping()
    }

    /// Check if the spring is critically damped (no oscillation, fastest settling)
    pub fn is_critically_damped(&self) -> bool {
        (self.damping - self.critical_damping()).abs() < 0.01
    }

    /// Check if the spring is overdamped (slow settling, no oscillation)
    pub fn is_overdamped(&self) -> bool {
        self.damping > self.critical_damping()
    }

    /// Approximate time to settle across `distance`, clamped to 100..=3000 ms
    pub fn settle_duration_ms(&self, distance: f64) -> f64 {
        let omega = self.natural_frequency();
        let zeta = self.damping_ratio();
        let decay = if zeta < 1.0 {
            zeta * omega
        } else {
            omega * (zeta - (zeta * zeta - 1.0).sqrt())
        };
        if !(decay.is_finite() && decay > 0.0) {
            return 3000.0;
        }
        let amplitude = distance.abs().max(1.0) / REST_EPSILON;
        // Critical and near-critical envelopes carry an extra (1 + ωt) factor
        let slack = if (zeta - 1.0).abs() < 0.05 { 1.5 } else { 1.0 };
        (amplitude.ln() / decay * slack * 1000.0).clamp(100.0, 3000.0)
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::stiff()
    }
}

// ============================================================================
// RK4 Core
// ============================================================================

#[inline]
fn acceleration(config: &SpringConfig, target: f64, x: f64, v: f64) -> f64 {
    let spring_force = -config.stiffness * (x - target);
    let damping_force = -config.damping * v;
    (spring_force + damping_force) / config.mass
}

/// Spring energy around `target`, normalized to squared displacement
#[inline]
fn energy(config: &SpringConfig, target: f64, x: f64, v: f64) -> f64 {
    let d = x - target;
    d * d + config.mass * v * v / config.stiffness
}

/// Upper bound on the energy any accepted step may reach
///
/// A damped spring never gains energy, so a state outside the starting
/// envelope (with some slack) means the integrator has left its stable region.
fn energy_limit(config: &SpringConfig, target: f64, x: f64, v: f64) -> f64 {
    let start = energy(config, target, x, v).max(REST_EPSILON * REST_EPSILON);
    start * DIVERGENCE_FACTOR * DIVERGENCE_FACTOR
}

/// One RK4 step of `dt` seconds; `None` if any stage went non-finite
fn rk4_step(config: &SpringConfig, target: f64, x: f64, v: f64, dt: f64) -> Option<(f64, f64)> {
    let finite = |a: f64, b: f64| a.is_finite() && b.is_finite();

    let k1_v = acceleration(config, target, x, v);
    let k1_x = v;
    if !finite(k1_x, k1_v) {
        return None;
    }

    let k2_v = acceleration(config, target, x + k1_x * dt * 0.5, v + k1_v * dt * 0.5);
    let k2_x = v + k1_v * dt * 0.5;
    if !finite(k2_x, k2_v) {
        return None;
    }

    let k3_v = acceleration(config, target, x + k2_x * dt * 0.5, v + k2_v * dt * 0.5);
    let k3_x = v + k2_v * dt * 0.5;
    if !finite(k3_x, k3_v) {
        return None;
    }

    let k4_v = acceleration(config, target, x + k3_x * dt, v + k3_v * dt);
    let k4_x = v + k3_v * dt;
    if !finite(k4_x, k4_v) {
        return None;
    }

    let next_v = v + (k1_v + 2.0 * k2_v + 2.0 * k3_v + k4_v) * dt / 6.0;
    let next_x = x + (k1_x + 2.0 * k2_x + 2.0 * k3_x + k4_x) * dt / 6.0;
    finite(next_x, next_v).then_some((next_x, next_v))
}

/// RK4 step with one half-step retry
///
/// A step fails when it goes non-finite or its energy exceeds `limit`.
fn guarded_step(config: &SpringConfig, target: f64, x: f64, v: f64, dt: f64, limit: f64) -> Option<(f64, f64)> {
    let bounded = |state: (f64, f64)| energy(config, target, state.0, state.1) <= limit;

    rk4_step(config, target, x, v, dt).filter(|s| bounded(*s)).or_else(|| {
        let half = dt * 0.5;
        let (mx, mv) = rk4_step(config, target, x, v, half).filter(|s| bounded(*s))?;
        rk4_step(config, target, mx, mv, half).filter(|s| bounded(*s))
    })
}

// ============================================================================
// Ahead-of-time Integration
// ============================================================================

/// Input to one integration run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringChannelConfig {
    pub stiffness: f64,
    pub damping: f64,
    #[serde(default = "default_mass")]
    pub mass: f64,
    pub from: f64,
    pub to: f64,
    #[serde(default)]
    pub initial_velocity: f64,
}

impl SpringChannelConfig {
    pub fn new(spring: SpringConfig, from: f64, to: f64) -> Self {
        Self {
            stiffness: spring.stiffness,
            damping: spring.damping,
            mass: spring.mass,
            from,
            to,
            initial_velocity: 0.0,
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.initial_velocity = velocity;
        self
    }

    pub fn spring(&self) -> SpringConfig {
        SpringConfig::new(self.stiffness, self.damping, self.mass)
    }
}

/// Discretized spring output: `step_count + 1` finite samples
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    samples: Vec<f64>,
    settled_at: Option<usize>,
    frozen: bool,
}

impl Trajectory {
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> f64 {
        self.samples.last().copied().unwrap_or(0.0)
    }

    /// Sample index from which the rest was padded because the spring settled
    pub fn settled_at(&self) -> Option<usize> {
        self.settled_at
    }

    /// True if integration went unstable and was stopped early
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Integrate one spring channel over `duration_ms` into `step_count + 1` samples
///
/// Samples are evenly spaced at `duration_ms / step_count`. When the spring is
/// too stiff for that spacing, each interval is split into sub-steps of at
/// most the stability-derived size. This intentionally differs from stepping
/// at the stability size and truncating: the sample count never changes and
/// every sample stays on the `i / step_count` grid the keyframes are laid on.
///
/// A step that goes non-finite or leaves the spring's starting energy
/// envelope is retried once as two half steps. If that also fails the
/// trajectory freezes and the remaining samples hold the target.
pub fn integrate(config: &SpringChannelConfig, duration_ms: f64, step_count: usize) -> Result<Trajectory> {
    let spring = config.spring();
    spring.validate()?;
    check_finite("from", config.from)?;
    check_finite("to", config.to)?;
    check_finite("initial velocity", config.initial_velocity)?;
    if !(duration_ms.is_finite() && duration_ms > 0.0) {
        return Err(MotionError::InvalidDuration(duration_ms));
    }
    if step_count == 0 {
        return Err(MotionError::InvalidStepCount(step_count));
    }

    let naive_ms = duration_ms / step_count as f64;
    let stable_ms = stability_step_ms(&spring);
    let substeps = if stable_ms < naive_ms * 0.5 {
        (naive_ms / stable_ms).ceil() as usize
    } else {
        1
    };
    let dt = naive_ms / substeps as f64 / 1000.0;

    tracing::trace!(
        naive_ms,
        stable_ms,
        substeps,
        zeta = spring.damping_ratio(),
        "integrating spring channel"
    );

    let target = config.to;
    let mut samples = Vec::with_capacity(step_count + 1);
    samples.push(config.from);

    let (mut x, mut v) = (config.from, config.initial_velocity);
    let limit = energy_limit(&spring, target, x, v);
    let mut at_rest = 0u32;
    let mut settled_at = None;
    let mut frozen = false;

    'samples: for _ in 0..step_count {
        for _ in 0..substeps {
            match guarded_step(&spring, target, x, v, dt, limit) {
                Some((nx, nv)) => {
                    x = nx;
                    v = nv;
                }
                None => {
                    tracing::warn!(
                        value = x,
                        velocity = v,
                        "spring integration unstable after retry, freezing"
                    );
                    frozen = true;
                    break 'samples;
                }
            }

            if (x - target).abs() < REST_EPSILON && v.abs() < REST_EPSILON {
                at_rest += 1;
                if at_rest >= SETTLE_STEPS {
                    settled_at = Some(samples.len());
                    break 'samples;
                }
            } else {
                at_rest = 0;
            }
        }
        samples.push(x);
    }

    samples.resize(step_count + 1, target);

    Ok(Trajectory {
        samples,
        settled_at,
        frozen,
    })
}

/// Largest step that still gives enough sub-steps per oscillation period
fn stability_step_ms(spring: &SpringConfig) -> f64 {
    let omega = spring.natural_frequency();
    let zeta = spring.damping_ratio();
    let period_ms = std::f64::consts::TAU / omega * 1000.0;
    let per_period = if zeta > 1.0 || (zeta - 1.0).abs() < 0.05 {
        30.0
    } else {
        20.0
    };
    (period_ms / per_period).max(MIN_STEP_MS)
}

// ============================================================================
// Incremental Spring
// ============================================================================

/// A spring-based animator with a live target
#[derive(Clone, Copy, Debug)]
pub struct Spring {
    config: SpringConfig,
    value: f64,
    velocity: f64,
    target: f64,
}

impl Spring {
    pub fn new(config: SpringConfig, initial: f64) -> Self {
        Self {
            config,
            value: initial,
            velocity: 0.0,
            target: initial,
        }
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn config(&self) -> SpringConfig {
        self.config
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Check if the spring has settled (within epsilon of target with minimal velocity)
    pub fn is_settled(&self) -> bool {
        (self.value - self.target).abs() < REST_EPSILON && self.velocity.abs() < REST_EPSILON
    }

    /// Advance by `dt` seconds
    ///
    /// Large deltas are split to respect the stability step. A step that
    /// goes non-finite or diverges from the energy the spring had when this
    /// call began snaps the spring to its target.
    pub fn step(&mut self, dt: f64) {
        if self.is_settled() {
            self.value = self.target;
            self.velocity = 0.0;
            return;
        }
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }

        let max_dt = stability_step_ms(&self.config) / 1000.0;
        let substeps = (dt / max_dt).ceil().max(1.0) as usize;
        let h = dt / substeps as f64;
        let limit = energy_limit(&self.config, self.target, self.value, self.velocity);

        for _ in 0..substeps {
            match guarded_step(&self.config, self.target, self.value, self.velocity, h, limit) {
                Some((x, v)) => {
                    self.value = x;
                    self.velocity = v;
                }
                None => {
                    tracing::warn!(goal = self.target, "runtime spring unstable, snapping to target");
                    self.value = self.target;
                    self.velocity = 0.0;
                    return;
                }
            }
        }
    }
}
