//! Solver Updateable (Constraint) Abstraction
//!
//! The common contract implemented by every constraint the solver drives:
//! contacts, joints, motors, limits. One flat trait plus an embedded
//! bookkeeping struct — concrete constraints are plain structs holding body
//! indices, and the shared parameter math lives in free functions taking
//! explicit arguments, not in inherited state.
//!
//! # Per-step lifecycle
//!
//! Detached -> Attached/Inactive <-> Attached/Active.
//!
//! 1. `update_activity`: recompute whether the constraint participates this
//!    step. A constraint that cannot act (both bodies non-dynamic, vanished
//!    support) deactivates itself here rather than erroring.
//! 2. `prestep`: recompute jacobians, effective mass, and bias terms from
//!    pre-step body state. Read-only on bodies — no velocity may change
//!    until every prestep has run.
//! 3. `warm_start`: apply the previous step's accumulated impulse, so
//!    iteration starts from last step's solution instead of zero. With a
//!    zero accumulated impulse this is an exact no-op.
//! 4. `solve_iteration` (repeated): apply one clamped incremental impulse
//!    and return the magnitude of the delta. The solver deactivates the
//!    constraint for the rest of the step once the magnitude stays below
//!    `min_impulse` for more than `min_iterations` consecutive calls.

use crate::body::{BodyId, RigidState};
use crate::fixed::Fix64;
use crate::math::Vec3;

/// Bodies a constraint connects; reported to the deactivation manager when
/// the constraint attaches to or detaches from a solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintBodies {
    /// Single-entity constraint (e.g. a world-anchored motor)
    One(BodyId),
    /// Two-entity constraint
    Two(BodyId, BodyId),
}

/// Per-constraint solver tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolverSettings {
    /// Per-constraint iteration cap; the solver runs
    /// `min(global_limit, max_iterations)` iterations. The default defers
    /// entirely to the global limit.
    pub max_iterations: u32,
    /// Number of consecutive below-threshold iterations tolerated before
    /// the early-out deactivates the constraint for the step.
    pub min_iterations: u32,
    /// Delta-impulse magnitude below which an iteration counts as resolved.
    pub min_impulse: Fix64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: u32::MAX,
            min_iterations: 1,
            min_impulse: Fix64::from_ratio(1, 1000),
        }
    }
}

/// Bookkeeping every solver updateable embeds: attachment and activity
/// state plus the per-step iteration counters. The solver owns all
/// transitions except self-deactivation in `update_activity`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateableCore {
    /// Solver tuning for this constraint
    pub settings: SolverSettings,
    pub(crate) attached: bool,
    pub(crate) active: bool,
    pub(crate) iterations_run: u32,
    pub(crate) near_zero_streak: u32,
}

impl UpdateableCore {
    /// Fresh detached core with the given settings.
    pub fn with_settings(settings: SolverSettings) -> Self {
        Self {
            settings,
            attached: false,
            active: false,
            iterations_run: 0,
            near_zero_streak: 0,
        }
    }

    /// Whether this updateable is currently owned by a solver.
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Whether this updateable participates in the current step.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn reset_step(&mut self) {
        self.iterations_run = 0;
        self.near_zero_streak = 0;
    }
}

/// A constraint the solver can drive through the per-step lifecycle.
pub trait SolverUpdateable {
    /// Shared bookkeeping.
    fn core(&self) -> &UpdateableCore;

    /// Shared bookkeeping, mutable.
    fn core_mut(&mut self) -> &mut UpdateableCore;

    /// Bodies this constraint references (it does not own them).
    fn connected_bodies(&self) -> ConstraintBodies;

    /// Recompute activity for the coming step. Implementations set
    /// `core_mut().active`; the default activates unconditionally.
    fn update_activity(&mut self, bodies: &[RigidState]) {
        let _ = bodies;
        self.core_mut().active = true;
    }

    /// Recompute jacobians, effective mass, and bias from pre-step state.
    /// Must not mutate any body.
    fn prestep(&mut self, dt: Fix64, bodies: &[RigidState]);

    /// Re-apply the accumulated impulse from the previous step.
    fn warm_start(&mut self, bodies: &mut [RigidState]);

    /// Apply one incremental impulse, clamped against the constraint's
    /// feasible set, and return the magnitude of the delta.
    fn solve_iteration(&mut self, bodies: &mut [RigidState]) -> Fix64;
}

// ============================================================================
// Shared constraint math
// ============================================================================

/// Velocity bias that corrects a position error over the step:
/// `error_reduction * error / dt`. A zero `dt` yields zero bias rather than
/// the divide-by-zero saturation.
pub fn error_reduction_bias(error: Fix64, error_reduction: Fix64, dt: Fix64) -> Fix64 {
    if dt.is_zero() {
        Fix64::ZERO
    } else {
        error_reduction * error / dt
    }
}

/// Split a stiffness/damping spring description into the solver's softness
/// (constraint-force mixing) and bias-factor pair for a given step length.
///
/// `softness` is added to the effective-mass denominator; `bias_factor`
/// scales position error directly into a bias velocity. A degenerate
/// description (both terms zero) falls back to zero softness and a unit
/// bias factor.
pub fn softness_and_bias(stiffness: Fix64, damping: Fix64, dt: Fix64) -> (Fix64, Fix64) {
    let denom = dt * stiffness + damping;
    if denom.is_zero() {
        return (Fix64::ZERO, Fix64::ONE);
    }
    let softness = (dt * denom).recip();
    let bias_factor = stiffness / denom;
    (softness, bias_factor)
}

/// Effective-mass denominator contribution of one body for a linear
/// jacobian `axis` applied at offset `r`:
/// `inv_mass + (I⁻¹ (r × axis) × r) · axis`.
pub fn angular_mass_term(body: &RigidState, r: Vec3, axis: Vec3) -> Fix64 {
    let rxn = r.cross(axis);
    body.inverse_mass + body.inverse_inertia.mul_vec(rxn).cross(r).dot(axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_settings_defaults() {
        let s = SolverSettings::default();
        assert_eq!(s.max_iterations, u32::MAX);
        assert_eq!(s.min_iterations, 1);
        assert_eq!(s.min_impulse, Fix64::from_ratio(1, 1000));
    }

    #[test]
    fn test_error_reduction_bias() {
        let dt = Fix64::from_ratio(1, 60);
        let bias = error_reduction_bias(Fix64::ONE, Fix64::from_ratio(1, 5), dt);
        assert_eq!(bias, Fix64::from_ratio(1, 5) * Fix64::ONE / dt);
        assert_eq!(
            error_reduction_bias(Fix64::ONE, Fix64::ONE, Fix64::ZERO),
            Fix64::ZERO
        );
    }

    #[test]
    fn test_softness_rigid_fallback() {
        let (softness, bias) = softness_and_bias(Fix64::ZERO, Fix64::ZERO, Fix64::from_ratio(1, 60));
        assert_eq!(softness, Fix64::ZERO);
        assert_eq!(bias, Fix64::ONE);
    }

    #[test]
    fn test_softness_spring() {
        let dt = Fix64::from_ratio(1, 60);
        let (softness, bias) = softness_and_bias(Fix64::from_int(100), Fix64::from_int(10), dt);
        assert!(softness > Fix64::ZERO);
        assert!(bias > Fix64::ZERO && bias < Fix64::from_int(100));
    }

    #[test]
    fn test_angular_mass_term_point_mass() {
        // With r = 0 the angular part vanishes and only inverse mass remains.
        let body = crate::body::RigidState::dynamic(Vec3::ZERO, Fix64::TWO);
        let k = angular_mass_term(&body, Vec3::ZERO, Vec3::UNIT_X);
        assert_eq!(k, Fix64::HALF);
    }
}
