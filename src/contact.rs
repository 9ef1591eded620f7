//! Contact Constraint
//!
//! One-sided non-penetration constraint at a single contact point. The
//! accumulated impulse lives on the contact normal and is clamped to stay
//! non-negative: a contact can push bodies apart, never pull them together.
//! Produced by the narrow phase from broad-phase candidate pairs; the
//! geometry (point, normal, depth) arrives precomputed.

use crate::body::{BodyId, RigidState};
use crate::constraint::{
    angular_mass_term, error_reduction_bias, ConstraintBodies, SolverUpdateable, UpdateableCore,
};
use crate::fixed::Fix64;
use crate::math::Vec3;

/// Velocity-level contact constraint between two bodies.
#[derive(Clone, Copy, Debug)]
pub struct ContactConstraint {
    /// Shared solver bookkeeping
    pub core: UpdateableCore,
    /// First body
    pub body_a: BodyId,
    /// Second body
    pub body_b: BodyId,
    /// Contact offset from body A's center of mass, world space
    pub offset_a: Vec3,
    /// Contact offset from body B's center of mass, world space
    pub offset_b: Vec3,
    /// Contact normal pointing from A toward B, unit length
    pub normal: Vec3,
    /// Penetration depth; negative once the bodies separate
    pub depth: Fix64,
    /// Penetration permitted before position correction kicks in
    pub slop: Fix64,
    /// Baumgarte factor scaling remaining penetration into bias velocity
    pub error_reduction: Fix64,
    /// Accumulated normal impulse (always >= 0)
    pub accumulated: Fix64,
    effective_mass: Fix64,
    bias: Fix64,
}

impl ContactConstraint {
    /// Create a contact from narrow-phase output.
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        offset_a: Vec3,
        offset_b: Vec3,
        normal: Vec3,
        depth: Fix64,
    ) -> Self {
        Self {
            core: UpdateableCore::default(),
            body_a,
            body_b,
            offset_a,
            offset_b,
            normal,
            depth,
            slop: Fix64::from_ratio(1, 200),
            error_reduction: Fix64::from_ratio(1, 5),
            accumulated: Fix64::ZERO,
            effective_mass: Fix64::ZERO,
            bias: Fix64::ZERO,
        }
    }

    /// Separation velocity along the normal (positive = separating).
    fn normal_velocity(&self, bodies: &[RigidState]) -> Fix64 {
        let va = bodies[self.body_a].velocity_at(self.offset_a);
        let vb = bodies[self.body_b].velocity_at(self.offset_b);
        self.normal.dot(vb - va)
    }
}

impl SolverUpdateable for ContactConstraint {
    fn core(&self) -> &UpdateableCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut UpdateableCore {
        &mut self.core
    }

    fn connected_bodies(&self) -> ConstraintBodies {
        ConstraintBodies::Two(self.body_a, self.body_b)
    }

    /// A contact with no penetration left, or between two non-dynamic
    /// bodies, sits out the step.
    fn update_activity(&mut self, bodies: &[RigidState]) {
        let movable = bodies[self.body_a].is_dynamic() || bodies[self.body_b].is_dynamic();
        self.core.active = movable && !self.depth.is_negative();
    }

    fn prestep(&mut self, dt: Fix64, bodies: &[RigidState]) {
        let a = &bodies[self.body_a];
        let b = &bodies[self.body_b];
        let k = angular_mass_term(a, self.offset_a, self.normal)
            + angular_mass_term(b, self.offset_b, self.normal);
        if k.is_zero() {
            self.core.active = false;
            return;
        }
        self.effective_mass = k.recip();
        let excess = (self.depth - self.slop).max(Fix64::ZERO);
        // Bias drives the separation velocity positive until the remaining
        // penetration is gone.
        self.bias = error_reduction_bias(excess, self.error_reduction, dt);
    }

    fn warm_start(&mut self, bodies: &mut [RigidState]) {
        if self.accumulated.is_zero() {
            return;
        }
        let impulse = self.normal * self.accumulated;
        bodies[self.body_a].apply_impulse(self.offset_a, -impulse);
        bodies[self.body_b].apply_impulse(self.offset_b, impulse);
    }

    fn solve_iteration(&mut self, bodies: &mut [RigidState]) -> Fix64 {
        let vn = self.normal_velocity(bodies);
        let lambda = -(vn - self.bias) * self.effective_mass;
        // Clamp the total, not the increment: the accumulated impulse may
        // never go negative.
        let target = (self.accumulated + lambda).max(Fix64::ZERO);
        let delta = target - self.accumulated;
        self.accumulated = target;
        if !delta.is_zero() {
            let impulse = self.normal * delta;
            bodies[self.body_a].apply_impulse(self.offset_a, -impulse);
            bodies[self.body_b].apply_impulse(self.offset_b, impulse);
        }
        delta.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;

    fn head_on() -> (Vec<RigidState>, ContactConstraint) {
        // A moving +X into B, contact normal +X, slight penetration.
        let mut a = RigidState::dynamic(Vec3::ZERO, Fix64::ONE);
        a.linear_velocity = Vec3::new(Fix64::ONE, Fix64::ZERO, Fix64::ZERO);
        let b = RigidState::dynamic(Vec3::from_int(1, 0, 0), Fix64::ONE);
        let c = ContactConstraint::new(
            0,
            1,
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::UNIT_X,
            Fix64::from_ratio(1, 100),
        );
        (vec![a, b], c)
    }

    #[test]
    fn test_contact_stops_approach() {
        let (mut bodies, mut contact) = head_on();
        let dt = Fix64::from_ratio(1, 60);
        contact.update_activity(&bodies);
        assert!(contact.core.is_active());
        contact.prestep(dt, &bodies);
        for _ in 0..10 {
            contact.solve_iteration(&mut bodies);
        }
        let vn = contact.normal_velocity(&bodies);
        // Approach cancelled (slightly positive from the penetration bias).
        assert!(vn >= Fix64::ZERO);
        assert!(contact.accumulated > Fix64::ZERO);
        // Equal masses: the impulse split momentum evenly.
        let total = bodies[0].linear_velocity + bodies[1].linear_velocity;
        assert_eq!(total.x, Fix64::ONE);
    }

    #[test]
    fn test_contact_never_pulls() {
        let (mut bodies, mut contact) = head_on();
        // Bodies already separating: any corrective impulse would be
        // attractive, so the clamp must keep the total at zero.
        bodies[0].linear_velocity = Vec3::new(-Fix64::ONE, Fix64::ZERO, Fix64::ZERO);
        contact.update_activity(&bodies);
        contact.prestep(Fix64::from_ratio(1, 60), &bodies);
        // No penetration bias for this check.
        contact.bias = Fix64::ZERO;
        for _ in 0..4 {
            contact.solve_iteration(&mut bodies);
        }
        assert_eq!(contact.accumulated, Fix64::ZERO);
        assert_eq!(bodies[0].linear_velocity.x, -Fix64::ONE);
    }

    #[test]
    fn test_separated_contact_deactivates() {
        let (bodies, mut contact) = head_on();
        contact.depth = Fix64::from_ratio(-1, 100);
        contact.update_activity(&bodies);
        assert!(!contact.core.is_active());
    }

    #[test]
    fn test_two_fixed_bodies_deactivate() {
        let bodies = vec![RigidState::fixed(Vec3::ZERO), RigidState::fixed(Vec3::UNIT_X)];
        let mut contact =
            ContactConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO, Vec3::UNIT_X, Fix64::ZERO);
        contact.update_activity(&bodies);
        assert!(!contact.core.is_active());
    }

    #[test]
    fn test_warm_start_zero_is_noop() {
        let (mut bodies, mut contact) = head_on();
        bodies[0].orientation = Quat::IDENTITY;
        let before = (bodies[0].linear_velocity, bodies[1].linear_velocity);
        contact.warm_start(&mut bodies);
        assert_eq!(before.0, bodies[0].linear_velocity);
        assert_eq!(before.1, bodies[1].linear_velocity);
    }

    #[test]
    fn test_warm_start_reapplies_accumulated() {
        let (mut bodies, mut contact) = head_on();
        contact.accumulated = Fix64::HALF;
        contact.warm_start(&mut bodies);
        // +X normal: A pushed -X, B pushed +X, half a unit of momentum each.
        assert_eq!(bodies[0].linear_velocity.x, Fix64::HALF);
        assert_eq!(bodies[1].linear_velocity.x, Fix64::HALF);
    }
}
