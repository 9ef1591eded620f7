//! Distance Constraint
//!
//! Equality constraint holding two anchor points at a rest length. The
//! accumulated impulse is an unbounded scalar on the anchor-to-anchor axis;
//! there is no feasible-set clamp because the constraint both pushes and
//! pulls. Optionally behaves as a damped spring via the shared
//! softness/bias-factor split.

use crate::body::{BodyId, RigidState};
use crate::constraint::{
    angular_mass_term, error_reduction_bias, softness_and_bias, ConstraintBodies,
    SolverUpdateable, UpdateableCore,
};
use crate::fixed::Fix64;
use crate::math::Vec3;

/// Two-body distance constraint with local-space anchors.
#[derive(Clone, Copy, Debug)]
pub struct DistanceConstraint {
    /// Shared solver bookkeeping
    pub core: UpdateableCore,
    /// First body
    pub body_a: BodyId,
    /// Second body
    pub body_b: BodyId,
    /// Anchor in body A's local space
    pub local_anchor_a: Vec3,
    /// Anchor in body B's local space
    pub local_anchor_b: Vec3,
    /// Target distance between the anchors
    pub rest_length: Fix64,
    /// Baumgarte factor scaling length error into bias velocity; zero
    /// disables position correction entirely
    pub error_reduction: Fix64,
    /// Optional (stiffness, damping) spring description; `None` is rigid
    pub spring: Option<(Fix64, Fix64)>,
    /// Accumulated axis impulse (unbounded)
    pub accumulated: Fix64,
    axis: Vec3,
    offset_a: Vec3,
    offset_b: Vec3,
    effective_mass: Fix64,
    softness: Fix64,
    bias: Fix64,
}

impl DistanceConstraint {
    /// Create a rigid distance constraint.
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec3,
        local_anchor_b: Vec3,
        rest_length: Fix64,
    ) -> Self {
        Self {
            core: UpdateableCore::default(),
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            rest_length,
            error_reduction: Fix64::from_ratio(1, 5),
            spring: None,
            accumulated: Fix64::ZERO,
            axis: Vec3::UNIT_X,
            offset_a: Vec3::ZERO,
            offset_b: Vec3::ZERO,
            effective_mass: Fix64::ZERO,
            softness: Fix64::ZERO,
            bias: Fix64::ZERO,
        }
    }

    /// Override the error-reduction factor (zero = velocity-only).
    pub fn with_error_reduction(mut self, error_reduction: Fix64) -> Self {
        self.error_reduction = error_reduction;
        self
    }

    /// Make the constraint a damped spring instead of a rigid rod.
    pub fn with_spring(mut self, stiffness: Fix64, damping: Fix64) -> Self {
        self.spring = Some((stiffness, damping));
        self
    }

    /// Constraint-space relative velocity at the anchors.
    fn axis_velocity(&self, bodies: &[RigidState]) -> Fix64 {
        let va = bodies[self.body_a].velocity_at(self.offset_a);
        let vb = bodies[self.body_b].velocity_at(self.offset_b);
        self.axis.dot(vb - va)
    }
}

impl SolverUpdateable for DistanceConstraint {
    fn core(&self) -> &UpdateableCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut UpdateableCore {
        &mut self.core
    }

    fn connected_bodies(&self) -> ConstraintBodies {
        ConstraintBodies::Two(self.body_a, self.body_b)
    }

    fn update_activity(&mut self, bodies: &[RigidState]) {
        self.core.active =
            bodies[self.body_a].is_dynamic() || bodies[self.body_b].is_dynamic();
    }

    fn prestep(&mut self, dt: Fix64, bodies: &[RigidState]) {
        let a = &bodies[self.body_a];
        let b = &bodies[self.body_b];
        self.offset_a = a.orientation.rotate(self.local_anchor_a);
        self.offset_b = b.orientation.rotate(self.local_anchor_b);
        let separation = (b.position + self.offset_b) - (a.position + self.offset_a);
        let length = separation.length();
        // Coincident anchors have no defined direction; pick one.
        self.axis = separation.normalize_or(Vec3::UNIT_X);
        let error = length - self.rest_length;

        match self.spring {
            Some((stiffness, damping)) => {
                let (softness, bias_factor) = softness_and_bias(stiffness, damping, dt);
                self.softness = softness;
                self.bias = bias_factor * error;
            }
            None => {
                self.softness = Fix64::ZERO;
                self.bias = error_reduction_bias(error, self.error_reduction, dt);
            }
        }

        let k = angular_mass_term(a, self.offset_a, self.axis)
            + angular_mass_term(b, self.offset_b, self.axis)
            + self.softness;
        if k.is_zero() {
            self.core.active = false;
            return;
        }
        self.effective_mass = k.recip();
    }

    fn warm_start(&mut self, bodies: &mut [RigidState]) {
        if self.accumulated.is_zero() {
            return;
        }
        let impulse = self.axis * self.accumulated;
        bodies[self.body_a].apply_impulse(self.offset_a, -impulse);
        bodies[self.body_b].apply_impulse(self.offset_b, impulse);
    }

    fn solve_iteration(&mut self, bodies: &mut [RigidState]) -> Fix64 {
        let jv = self.axis_velocity(bodies);
        let lambda =
            -(jv + self.bias + self.softness * self.accumulated) * self.effective_mass;
        self.accumulated = self.accumulated + lambda;
        let impulse = self.axis * lambda;
        bodies[self.body_a].apply_impulse(self.offset_a, -impulse);
        bodies[self.body_b].apply_impulse(self.offset_b, impulse);
        lambda.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point_masses() -> Vec<RigidState> {
        vec![
            RigidState::dynamic(Vec3::ZERO, Fix64::ONE),
            RigidState::dynamic(Vec3::from_int(2, 0, 0), Fix64::ONE),
        ]
    }

    #[test]
    fn test_kills_separating_velocity() {
        let mut bodies = two_point_masses();
        bodies[0].linear_velocity = Vec3::new(-Fix64::ONE, Fix64::ZERO, Fix64::ZERO);
        bodies[1].linear_velocity = Vec3::new(Fix64::ONE, Fix64::ZERO, Fix64::ZERO);
        let mut c = DistanceConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO, Fix64::ONE)
            .with_error_reduction(Fix64::ZERO);
        c.update_activity(&bodies);
        c.prestep(Fix64::from_ratio(1, 60), &bodies);
        let mut last = Fix64::MAX;
        for _ in 0..10 {
            last = c.solve_iteration(&mut bodies);
        }
        assert!(last < Fix64::from_ratio(1, 1000));
        assert!(c.axis_velocity(&bodies).abs() < Fix64::from_ratio(1, 1000));
        // Internal impulses conserve momentum exactly for unit masses.
        let total = bodies[0].linear_velocity + bodies[1].linear_velocity;
        assert_eq!(total, Vec3::ZERO);
    }

    #[test]
    fn test_bias_pulls_toward_rest_length() {
        // Separation 2, rest length 1: the bias must drive the bodies
        // toward each other.
        let mut bodies = two_point_masses();
        let mut c = DistanceConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO, Fix64::ONE);
        c.update_activity(&bodies);
        c.prestep(Fix64::from_ratio(1, 60), &bodies);
        for _ in 0..10 {
            c.solve_iteration(&mut bodies);
        }
        // Axis points a->b, so closing means negative axis velocity.
        assert!(c.axis_velocity(&bodies) < Fix64::ZERO);
        let total = bodies[0].linear_velocity + bodies[1].linear_velocity;
        assert_eq!(total, Vec3::ZERO);
    }

    #[test]
    fn test_spring_mode_is_soft() {
        let mut bodies = two_point_masses();
        let mut rigid = DistanceConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO, Fix64::ONE);
        let mut soft = DistanceConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO, Fix64::ONE)
            .with_spring(Fix64::from_int(50), Fix64::from_int(2));
        let dt = Fix64::from_ratio(1, 60);
        rigid.update_activity(&bodies);
        rigid.prestep(dt, &bodies);
        soft.update_activity(&bodies);
        soft.prestep(dt, &bodies);
        assert!(soft.softness > Fix64::ZERO);
        assert_eq!(rigid.softness, Fix64::ZERO);
        let mut soft_bodies = bodies.clone();
        let rigid_impulse = rigid.solve_iteration(&mut bodies);
        let soft_impulse = soft.solve_iteration(&mut soft_bodies);
        // The soft constraint corrects less aggressively per iteration.
        assert!(soft_impulse < rigid_impulse);
    }

    #[test]
    fn test_coincident_anchors_fall_back() {
        let mut bodies = vec![
            RigidState::dynamic(Vec3::ZERO, Fix64::ONE),
            RigidState::dynamic(Vec3::ZERO, Fix64::ONE),
        ];
        let mut c = DistanceConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO, Fix64::ZERO);
        c.update_activity(&bodies);
        c.prestep(Fix64::from_ratio(1, 60), &bodies);
        assert_eq!(c.axis, Vec3::UNIT_X);
        // Still solvable without panicking.
        c.solve_iteration(&mut bodies);
    }
}
