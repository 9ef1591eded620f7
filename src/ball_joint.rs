//! Ball-Socket Joint Constraint
//!
//! Pins two anchor points together while leaving rotation free. This is the
//! vector-valued accumulated-impulse case: the impulse is a full 3-vector
//! and the effective mass a 3x3 matrix. A singular effective mass (both
//! bodies immovable) deactivates the joint for the step instead of erroring.

use crate::body::{BodyId, RigidState};
use crate::constraint::{ConstraintBodies, SolverUpdateable, UpdateableCore};
use crate::fixed::Fix64;
use crate::math::{Mat3, Vec3};

/// Two-body ball-socket joint with local-space anchors.
#[derive(Clone, Copy, Debug)]
pub struct BallJointConstraint {
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
    /// Baumgarte factor scaling anchor separation into bias velocity
    pub error_reduction: Fix64,
    /// Accumulated impulse vector
    pub accumulated: Vec3,
    offset_a: Vec3,
    offset_b: Vec3,
    effective_mass: Mat3,
    bias: Vec3,
}

impl BallJointConstraint {
    /// Create a ball-socket joint.
    pub fn new(
        body_a: BodyId,
        body_b: BodyId,
        local_anchor_a: Vec3,
        local_anchor_b: Vec3,
    ) -> Self {
        Self {
            core: UpdateableCore::default(),
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            error_reduction: Fix64::from_ratio(1, 5),
            accumulated: Vec3::ZERO,
            offset_a: Vec3::ZERO,
            offset_b: Vec3::ZERO,
            effective_mass: Mat3::ZERO,
            bias: Vec3::ZERO,
        }
    }

    /// Relative velocity of the two anchor points.
    fn anchor_velocity(&self, bodies: &[RigidState]) -> Vec3 {
        bodies[self.body_b].velocity_at(self.offset_b)
            - bodies[self.body_a].velocity_at(self.offset_a)
    }
}

impl SolverUpdateable for BallJointConstraint {
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

        // K = (1/ma + 1/mb) I - ra~ Ia^-1 ra~ - rb~ Ib^-1 rb~
        let skew_a = Mat3::skew(self.offset_a);
        let skew_b = Mat3::skew(self.offset_b);
        let k = Mat3::scaled_identity(a.inverse_mass + b.inverse_mass)
            - skew_a * a.inverse_inertia * skew_a
            - skew_b * b.inverse_inertia * skew_b;
        match k.invert() {
            Some(inverse) => self.effective_mass = inverse,
            None => {
                // Degenerate mass configuration; sit the step out.
                self.core.active = false;
                return;
            }
        }

        let separation =
            (b.position + self.offset_b) - (a.position + self.offset_a);
        self.bias = if dt.is_zero() {
            Vec3::ZERO
        } else {
            separation * (self.error_reduction / dt)
        };
    }

    fn warm_start(&mut self, bodies: &mut [RigidState]) {
        if self.accumulated == Vec3::ZERO {
            return;
        }
        bodies[self.body_a].apply_impulse(self.offset_a, -self.accumulated);
        bodies[self.body_b].apply_impulse(self.offset_b, self.accumulated);
    }

    fn solve_iteration(&mut self, bodies: &mut [RigidState]) -> Fix64 {
        let velocity_error = self.anchor_velocity(bodies) + self.bias;
        let lambda = -self.effective_mass.mul_vec(velocity_error);
        self.accumulated = self.accumulated + lambda;
        bodies[self.body_a].apply_impulse(self.offset_a, -lambda);
        bodies[self.body_b].apply_impulse(self.offset_b, lambda);
        lambda.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jointed_pair() -> (Vec<RigidState>, BallJointConstraint) {
        let bodies = vec![
            RigidState::dynamic(Vec3::ZERO, Fix64::ONE),
            RigidState::dynamic(Vec3::from_int(2, 0, 0), Fix64::ONE),
        ];
        let joint = BallJointConstraint::new(
            0,
            1,
            Vec3::from_int(1, 0, 0),
            Vec3::from_int(-1, 0, 0),
        );
        (bodies, joint)
    }

    #[test]
    fn test_joint_kills_relative_anchor_velocity() {
        let (mut bodies, mut joint) = jointed_pair();
        bodies[1].linear_velocity = Vec3::from_int(0, 3, 0);
        joint.error_reduction = Fix64::ZERO;
        joint.update_activity(&bodies);
        joint.prestep(Fix64::from_ratio(1, 60), &bodies);
        let mut last = Fix64::MAX;
        for _ in 0..12 {
            last = joint.solve_iteration(&mut bodies);
        }
        assert!(last < Fix64::from_ratio(1, 1000));
        let rel = joint.anchor_velocity(&bodies);
        assert!(rel.max_abs_component() < Fix64::from_ratio(1, 500));
        // Unit masses: linear momentum is conserved exactly.
        let total = bodies[0].linear_velocity + bodies[1].linear_velocity;
        assert_eq!(total, Vec3::from_int(0, 3, 0));
    }

    #[test]
    fn test_singular_mass_deactivates() {
        let bodies = vec![
            RigidState::fixed(Vec3::ZERO),
            RigidState::dynamic(Vec3::from_int(2, 0, 0), Fix64::ONE),
        ];
        let mut joint = BallJointConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO);
        joint.update_activity(&bodies);
        assert!(joint.core.is_active());
        // One dynamic body keeps K invertible; prestep stays active.
        joint.prestep(Fix64::from_ratio(1, 60), &bodies);
        assert!(joint.core.is_active());
    }

    #[test]
    fn test_two_fixed_bodies_deactivate() {
        let bodies = vec![
            RigidState::fixed(Vec3::ZERO),
            RigidState::fixed(Vec3::from_int(2, 0, 0)),
        ];
        let mut joint = BallJointConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO);
        joint.update_activity(&bodies);
        assert!(!joint.core.is_active());
    }

    #[test]
    fn test_warm_start_zero_is_noop() {
        let (mut bodies, mut joint) = jointed_pair();
        let before = bodies.clone();
        joint.warm_start(&mut bodies);
        assert_eq!(before[0].linear_velocity, bodies[0].linear_velocity);
        assert_eq!(before[1].angular_velocity, bodies[1].angular_velocity);
    }
}
