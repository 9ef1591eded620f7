//! Rigid-Body Entity Contract
//!
//! The minimal view of an entity the solver machinery needs: pose for
//! jacobian setup, inverse mass / inverse world-space inertia for effective
//! masses, and velocities that impulses mutate in place. Entities are owned
//! by the host and referenced by index; constraints never own them.

use crate::error::PhysicsError;
use crate::fixed::Fix64;
use crate::math::{Mat3, Quat, Vec3};

/// Index of a body in the host's state slice.
pub type BodyId = usize;

/// Bounds-checked body lookup, for hosts validating constraint body indices
/// before attaching an updateable.
pub fn get_checked(bodies: &[RigidState], index: BodyId) -> Result<&RigidState, PhysicsError> {
    bodies.get(index).ok_or(PhysicsError::InvalidBodyIndex {
        index,
        count: bodies.len(),
    })
}

/// Velocity-level rigid body state.
///
/// A zero inverse mass and zero inverse inertia marks a kinematic or static
/// entity: impulses applied to it are no-ops, and a constraint joining two
/// such entities deactivates itself rather than erroring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RigidState {
    /// Center-of-mass position
    pub position: Vec3,
    /// Orientation
    pub orientation: Quat,
    /// Linear velocity
    pub linear_velocity: Vec3,
    /// Angular velocity
    pub angular_velocity: Vec3,
    /// Inverse mass (zero = non-dynamic)
    pub inverse_mass: Fix64,
    /// Inverse inertia tensor in world space
    pub inverse_inertia: Mat3,
}

impl RigidState {
    /// Dynamic body with the given mass and a unit-sphere inertia scaled by
    /// mass (2/5 m r² with r = 1).
    pub fn dynamic(position: Vec3, mass: Fix64) -> Self {
        let inverse_mass = if mass.is_zero() {
            Fix64::ZERO
        } else {
            mass.recip()
        };
        let inertia = mass * Fix64::from_ratio(2, 5);
        let inverse_inertia = if inertia.is_zero() {
            Mat3::ZERO
        } else {
            Mat3::scaled_identity(inertia.recip())
        };
        Self {
            position,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inverse_mass,
            inverse_inertia,
        }
    }

    /// Non-dynamic (static or kinematic) body: infinite mass and inertia.
    pub fn fixed(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            inverse_mass: Fix64::ZERO,
            inverse_inertia: Mat3::ZERO,
        }
    }

    /// Check whether impulses can move this body.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        !self.inverse_mass.is_zero() || self.inverse_inertia != Mat3::ZERO
    }

    /// Apply a linear impulse at the center of mass.
    #[inline]
    pub fn apply_linear_impulse(&mut self, impulse: Vec3) {
        self.linear_velocity = self.linear_velocity + impulse * self.inverse_mass;
    }

    /// Apply an angular impulse.
    #[inline]
    pub fn apply_angular_impulse(&mut self, impulse: Vec3) {
        self.angular_velocity = self.angular_velocity + self.inverse_inertia.mul_vec(impulse);
    }

    /// Apply an impulse at offset `r` from the center of mass.
    #[inline]
    pub fn apply_impulse(&mut self, r: Vec3, impulse: Vec3) {
        self.apply_linear_impulse(impulse);
        self.apply_angular_impulse(r.cross(impulse));
    }

    /// Velocity of the material point at offset `r` from the center of mass.
    #[inline]
    pub fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_flags() {
        assert!(RigidState::dynamic(Vec3::ZERO, Fix64::ONE).is_dynamic());
        assert!(!RigidState::fixed(Vec3::ZERO).is_dynamic());
        // Zero mass falls back to non-dynamic.
        assert!(!RigidState::dynamic(Vec3::ZERO, Fix64::ZERO).is_dynamic());
    }

    #[test]
    fn test_linear_impulse_unit_mass() {
        let mut b = RigidState::dynamic(Vec3::ZERO, Fix64::ONE);
        b.apply_linear_impulse(Vec3::from_int(3, 0, 0));
        assert_eq!(b.linear_velocity, Vec3::from_int(3, 0, 0));
    }

    #[test]
    fn test_impulse_on_fixed_is_noop() {
        let mut b = RigidState::fixed(Vec3::ZERO);
        b.apply_impulse(Vec3::UNIT_X, Vec3::from_int(0, 100, 0));
        assert_eq!(b.linear_velocity, Vec3::ZERO);
        assert_eq!(b.angular_velocity, Vec3::ZERO);
    }

    #[test]
    fn test_get_checked() {
        let bodies = [RigidState::fixed(Vec3::ZERO)];
        assert!(get_checked(&bodies, 0).is_ok());
        assert_eq!(
            get_checked(&bodies, 3),
            Err(PhysicsError::InvalidBodyIndex { index: 3, count: 1 })
        );
    }

    #[test]
    fn test_velocity_at_offset() {
        let mut b = RigidState::dynamic(Vec3::ZERO, Fix64::ONE);
        b.angular_velocity = Vec3::UNIT_Z;
        // Spinning about Z, the point at +X moves along +Y.
        assert_eq!(b.velocity_at(Vec3::UNIT_X), Vec3::UNIT_Y);
    }
}
