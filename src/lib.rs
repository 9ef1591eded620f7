//! # lockstep-physics
//!
//! **Deterministic Fixed-Point Rigid-Body Physics Core**
//!
//! A broad-phase spatial index and sequential-impulse constraint solver on
//! a Q31.32 fixed-point foundation. No value that affects simulation
//! outcome ever touches native floating point, so replaying the same inputs
//! produces bit-identical state on every platform — the property lockstep
//! multiplayer and replay-hash regression tests depend on.
//!
//! # Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Fix64`] | Q31.32 scalar: wrapping/saturating/checked arithmetic, bit-reproducible transcendentals |
//! | [`Vec3`] / [`Quat`] / [`Mat3`] | Fixed-point geometric primitives |
//! | [`Aabb`] | Bounding boxes with saturating volume metrics |
//! | [`DynamicHierarchy`] | Dynamic bounding-volume tree broad phase with refit, revalidation, and split-depth parallel update |
//! | [`SolverUpdateable`] | The constraint contract: prestep / warm start / clamped iteration |
//! | [`Solver`] | Three-phase sequential-impulse driver with warm starting and early-out |
//! | [`ParallelLooper`] | The single work-splitting primitive all parallelism goes through |
//!
//! # Per-step data flow
//!
//! Host updates entry bounding boxes → hierarchy refit + self-overlap →
//! candidate pairs → (external narrow phase) contact constraints → solver
//! prestep / warm start / iterate → impulses update entity velocities →
//! host integrates positions.
//!
//! # Quick start
//!
//! ```rust
//! use lockstep_physics::prelude::*;
//!
//! // Two unit-mass bodies flying apart, joined by a distance constraint.
//! let mut bodies = vec![
//!     RigidState::dynamic(Vec3::ZERO, Fix64::ONE),
//!     RigidState::dynamic(Vec3::from_int(2, 0, 0), Fix64::ONE),
//! ];
//! bodies[0].linear_velocity = Vec3::from_int(-1, 0, 0);
//! bodies[1].linear_velocity = Vec3::from_int(1, 0, 0);
//!
//! let rod = DistanceConstraint::new(0, 1, Vec3::ZERO, Vec3::ZERO, Fix64::ONE)
//!     .with_error_reduction(Fix64::ZERO);
//! let mut solver = Solver::new(SolverConfig::default());
//! solver.add(Box::new(rod));
//!
//! solver.update(Fix64::from_ratio(1, 60), &mut bodies);
//!
//! // The constraint cancelled the separating velocity...
//! let relative = (bodies[1].linear_velocity - bodies[0].linear_velocity).x;
//! assert!(relative.abs() < Fix64::from_ratio(1, 1000));
//! // ...without creating momentum.
//! assert_eq!(
//!     bodies[0].linear_velocity + bodies[1].linear_velocity,
//!     Vec3::ZERO,
//! );
//! ```
//!
//! # Features
//!
//! - `std` (default): float conversions for debugging, `std::error::Error`
//! - `parallel`: the Rayon-backed `RayonLooper` for broad-phase updates

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod ball_joint;
pub mod body;
pub mod bounds;
pub mod constraint;
pub mod contact;
pub mod distance;
pub mod error;
pub mod fixed;
pub mod hierarchy;
pub mod islands;
pub mod looper;
pub mod math;
pub mod rng;
pub mod solver;

/// Convenience re-exports of the main API surface.
pub mod prelude {
    pub use crate::ball_joint::BallJointConstraint;
    pub use crate::body::{BodyId, RigidState};
    pub use crate::bounds::Aabb;
    pub use crate::constraint::{
        ConstraintBodies, SolverSettings, SolverUpdateable, UpdateableCore,
    };
    pub use crate::contact::ContactConstraint;
    pub use crate::distance::DistanceConstraint;
    pub use crate::error::PhysicsError;
    pub use crate::fixed::Fix64;
    pub use crate::hierarchy::{BroadPhaseEntry, DynamicHierarchy, EntryId};
    pub use crate::islands::{ConnectionCounter, ConnectionListener, NullListener};
    #[cfg(feature = "parallel")]
    pub use crate::looper::RayonLooper;
    pub use crate::looper::{ParallelLooper, SequentialLooper};
    pub use crate::math::{Mat3, Quat, Vec3};
    pub use crate::rng::DeterministicRng;
    pub use crate::solver::{Solver, SolverConfig};
}

pub use prelude::*;
