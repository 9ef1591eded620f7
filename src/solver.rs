//! Sequential-Impulse Solver
//!
//! Owns the active solver updateables and drives the per-step three-phase
//! loop:
//!
//! 1. **Prestep** for every attached updateable — activity, then jacobian /
//!    effective-mass / bias setup against pre-step velocities. No velocity
//!    changes until every prestep has finished, so later presteps never see
//!    another constraint's impulse.
//! 2. **Warm start** for every active updateable — re-apply the previous
//!    step's accumulated impulse, starting iteration from last step's
//!    solution.
//! 3. **Iterate** up to the configured limit — each sweep gives every
//!    still-active updateable one clamped incremental impulse. An
//!    updateable whose delta stays below its `min_impulse` for more than
//!    `min_iterations` consecutive calls is done for the step.
//!
//! The collection is unordered but index-addressable (swap-remove keeps
//! removal O(1)); iteration order is the plain collection order, which is
//! identical for identical insertion histories — the property cross-platform
//! determinism needs, since impulse accumulation is order-sensitive.
//!
//! The reference solver is single-threaded: a parallel variant needs a
//! conflict-free partition of bodies from the external island machinery,
//! which is out of scope here.

use crate::body::RigidState;
use crate::constraint::SolverUpdateable;
use crate::error::PhysicsError;
use crate::fixed::Fix64;
use crate::islands::{ConnectionListener, NullListener};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Solver configuration, threaded through construction — no global
/// settings, so independent simulations tune independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolverConfig {
    /// Global cap on solve sweeps per step.
    pub iteration_limit: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self { iteration_limit: 10 }
    }
}

impl SolverConfig {
    /// Reject configurations the solver cannot run with.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.iteration_limit == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "iteration_limit must be > 0",
            });
        }
        Ok(())
    }
}

/// Sequential-impulse constraint solver.
pub struct Solver {
    config: SolverConfig,
    updateables: Vec<Box<dyn SolverUpdateable>>,
    listener: Box<dyn ConnectionListener>,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl Solver {
    /// Create a solver with a no-op deactivation listener.
    pub fn new(config: SolverConfig) -> Self {
        Self::with_listener(config, Box::new(NullListener))
    }

    /// Create a solver reporting connections to the given listener
    /// (typically the host's island/deactivation manager).
    pub fn with_listener(config: SolverConfig, listener: Box<dyn ConnectionListener>) -> Self {
        Self {
            config,
            updateables: Vec::new(),
            listener,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> SolverConfig {
        self.config
    }

    /// Number of attached updateables.
    pub fn len(&self) -> usize {
        self.updateables.len()
    }

    /// Check whether no updateables are attached.
    pub fn is_empty(&self) -> bool {
        self.updateables.is_empty()
    }

    /// Borrow an attached updateable.
    pub fn updateable(&self, index: usize) -> &dyn SolverUpdateable {
        &*self.updateables[index]
    }

    /// Mutably borrow an attached updateable.
    pub fn updateable_mut(&mut self, index: usize) -> &mut dyn SolverUpdateable {
        &mut *self.updateables[index]
    }

    /// Attach an updateable and register its connection with the listener.
    /// Returns the current index (valid until the next removal).
    ///
    /// # Panics
    ///
    /// Panics if the updateable is already attached — attach state must be
    /// consistent or solver bookkeeping corrupts.
    pub fn add(&mut self, mut updateable: Box<dyn SolverUpdateable>) -> usize {
        assert!(
            !updateable.core().is_attached(),
            "updateable is already attached to a solver"
        );
        updateable.core_mut().attached = true;
        self.listener.connection_added(updateable.connected_bodies());
        self.updateables.push(updateable);
        self.updateables.len() - 1
    }

    /// Detach and return the updateable at `index`. Swap-remove: the last
    /// updateable takes over the vacated index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove(&mut self, index: usize) -> Box<dyn SolverUpdateable> {
        assert!(
            index < self.updateables.len(),
            "no updateable at index {index}"
        );
        let mut updateable = self.updateables.swap_remove(index);
        debug_assert!(updateable.core().is_attached());
        updateable.core_mut().attached = false;
        updateable.core_mut().active = false;
        self.listener
            .connection_removed(updateable.connected_bodies());
        updateable
    }

    /// Advance one step of duration `dt` over the host's body states.
    pub fn update(&mut self, dt: Fix64, bodies: &mut [RigidState]) {
        // Phase 1: prestep. Bodies are read-only here by construction.
        for updateable in &mut self.updateables {
            updateable.core_mut().reset_step();
            updateable.update_activity(bodies);
            if updateable.core().is_active() {
                updateable.prestep(dt, bodies);
            }
        }

        // Phase 2: warm start. Strictly after every prestep.
        for updateable in &mut self.updateables {
            if updateable.core().is_active() {
                updateable.warm_start(bodies);
            }
        }

        // Phase 3: bounded solve sweeps with per-updateable early-out.
        for _ in 0..self.config.iteration_limit {
            let mut any_solved = false;
            for updateable in &mut self.updateables {
                let core = updateable.core();
                if !core.is_active() {
                    continue;
                }
                if core.iterations_run >= core.settings.max_iterations {
                    updateable.core_mut().active = false;
                    continue;
                }
                let magnitude = updateable.solve_iteration(bodies);
                any_solved = true;
                let core = updateable.core_mut();
                core.iterations_run += 1;
                if magnitude < core.settings.min_impulse {
                    core.near_zero_streak += 1;
                    if core.near_zero_streak > core.settings.min_iterations {
                        core.active = false;
                    }
                } else {
                    core.near_zero_streak = 0;
                }
            }
            if !any_solved {
                break;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
