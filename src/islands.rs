//! Deactivation-Manager Contract
//!
//! The island/sleep manager itself lives outside this core; the solver only
//! promises to report constraint connections symmetrically on attach and
//! detach. [`ConnectionListener`] is that contract. [`ConnectionCounter`]
//! is a minimal implementation for hosts and tests that do not run a full
//! island manager.

use crate::body::BodyId;
use crate::constraint::ConstraintBodies;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Receives constraint connectivity changes from the solver. `Solver::add`
/// and `Solver::remove` call these symmetrically.
pub trait ConnectionListener {
    /// A constraint referencing these bodies was attached.
    fn connection_added(&mut self, bodies: ConstraintBodies);

    /// A constraint referencing these bodies was detached.
    fn connection_removed(&mut self, bodies: ConstraintBodies);
}

/// Listener that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullListener;

impl ConnectionListener for NullListener {
    fn connection_added(&mut self, _bodies: ConstraintBodies) {}

    fn connection_removed(&mut self, _bodies: ConstraintBodies) {}
}

/// Per-body connection counts; enough for a host to ask "is anything still
/// attached to this body" without a full island graph.
#[derive(Clone, Debug, Default)]
pub struct ConnectionCounter {
    counts: Vec<u32>,
}

impl ConnectionCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections currently referencing `body`.
    pub fn connections(&self, body: BodyId) -> u32 {
        self.counts.get(body).copied().unwrap_or(0)
    }

    /// Whether no constraint references `body`.
    pub fn is_isolated(&self, body: BodyId) -> bool {
        self.connections(body) == 0
    }

    fn bump(&mut self, body: BodyId, delta: i32) {
        if body >= self.counts.len() {
            self.counts.resize(body + 1, 0);
        }
        let count = &mut self.counts[body];
        if delta > 0 {
            *count += 1;
        } else {
            *count = count.saturating_sub(1);
        }
    }
}

impl ConnectionListener for ConnectionCounter {
    fn connection_added(&mut self, bodies: ConstraintBodies) {
        match bodies {
            ConstraintBodies::One(a) => self.bump(a, 1),
            ConstraintBodies::Two(a, b) => {
                self.bump(a, 1);
                self.bump(b, 1);
            }
        }
    }

    fn connection_removed(&mut self, bodies: ConstraintBodies) {
        match bodies {
            ConstraintBodies::One(a) => self.bump(a, -1),
            ConstraintBodies::Two(a, b) => {
                self.bump(a, -1);
                self.bump(b, -1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_symmetry() {
        let mut counter = ConnectionCounter::new();
        counter.connection_added(ConstraintBodies::Two(0, 2));
        counter.connection_added(ConstraintBodies::Two(0, 1));
        counter.connection_added(ConstraintBodies::One(2));
        assert_eq!(counter.connections(0), 2);
        assert_eq!(counter.connections(1), 1);
        assert_eq!(counter.connections(2), 2);
        assert!(counter.is_isolated(5));

        counter.connection_removed(ConstraintBodies::Two(0, 2));
        counter.connection_removed(ConstraintBodies::One(2));
        assert_eq!(counter.connections(0), 1);
        assert_eq!(counter.connections(2), 0);
        assert!(counter.is_isolated(2));
    }

    #[test]
    fn test_counter_underflow_saturates() {
        let mut counter = ConnectionCounter::new();
        counter.connection_removed(ConstraintBodies::One(3));
        assert_eq!(counter.connections(3), 0);
    }
}
