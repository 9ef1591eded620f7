//! Error Types
//!
//! Fallible configuration and lookup paths return `Result<T, PhysicsError>`.
//! Invariant violations (double-attaching an updateable, removing an entry
//! the hierarchy does not hold) are programmer errors and panic instead;
//! continuing past them would corrupt the spatial index or the solver's
//! bookkeeping.

use core::fmt;

/// Unified error type for the fallible parts of the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// Body index is out of range.
    InvalidBodyIndex {
        /// The invalid index that was provided
        index: usize,
        /// Current number of bodies
        count: usize,
    },
    /// Invalid configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
    /// A constraint's effective mass is singular and cannot be inverted.
    SingularMass {
        /// Context describing where the singular mass was encountered
        context: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBodyIndex { index, count } => {
                write!(f, "body index {index} out of range (count={count})")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::SingularMass { context } => {
                write!(f, "singular effective mass in {context}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PhysicsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "std")]
    #[test]
    fn test_error_display() {
        let e = PhysicsError::InvalidBodyIndex { index: 5, count: 3 };
        let s = std::format!("{e}");
        assert!(s.contains('5'));
        assert!(s.contains('3'));
        let c = PhysicsError::InvalidConfiguration {
            reason: "iteration_limit must be > 0",
        };
        assert!(std::format!("{c}").contains("iteration_limit"));
    }

    #[test]
    fn test_error_variants_distinct() {
        let a = PhysicsError::InvalidBodyIndex { index: 0, count: 0 };
        let b = PhysicsError::SingularMass { context: "ball joint" };
        assert_ne!(a, b);
    }
}
