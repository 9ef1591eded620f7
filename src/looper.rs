//! Parallel-For Substrate
//!
//! All parallelism in the core is expressed through one primitive: run the
//! indices of a range across however many workers the host provides. The
//! broad phase hands this trait independent subtree jobs; nothing here owns
//! threads or schedules tasks.
//!
//! `map_range` is the deterministic collection form: job outputs come back
//! in index order regardless of execution order, so parallel passes produce
//! the same concatenated result on every run.

use core::ops::Range;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A work-splitting primitive: execute a body over `[start, end)` indices.
pub trait ParallelLooper {
    /// Run `body(i)` for every `i` in `range`. Bodies must be independent;
    /// execution order across indices is unspecified.
    fn for_range<F>(&self, range: Range<usize>, body: F)
    where
        F: Fn(usize) + Sync + Send;

    /// Run `f(i)` for `i` in `0..len` and collect the results **in index
    /// order**. This is the form parallel passes use when output order must
    /// not depend on scheduling.
    fn map_range<T, F>(&self, len: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send;
}

/// Single-threaded looper: a plain loop. Always available and the reference
/// behavior every parallel looper must reproduce.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialLooper;

impl ParallelLooper for SequentialLooper {
    fn for_range<F>(&self, range: Range<usize>, body: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        for i in range {
            body(i);
        }
    }

    fn map_range<T, F>(&self, len: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        (0..len).map(f).collect()
    }
}

/// Rayon-backed looper. Rayon's indexed collect preserves index order, which
/// keeps `map_range` output identical to the sequential looper's.
#[cfg(feature = "parallel")]
#[derive(Clone, Copy, Debug, Default)]
pub struct RayonLooper;

#[cfg(feature = "parallel")]
impl ParallelLooper for RayonLooper {
    fn for_range<F>(&self, range: Range<usize>, body: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        range.into_par_iter().for_each(|i| body(i));
    }

    fn map_range<T, F>(&self, len: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        (0..len).into_par_iter().map(f).collect()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_sequential_for_range_visits_all() {
        let count = AtomicUsize::new(0);
        SequentialLooper.for_range(3..11, |_| {
            count.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(count.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn test_map_range_order() {
        let out = SequentialLooper.map_range(5, |i| i * i);
        assert_eq!(out, vec![0, 1, 4, 9, 16]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_rayon_matches_sequential() {
        let seq = SequentialLooper.map_range(100, |i| i * 3 + 1);
        let par = RayonLooper.map_range(100, |i| i * 3 + 1);
        assert_eq!(seq, par);
    }
}
