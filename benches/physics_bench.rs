//! Benchmarks for lockstep-physics
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lockstep_physics::{
    Aabb, BroadPhaseEntry, DeterministicRng, DistanceConstraint, DynamicHierarchy, Fix64,
    RigidState, Solver, SolverConfig, Vec3,
};

struct BenchEntry {
    aabb: Aabb,
}

impl BroadPhaseEntry for BenchEntry {
    fn bounding_box(&self) -> Aabb {
        self.aabb
    }

    fn update_bounding_box(&mut self) {
        self.aabb = self.aabb.expand(Fix64::from_ratio(1, 10));
    }
}

fn scattered_tree(count: usize, seed: u64) -> DynamicHierarchy<BenchEntry> {
    let mut rng = DeterministicRng::new(seed);
    let mut tree = DynamicHierarchy::new();
    for _ in 0..count {
        let aabb = rng.next_aabb(
            Fix64::from_int(-100),
            Fix64::from_int(100),
            Fix64::from_int(4),
        );
        tree.add(BenchEntry { aabb });
    }
    tree
}

// ============================================================================
// Broad phase benchmarks
// ============================================================================

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");

    group.bench_function("insert_512", |b| {
        b.iter(|| {
            let tree = scattered_tree(512, 42);
            black_box(tree.node_count())
        });
    });

    group.bench_function("update_512", |b| {
        let mut tree = scattered_tree(512, 42);
        b.iter(|| black_box(tree.update().len()));
    });

    group.bench_function("churn_256", |b| {
        b.iter(|| {
            let mut tree = scattered_tree(256, 7);
            let mut rng = DeterministicRng::new(99);
            for _ in 0..64 {
                let aabb = rng.next_aabb(
                    Fix64::from_int(-100),
                    Fix64::from_int(100),
                    Fix64::from_int(4),
                );
                let id = tree.add(BenchEntry { aabb });
                tree.remove(id);
            }
            black_box(tree.update().len())
        });
    });

    group.finish();
}

// ============================================================================
// Solver benchmarks
// ============================================================================

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver");

    group.bench_function("chain_64_10_steps", |b| {
        b.iter(|| {
            let mut bodies: Vec<RigidState> = (0..64)
                .map(|i| RigidState::dynamic(Vec3::from_int(i * 2, 0, 0), Fix64::ONE))
                .collect();
            bodies[0].linear_velocity = Vec3::from_int(0, 1, 0);
            let mut solver = Solver::new(SolverConfig::default());
            for i in 0..63 {
                solver.add(Box::new(DistanceConstraint::new(
                    i,
                    i + 1,
                    Vec3::ZERO,
                    Vec3::ZERO,
                    Fix64::TWO,
                )));
            }
            let dt = Fix64::from_ratio(1, 60);
            for _ in 0..10 {
                solver.update(black_box(dt), &mut bodies);
            }
            bodies[63].linear_velocity
        });
    });

    group.finish();
}

criterion_group!(benches, bench_broad_phase, bench_solver);
criterion_main!(benches);
