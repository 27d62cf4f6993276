//! # Registry Performance Benchmark
//!
//! - Entity creation into pre-reserved pools
//! - Query iteration across archetypes
//! - Snooze/wake churn between the active and dormant pools
//!
//! Run with: `cargo bench --package kiln_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kiln_core::{
    Component, ComponentId, EntityTask, Filter, PoolKind, Registry, RegistryBuilder,
    RegistryConfig,
};

const ENTITY_COUNT: usize = 100_000;

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Health {
    value: i32,
}

impl Component for Health {
    const ID: ComponentId = 0;
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
}

impl Component for Position {
    const ID: ComponentId = 1;
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Velocity {
    dx: f32,
    dy: f32,
}

impl Component for Velocity {
    const ID: ComponentId = 2;
}

fn registry(capacity: usize) -> Registry {
    let config = RegistryConfig {
        pool_capacity: capacity,
        queue_capacity: capacity,
        callbacks: false,
    };
    RegistryBuilder::new()
        .with_config(config)
        .archetype::<(Health, Position, Velocity)>()
        .and_then(|builder| builder.archetype::<(Position, Velocity)>())
        .and_then(RegistryBuilder::build)
        .unwrap()
}

/// Benchmark: Create entities into reserved pools.
fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for count in [1_000, 10_000, ENTITY_COUNT] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let mut registry = registry(count);
                let record = (Health { value: 1 }, Position::default(), Velocity::default());
                registry.populate(record, count).unwrap();
                black_box(registry.total())
            });
        });
    }

    group.finish();
}

/// Benchmark: Integrate positions over two archetypes.
fn bench_query_iteration(c: &mut Criterion) {
    let mut registry = registry(ENTITY_COUNT);
    let moving = (
        Health { value: 1 },
        Position::default(),
        Velocity { dx: 0.1, dy: 0.2 },
    );
    registry.populate(moving, ENTITY_COUNT / 2).unwrap();
    registry
        .populate((Position::default(), Velocity { dx: 0.3, dy: 0.4 }), ENTITY_COUNT / 2)
        .unwrap();
    let plan = registry.prepare::<(Position, Velocity)>(&Filter::new()).unwrap();

    c.bench_function("query_position_velocity_100k", |b| {
        b.iter(|| {
            let mut query = registry.bind(&plan, PoolKind::Active).unwrap();
            while let Some((_, (position, velocity))) = query.next() {
                position.x += velocity.dx;
                position.y += velocity.dy;
            }
        });
    });

    c.bench_function("for_each_health_50k", |b| {
        b.iter(|| {
            let mut total = 0_i64;
            registry
                .for_each::<(Health,)>(PoolKind::Active, |_, (health,)| {
                    total += i64::from(health.value);
                })
                .unwrap();
            black_box(total)
        });
    });
}

/// Benchmark: Move a tenth of the entities to the dormant pool and back.
fn bench_snooze_wake(c: &mut Criterion) {
    let mut registry = registry(ENTITY_COUNT);
    registry
        .populate((Position::default(), Velocity::default()), ENTITY_COUNT)
        .unwrap();
    let ids: Vec<_> = registry
        .ids::<(Position, Velocity)>(PoolKind::Active)
        .unwrap()
        .iter()
        .step_by(10)
        .copied()
        .collect();

    c.bench_function("snooze_wake_10k", |b| {
        b.iter(|| {
            for &id in &ids {
                registry.queue(id, EntityTask::Snooze).unwrap();
            }
            registry.update().unwrap();
            for &id in &ids {
                registry.queue(id, EntityTask::Wake).unwrap();
            }
            registry.update().unwrap();
            black_box(registry.pending())
        });
    });
}

criterion_group!(benches, bench_create, bench_query_iteration, bench_snooze_wake);
criterion_main!(benches);
