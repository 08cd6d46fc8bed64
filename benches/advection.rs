//! Benchmarks for the CPU-side simulation pieces.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::Vec2;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use windflow::advection::{advect_all, seed_positions, AdvectionParams};
use windflow::shader_utils::random_unit;
use windflow::{GeoBounds, VectorField};

fn bounds() -> GeoBounds {
    GeoBounds::new(-180.0, -80.0, 180.0, 80.0)
}

fn field() -> VectorField {
    VectorField::from_fn(360, 161, bounds(), |lon, lat| {
        Vec2::new(10.0 * (lat / 20.0).cos(), 5.0 * (lon / 30.0).sin())
    })
    .unwrap()
}

fn bench_advect_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("advect_all");
    let field = field();

    for count in [1_024usize, 16_384, 65_536] {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut positions = seed_positions(&mut rng, &bounds(), count);
        let mut seed = 0u32;

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                seed = seed.wrapping_add(1);
                let params = AdvectionParams {
                    bounds: bounds(),
                    speed_factor: 0.008,
                    drop_rate: 0.003,
                    seed,
                };
                black_box(advect_all(&field, &params, &mut positions))
            })
        });
    }

    group.finish();
}

fn bench_field(c: &mut Criterion) {
    let mut group = c.benchmark_group("field");
    let field = field();

    group.bench_function("texels", |b| b.iter(|| black_box(field.texels())));

    group.bench_function("sample", |b| {
        let t = Vec2::new(0.37, 0.61);
        b.iter(|| black_box(field.sample(black_box(t))))
    });

    group.finish();
}

fn bench_random(c: &mut Criterion) {
    c.bench_function("random_unit", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            black_box(random_unit(i, 42, 0))
        })
    });
}

criterion_group!(benches, bench_advect_all, bench_field, bench_random);
criterion_main!(benches);
