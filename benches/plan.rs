use criterion::{
    criterion_group,
    criterion_main,
    BenchmarkId,
    Criterion,
};

use bevy::math::UVec2;
use bevy_hiz::PyramidPlan;


const PYRAMID_SIZES: [u32; 4] = [
    64,
    256,
    1024,
    2048,
];

fn pyramid_plan_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("build pyramid plans");
    for size in PYRAMID_SIZES.iter() {
        group.bench_with_input(
            BenchmarkId::new("plan", size),
            size,
            |b, &size| {
                b.iter(|| PyramidPlan::new(size));
            },
        );
    }
    group.finish();

    c.bench_function("plan for viewport 1920x1080", |b| {
        b.iter(|| PyramidPlan::for_viewport(UVec2::new(1920, 1080)));
    });
}

criterion_group! {
    name = plan_benches;
    config = Criterion::default().sample_size(10);
    targets = pyramid_plan_benchmark
}
criterion_main!(plan_benches);
