use criterion::*;
use rayon::prelude::*;
use std::hint::black_box;

use hearth_engine::{MultithreadingConfiguration, TaskSystem};

const ELEMENTS: usize = 1_000_000;
const BATCH: usize = 16_384;

#[derive(Clone, Copy, Default)]
struct Transform {
    position: [f32; 3],
    velocity: [f32; 3],
}

fn integrate(batch: &mut [Transform]) {
    for transform in batch {
        for axis in 0..3 {
            transform.position[axis] += transform.velocity[axis] * (1.0 / 60.0);
        }
    }
}

fn parallel_for_benchmark(c: &mut Criterion) {
    let system = TaskSystem::with_configuration(&MultithreadingConfiguration::default())
        .expect("task system");
    let mut transforms = vec![
        Transform {
            position: [0.0; 3],
            velocity: [1.0, 2.0, 3.0],
        };
        ELEMENTS
    ];

    let mut group = c.benchmark_group("parallel_for");
    group.throughput(Throughput::Elements(ELEMENTS as u64));

    group.bench_function("sequential", |b| {
        b.iter(|| {
            integrate(&mut transforms);
            black_box(&transforms);
        });
    });

    group.bench_function("task_system", |b| {
        b.iter(|| {
            system
                .parallel_for(&mut transforms, BATCH, |batch, _| integrate(batch))
                .unwrap();
            black_box(&transforms);
        });
    });

    group.bench_function("rayon_baseline", |b| {
        b.iter(|| {
            transforms.par_chunks_mut(BATCH).for_each(integrate);
            black_box(&transforms);
        });
    });

    group.finish();
}

criterion_group!(benches, parallel_for_benchmark);
criterion_main!(benches);
