use criterion::*;
use std::hint::black_box;

use hearth_engine::{ComponentManager, ComponentTable, EntityKindId, EntitySystem};

const ENTITIES: usize = 100_000;

#[derive(Clone, Copy, Default)]
struct Transform {
    matrix: [f32; 16],
}

#[derive(Clone, Copy, Default)]
struct Bounds {
    min: [f32; 3],
    max: [f32; 3],
}

#[derive(Clone, Copy, Default)]
struct Visible(bool);

fn world() -> (ComponentManager, EntityKindId) {
    let mut components = ComponentManager::new();
    let kind = components
        .register_entity_kind(
            ComponentTable::builder("Renderable")
                .with::<Transform>()
                .with::<Bounds>()
                .with::<Visible>()
                .with_capacity(ENTITIES),
        )
        .unwrap();
    (components, kind)
}

fn components_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("components");

    group.bench_function("allocate_indices_100k", |b| {
        b.iter_batched(
            world,
            |(mut components, kind)| {
                let entities = EntitySystem::new();
                for _ in 0..ENTITIES {
                    let entity = entities.create_entity(kind);
                    components.new_components_index(kind, entity).unwrap();
                }
                black_box(components);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("return_half_swap_and_pop_100k", |b| {
        b.iter_batched(
            || {
                let (mut components, kind) = world();
                let entities = EntitySystem::new();
                for _ in 0..ENTITIES {
                    let entity = entities.create_entity(kind);
                    components.new_components_index(kind, entity).unwrap();
                }
                (components, kind)
            },
            |(mut components, kind)| {
                for index in (0..ENTITIES / 2).rev() {
                    black_box(components.return_components_index(kind, index * 2).unwrap());
                }
                black_box(components);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("entity_pre_update_forced_100k", |b| {
        b.iter_batched(
            || {
                let (components, kind) = world();
                let entities = EntitySystem::new();
                for _ in 0..ENTITIES {
                    let entity = entities.create_entity(kind);
                    entities.request_initialization(entity, true).unwrap();
                }
                (components, entities)
            },
            |(mut components, entities)| {
                black_box(entities.pre_update(&mut components));
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("cull_column_scan_100k", |b| {
        let (mut components, kind) = world();
        let entities = EntitySystem::new();
        for _ in 0..ENTITIES {
            let entity = entities.create_entity(kind);
            components.new_components_index(kind, entity).unwrap();
        }
        b.iter(|| {
            let (bounds, visible) = components.components_pair_mut::<Bounds, Visible>(kind).unwrap();
            for (bounds, visible) in bounds.iter().zip(visible.iter_mut()) {
                visible.0 = bounds.max[2] >= bounds.min[2];
            }
            black_box(visible);
        });
    });

    group.finish();
}

criterion_group!(benches, components_benchmark);
criterion_main!(benches);
