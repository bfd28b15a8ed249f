//! Refresh Benchmarks
//!
//! Measures the cost of a no-op refresh over a settled graph and of a
//! refresh after a single leaf changed.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cascade_core::{Engine, NodeId, Passthrough};

/// A layered graph: every node in a layer depends on every node in the next.
fn layered(engine: &Engine, layers: usize, width: usize) -> (NodeId, Vec<NodeId>) {
    let root = engine.add_node("root");
    let mut above = vec![root];

    for layer in 0..layers {
        let current: Vec<_> = (0..width)
            .map(|i| engine.add_node(format!("{layer}.{i}")))
            .collect();
        for &master in &above {
            for &slave in &current {
                engine.add_edge(master, slave).unwrap();
            }
        }
        above = current;
    }

    (root, above)
}

fn bench_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh");

    for width in [2, 4] {
        let engine = Engine::new(Passthrough);
        let (root, leaves) = layered(&engine, 3, width);
        engine.refresh(root).unwrap();

        group.bench_with_input(BenchmarkId::new("settled", width), &width, |b, _| {
            b.iter(|| black_box(engine.refresh(root).unwrap()))
        });

        let mut flip = false;
        group.bench_with_input(BenchmarkId::new("one_leaf_changed", width), &width, |b, _| {
            b.iter(|| {
                flip = !flip;
                engine.set_data(leaves[0], if flip { "on" } else { "off" }).unwrap();
                black_box(engine.refresh(root).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_refresh);
criterion_main!(benches);
