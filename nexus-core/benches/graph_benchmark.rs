use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use nexus_core::{export_world, import_world, GraphSnapshot, GraphStore, NodeType};

fn build_world(nodes: usize) -> GraphStore {
    let mut store = GraphStore::new();
    let mut ids = Vec::with_capacity(nodes);
    for i in 0..nodes {
        let kind = NodeType::ALL[i % NodeType::ALL.len()];
        ids.push(store.create_node(kind, i as f64 * 20.0, (i % 17) as f64 * 35.0).id);
    }
    // Ring plus a few chords.
    for i in 0..nodes {
        store.create_link(&ids[i], &ids[(i + 1) % nodes]);
        store.create_link(&ids[i], &ids[(i + 7) % nodes]);
    }
    store
}

fn bench_snapshot_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Snapshot");
    let store = build_world(500);
    let snapshot = store.serialize();
    let json = export_world(&snapshot).unwrap();
    group.throughput(Throughput::Bytes(json.len() as u64));

    group.bench_function("encode_500_nodes", |b| {
        b.iter(|| black_box(serde_json::to_string(black_box(&snapshot)).unwrap()))
    });

    group.bench_function("decode_500_nodes", |b| {
        b.iter(|| black_box(import_world(black_box(&json)).unwrap()))
    });

    group.finish();
}

fn bench_replace_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("GraphStore");
    let snapshot: GraphSnapshot = build_world(500).serialize();

    group.bench_function("apply_remote_snapshot_500", |b| {
        let mut store = GraphStore::new();
        b.iter(|| store.apply_remote_snapshot(black_box(snapshot.clone())))
    });

    group.bench_function("create_link_dedupe", |b| {
        let mut store = build_world(200);
        let a = store.node_at(0).unwrap().id.clone();
        let z = store.node_at(1).unwrap().id.clone();
        b.iter(|| black_box(store.create_link(&z, &a)))
    });

    group.finish();
}

criterion_group!(benches, bench_snapshot_codec, bench_replace_all);
criterion_main!(benches);
