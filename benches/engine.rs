use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chronograph::engine::Engine;
use chronograph::gateway::memory::MemoryGateway;
use chronograph::EngineConfig;

fn populated_engine(node_count: u64) -> Engine<MemoryGateway> {
    let mut e = Engine::new(MemoryGateway::new(), EngineConfig::default()).unwrap();
    for i in 0..node_count {
        let id = format!("n{i}");
        e.set_node_exists("g", &id, true).unwrap();
        e.set_node_attr("g", &id, "hp", Some(chronograph::Value::Int(i as i64))).unwrap();
        if i > 0 {
            e.set_edge_exists("g", &format!("n{}", i - 1), &id, 0, true).unwrap();
        }
        e.set_tick(i + 1).unwrap();
    }
    e
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("engine sequential node writes 5000", |b| {
        b.iter(|| black_box(populated_engine(5_000)))
    });

    c.bench_function("engine attribute read near cursor", |b| {
        let mut e = populated_engine(5_000);
        b.iter(|| black_box(e.get_node_attr("g", &"n4999".to_string(), "hp").unwrap()))
    });

    c.bench_function("engine successors lookup", |b| {
        let mut e = populated_engine(5_000);
        b.iter(|| black_box(e.successors("g", &"n2500".to_string())))
    });

    c.bench_function("engine branch fork and divergent write", |b| {
        b.iter(|| {
            let mut e = populated_engine(500);
            e.set_branch("alt").unwrap();
            e.set_node_attr("g", &"n100".to_string(), "hp", Some(chronograph::Value::Int(-1))).unwrap();
            black_box(&e);
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
