use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chronograph::windowdict::WindowDict;

fn sequential_writes(n: u128) -> WindowDict<Option<i64>> {
    let mut wd = WindowDict::new();
    for r in 0..n {
        wd.set(r, Some(r as i64));
    }
    wd
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("windowdict sequential set 10000", |b| {
        b.iter(|| black_box(sequential_writes(10_000)))
    });

    c.bench_function("windowdict get near cursor", |b| {
        let mut wd = sequential_writes(10_000);
        wd.seek(5_000);
        b.iter(|| black_box(wd.get(black_box(5_001)).unwrap()))
    });

    c.bench_function("windowdict get far jump", |b| {
        let mut wd = sequential_writes(10_000);
        let mut toggle = 0u128;
        b.iter(|| {
            toggle = 10_000 - toggle;
            black_box(wd.get(black_box(toggle)).unwrap())
        })
    });

    c.bench_function("windowdict truncate then rebuild tail", |b| {
        b.iter(|| {
            let mut wd = sequential_writes(2_000);
            wd.truncate(1_000);
            for r in 1_000..2_000 {
                wd.set(r, Some(r as i64));
            }
            black_box(&wd);
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
