//! Benchmarks for tutorq-admin
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tutorq_admin::model::{NotificationEvent, QueueSnapshot};

fn snapshot_json(students: usize) -> String {
    let queue: Vec<_> = (0..students)
        .map(|i| {
            json!({
                "id": format!("S{i}"),
                "name": "student",
                "class": "INFO 441",
                "topic": "ownership",
                "loc.x": "3",
                "loc.y": "5",
            })
        })
        .collect();
    json!({ "queue": queue }).to_string()
}

fn benchmark_snapshot_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_rewrite");

    for students in [10, 100, 1000] {
        let raw = snapshot_json(students);
        let target = format!("S{}", students / 2);

        // The same parse/filter/serialize cycle a cache removal performs
        group.bench_with_input(BenchmarkId::from_parameter(students), &raw, |b, raw| {
            b.iter(|| {
                let mut snapshot = QueueSnapshot::from_json(raw).unwrap();
                let removed = snapshot.remove_student(&target);
                black_box((removed, snapshot.to_json().unwrap()));
            })
        });
    }

    group.finish();
}

fn benchmark_event_fields(c: &mut Criterion) {
    c.bench_function("event_stream_fields", |b| {
        let event = NotificationEvent::resolved("S1", chrono::Utc::now());
        b.iter(|| black_box(event.stream_fields().unwrap()))
    });
}

criterion_group!(benches, benchmark_snapshot_rewrite, benchmark_event_fields);
criterion_main!(benches);
