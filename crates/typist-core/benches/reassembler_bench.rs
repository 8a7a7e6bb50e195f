//! Criterion benchmarks for the inbound config-stream path and outbound
//! chunking.
//!
//! A full configuration snapshot with a few dozen macros arrives as several
//! hundred notifications; routing them must stay well below the BLE
//! connection interval so the notification queue never backs up.
//!
//! Run with:
//! ```bash
//! cargo bench --package typist-core --bench reassembler_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use typist_core::protocol::chunk::{chunk_payload, CHUNK_SIZE};
use typist_core::protocol::router::{NotificationRouter, RouteOutcome};
use typist_core::{ConfigDocument, MacroRecord};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_document(macro_count: usize) -> String {
    let doc = ConfigDocument {
        macros: (0..macro_count as i64)
            .map(|id| MacroRecord {
                id,
                title: format!("Macro {id}"),
                icon: "keyboard".into(),
                script: "The quick brown fox jumps over the lazy dog.".into(),
            })
            .collect(),
        startup_id: Some(0),
        ..Default::default()
    };
    serde_json::to_string(&doc).expect("fixture serializes")
}

fn make_frames(json: &str) -> Vec<Vec<u8>> {
    let mut frames = vec![format!(":CFG:LIST LEN={}", json.chars().count()).into_bytes()];
    for piece in json.as_bytes().chunks(CHUNK_SIZE * 4) {
        let mut frame = b":CFG:DATA ".to_vec();
        frame.extend_from_slice(piece);
        frames.push(frame);
    }
    frames
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_route_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_config_stream");
    for macro_count in [4usize, 32, 128] {
        let frames = make_frames(&make_document(macro_count));
        group.bench_with_input(
            BenchmarkId::from_parameter(macro_count),
            &frames,
            |b, frames| {
                b.iter(|| {
                    let mut router = NotificationRouter::new();
                    let mut ready = false;
                    for frame in frames {
                        if let RouteOutcome::ConfigReady(_) = router.route(black_box(frame)) {
                            ready = true;
                        }
                    }
                    assert!(ready);
                });
            },
        );
    }
    group.finish();
}

fn bench_chunking(c: &mut Criterion) {
    let payload = "x".repeat(4096).into_bytes();
    c.bench_function("chunk_4k_payload", |b| {
        b.iter(|| chunk_payload(black_box(&payload), CHUNK_SIZE).count())
    });
}

criterion_group!(benches, bench_route_stream, bench_chunking);
criterion_main!(benches);
