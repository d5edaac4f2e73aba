//! Benchmarks for the per-frame pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mask_core::config::Config;
use mask_core::pose::PoseAdapter;
use mask_core::synthetic::SwayingHead;
use mask_core::{Command, MaskSession, Mesh, ShadingMode};
use std::path::PathBuf;

fn bench_config() -> Config {
    let mut config = Config::default();
    config.mesh.path = PathBuf::from("/nonexistent/facemesh.obj");
    config
}

/// Full frame at the default 1280x720 in every shading mode
fn bench_process_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_frame");
    let config = bench_config();

    for mode in ShadingMode::ALL {
        group.bench_with_input(BenchmarkId::new("mode", mode.name()), &mode, |b, &mode| {
            let mut session = MaskSession::new(config.clone()).expect("Failed to create session");
            session.apply(Command::SelectShading(mode)).expect("Failed to select mode");
            let head = SwayingHead::new(session.mesh(), &config);
            let frames: Vec<_> = (0..30).map(|i| head.frame_at(i * 33)).collect();
            let mut i = 0;
            b.iter(|| {
                session
                    .process_frame(Some(black_box(&frames[i % frames.len()])), None)
                    .expect("Frame failed");
                i += 1;
            });
        });
    }

    group.finish();
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("stages");
    let config = bench_config();
    let mesh = Mesh::builtin_face();
    let head = SwayingHead::new(&mesh, &config);
    let frame = head.frame_at(500);
    let adapter = PoseAdapter::new(&config);

    group.bench_function("adapt", |b| {
        b.iter(|| black_box(adapter.adapt(black_box(&frame)).expect("Invalid frame")));
    });

    group.bench_function("vertex_normals", |b| {
        b.iter(|| black_box(mesh.vertex_normals()));
    });

    group.finish();
}

criterion_group!(benches, bench_process_frame, bench_stages);
criterion_main!(benches);
