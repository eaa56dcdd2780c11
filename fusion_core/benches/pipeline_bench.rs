use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fusion_core::{FusedEstimate, FusionConfig, FusionPipeline, PixelBox, RawInput};

/// One second of 30 Hz detections with a range reading per frame.
fn make_inputs(frames: usize, cx: f64, cy: f64) -> Vec<RawInput> {
    let dt = 1.0 / 30.0;
    (0..frames)
        .flat_map(|i| {
            let t = i as f64 * dt;
            let sway = 8.0 * (t * 3.0).sin();
            [
                RawInput::Range {
                    distance: 0.5 - 0.01 * t,
                    stamp: t,
                },
                RawInput::Detection {
                    pixel_box: PixelBox::centered(cx + sway, cy, 40.0, 40.0),
                    confidence: 0.9,
                    stamp: t,
                },
            ]
        })
        .collect()
}

fn bench_pipeline(c: &mut Criterion) {
    let config = FusionConfig::default();
    let k = config.camera.intrinsics;
    let mut group = c.benchmark_group("pipeline");

    for frames in [30, 300, 3000] {
        let inputs = make_inputs(frames, k.cx, k.cy);
        group.bench_function(format!("{frames}_frames"), |b| {
            b.iter(|| {
                let mut pipeline = FusionPipeline::new(config.clone(), Vec::<FusedEstimate>::new())
                    .expect("default config is valid");
                for raw in inputs.iter().cloned() {
                    let _ = pipeline.handle_input(raw);
                }
                black_box(pipeline.tick(frames as f64 / 30.0));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
