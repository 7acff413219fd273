use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use fitts_core::{SessionPhase, SessionView, Target};
use fitts_render::{SkiaRenderer, load_font};
use fitts_timing::HighPrecisionTimer;
use std::time::Duration;

const WIDTH: u32 = 1920;
const HEIGHT: u32 = 1080;

fn harness() -> (SkiaRenderer, Vec<u8>, HighPrecisionTimer) {
    let font = load_font(None).ok().flatten();
    let r = SkiaRenderer::new(WIDTH, HEIGHT, font).unwrap();
    let fb = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    (r, fb, HighPrecisionTimer::new())
}

fn experiment_view(pointer: (i32, i32)) -> SessionView {
    SessionView {
        phase: SessionPhase::Experiment,
        pointer,
        target: Some(Target {
            x: 1260,
            y: 540,
            size: 50,
            on_left_side: false,
        }),
        progress: Some((57, 120)),
        total_targets: 120,
        practice_targets: 3,
        ..SessionView::default()
    }
}

pub fn bench_experiment_frame(c: &mut Criterion) {
    let mut g = c.benchmark_group("render_frame");
    g.sample_size(40).measurement_time(Duration::from_secs(8));

    g.bench_function("first_frame", |b| {
        b.iter_batched(
            harness,
            |(mut r, mut fb, t)| {
                let stats = r.render_frame(&experiment_view((960, 540)), &mut fb, &t);
                black_box(stats.ok());
            },
            BatchSize::LargeInput,
        )
    });

    // steady state: pointer sweeping toward the target, only dirty regions copied
    g.bench_function("pointer_sweep", |b| {
        let (mut r, mut fb, t) = harness();
        let mut x = 660;
        b.iter(|| {
            x = if x >= 1260 { 660 } else { x + 12 };
            let stats = r.render_frame(&experiment_view((x, 540)), &mut fb, &t);
            black_box(stats.ok());
        })
    });

    g.finish();
}

criterion_group!(benches, bench_experiment_frame);
criterion_main!(benches);
