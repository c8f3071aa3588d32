use criterion::{black_box, criterion_group, criterion_main, Criterion};
use follow_track::{BoundingBox, CocoLabels, Detection, DetectionSelector, Tracker};
use rand::prelude::*;
use rand_distr::Normal;
use rand_pcg::Pcg64;

/// A person walking across the frame with jittered boxes, plus some clutter of other classes.
fn frames(count: usize) -> Vec<Vec<Detection>> {
    let mut rng = Pcg64::seed_from_u64(42);
    let jitter = Normal::new(0.0f32, 3.0).unwrap();

    (0..count)
        .map(|i| {
            let mut detections = Vec::new();

            // every tenth frame the subject is occluded
            if i % 10 != 0 {
                let left = (i as f32 * 2.0) % 560.0 + jitter.sample(&mut rng);
                let top = 120.0 + jitter.sample(&mut rng);
                detections.push(Detection::new(
                    None,
                    BoundingBox::new(left, top, left + 80.0, top + 200.0),
                    0.8,
                    0,
                    None,
                ));
            }

            for _ in 0..rng.gen_range(0..6) {
                let left = rng.gen_range(0.0..600.0);
                let top = rng.gen_range(0.0..440.0);
                detections.push(Detection::new(
                    None,
                    BoundingBox::new(left, top, left + 40.0, top + 40.0),
                    0.5,
                    rng.gen_range(0..80),
                    None,
                ));
            }

            detections
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    let frames = frames(1000);
    let selector = DetectionSelector::default();

    c.bench_function("select and track 1000 frames", |b| {
        b.iter(|| {
            let mut tracker = Tracker::default();
            for detections in frames.iter() {
                let selected = selector.select_primary(detections.clone(), &CocoLabels);
                black_box(tracker.update(selected.as_ref(), 640, 480).unwrap());
            }
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
