// benches/detectors.rs -- Per-frame obstacle detector benchmarks.
//
//   cargo bench
//
// Frames come from the synthetic camera so the numbers are comparable
// across machines without a device attached.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};

use std::sync::Arc;

use vehicle_perception::capture::{Camera, CameraConfig, Frame, MockCamera};
use vehicle_perception::obstacle::{hsv, ContourObstacleDetector, TemplateMatcher};
use vehicle_perception::pipeline::{LogSink, ObstacleWorker};

fn mock_capture(width: u32, height: u32) -> Frame {
    let mut camera = MockCamera::new();
    camera
        .open(&CameraConfig::with_dimensions(width, height))
        .expect("mock camera opens");
    camera.capture().expect("mock camera captures")
}

fn mock_frame(width: u32, height: u32) -> RgbImage {
    mock_capture(width, height).image().clone()
}

fn bench_hsv_threshold(c: &mut Criterion) {
    let image = mock_frame(640, 480);
    c.bench_function("hsv_in_range_640x480", |b| {
        b.iter(|| hsv::in_range(black_box(&image), &hsv::CONE_HSV_RANGE))
    });
}

fn bench_contour_detector(c: &mut Criterion) {
    let detector = ContourObstacleDetector::default();

    let mut group = c.benchmark_group("contour_detect");
    for &(w, h) in &[(320u32, 240u32), (640, 480)] {
        let image = mock_frame(w, h);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{w}x{h}")),
            &image,
            |b, image| b.iter(|| detector.detect(black_box(image))),
        );
    }
    group.finish();
}

fn bench_template_matcher(c: &mut Criterion) {
    let template = RgbImage::from_pixel(20, 20, Rgb([255, 128, 0]));
    let image = mock_frame(320, 240);

    let mut group = c.benchmark_group("template_match_320x240");
    group.sample_size(10);
    for levels in [1usize, 3, 5] {
        let matcher = TemplateMatcher::new(&template, levels, 0.5).expect("template is non-empty");
        group.bench_with_input(BenchmarkId::new("levels", levels), &matcher, |b, matcher| {
            b.iter(|| matcher.match_image(black_box(&image)))
        });
    }
    group.finish();
}

// Contour latency through the worker with a five-level template search
// occupying its own slot. Should track `contour_detect/640x480` plus thread
// spawn cost, not the template search time.
fn bench_contour_with_template_in_flight(c: &mut Criterion) {
    let template = RgbImage::from_pixel(20, 20, Rgb([255, 128, 0]));
    let matcher = TemplateMatcher::new(&template, 5, 0.5).expect("template is non-empty");
    let worker = ObstacleWorker::new(
        ContourObstacleDetector::default(),
        Some(matcher),
        Arc::new(LogSink),
    );
    let frame = mock_capture(640, 480);

    c.bench_function("contour_dispatch_640x480_template_busy", |b| {
        b.iter(|| worker.submit(black_box(frame.clone())).contour.join())
    });
}

criterion_group!(
    benches,
    bench_hsv_threshold,
    bench_contour_detector,
    bench_template_matcher,
    bench_contour_with_template_in_flight
);
criterion_main!(benches);
