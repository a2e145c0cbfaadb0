//! Per-frame obstacle detection dispatch.
//!
//! Every submitted frame gets its own worker thread so ingestion never
//! waits on detection. Contour detection and template matching each own a
//! single busy slot: at most one run of each is in flight, and a frame
//! that finds a slot taken is dropped for that detector, not queued. A
//! slow template search therefore never holds back contour detection.

use super::guard::{BusyFlag, BusyGuard};
use super::DetectionSink;
use crate::capture::Frame;
use crate::obstacle::{
    annotate_frame, BoundingBox, ContourObstacleDetector, DebugImage, ObstacleReport,
    TemplateMatcher, TemplateReport,
};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Result of offering a frame to one detector.
#[derive(Debug)]
pub enum Dispatch {
    /// A worker is running for this frame.
    Spawned(JoinHandle<()>),
    /// Another run was in flight; the frame was dropped.
    Busy,
    /// The worker thread could not be started; the frame was dropped.
    Failed,
    /// The detector is not enabled.
    Disabled,
}

impl Dispatch {
    /// Whether a worker thread was started.
    pub fn is_spawned(&self) -> bool {
        matches!(self, Dispatch::Spawned(_))
    }

    /// Whether no worker is left running for this frame.
    pub fn is_finished(&self) -> bool {
        match self {
            Dispatch::Spawned(handle) => handle.is_finished(),
            _ => true,
        }
    }

    /// Waits for the worker, if any. Returns `false` if it panicked.
    pub fn join(self) -> bool {
        match self {
            Dispatch::Spawned(handle) => handle.join().is_ok(),
            _ => true,
        }
    }
}

/// What happened to one frame on each detector.
#[derive(Debug)]
pub struct Submission {
    /// Contour detection dispatch.
    pub contour: Dispatch,
    /// Template matching dispatch.
    pub template: Dispatch,
}

impl Submission {
    /// Whether both workers have exited.
    pub fn is_finished(&self) -> bool {
        self.contour.is_finished() && self.template.is_finished()
    }

    /// Waits for both workers. Returns `false` if either panicked.
    pub fn join(self) -> bool {
        let contour = self.contour.join();
        let template = self.template.join();
        contour && template
    }
}

/// Live counters, shared with worker threads.
#[derive(Debug, Default)]
pub struct WorkerStats {
    submitted: AtomicU64,
    dropped_busy: AtomicU64,
    spawn_failures: AtomicU64,
    processed: AtomicU64,
    detections: AtomicU64,
    template_dropped_busy: AtomicU64,
    template_processed: AtomicU64,
    template_matches: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerCounts {
    /// Frames offered to the worker.
    pub submitted: u64,
    /// Frames the contour detector skipped because it was busy.
    pub dropped_busy: u64,
    /// Worker threads that failed to start, over both detectors.
    pub spawn_failures: u64,
    /// Frames the contour detector finished.
    pub processed: u64,
    /// Cone detections published.
    pub detections: u64,
    /// Frames the template matcher skipped because it was busy.
    pub template_dropped_busy: u64,
    /// Frames the template matcher finished.
    pub template_processed: u64,
    /// Template searches that cleared the acceptance threshold.
    pub template_matches: u64,
}

impl WorkerStats {
    /// Reads every counter.
    pub fn snapshot(&self) -> WorkerCounts {
        WorkerCounts {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            template_dropped_busy: self.template_dropped_busy.load(Ordering::Relaxed),
            template_processed: self.template_processed.load(Ordering::Relaxed),
            template_matches: self.template_matches.load(Ordering::Relaxed),
        }
    }
}

/// Runs the obstacle detectors on frames.
pub struct ObstacleWorker {
    contour_busy: BusyFlag,
    template_busy: BusyFlag,
    detector: Arc<ContourObstacleDetector>,
    matcher: Option<Arc<TemplateMatcher>>,
    debug_images: bool,
    latest_template_box: Arc<Mutex<Option<BoundingBox>>>,
    sink: Arc<dyn DetectionSink>,
    stats: Arc<WorkerStats>,
}

impl ObstacleWorker {
    /// Creates a worker. Template matching runs only when `matcher` is set.
    pub fn new(
        detector: ContourObstacleDetector,
        matcher: Option<TemplateMatcher>,
        sink: Arc<dyn DetectionSink>,
    ) -> Self {
        Self {
            contour_busy: BusyFlag::new(),
            template_busy: BusyFlag::new(),
            detector: Arc::new(detector),
            matcher: matcher.map(Arc::new),
            debug_images: false,
            latest_template_box: Arc::new(Mutex::new(None)),
            sink,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Publishes an annotated copy of every contour-processed frame.
    ///
    /// The overlay carries that frame's cone boxes plus the most recent
    /// accepted template box.
    pub fn with_debug_images(mut self, enabled: bool) -> Self {
        self.debug_images = enabled;
        self
    }

    /// Whether a contour detection is in flight.
    pub fn is_busy(&self) -> bool {
        self.contour_busy.is_busy()
    }

    /// Whether a template search is in flight.
    pub fn is_template_busy(&self) -> bool {
        self.template_busy.is_busy()
    }

    /// Current counters.
    pub fn stats(&self) -> WorkerCounts {
        self.stats.snapshot()
    }

    /// Offers `frame` to both detectors; each runs unless already busy.
    pub fn submit(&self, frame: Frame) -> Submission {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let template = match &self.matcher {
            Some(matcher) => self.submit_template(Arc::clone(matcher), frame.clone()),
            None => Dispatch::Disabled,
        };
        let contour = self.submit_contour(frame);
        Submission { contour, template }
    }

    fn submit_contour(&self, frame: Frame) -> Dispatch {
        let Some(guard) = self.contour_busy.try_acquire() else {
            self.stats.dropped_busy.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(sequence = frame.sequence(), "Contour detector busy; frame dropped");
            return Dispatch::Busy;
        };

        let detector = Arc::clone(&self.detector);
        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        let latest_template_box = self
            .debug_images
            .then(|| Arc::clone(&self.latest_template_box));

        self.spawn("obstacle-contour", guard, move || {
            let report = detect_obstacles(&detector, &frame);
            sink.publish_obstacles(&report);

            if let Some(latest) = latest_template_box {
                let template_box = *latest.lock().unwrap_or_else(PoisonError::into_inner);
                sink.publish_debug_image(&DebugImage {
                    sequence: frame.sequence(),
                    frame_timestamp: frame.timestamp(),
                    image: annotate_frame(frame.image(), &report.detections, template_box.as_ref()),
                });
            }

            stats.processed.fetch_add(1, Ordering::Relaxed);
            stats
                .detections
                .fetch_add(report.detections.len() as u64, Ordering::Relaxed);
        })
    }

    fn submit_template(&self, matcher: Arc<TemplateMatcher>, frame: Frame) -> Dispatch {
        let Some(guard) = self.template_busy.try_acquire() else {
            self.stats
                .template_dropped_busy
                .fetch_add(1, Ordering::Relaxed);
            tracing::trace!(sequence = frame.sequence(), "Template matcher busy; frame dropped");
            return Dispatch::Busy;
        };

        let sink = Arc::clone(&self.sink);
        let stats = Arc::clone(&self.stats);
        let latest = Arc::clone(&self.latest_template_box);

        self.spawn("obstacle-template", guard, move || {
            let report = match_template(&matcher, &frame);
            *latest.lock().unwrap_or_else(PoisonError::into_inner) =
                report.template_match.bounding_box;
            sink.publish_template(&report);

            stats.template_processed.fetch_add(1, Ordering::Relaxed);
            if report.template_match.is_match() {
                stats.template_matches.fetch_add(1, Ordering::Relaxed);
            }
        })
    }

    /// Runs `job` on a named thread that holds `guard` until it finishes.
    fn spawn<F>(&self, name: &str, guard: BusyGuard, job: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        let spawned = thread::Builder::new().name(name.into()).spawn(move || {
            let _guard = guard;
            job();
        });

        match spawned {
            Ok(handle) => Dispatch::Spawned(handle),
            Err(e) => {
                self.stats.spawn_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker = name, error = %e, "Failed to start worker; frame dropped");
                Dispatch::Failed
            }
        }
    }
}

/// Runs the contour detector on one frame and assembles the report.
pub fn detect_obstacles(detector: &ContourObstacleDetector, frame: &Frame) -> ObstacleReport {
    let tic = Instant::now();
    let detections = detector.detect(frame.image());

    tracing::debug!(
        sequence = frame.sequence(),
        detections = detections.len(),
        elapsed_ms = tic.elapsed().as_millis() as u64,
        "Obstacle frame processed"
    );

    ObstacleReport {
        frame_timestamp: frame.timestamp(),
        sequence: frame.sequence(),
        detections,
        published_at: Utc::now(),
    }
}

/// Runs the template matcher on one frame and assembles the report.
pub fn match_template(matcher: &TemplateMatcher, frame: &Frame) -> TemplateReport {
    let tic = Instant::now();
    let template_match = matcher.match_image(frame.image());
    let processing_time = tic.elapsed();

    tracing::debug!(
        sequence = frame.sequence(),
        matched = template_match.is_match(),
        elapsed_ms = processing_time.as_millis() as u64,
        "Template search finished"
    );

    TemplateReport {
        frame_timestamp: frame.timestamp(),
        sequence: frame.sequence(),
        template_match,
        processing_time,
        published_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blink::{CaptureDebugInfo, LedDetectionReport};
    use crate::obstacle::{CONTOUR_BOX_COLOR, TEMPLATE_BOX_COLOR};
    use crate::pipeline::MemorySink;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    /// Sink that lingers in `publish_obstacles` and tracks overlap.
    #[derive(Default)]
    struct SlowSink {
        active: AtomicUsize,
        max_active: AtomicUsize,
        reports: Mutex<Vec<u64>>,
    }

    impl DetectionSink for SlowSink {
        fn publish_leds(&self, _report: &LedDetectionReport) {}

        fn publish_obstacles(&self, report: &ObstacleReport) {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            self.reports.lock().unwrap().push(report.sequence);
            self.active.fetch_sub(1, Ordering::SeqCst);
        }

        fn publish_template(&self, _report: &TemplateReport) {}

        fn publish_debug_image(&self, _image: &DebugImage) {}

        fn publish_debug(&self, _info: &CaptureDebugInfo) {}
    }

    /// Holds every template publication until the test lets it through.
    struct GatedTemplateSink {
        inner: MemorySink,
        gate: Mutex<Receiver<()>>,
    }

    impl DetectionSink for GatedTemplateSink {
        fn publish_leds(&self, report: &LedDetectionReport) {
            self.inner.publish_leds(report);
        }

        fn publish_obstacles(&self, report: &ObstacleReport) {
            self.inner.publish_obstacles(report);
        }

        fn publish_template(&self, report: &TemplateReport) {
            self.gate.lock().unwrap().recv().unwrap();
            self.inner.publish_template(report);
        }

        fn publish_debug_image(&self, image: &DebugImage) {
            self.inner.publish_debug_image(image);
        }

        fn publish_debug(&self, info: &CaptureDebugInfo) {
            self.inner.publish_debug(info);
        }
    }

    fn cone_frame(sequence: u64) -> Frame {
        let mut image = RgbImage::new(640, 480);
        draw_filled_rect_mut(&mut image, Rect::at(100, 200).of_size(40, 40), Rgb([255, 128, 0]));
        Frame::new(image, Duration::from_millis(sequence * 33), sequence)
    }

    fn cone_matcher() -> TemplateMatcher {
        TemplateMatcher::new(&RgbImage::from_pixel(10, 10, Rgb([255, 128, 0])), 2, 0.5).unwrap()
    }

    #[test]
    fn test_single_frame_published() {
        let sink = Arc::new(MemorySink::new());
        let worker = ObstacleWorker::new(ContourObstacleDetector::default(), None, sink.clone());

        let submission = worker.submit(cone_frame(7));
        assert!(submission.contour.is_spawned());
        assert!(matches!(submission.template, Dispatch::Disabled));
        assert!(submission.join());

        let reports = sink.obstacles();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sequence, 7);
        assert_eq!(reports[0].detections.len(), 1);
        assert!(sink.templates().is_empty());
        assert!(sink.debug_images().is_empty());
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_burst_drops_while_busy() {
        let sink = Arc::new(SlowSink::default());
        let worker = ObstacleWorker::new(ContourObstacleDetector::default(), None, sink.clone());

        let n = 20;
        let submissions: Vec<_> = (0..n).map(|i| worker.submit(cone_frame(i))).collect();
        for submission in submissions {
            assert!(submission.join());
        }

        let completed = sink.reports.lock().unwrap().len() as u64;
        assert!(completed >= 1 && completed <= n);
        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);

        let stats = worker.stats();
        assert_eq!(stats.submitted, n);
        assert_eq!(stats.processed, completed);
        assert_eq!(stats.processed + stats.dropped_busy + stats.spawn_failures, n);
        assert!(!worker.is_busy());
    }

    #[test]
    fn test_template_search_does_not_block_contours() {
        let (release, gate) = mpsc::channel();
        let sink = Arc::new(GatedTemplateSink {
            inner: MemorySink::new(),
            gate: Mutex::new(gate),
        });
        let worker = ObstacleWorker::new(
            ContourObstacleDetector::default(),
            Some(cone_matcher()),
            sink.clone(),
        );

        let first = worker.submit(cone_frame(0));
        assert!(first.template.is_spawned());
        assert!(first.contour.join());

        // The first search is parked in the sink; contour frames keep flowing.
        for sequence in 1..4 {
            let next = worker.submit(cone_frame(sequence));
            assert!(matches!(next.template, Dispatch::Busy));
            assert!(next.contour.join());
        }
        assert!(worker.is_template_busy());
        assert_eq!(sink.inner.obstacles().len(), 4);
        assert!(sink.inner.templates().is_empty());

        release.send(()).unwrap();
        assert!(first.template.join());

        let templates = sink.inner.templates();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].sequence, 0);
        assert!(templates[0].template_match.is_match());

        let stats = worker.stats();
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.template_processed, 1);
        assert_eq!(stats.template_dropped_busy, 3);
        assert_eq!(stats.template_matches, 1);
        assert!(!worker.is_template_busy());
    }

    #[test]
    fn test_debug_image_outlines_detections() {
        let sink = Arc::new(MemorySink::new());
        let worker = ObstacleWorker::new(
            ContourObstacleDetector::default(),
            Some(cone_matcher()),
            sink.clone(),
        )
        .with_debug_images(true);

        // Let the template result land before the annotated frame is drawn.
        let first = worker.submit(cone_frame(1));
        assert!(first.join());
        assert!(worker.submit(cone_frame(2)).join());

        let images = sink.debug_images();
        assert_eq!(images.len(), 2);
        let annotated = &images[1];
        assert_eq!(annotated.sequence, 2);

        // Cone box (100, 200, 40, 40) in green.
        assert_eq!(*annotated.image.get_pixel(100, 220), CONTOUR_BOX_COLOR);
        assert_eq!(*annotated.image.get_pixel(139, 220), CONTOUR_BOX_COLOR);
        assert_eq!(*annotated.image.get_pixel(120, 239), CONTOUR_BOX_COLOR);
        // The 10x10 template matched inside the cone; its outline is blue.
        let bbox = sink.templates()[0].template_match.bounding_box.unwrap();
        assert!(bbox.x >= 100 && bbox.y >= 200);
        assert_eq!(*annotated.image.get_pixel(bbox.x + 5, bbox.y + 3), TEMPLATE_BOX_COLOR);
        assert_eq!(*annotated.image.get_pixel(bbox.x + 3, bbox.y + 5), TEMPLATE_BOX_COLOR);
    }

    #[test]
    fn test_template_report_contents() {
        let report = match_template(&cone_matcher(), &cone_frame(1));
        assert_eq!(report.sequence, 1);
        assert!(report.template_match.is_match());
        assert!(report.template_match.pose.is_finite());
    }
}
