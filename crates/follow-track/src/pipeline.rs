use crate::{
    DetectionSelector, Detector, Frame, FrameSlot, Latest, Reporter, Result, TrackReport, Tracker,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// What the tracking loop does while there is no new frame to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStrategy {
    /// Busy-poll the slot.
    Spin,
    /// Yield the time slice before polling again.
    Yield,
    /// Sleep before polling again.
    Sleep(Duration),
}

impl IdleStrategy {
    fn idle(&self) {
        match self {
            IdleStrategy::Spin => std::hint::spin_loop(),
            IdleStrategy::Yield => thread::yield_now(),
            IdleStrategy::Sleep(duration) => thread::sleep(*duration),
        }
    }
}

/// Counters kept by the tracking loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Frames that went through a tracker update.
    pub processed: u64,
    /// Processed frames with a selected detection.
    pub detections: u64,
    pub inference_failures: u64,
    pub tracker_failures: u64,
    pub report_failures: u64,
    /// Polls that found no frame to process.
    pub empty_polls: u64,
}

/// The tracking loop: detect, select, track and report, once per iteration.
///
/// The loop owns the detector, the selector, the tracker and the reporter, so none of them needs
/// synchronization. The only state shared with the producer thread is the [`FrameSlot`].
pub struct Pipeline<D: Detector, R: Reporter> {
    slot: Arc<FrameSlot>,
    detector: D,
    selector: DetectionSelector,
    tracker: Tracker,
    reporter: R,
    idle: IdleStrategy,
    max_frames: Option<u64>,
    /// Skip a frame already processed instead of running the detector on it again.
    skip_stale: bool,
    stats: PipelineStats,
}

impl<D: Detector, R: Reporter> Pipeline<D, R> {
    /// Returns a new Pipeline
    ///
    /// # Parameters
    ///
    /// * `slot`: The slot the producer publishes into.
    /// * `detector`: A loaded detector.
    /// * `selector`: Picks the detection to track.
    /// * `tracker`: The estimator, usually uninitialized.
    /// * `reporter`: Receives one report per processed frame.
    pub fn new(
        slot: Arc<FrameSlot>,
        detector: D,
        selector: DetectionSelector,
        tracker: Tracker,
        reporter: R,
    ) -> Pipeline<D, R> {
        Pipeline {
            slot,
            detector,
            selector,
            tracker,
            reporter,
            idle: IdleStrategy::Spin,
            max_frames: None,
            skip_stale: false,
            stats: PipelineStats::default(),
        }
    }

    /// Set the idle strategy
    pub fn with_idle(&mut self, idle: IdleStrategy) -> &mut Self {
        self.idle = idle;
        self
    }

    /// Stop `run` after `max_frames` processed frames
    pub fn with_max_frames(&mut self, max_frames: Option<u64>) -> &mut Self {
        self.max_frames = max_frames;
        self
    }

    /// Set whether a frame already processed is skipped
    pub fn with_skip_stale(&mut self, skip_stale: bool) -> &mut Self {
        self.skip_stale = skip_stale;
        self
    }

    /// Returns the counters
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Returns the tracker
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Returns the detector
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Returns the mutable detector
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Returns the reporter
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Process a single frame.
    ///
    /// A failed inference abandons the frame: the tracker is not updated and nothing is reported,
    /// which also leaves the dropout counter where it was. `Ok(None)` signals that case.
    pub fn process(&mut self, frame: &Frame) -> Result<Option<TrackReport>> {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                log::warn!(
                    "frame {}: {} skipped: {err}",
                    frame.sequence(),
                    self.detector.name()
                );
                self.stats.inference_failures += 1;
                return Ok(None);
            }
        };
        log::trace!("frame {}: {} raw detections", frame.sequence(), detections.len());

        let selected = self.selector.select_primary(detections, &self.detector);

        let estimate = self
            .tracker
            .update(selected.as_ref(), frame.width(), frame.height())
            .map_err(|err| {
                self.stats.tracker_failures += 1;
                err
            })?;

        self.stats.processed += 1;
        if selected.is_some() {
            self.stats.detections += 1;
        }

        let report = TrackReport::new(frame.sequence(), &estimate, selected.as_ref());
        self.reporter.report(&report).map_err(|err| {
            self.stats.report_failures += 1;
            err
        })?;

        Ok(Some(report))
    }

    fn reached_limit(&self) -> bool {
        self.max_frames
            .map_or(false, |max_frames| self.stats.processed >= max_frames)
    }

    /// Run until `running` is cleared or the frame limit is reached.
    ///
    /// A closed slot ends the loop once its last frame has been processed.
    /// Errors raised while processing a frame are logged and never end the loop.
    pub fn run(&mut self, running: &AtomicBool) -> PipelineStats {
        log::info!(
            "tracking loop started: target={} detector={}",
            self.selector.target_class(),
            self.detector.name()
        );

        while running.load(Ordering::Acquire) && !self.reached_limit() {
            let frame = match self.slot.take(self.skip_stale) {
                Latest::Frame(frame) => frame,
                Latest::Pending => {
                    self.stats.empty_polls += 1;
                    self.idle.idle();
                    continue;
                }
                Latest::Drained => {
                    log::info!("frame slot drained");
                    break;
                }
            };

            if let Err(err) = self.process(&frame) {
                log::warn!("frame {} dropped: {err}", frame.sequence());
            }
        }

        log::info!(
            "tracking loop stopped: processed={} detections={} inference_failures={}",
            self.stats.processed,
            self.stats.detections,
            self.stats.inference_failures
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    const PERSON: usize = 0;
    const CAR: usize = 2;

    #[derive(Default)]
    struct Collect(Vec<TrackReport>);

    impl Reporter for Collect {
        fn report(&mut self, report: &TrackReport) -> Result<()> {
            self.0.push(report.clone());
            Ok(())
        }
    }

    struct Broken;

    impl Reporter for Broken {
        fn report(&mut self, _report: &TrackReport) -> Result<()> {
            Err(Error::Report("consumer went away".to_string()))
        }
    }

    fn frame(sequence: u64) -> Frame {
        let buffer = PixelBuffer::from_vec(vec![0; PixelFormat::Gray8.frame_size(640, 480)]);
        Frame::new(sequence, 640, 480, PixelFormat::Gray8, buffer).unwrap()
    }

    fn detection(class_id: usize, bbox: BoundingBox) -> Detection {
        Detection::new(None, bbox, 0.9, class_id, None)
    }

    /// A 40x40 person box centered on the normalized point (0.3, -0.2).
    fn subject() -> Detection {
        detection(PERSON, BoundingBox::new(396.0, 268.0, 436.0, 308.0))
    }

    fn pipeline(detector: ScriptedDetector) -> Pipeline<ScriptedDetector, Collect> {
        Pipeline::new(
            Arc::new(FrameSlot::new()),
            detector,
            DetectionSelector::default(),
            Tracker::default(),
            Collect::default(),
        )
    }

    #[test]
    fn tracks_largest_person() {
        let mut detector = ScriptedDetector::new();
        detector.then_detect(vec![
            detection(CAR, BoundingBox::new(0.0, 0.0, 640.0, 480.0)),
            detection(PERSON, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            subject(),
        ]);
        let mut pipeline = pipeline(detector);

        let report = pipeline.process(&frame(0)).unwrap().unwrap();

        assert_eq!(report.source, MeasurementSource::Detected);
        assert_eq!(report.bbox, Some(*subject().bbox()));
        assert_eq!(report.confidence, Some(0.9));
        assert_eq!(pipeline.stats().detections, 1);
        assert_eq!(pipeline.reporter().0.len(), 1);
    }

    #[test]
    fn other_classes_count_as_dropout() {
        let mut detector = ScriptedDetector::new();
        detector
            .then_detect(vec![subject()])
            .then_detect(vec![detection(CAR, BoundingBox::new(0.0, 0.0, 50.0, 50.0))]);
        let mut pipeline = pipeline(detector);

        pipeline.process(&frame(0)).unwrap();
        let report = pipeline.process(&frame(1)).unwrap().unwrap();

        assert_eq!(report.source, MeasurementSource::Held);
        assert_eq!(report.frames_since_detection, 1);
        assert_eq!(report.confidence, None);
    }

    #[test]
    fn inference_failure_skips_tracker() {
        let mut detector = ScriptedDetector::new();
        detector
            .then_detect(vec![subject()])
            .then_nothing(2)
            .then_fail("npu timeout")
            .then_fail("npu timeout")
            .then_nothing(1);
        let mut pipeline = pipeline(detector);

        for sequence in 0..3 {
            pipeline.process(&frame(sequence)).unwrap();
        }
        let state_before = pipeline.tracker().state().map(|(mean, _)| mean.clone());
        assert_eq!(pipeline.tracker().frames_since_detection(), 2);

        assert!(pipeline.process(&frame(3)).unwrap().is_none());
        assert!(pipeline.process(&frame(4)).unwrap().is_none());

        assert_eq!(pipeline.tracker().frames_since_detection(), 2);
        assert_eq!(
            pipeline.tracker().state().map(|(mean, _)| mean.clone()),
            state_before
        );
        assert_eq!(pipeline.stats().inference_failures, 2);
        assert_eq!(pipeline.reporter().0.len(), 3);

        let report = pipeline.process(&frame(5)).unwrap().unwrap();
        assert_eq!(report.frames_since_detection, 3);
        assert_eq!(pipeline.stats().processed, 4);
    }

    #[test]
    fn report_failure_is_per_frame() {
        let mut detector = ScriptedDetector::new();
        detector.then_detect(vec![subject()]);
        let mut pipeline = Pipeline::new(
            Arc::new(FrameSlot::new()),
            detector,
            DetectionSelector::default(),
            Tracker::default(),
            Broken,
        );

        assert!(matches!(pipeline.process(&frame(0)), Err(Error::Report(_))));
        assert_eq!(pipeline.stats().report_failures, 1);
        assert!(pipeline.tracker().is_initialized());
    }

    #[test]
    fn run_stops_at_frame_limit() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(frame(0));

        let mut detector = ScriptedDetector::new();
        detector.then_detect(vec![subject()]).then_nothing(1).looping(true);

        let mut pipeline = Pipeline::new(
            slot,
            detector,
            DetectionSelector::default(),
            Tracker::default(),
            Collect::default(),
        );
        pipeline.with_max_frames(Some(6));

        let stats = pipeline.run(&AtomicBool::new(true));

        assert_eq!(stats.processed, 6);
        assert_eq!(stats.detections, 3);
        assert_eq!(pipeline.reporter().0.len(), 6);
    }

    #[test]
    fn run_skips_stale_frames() {
        let slot = Arc::new(FrameSlot::new());
        let running = Arc::new(AtomicBool::new(true));

        let mut pipeline = Pipeline::new(
            slot.clone(),
            ScriptedDetector::new(),
            DetectionSelector::default(),
            Tracker::default(),
            Collect::default(),
        );
        pipeline
            .with_skip_stale(true)
            .with_idle(IdleStrategy::Sleep(std::time::Duration::from_millis(1)))
            .with_max_frames(Some(3));

        let publisher = {
            let slot = slot.clone();
            let running = running.clone();
            std::thread::spawn(move || {
                for sequence in 0..3 {
                    slot.publish(frame(sequence));
                    std::thread::sleep(std::time::Duration::from_millis(50));
                }
                // watchdog so a missed frame fails the assertions instead of hanging the test
                std::thread::sleep(std::time::Duration::from_secs(2));
                running.store(false, std::sync::atomic::Ordering::Release);
            })
        };

        let stats = pipeline.run(&running);
        publisher.join().unwrap();

        assert_eq!(stats.processed, 3);
        itertools::assert_equal(
            pipeline.reporter().0.iter().map(|report| report.sequence),
            [0u64, 1, 2],
        );
    }

    #[test]
    fn run_ends_once_closed_slot_is_drained() {
        let slot = Arc::new(FrameSlot::new());
        slot.publish(frame(7));
        slot.close();

        let mut detector = ScriptedDetector::new();
        detector.then_detect(vec![subject()]);
        let mut pipeline = Pipeline::new(
            slot,
            detector,
            DetectionSelector::default(),
            Tracker::default(),
            Collect::default(),
        );

        // returns without the run flag being cleared
        let stats = pipeline.run(&AtomicBool::new(true));

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.detections, 1);
        assert_eq!(pipeline.reporter().0[0].sequence, 7);
    }

    #[test]
    fn run_returns_when_flag_cleared() {
        let mut pipeline = pipeline(ScriptedDetector::new());
        let stats = pipeline.run(&AtomicBool::new(false));
        assert_eq!(stats, PipelineStats::default());
    }
}
