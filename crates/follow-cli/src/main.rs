mod onnx;
mod sequence;

use anyhow::{Context, Result};
use clap::Parser;
use follow_track::{
    run_session, BoundingBox, CocoLabels, Detection, FollowConfig, FrameSource, JsonLinesReporter,
    LogReporter, PixelFormat, Reporter, ScriptedDetector, SessionSummary, SyntheticSource,
    COCO_CLASSES,
};
use onnx::{NmsParameters, OnnxDetector};
use sequence::ImageSequenceSource;
use std::fs::File;
use std::io::BufWriter;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Follow a single subject through a video feed and report its smoothed, normalized position
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Glob pattern of image files to replay as the video feed. A synthetic feed is used when absent
    #[arg(short, long)]
    input: Option<String>,

    /// Restart the image sequence when it ends
    #[arg(long = "loop", default_value_t = false)]
    looping: bool,

    /// Maximum frames per second delivered by the feed
    #[arg(long)]
    fps: Option<u32>,

    /// YOLOv8 ONNX model with embedded non maximum suppression. A scripted demo detector is used when absent
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// The maximum number of output boxes per class
    #[arg(long, default_value_t = NonZeroU32::new(50).unwrap())]
    max_output_boxes_per_class: NonZeroU32,

    /// The threshold for grouping detected objects
    #[arg(long, default_value_t = 0.5)]
    iou_threshold: f32,

    /// The score threshold for detection
    #[arg(long, default_value_t = 0.5)]
    score_threshold: f32,

    /// Factor applied to pixel values before inference, e.g. 0.00392 for models expecting 0..1
    #[arg(long, default_value_t = 1.0)]
    input_scale: f32,

    /// Overrides the class to follow
    #[arg(short, long)]
    target_class: Option<String>,

    /// Overrides the number of missed frames that hold the last position
    #[arg(short, long)]
    dropout_threshold: Option<usize>,

    /// Stop after this many processed frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Write JSON lines reports to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit reports as log lines instead of JSON
    #[arg(long, default_value_t = false)]
    log_reports: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received, shutting down");
            running.store(false, Ordering::Release);
        })
        .context("failed to install the interrupt handler")?;
    }

    let source = frame_source(&args, &config);
    let reporter = reporter(&args)?;

    let summary = match &args.model {
        Some(path) => {
            let nms = NmsParameters {
                max_output_boxes_per_class: args.max_output_boxes_per_class.get() as i64,
                iou_threshold: args.iou_threshold,
                score_threshold: args.score_threshold,
            };
            run_session(
                &config,
                source,
                || OnnxDetector::load(path, nms, args.input_scale),
                reporter,
                running,
            )?
        }
        None => {
            log::warn!("no model given, running the scripted demo detector");
            let detector = demo_detector(&config);
            run_session(&config, source, || Ok(detector), reporter, running)?
        }
    };

    log_summary(&summary);
    Ok(())
}

fn load_config(args: &Args) -> Result<FollowConfig> {
    let mut config = match &args.config {
        Some(path) => FollowConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => FollowConfig::default(),
    };

    if let Some(target_class) = &args.target_class {
        config.target_class = target_class.clone();
    }
    if let Some(dropout_threshold) = args.dropout_threshold {
        config.dropout_threshold = dropout_threshold;
    }
    if args.max_frames.is_some() {
        config.pipeline.max_frames = args.max_frames;
    }
    // replayed files are not a live feed, every image should be processed once
    if args.input.is_some() {
        config.pipeline.skip_stale = true;
        config.pipeline.lockstep = true;
        if config.frame.format != PixelFormat::Rgb888 {
            log::warn!("image sequences decode to rgb888, ignoring the configured frame format");
            config.frame.format = PixelFormat::Rgb888;
        }
    }

    config.validate()?;
    Ok(config)
}

fn frame_source(args: &Args, config: &FollowConfig) -> Box<dyn FrameSource> {
    match &args.input {
        Some(pattern) => {
            let mut source = ImageSequenceSource::new(pattern.clone());
            source.with_looping(args.looping).with_fps(args.fps);
            Box::new(source)
        }
        None => {
            let mut source = SyntheticSource::new(config.frame.format);
            source.with_fps(args.fps.unwrap_or(30));
            Box::new(source)
        }
    }
}

fn reporter(args: &Args) -> Result<Box<dyn Reporter>> {
    if args.log_reports {
        return Ok(Box::new(LogReporter));
    }

    Ok(match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(JsonLinesReporter::new(BufWriter::new(file)))
        }
        None => Box::new(JsonLinesReporter::new(std::io::stdout())),
    })
}

/// A subject crossing the frame, an occlusion long enough to fall back to center, and a
/// distracting object of another class.
///
/// Targets outside the COCO table get a class id the table does not know, so the selector
/// matches them through the detection's class name.
fn demo_detector(config: &FollowConfig) -> ScriptedDetector {
    let width = config.frame.width as f32;
    let height = config.frame.height as f32;
    let target = CocoLabels::class_id(&config.target_class).unwrap_or(COCO_CLASSES.len());
    let distractor = if target == 0 { 16 } else { 0 };

    let box_width = width / 8.0;
    let box_height = height / 3.0;
    let top = (height - box_height) / 2.0;

    let mut detector = ScriptedDetector::new();
    for step in 0..120 {
        let left = (width - box_width) * step as f32 / 119.0;
        detector.then_detect(vec![
            Detection::new(
                None,
                BoundingBox::new(left, top, left + box_width, top + box_height),
                0.9,
                target,
                Some(config.target_class.clone()),
            ),
            Detection::new(
                None,
                BoundingBox::new(0.0, 0.0, width / 2.0, height / 2.0),
                0.8,
                distractor,
                None,
            ),
        ]);
    }
    detector
        .then_nothing(config.dropout_threshold + 60)
        .looping(true);
    detector
}

fn log_summary(summary: &SessionSummary) {
    log::info!(
        "processed={} detections={} inference_failures={} tracker_failures={} report_failures={}",
        summary.pipeline.processed,
        summary.pipeline.detections,
        summary.pipeline.inference_failures,
        summary.pipeline.tracker_failures,
        summary.pipeline.report_failures
    );
    if !summary.detector_released {
        log::warn!("detector resources were not released cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use follow_track::{Detector, Frame, PixelBuffer};

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("follow").chain(extra.iter().copied()))
    }

    #[test]
    fn cli_overrides_config() {
        let config = load_config(&args(&[
            "--target-class",
            "dog",
            "--dropout-threshold",
            "12",
            "--max-frames",
            "40",
        ]))
        .unwrap();

        assert_eq!(config.target_class, "dog");
        assert_eq!(config.dropout_threshold, 12);
        assert_eq!(config.pipeline.max_frames, Some(40));
        assert!(!config.pipeline.skip_stale);
        assert!(!config.pipeline.lockstep);

        let config = load_config(&args(&["--input", "frames/*.jpg"])).unwrap();
        assert!(config.pipeline.skip_stale);
        assert!(config.pipeline.lockstep);
        assert_eq!(config.frame.format, PixelFormat::Rgb888);
    }

    #[test]
    fn rejects_empty_target_class() {
        assert!(load_config(&args(&["--target-class", ""])).is_err());
    }

    #[test]
    fn demo_script_has_selectable_target() {
        let config = FollowConfig::default();
        let selector = config.selector().unwrap();
        let mut detector = demo_detector(&config);
        let frame = Frame::new(0, 2, 2, PixelFormat::Gray8, PixelBuffer::from_vec(vec![0; 4]))
            .unwrap();

        let detections = detector.detect(&frame).unwrap();
        assert_eq!(detections.len(), 2);

        let selected = selector.select_primary(detections, &detector).unwrap();
        assert_eq!(selected.class_id(), 0);
    }

    #[test]
    fn demo_script_follows_any_target_class() {
        let config = load_config(&args(&["--target-class", "drone"])).unwrap();
        let selector = config.selector().unwrap();
        let mut detector = demo_detector(&config);
        let frame = Frame::new(0, 2, 2, PixelFormat::Gray8, PixelBuffer::from_vec(vec![0; 4]))
            .unwrap();

        let detections = detector.detect(&frame).unwrap();
        let selected = selector.select_primary(detections, &detector).unwrap();
        assert_eq!(selected.class_name(), Some("drone"));
        assert_eq!(selected.confidence(), 0.9);

        // COCO targets still resolve through the label table
        let config = load_config(&args(&["--target-class", "dog"])).unwrap();
        let mut detector = demo_detector(&config);
        let detections = detector.detect(&frame).unwrap();
        let selected = config.selector().unwrap().select_primary(detections, &detector).unwrap();
        assert_eq!(selected.class_id(), 16);
    }
}
