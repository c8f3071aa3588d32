#[macro_use]
extern crate lazy_static;

mod bounding_box;
mod buffer;
pub mod config;
mod detection;
mod detector;
mod error;
mod frame;
mod frame_slot;
mod kalman_filter;
mod labels;
mod pipeline;
mod producer;
mod reporter;
mod selector;
mod session;
mod source;
mod tracker;

pub use bounding_box::BoundingBox;
pub use buffer::{BufferProvider, HeapProvider, PixelBuffer, PoolProvider};
pub use config::FollowConfig;
pub use detection::Detection;
pub use detector::{Detector, ScriptedDetector};
pub use error::{Error, Result};
pub use frame::{Frame, PixelFormat};
pub use frame_slot::{FrameSlot, Latest};
pub use kalman_filter::KalmanFilter;
pub use labels::{ClassLabels, CocoLabels, COCO_CLASSES};
pub use pipeline::{IdleStrategy, Pipeline, PipelineStats};
pub use producer::{FrameProducer, ProducerStats};
pub use reporter::{JsonLinesReporter, LogReporter, Reporter, TrackReport};
pub use selector::DetectionSelector;
pub use session::{run_session, SessionSummary};
pub use source::{CapturedImage, FrameSource, SyntheticSource};
pub use tracker::{normalize_center, Estimate, MeasurementSource, Point, TrackPhase, Tracker};
