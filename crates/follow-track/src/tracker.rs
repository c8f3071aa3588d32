use crate::{Detection, Error, KalmanFilter, Result};
use ndarray::*;
use serde::Serialize;

/// Default number of consecutive missed frames before the measurement decays to the origin.
pub const DEFAULT_DROPOUT_THRESHOLD: usize = 100;

/// A point in normalized image coordinates: `[-1, 1]` across the frame, `y` positive upwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Point {
        Point { x, y }
    }

    /// Returns the euclidean distance to `other`
    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn to_array(self) -> Array1<f32> {
        arr1(&[self.x, self.y])
    }
}

/// Normalize a pixel position against the frame's half dimensions.
///
/// The vertical axis is inverted so that up is positive.
pub fn normalize_center(x: f32, y: f32, frame_width: u32, frame_height: u32) -> Result<Point> {
    if frame_width == 0 || frame_height == 0 {
        return Err(Error::InvalidFrame(format!(
            "cannot normalize against a {frame_width}x{frame_height} frame"
        )));
    }

    let half_width = frame_width as f32 / 2.0;
    let half_height = frame_height as f32 / 2.0;

    Ok(Point::new(
        (x - half_width) / half_width,
        -((y - half_height) / half_height),
    ))
}

/// Lifecycle of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackPhase {
    /// No measurement has been processed yet.
    Uninitialized,
    /// The filter holds a state and is updated every processed frame.
    Tracking,
}

/// Where the measurement fed to the filter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSource {
    /// The center of the selected detection.
    Detected,
    /// The last detected position, held through a short dropout.
    Held,
    /// The origin, used once a dropout outlasts the threshold.
    Centered,
}

/// Output of a single tracker update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    /// The measurement fed to the correction step.
    pub measurement: Point,
    pub source: MeasurementSource,
    /// Posterior position.
    pub position: Point,
    /// Posterior velocity, in normalized units per processed frame.
    pub velocity: Point,
    pub frames_since_detection: usize,
}

/// Single-target constant velocity tracker with a two tier dropout policy.
///
/// Every call to [`Tracker::update`] runs one predict and one correct step. Frames without a
/// detection feed the last detected position for up to `dropout_threshold` frames, then the
/// origin, which pulls the estimate back to the frame center once the subject is gone.
///
/// # Examples
///
/// ```
/// use follow_track::{BoundingBox, Detection, MeasurementSource, Tracker};
///
/// let mut tracker = Tracker::default();
///
/// let detection = Detection::new(None, BoundingBox::new(300.0, 220.0, 340.0, 260.0), 0.9, 0, None);
/// let estimate = tracker.update(Some(&detection), 640, 480).unwrap();
/// assert_eq!(estimate.source, MeasurementSource::Detected);
///
/// let estimate = tracker.update(None, 640, 480).unwrap();
/// assert_eq!(estimate.source, MeasurementSource::Held);
/// assert_eq!(estimate.frames_since_detection, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Tracker {
    /// The Kalman filter model.
    kf: KalmanFilter,
    /// Consecutive missed frames after which the measurement becomes the origin.
    dropout_threshold: usize,
    /// Mean vector `[x, y, vx, vy]`, `None` until the first update.
    mean: Option<Array1<f32>>,
    /// Covariance matrix of the state.
    covariance: Array2<f32>,
    /// Number of processed frames since the last selected detection.
    frames_since_detection: usize,
    /// The last detected position.
    last_known: Point,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(DEFAULT_DROPOUT_THRESHOLD)
    }
}

impl Tracker {
    /// Returns a new, uninitialized Tracker
    ///
    /// # Arguments
    ///
    /// * `dropout_threshold`: Consecutive missed frames that still hold the last detected position. Default `100`.
    pub fn new(dropout_threshold: usize) -> Tracker {
        Tracker::with_filter(KalmanFilter::default(), dropout_threshold)
    }

    /// Returns a new Tracker using a custom filter model
    pub fn with_filter(kf: KalmanFilter, dropout_threshold: usize) -> Tracker {
        Tracker {
            kf,
            dropout_threshold,
            mean: None,
            covariance: Array2::eye(4),
            frames_since_detection: 0,
            last_known: Point::ORIGIN,
        }
    }

    /// Returns the lifecycle phase
    pub fn phase(&self) -> TrackPhase {
        match self.mean {
            Some(_) => TrackPhase::Tracking,
            None => TrackPhase::Uninitialized,
        }
    }

    /// Returns whether the filter has been seeded
    pub fn is_initialized(&self) -> bool {
        self.mean.is_some()
    }

    /// Returns the number of processed frames since the last detection
    pub fn frames_since_detection(&self) -> usize {
        self.frames_since_detection
    }

    /// Returns the last detected position
    pub fn last_known(&self) -> Point {
        self.last_known
    }

    /// Returns the dropout threshold
    pub fn dropout_threshold(&self) -> usize {
        self.dropout_threshold
    }

    /// Returns the current mean and covariance, `None` before the first update
    pub fn state(&self) -> Option<(&Array1<f32>, &Array2<f32>)> {
        self.mean.as_ref().map(|mean| (mean, &self.covariance))
    }

    /// Forget all state and return to `Uninitialized`.
    pub fn reset(&mut self) {
        self.mean = None;
        self.covariance = Array2::eye(4);
        self.frames_since_detection = 0;
        self.last_known = Point::ORIGIN;
    }

    /// Choose the measurement for this frame and update the dropout bookkeeping.
    fn measure(
        &mut self,
        detection: Option<&Detection>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<(Point, MeasurementSource)> {
        match detection {
            Some(detection) => {
                let (center_x, center_y) = detection.bbox().center();
                let point = normalize_center(center_x, center_y, frame_width, frame_height)?;
                self.frames_since_detection = 0;
                self.last_known = point;
                Ok((point, MeasurementSource::Detected))
            }
            None => {
                self.frames_since_detection += 1;
                if self.frames_since_detection > self.dropout_threshold {
                    Ok((Point::ORIGIN, MeasurementSource::Centered))
                } else {
                    Ok((self.last_known, MeasurementSource::Held))
                }
            }
        }
    }

    /// Run one predict/correct cycle.
    ///
    /// # Parameters
    ///
    /// * `detection`: The detection selected for this frame, `None` on a dropout.
    /// * `frame_width`: Width in pixels of the frame the detection belongs to.
    /// * `frame_height`: Height in pixels of the frame the detection belongs to.
    pub fn update(
        &mut self,
        detection: Option<&Detection>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Estimate> {
        let (measurement, source) = self.measure(detection, frame_width, frame_height)?;
        let measurement_vec = measurement.to_array();

        let (mean, covariance) = match self.mean.take() {
            Some(mean) => (mean, std::mem::replace(&mut self.covariance, Array2::eye(4))),
            None => self.kf.initiate(&measurement_vec),
        };

        let (mean, covariance) = self.kf.predict(&mean, &covariance);
        let (mean, covariance) = match self.kf.update(&mean, &covariance, &measurement_vec) {
            Ok(posterior) => posterior,
            Err(err) => {
                // keep the predicted state so the next frame can still correct it
                self.mean = Some(mean);
                self.covariance = covariance;
                return Err(err);
            }
        };

        let estimate = Estimate {
            measurement,
            source,
            position: Point::new(mean[0], mean[1]),
            velocity: Point::new(mean[2], mean[3]),
            frames_since_detection: self.frames_since_detection,
        };

        self.mean = Some(mean);
        self.covariance = covariance;

        Ok(estimate)
    }
}
