use crate::{ClassLabels, Detection, Error, Result};

/// Picks which detections of a frame are worth tracking.
///
/// Detections of other classes are dropped, as are boxes without a finite, positive area. The
/// rest are ranked by bounding box area (largest first, on the assumption that the largest
/// instance is the nearest subject) and truncated to `max_candidates`. Equal areas keep the order the detector emitted them in.
#[derive(Debug, Clone)]
pub struct DetectionSelector {
    /// Class name of the subject to follow.
    target_class: String,
    /// Maximum number of detections returned per frame.
    max_candidates: usize,
}

impl Default for DetectionSelector {
    fn default() -> Self {
        DetectionSelector {
            target_class: "person".to_string(),
            max_candidates: 1,
        }
    }
}

impl DetectionSelector {
    /// Returns a new DetectionSelector
    ///
    /// # Parameters
    ///
    /// * `target_class`: Class name to retain, e.g. `person`.
    /// * `max_candidates`: Maximum number of detections to keep. Must be at least 1.
    pub fn new<S: Into<String>>(target_class: S, max_candidates: usize) -> Result<DetectionSelector> {
        if max_candidates == 0 {
            return Err(Error::config("max_candidates must be at least 1"));
        }

        Ok(DetectionSelector {
            target_class: target_class.into(),
            max_candidates,
        })
    }

    /// Returns the target class name
    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    /// Returns the maximum number of candidates
    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    fn is_target(&self, detection: &Detection, labels: &dyn ClassLabels) -> bool {
        let bbox = detection.bbox();
        if !bbox.is_valid() || !bbox.area().is_finite() {
            return false;
        }

        labels
            .class_name(detection.class_id())
            .or_else(|| detection.class_name())
            .map_or(false, |name| name == self.target_class)
    }

    /// Filter and rank the detections of a single inference call.
    ///
    /// # Parameters
    ///
    /// * `detections`: Detections in detector emission order.
    /// * `labels`: Class lookup used to resolve `class_id` to a name.
    pub fn select(&self, detections: Vec<Detection>, labels: &dyn ClassLabels) -> Vec<Detection> {
        let mut candidates = detections
            .into_iter()
            .filter(|detection| self.is_target(detection, labels))
            .enumerate()
            .collect::<Vec<_>>();

        candidates.sort_unstable_by(|(a_index, a), (b_index, b)| {
            b.bbox()
                .area()
                .total_cmp(&a.bbox().area())
                .then(a_index.cmp(b_index))
        });
        candidates.truncate(self.max_candidates);

        candidates
            .into_iter()
            .map(|(_, detection)| detection)
            .collect()
    }

    /// Returns the single detection to track this frame, if any.
    pub fn select_primary(
        &self,
        detections: Vec<Detection>,
        labels: &dyn ClassLabels,
    ) -> Option<Detection> {
        self.select(detections, labels).into_iter().next()
    }
}
