use crate::{ClassLabels, Detection, Error, Frame, Result, COCO_CLASSES};

/// The object detection collaborator.
///
/// Model loading is the implementation's constructor; a loaded detector is handed to the tracking
/// loop, which calls [`Detector::detect`] once per processed frame and [`Detector::release`] once
/// at shutdown.
pub trait Detector: ClassLabels + Send {
    /// Detector identifier used in logs.
    fn name(&self) -> &str;

    /// Run inference on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Release model resources.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One scripted inference outcome.
#[derive(Debug, Clone)]
enum Outcome {
    Detections(Vec<Detection>),
    Failure(String),
}

/// A detector that replays a fixed script of outcomes, one per call.
///
/// Used by tests and by the demo mode of the CLI. Once the script is exhausted it either starts
/// over (`looping`) or reports no detections.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    script: Vec<Outcome>,
    cursor: usize,
    looping: bool,
    fail_release: bool,
    released: bool,
}

impl ScriptedDetector {
    /// Returns a new, empty ScriptedDetector
    pub fn new() -> ScriptedDetector {
        ScriptedDetector::default()
    }

    /// Append a call that returns `detections`
    pub fn then_detect(&mut self, detections: Vec<Detection>) -> &mut Self {
        self.script.push(Outcome::Detections(detections));
        self
    }

    /// Append `count` calls that return no detections
    pub fn then_nothing(&mut self, count: usize) -> &mut Self {
        self.script
            .extend((0..count).map(|_| Outcome::Detections(vec![])));
        self
    }

    /// Append a call that fails
    pub fn then_fail<S: Into<String>>(&mut self, reason: S) -> &mut Self {
        self.script.push(Outcome::Failure(reason.into()));
        self
    }

    /// Restart the script when it runs out
    pub fn looping(&mut self, looping: bool) -> &mut Self {
        self.looping = looping;
        self
    }

    /// Make `release` fail
    pub fn fail_release(&mut self, fail_release: bool) -> &mut Self {
        self.fail_release = fail_release;
        self
    }

    /// Returns the number of `detect` calls made so far
    pub fn calls(&self) -> usize {
        self.cursor
    }

    /// Returns whether `release` completed
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl ClassLabels for ScriptedDetector {
    fn class_name(&self, class_id: usize) -> Option<&str> {
        COCO_CLASSES.get(class_id).copied()
    }
}

impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.released {
            return Err(Error::inference("detector already released"));
        }

        let index = self.cursor;
        self.cursor += 1;

        let step = match (self.script.is_empty(), self.looping) {
            (true, _) => None,
            (false, true) => self.script.get(index % self.script.len()),
            (false, false) => self.script.get(index),
        };

        match step {
            Some(Outcome::Detections(detections)) => Ok(detections.clone()),
            Some(Outcome::Failure(reason)) => Err(Error::inference(reason.clone())),
            None => Ok(vec![]),
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.fail_release {
            return Err(Error::release("scripted release failure"));
        }
        self.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn frame() -> Frame {
        Frame::new(0, 2, 2, PixelFormat::Gray8, PixelBuffer::from_vec(vec![0; 4])).unwrap()
    }

    fn person() -> Detection {
        Detection::new(None, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.9, 0, None)
    }

    #[test]
    fn replays_script() {
        let mut detector = ScriptedDetector::new();
        detector
            .then_detect(vec![person()])
            .then_nothing(1)
            .then_fail("boom");

        assert_eq!(detector.detect(&frame()).unwrap().len(), 1);
        assert!(detector.detect(&frame()).unwrap().is_empty());
        assert!(matches!(detector.detect(&frame()), Err(Error::Inference(_))));
        assert!(detector.detect(&frame()).unwrap().is_empty());
        assert_eq!(detector.calls(), 4);
    }

    #[test]
    fn loops_script() {
        let mut detector = ScriptedDetector::new();
        detector.then_detect(vec![person()]).then_nothing(1).looping(true);

        let counts = (0..4)
            .map(|_| detector.detect(&frame()).unwrap().len())
            .collect::<Vec<_>>();
        itertools::assert_equal(counts, [1, 0, 1, 0]);
    }

    #[test]
    fn release() {
        let mut detector = ScriptedDetector::new();
        detector.release().unwrap();
        assert!(detector.is_released());
        assert!(detector.detect(&frame()).is_err());

        let mut detector = ScriptedDetector::new();
        detector.fail_release(true);
        assert!(matches!(detector.release(), Err(Error::Release(_))));
    }
}
