use crate::{BoundingBox, Detection, Estimate, MeasurementSource, Point, Result};
use serde::Serialize;
use std::io::Write;

/// The per-frame record handed to downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackReport {
    /// Sequence number of the processed frame.
    pub sequence: u64,
    /// Measurement fed to the filter.
    pub measurement: Point,
    pub source: MeasurementSource,
    /// Filtered position.
    pub position: Point,
    /// Filtered velocity per processed frame.
    pub velocity: Point,
    /// Confidence of the tracked detection, absent on dropouts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Pixel box of the tracked detection, absent on dropouts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub frames_since_detection: usize,
}

impl TrackReport {
    pub fn new(sequence: u64, estimate: &Estimate, detection: Option<&Detection>) -> TrackReport {
        TrackReport {
            sequence,
            measurement: estimate.measurement,
            source: estimate.source,
            position: estimate.position,
            velocity: estimate.velocity,
            confidence: detection.map(|detection| detection.confidence()),
            bbox: detection.map(|detection| *detection.bbox()),
            frames_since_detection: estimate.frames_since_detection,
        }
    }
}

/// Receives one report per processed frame.
pub trait Reporter {
    fn report(&mut self, report: &TrackReport) -> Result<()>;
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&mut self, report: &TrackReport) -> Result<()> {
        (**self).report(report)
    }
}

/// Writes each report as one line of JSON.
#[derive(Debug)]
pub struct JsonLinesReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesReporter<W> {
    pub fn new(writer: W) -> JsonLinesReporter<W> {
        JsonLinesReporter { writer }
    }

    /// Returns the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Reporter for JsonLinesReporter<W> {
    fn report(&mut self, report: &TrackReport) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Emits each report as an `info` log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, report: &TrackReport) -> Result<()> {
        match (report.bbox, report.confidence) {
            (Some(bbox), Some(confidence)) => log::info!(
                "frame {} target: box=({:.0},{:.0},{:.0},{:.0}) raw=({:.3},{:.3}) filtered=({:.3},{:.3}) vel=({:.3},{:.3}) conf={:.3}",
                report.sequence,
                bbox.left(),
                bbox.top(),
                bbox.right(),
                bbox.bottom(),
                report.measurement.x,
                report.measurement.y,
                report.position.x,
                report.position.y,
                report.velocity.x,
                report.velocity.y,
                confidence
            ),
            _ => log::info!(
                "frame {} no detection[{}]: raw=({:.3},{:.3}) filtered=({:.3},{:.3}) vel=({:.3},{:.3})",
                report.sequence,
                report.frames_since_detection,
                report.measurement.x,
                report.measurement.y,
                report.position.x,
                report.position.y,
                report.velocity.x,
                report.velocity.y
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn estimate(source: MeasurementSource) -> Estimate {
        Estimate {
            measurement: Point::new(0.5, -0.25),
            source,
            position: Point::new(0.25, -0.125),
            velocity: Point::new(0.0625, 0.0),
            frames_since_detection: 0,
        }
    }

    #[test]
    fn report_from_detection() {
        let detection = Detection::new(None, BoundingBox::new(1.0, 2.0, 3.0, 4.0), 0.75, 0, None);
        let report = TrackReport::new(9, &estimate(MeasurementSource::Detected), Some(&detection));

        assert_eq!(report.sequence, 9);
        assert_eq!(report.confidence, Some(0.75));
        assert_eq!(report.bbox, Some(BoundingBox::new(1.0, 2.0, 3.0, 4.0)));
    }

    #[test]
    fn json_lines() {
        let mut reporter = JsonLinesReporter::new(Vec::new());
        reporter
            .report(&TrackReport::new(1, &estimate(MeasurementSource::Held), None))
            .unwrap();
        reporter
            .report(&TrackReport::new(2, &estimate(MeasurementSource::Centered), None))
            .unwrap();

        let output = String::from_utf8(reporter.into_inner()).unwrap();
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sequence"], 1);
        assert_eq!(first["source"], "held");
        assert_eq!(first["measurement"]["x"], 0.5);
        assert_eq!(first["position"]["y"], -0.125);
        assert_eq!(first["velocity"]["x"], 0.0625);
        assert!(first.get("confidence").is_none());
        assert!(first.get("bbox").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["source"], "centered");
    }

    #[test]
    fn json_lines_with_detection() {
        let detection = Detection::new(None, BoundingBox::new(1.0, 2.0, 3.0, 4.0), 0.5, 0, None);
        let mut reporter = JsonLinesReporter::new(Vec::new());
        reporter
            .report(&TrackReport::new(
                3,
                &estimate(MeasurementSource::Detected),
                Some(&detection),
            ))
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
        assert_eq!(value["confidence"], 0.5);
        assert_eq!(value["bbox"]["left"], 1.0);
        assert_eq!(value["bbox"]["bottom"], 4.0);
    }
}
