use follow_track::{
    BoundingBox, ClassLabels, Detection, Detector, Error, Frame, PixelFormat, Result, COCO_CLASSES,
};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;
use tract_ndarray::Array;
use tract_onnx::prelude::*;

static MODEL_WIDTH: u32 = 640;
static MODEL_HEIGHT: u32 = 640;

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Thresholds fed to the non maximum suppression embedded in the model.
#[derive(Debug, Clone, Copy)]
pub struct NmsParameters {
    pub max_output_boxes_per_class: i64,
    pub iou_threshold: f32,
    pub score_threshold: f32,
}

impl Default for NmsParameters {
    fn default() -> Self {
        NmsParameters {
            max_output_boxes_per_class: 50,
            iou_threshold: 0.5,
            score_threshold: 0.5,
        }
    }
}

/// Scales a frame into the square model input without distorting it, padding the short side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    frame_width: u32,
    frame_height: u32,
    scaled_width: u32,
    scaled_height: u32,
    pad_x: u32,
    pad_y: u32,
    scale: f32,
}

impl Letterbox {
    pub fn new(frame_width: u32, frame_height: u32, model_width: u32, model_height: u32) -> Self {
        let scale = f32::min(
            model_width as f32 / frame_width as f32,
            model_height as f32 / frame_height as f32,
        );
        let scaled_width = ((frame_width as f32 * scale).round() as u32).clamp(1, model_width);
        let scaled_height = ((frame_height as f32 * scale).round() as u32).clamp(1, model_height);

        Letterbox {
            frame_width,
            frame_height,
            scaled_width,
            scaled_height,
            pad_x: (model_width - scaled_width) / 2,
            pad_y: (model_height - scaled_height) / 2,
            scale,
        }
    }

    /// Resize `image` and place it centered on a black model sized canvas
    pub fn apply(&self, image: &RgbImage, model_width: u32, model_height: u32) -> RgbImage {
        let resized = imageops::resize(
            image,
            self.scaled_width,
            self.scaled_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::new(model_width, model_height);
        imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Map a model space coordinate back onto the frame, clamped to its bounds
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.pad_x as f32) / self.scale;
        let y = (y - self.pad_y as f32) / self.scale;
        (
            x.clamp(0.0, self.frame_width as f32),
            y.clamp(0.0, self.frame_height as f32),
        )
    }
}

/// Copy the frame pixels into an RGB image regardless of the capture format.
pub fn rgb_image(frame: &Frame) -> Result<RgbImage> {
    let pixels = frame.pixels();
    let data = match frame.format() {
        PixelFormat::Rgb888 => pixels.to_vec(),
        PixelFormat::Bgr888 => pixels
            .chunks_exact(3)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect(),
        PixelFormat::Gray8 => pixels.iter().flat_map(|&v| [v, v, v]).collect(),
    };

    RgbImage::from_raw(frame.width(), frame.height(), data).ok_or_else(|| {
        Error::InvalidFrame(format!(
            "frame {} does not hold {}x{} pixels",
            frame.sequence(),
            frame.width(),
            frame.height()
        ))
    })
}

/// A YOLOv8 detector exported to ONNX with non maximum suppression in the graph.
///
/// The model takes a `1x3x640x640` image plus the three NMS thresholds and returns one row per
/// kept box: `[batch, x0, y0, x1, y1, class, confidence]` in model input coordinates.
pub struct OnnxDetector {
    model: Option<OnnxPlan>,
    max_output_boxes_per_class: Tensor,
    iou_threshold: Tensor,
    score_threshold: Tensor,
    input_scale: f32,
}

impl OnnxDetector {
    /// Load and optimize the model at `path`.
    ///
    /// # Parameters
    ///
    /// * `path`: Path of the `.onnx` file.
    /// * `nms`: Thresholds passed to every inference.
    /// * `input_scale`: Factor applied to each 0-255 pixel value before inference.
    pub fn load(path: &Path, nms: NmsParameters, input_scale: f32) -> Result<OnnxDetector> {
        let model = load_plan(path)
            .map_err(|err| Error::model_load(format!("{}: {err:#}", path.display())))?;

        let (max_output_boxes_per_class, iou_threshold, score_threshold) =
            nms_tensors(nms).map_err(|err| Error::model_load(format!("{err:#}")))?;

        log::info!(
            "OnnxDetector: loaded {} (iou_threshold={} score_threshold={})",
            path.display(),
            nms.iou_threshold,
            nms.score_threshold
        );

        Ok(OnnxDetector {
            model: Some(model),
            max_output_boxes_per_class,
            iou_threshold,
            score_threshold,
            input_scale,
        })
    }

    fn infer(
        &self,
        model: &OnnxPlan,
        letterbox: &Letterbox,
        input: &RgbImage,
    ) -> TractResult<Vec<Detection>> {
        let frame_tensor: Tensor = tract_ndarray::Array4::from_shape_fn(
            (1, 3, MODEL_HEIGHT as usize, MODEL_WIDTH as usize),
            |(_, c, y, x)| input[(x as _, y as _)][c] as f32 * self.input_scale,
        )
        .into();

        let results = model.run(tvec!(
            frame_tensor.into(),
            self.max_output_boxes_per_class.clone().into(),
            self.iou_threshold.clone().into(),
            self.score_threshold.clone().into()
        ))?;

        let output = results
            .first()
            .ok_or_else(|| anyhow::anyhow!("model produced no outputs"))?
            .to_array_view::<f32>()?;

        Ok(output
            .outer_iter()
            .filter_map(|row| row_detection(&row.iter().copied().collect::<Vec<f32>>(), letterbox))
            .collect())
    }
}

/// Decode one `[batch, x0, y0, x1, y1, class, confidence]` output row.
///
/// Rows that are too short or whose class is NaN or negative yield nothing instead of being cast
/// to class 0.
fn row_detection(row: &[f32], letterbox: &Letterbox) -> Option<Detection> {
    if row.len() < 7 || !row[5].is_finite() || row[5] < 0.0 {
        return None;
    }

    let (x0, y0) = letterbox.to_frame(row[1], row[2]);
    let (x1, y1) = letterbox.to_frame(row[3], row[4]);
    Some(Detection::new(
        None,
        BoundingBox::new(x0, y0, x1, y1),
        row[6],
        row[5] as usize,
        None,
    ))
}

fn load_plan(path: &Path) -> TractResult<OnnxPlan> {
    tract_onnx::onnx()
        .model_for_path(path)?
        .with_output_fact(0, Default::default())?
        .into_optimized()?
        .into_runnable()
}

fn nms_tensors(nms: NmsParameters) -> TractResult<(Tensor, Tensor, Tensor)> {
    let max_output_boxes_per_class: Tensor = Array::from_elem(1, nms.max_output_boxes_per_class)
        .into_shape(vec![1])?
        .into();
    let iou_threshold: Tensor = Array::from_elem(1, nms.iou_threshold)
        .into_shape(vec![1])?
        .into();
    let score_threshold: Tensor = Array::from_elem(1, nms.score_threshold)
        .into_shape(vec![1])?
        .into();
    Ok((max_output_boxes_per_class, iou_threshold, score_threshold))
}

impl ClassLabels for OnnxDetector {
    fn class_name(&self, class_id: usize) -> Option<&str> {
        COCO_CLASSES.get(class_id).copied()
    }
}

impl Detector for OnnxDetector {
    fn name(&self) -> &str {
        "yolov8-onnx"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::inference("model has been released"))?;

        let letterbox = Letterbox::new(frame.width(), frame.height(), MODEL_WIDTH, MODEL_HEIGHT);
        let input = letterbox.apply(&rgb_image(frame)?, MODEL_WIDTH, MODEL_HEIGHT);

        self.infer(model, &letterbox, &input)
            .map_err(|err| Error::inference(format!("frame {}: {err:#}", frame.sequence())))
    }

    fn release(&mut self) -> Result<()> {
        match self.model.take() {
            Some(_) => {
                log::debug!("OnnxDetector: model released");
                Ok(())
            }
            None => Err(Error::release("model was already released")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use follow_track::PixelBuffer;

    fn frame(format: PixelFormat, width: u32, height: u32, pixels: Vec<u8>) -> Frame {
        Frame::new(0, width, height, format, PixelBuffer::from_vec(pixels)).unwrap()
    }

    #[test]
    fn letterbox_pads_short_side() {
        let letterbox = Letterbox::new(640, 480, 640, 640);

        let (x, y) = letterbox.to_frame(320.0, 80.0);
        assert_approx_eq!(x, 320.0);
        assert_approx_eq!(y, 0.0);

        let (x, y) = letterbox.to_frame(640.0, 560.0);
        assert_approx_eq!(x, 640.0);
        assert_approx_eq!(y, 480.0);

        // boxes reaching into the padding are clamped to the frame
        let (x, y) = letterbox.to_frame(-10.0, 700.0);
        assert_approx_eq!(x, 0.0);
        assert_approx_eq!(y, 480.0);
    }

    #[test]
    fn letterbox_scales_large_frames() {
        let letterbox = Letterbox::new(1280, 720, 640, 640);

        let (x, y) = letterbox.to_frame(320.0, 320.0);
        assert_approx_eq!(x, 640.0);
        assert_approx_eq!(y, 360.0);

        let (x, y) = letterbox.to_frame(0.0, 140.0);
        assert_approx_eq!(x, 0.0);
        assert_approx_eq!(y, 0.0);
    }

    #[test]
    fn letterbox_canvas() {
        let image = RgbImage::from_pixel(8, 4, image::Rgb([200, 100, 50]));
        let canvas = Letterbox::new(8, 4, 8, 8).apply(&image, 8, 8);

        assert_eq!(canvas.dimensions(), (8, 8));
        assert_eq!(canvas[(0, 0)], image::Rgb([0, 0, 0]));
        assert_eq!(canvas[(4, 4)], image::Rgb([200, 100, 50]));
        assert_eq!(canvas[(4, 7)], image::Rgb([0, 0, 0]));
    }

    #[test]
    fn converts_pixel_formats() {
        let rgb = rgb_image(&frame(PixelFormat::Bgr888, 1, 1, vec![1, 2, 3])).unwrap();
        assert_eq!(rgb[(0, 0)], image::Rgb([3, 2, 1]));

        let rgb = rgb_image(&frame(PixelFormat::Gray8, 2, 1, vec![7, 9])).unwrap();
        assert_eq!(rgb[(1, 0)], image::Rgb([9, 9, 9]));

        let rgb = rgb_image(&frame(PixelFormat::Rgb888, 1, 1, vec![1, 2, 3])).unwrap();
        assert_eq!(rgb[(0, 0)], image::Rgb([1, 2, 3]));
    }

    #[test]
    fn decodes_output_rows() {
        let letterbox = Letterbox::new(640, 640, 640, 640);

        let detection =
            row_detection(&[0.0, 10.0, 20.0, 110.0, 220.0, 16.0, 0.8], &letterbox).unwrap();
        assert_eq!(detection.class_id(), 16);
        assert_eq!(detection.bbox(), &BoundingBox::new(10.0, 20.0, 110.0, 220.0));
        assert_approx_eq!(detection.confidence(), 0.8);

        // fractional class values truncate like the model's integer class index
        let detection = row_detection(&[0.0, 1.0, 1.0, 2.0, 2.0, 2.9, 0.5], &letterbox).unwrap();
        assert_eq!(detection.class_id(), 2);
    }

    #[test]
    fn skips_rows_without_usable_class() {
        let letterbox = Letterbox::new(640, 640, 640, 640);

        for class in [f32::NAN, -1.0, -0.5, f32::INFINITY, f32::NEG_INFINITY] {
            let row = [0.0, 10.0, 20.0, 110.0, 220.0, class, 0.8];
            assert!(row_detection(&row, &letterbox).is_none(), "{class}");
        }
        assert!(row_detection(&[0.0, 10.0, 20.0, 110.0, 220.0, 0.0], &letterbox).is_none());
    }

    #[test]
    fn missing_model_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxDetector::load(
            &dir.path().join("missing.onnx"),
            NmsParameters::default(),
            1.0,
        );
        assert!(matches!(result, Err(Error::ModelLoad(_))));
    }
}
