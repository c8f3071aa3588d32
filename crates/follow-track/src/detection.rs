use crate::BoundingBox;
use uuid::Uuid;

/// Detection represents a bounding box detection in a single image.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Unique detection identifier
    id: Uuid,
    /// Bounding box in left, top, right, bottom format.
    bbox: BoundingBox,
    /// Detection confidence score.
    confidence: f32,
    /// Class identifier as emitted by the detector.
    class_id: usize,
    /// Optional class name
    class_name: Option<String>,
}

impl Detection {
    /// Returns a new Detection
    ///
    /// # Parameters
    ///
    /// * `id`: An optional identifier, a random one is generated when `None`.
    /// * `bbox`: A bounding box object.
    /// * `confidence`: Detection confidence score.
    /// * `class_id`: The class identifier.
    /// * `class_name`: An optional class name.
    pub fn new(
        id: Option<Uuid>,
        bbox: BoundingBox,
        confidence: f32,
        class_id: usize,
        class_name: Option<String>,
    ) -> Detection {
        Detection {
            id: id.unwrap_or_else(Uuid::new_v4),
            bbox,
            confidence,
            class_id,
            class_name,
        }
    }

    /// Returns the unique id of the detection
    pub fn id(&self) -> &Uuid {
        &self.id
    }

    /// Returns a BoundingBox of the detection co-ordinates
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Returns the confidence of the detection
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the class identifier of the detection
    pub fn class_id(&self) -> usize {
        self.class_id
    }

    /// Returns the class name of the detection
    pub fn class_name(&self) -> Option<&str> {
        self.class_name.as_deref()
    }
}
