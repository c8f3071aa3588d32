use std::collections::HashMap;

lazy_static! {
    /// The 80 COCO object categories in model output order.
    pub static ref COCO_CLASSES: Vec<&'static str> = vec![
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
        "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
        "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
        "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
        "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
        "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
        "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
        "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ];

    static ref COCO_INDEX: HashMap<&'static str, usize> = COCO_CLASSES
        .iter()
        .enumerate()
        .map(|(id, name)| (*name, id))
        .collect();
}

/// Maps detector class identifiers to class names.
pub trait ClassLabels {
    /// Returns the name of `class_id`, or `None` for identifiers the table does not know.
    fn class_name(&self, class_id: usize) -> Option<&str>;
}

/// Class lookup backed by [`COCO_CLASSES`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CocoLabels;

impl CocoLabels {
    /// Returns the identifier of a COCO class name
    pub fn class_id(name: &str) -> Option<usize> {
        COCO_INDEX.get(name).copied()
    }
}

impl ClassLabels for CocoLabels {
    fn class_name(&self, class_id: usize) -> Option<&str> {
        COCO_CLASSES.get(class_id).copied()
    }
}
