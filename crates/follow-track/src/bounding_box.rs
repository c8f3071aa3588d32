use serde::Serialize;

/// BoundingBox represents the pixel extent of a detection.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BoundingBox {
    /// Left edge of the bounding box (i.e. min-x)
    left: f32,
    /// Top edge of the bounding box (i.e. min-y, pixel rows grow downwards)
    top: f32,
    /// Right edge of the bounding box (i.e. max-x)
    right: f32,
    /// Bottom edge of the bounding box (i.e. max-y)
    bottom: f32,
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left
            && self.top == other.top
            && self.right == other.right
            && self.bottom == other.bottom
    }
}

impl BoundingBox {
    /// Returns a new BoundingBox
    ///
    /// # Parameters
    ///
    /// * `left`: Bounding box left edge.
    /// * `top`: Bounding box top edge.
    /// * `right`: Bounding box right edge.
    /// * `bottom`: Bounding box bottom edge.
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> BoundingBox {
        BoundingBox {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Returns the left edge of the bounding box
    pub fn left(&self) -> f32 {
        self.left
    }

    /// Returns the top edge of the bounding box
    pub fn top(&self) -> f32 {
        self.top
    }

    /// Returns the right edge of the bounding box
    pub fn right(&self) -> f32 {
        self.right
    }

    /// Returns the bottom edge of the bounding box
    pub fn bottom(&self) -> f32 {
        self.bottom
    }

    /// Returns the width of the bounding box
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Returns the height of the bounding box
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Returns the area of the bounding box.
    ///
    /// Degenerate boxes (right <= left or bottom <= top) yield a non-positive area.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Returns the center point `(x, y)` of the bounding box in pixels.
    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Returns whether the edges are ordered, i.e. `left < right` and `top < bottom`.
    pub fn is_valid(&self) -> bool {
        self.left < self.right && self.top < self.bottom
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn area_and_center() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 300.0);
        assert_eq!(bbox.area(), 20000.0);
        assert_eq!(bbox.center(), (150.0, 200.0));
        assert!(bbox.is_valid());
    }

    #[test]
    fn degenerate() {
        let bbox = BoundingBox::new(10.0, 10.0, 5.0, 20.0);
        assert!(!bbox.is_valid());
        assert!(bbox.area() < 0.0);
    }
}
