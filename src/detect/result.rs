/// Axis-aligned box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Build from a center point and extent, as most detector heads emit them.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0.0);
        let iy = (self.y_max.min(other.y_max) - self.y_min.max(other.y_min)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp to `[0, width] x [0, height]`.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self::new(
            self.x_min.clamp(0.0, w),
            self.y_min.clamp(0.0, h),
            self.x_max.clamp(0.0, w),
            self.y_max.clamp(0.0, h),
        )
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(
            self.x_min * sx,
            self.y_min * sy,
            self.x_max * sx,
            self.y_max * sy,
        )
    }
}

/// One model output for a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Class label as reported by the model (e.g. "dog", "Sea Bird").
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub region: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, region: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            region,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn clamps_to_frame() {
        let b = BoundingBox::new(-5.0, 3.0, 700.0, 900.0).clamped(640, 480);
        assert_eq!(b, BoundingBox::new(0.0, 3.0, 640.0, 480.0));
    }
}
