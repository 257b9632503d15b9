use glam::Vec2;

/// A 2D axis-aligned bounding box in image pixel coordinates.
///
/// `min` is the top-left corner and `max` the bottom-right corner, i.e. the
/// `(x1, y1, x2, y2)` form produced by layout detectors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bbox {
    /// The top-left corner.
    pub min: Vec2,
    /// The bottom-right corner.
    pub max: Vec2,
}

/// Integer pixel bounds of a box, truncated toward zero like a slice index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBounds {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl PixelBounds {
    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    /// Zero or negative extent on either axis.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

impl Bbox {
    /// Creates a new bounding box from minimum and maximum points.
    ///
    /// # Example
    /// ```
    /// use glam::Vec2;
    /// use parcorp_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 5.0));
    /// ```
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box from raw `x1, y1, x2, y2` coordinates.
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(Vec2::new(x1, y1), Vec2::new(x2, y2))
    }

    /// Creates a new bounding box from a center point and size vector.
    ///
    /// This constructor is used with YOLO-style detection outputs where
    /// bounding boxes are represented as (center_x, center_y, width, height).
    ///
    /// # Example
    /// ```
    /// use glam::Vec2;
    /// use parcorp_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::from_center_size(Vec2::new(100.0, 200.0), Vec2::new(50.0, 80.0));
    /// assert_eq!(bbox.min, Vec2::new(75.0, 160.0));
    /// ```
    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half_size = size / 2.0;
        Self {
            min: center - half_size,
            max: center + half_size,
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Calculates the area of the bounding box.
    pub fn area(&self) -> f32 {
        let length = self.max - self.min;

        length.x * length.y
    }

    /// Calculates the center point of the bounding box.
    ///
    /// # Example
    /// ```
    /// use glam::Vec2;
    /// use parcorp_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::new(Vec2::new(0.0, 0.0), Vec2::new(4.0, 2.0));
    /// assert_eq!(bbox.center(), Vec2::new(2.0, 1.0));
    /// ```
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) / 2.0
    }

    /// Euclidean distance between the centers of two boxes.
    ///
    /// # Example
    /// ```
    /// use parcorp_core::analysis::bbox::Bbox;
    /// let a = Bbox::from_xyxy(0.0, 0.0, 10.0, 10.0);
    /// let b = Bbox::from_xyxy(100.0, 0.0, 110.0, 10.0);
    /// assert_eq!(a.center_distance(&b), 100.0);
    /// ```
    pub fn center_distance(&self, other: &Self) -> f32 {
        self.center().distance(other.center())
    }

    /// Calculates the area of intersection between this bounding box and another.
    ///
    /// Returns 0.0 when the boxes do not overlap or only touch on an edge.
    pub fn intersection(&self, other: &Self) -> f32 {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);

        if max.x > min.x && max.y > min.y {
            (max.x - min.x) * (max.y - min.y)
        } else {
            0.
        }
    }

    /// Overlap ratio using the smaller of the two areas as denominator.
    ///
    /// More lenient than IoU when a small box sits inside a large one, which is
    /// the common duplicate pattern in layout detector output.
    pub fn overlap_ratio(&self, other: &Self) -> f32 {
        let intersection_area = self.intersection(other);
        let min_area = self.area().min(other.area());

        if min_area > 0.0 {
            intersection_area / min_area
        } else {
            0.0
        }
    }

    /// Smallest box enclosing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Clamps the bounding box coordinates to stay within the specified bounds.
    pub fn clamp(&self, min_bounds: Vec2, max_bounds: Vec2) -> Self {
        Self {
            min: self.min.max(min_bounds),
            max: self.max.min(max_bounds),
        }
    }

    /// Scales both corners by `factor`, e.g. to map model-input coordinates
    /// back onto the source image.
    pub fn scale(&self, factor: f32) -> Self {
        Self {
            min: self.min * factor,
            max: self.max * factor,
        }
    }

    /// Translates the box by `offset`.
    pub fn translate(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Integer pixel bounds, truncating each coordinate toward zero.
    pub fn pixel_bounds(&self) -> PixelBounds {
        PixelBounds {
            x1: self.min.x as i64,
            y1: self.min.y as i64,
            x2: self.max.x as i64,
            y2: self.max.y as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_center() {
        // Rectangle starting at origin
        let bbox = Bbox::from_xyxy(0.0, 0.0, 2.0, 3.0);
        assert_eq!(bbox.center(), Vec2::new(1.0, 1.5));

        // Offset rectangle
        let offset_bbox = Bbox::new(Vec2::new(10.0, 20.0), Vec2::new(14.0, 26.0));
        assert_eq!(offset_bbox.center(), Vec2::new(12.0, 23.0));

        // Negative coordinates
        let negative = Bbox::new(Vec2::new(-4.0, -2.0), Vec2::new(0.0, 2.0));
        assert_eq!(negative.center(), Vec2::new(-2.0, 0.0));
    }

    #[test]
    fn test_bbox_center_distance() {
        // Horizontal offset only
        let left = Bbox::from_xyxy(0.0, 0.0, 10.0, 10.0);
        let right = Bbox::from_xyxy(100.0, 0.0, 110.0, 10.0);
        assert_eq!(left.center_distance(&right), 100.0);

        // 3-4-5 triangle between centers
        let a = Bbox::from_xyxy(0.0, 0.0, 2.0, 2.0);
        let b = Bbox::from_xyxy(3.0, 4.0, 5.0, 6.0);
        assert_eq!(a.center_distance(&b), 5.0);

        // Symmetric and zero for identical boxes
        assert_eq!(b.center_distance(&a), 5.0);
        assert_eq!(a.center_distance(&a), 0.0);

        // Boxes of different sizes sharing a center
        let small = Bbox::from_xyxy(4.0, 4.0, 6.0, 6.0);
        let large = Bbox::from_xyxy(0.0, 0.0, 10.0, 10.0);
        assert_eq!(small.center_distance(&large), 0.0);
    }

    #[test]
    fn test_bbox_from_center_size() {
        let bbox = Bbox::from_center_size(Vec2::new(100.0, 200.0), Vec2::new(50.0, 80.0));
        assert_eq!(bbox.min, Vec2::new(75.0, 160.0));
        assert_eq!(bbox.max, Vec2::new(125.0, 240.0));
        assert_eq!(bbox.area(), 4000.0);

        // Zero size collapses to a point
        let point = Bbox::from_center_size(Vec2::new(5.0, 7.0), Vec2::ZERO);
        assert_eq!(point.min, point.max);
        assert_eq!(point.area(), 0.0);
    }

    #[test]
    fn test_bbox_overlap_ratio_and_union() {
        // Small box fully inside a large one
        let large = Bbox::from_xyxy(0.0, 0.0, 100.0, 100.0);
        let small = Bbox::from_xyxy(10.0, 10.0, 30.0, 30.0);
        assert_eq!(large.overlap_ratio(&small), 1.0);
        assert_eq!(small.overlap_ratio(&large), 1.0);

        // Partial overlap: 400 / min(3600, 1600)
        let a = Bbox::from_xyxy(0.0, 0.0, 60.0, 60.0);
        let b = Bbox::from_xyxy(40.0, 40.0, 80.0, 80.0);
        assert!((a.overlap_ratio(&b) - 0.25).abs() < 1e-3);

        // Edge touching boxes do not overlap
        let left = Bbox::from_xyxy(0.0, 0.0, 2.0, 2.0);
        let right = Bbox::from_xyxy(2.0, 0.0, 4.0, 2.0);
        assert_eq!(left.intersection(&right), 0.0);
        assert_eq!(left.overlap_ratio(&right), 0.0);

        let union = a.union(&b);
        assert_eq!(union.min, Vec2::ZERO);
        assert_eq!(union.max, Vec2::new(80.0, 80.0));
    }

    #[test]
    fn test_bbox_clamp_scale_translate() {
        let oversized = Bbox::from_xyxy(-10.0, -5.0, 1030.0, 1030.0);
        let clamped = oversized.clamp(Vec2::ZERO, Vec2::new(1023.0, 1023.0));
        assert_eq!(clamped.min, Vec2::ZERO);
        assert_eq!(clamped.max, Vec2::new(1023.0, 1023.0));

        let scaled = Bbox::from_xyxy(10.0, 20.0, 30.0, 40.0).scale(0.5);
        assert_eq!(scaled, Bbox::from_xyxy(5.0, 10.0, 15.0, 20.0));

        let moved = scaled.translate(Vec2::new(100.0, 0.0));
        assert_eq!(moved, Bbox::from_xyxy(105.0, 10.0, 115.0, 20.0));
    }

    #[test]
    fn test_bbox_pixel_bounds() {
        // Fractions are truncated
        let bounds = Bbox::from_xyxy(1.9, 2.2, 10.7, 20.5).pixel_bounds();
        assert_eq!(
            bounds,
            PixelBounds {
                x1: 1,
                y1: 2,
                x2: 10,
                y2: 20
            }
        );
        assert_eq!(bounds.width(), 9);
        assert_eq!(bounds.height(), 18);
        assert!(!bounds.is_degenerate());

        // Sub-pixel wide box collapses to zero width
        let thin = Bbox::from_xyxy(5.2, 0.0, 5.8, 10.0).pixel_bounds();
        assert!(thin.is_degenerate());

        // Inverted box from malformed detector output
        let inverted = Bbox::from_xyxy(20.0, 20.0, 10.0, 30.0).pixel_bounds();
        assert!(inverted.width() < 0);
        assert!(inverted.is_degenerate());
    }
}
