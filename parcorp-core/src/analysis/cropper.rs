use glam::Vec2;
use image::{DynamicImage, GenericImageView};

use crate::{
    analysis::{bbox::Bbox, labels::Label, matcher::MatchesByClass},
    layout::element::Detection,
};

/// Two aligned crops of the same layout region, one from each half.
#[derive(Debug, Clone)]
pub struct CropPair {
    pub left: DynamicImage,
    pub right: DynamicImage,
    pub label: Label,
    pub distance: f32,
}

impl CropPair {
    /// Either side has no pixels.
    pub fn is_degenerate(&self) -> bool {
        is_empty(&self.left) || is_empty(&self.right)
    }
}

fn is_empty(image: &DynamicImage) -> bool {
    image.width() == 0 || image.height() == 0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoxCropper;

impl BoxCropper {
    /// Cuts the matched regions out of both halves, in label order then match order.
    ///
    /// Pairs whose indices do not resolve against the detections are skipped.
    pub fn crop_and_pair(
        &self,
        left_image: &DynamicImage,
        right_image: &DynamicImage,
        matches: &MatchesByClass,
        left_detections: &[Detection],
        right_detections: &[Detection],
    ) -> Vec<CropPair> {
        let mut crops = Vec::new();

        for (label, pairs) in matches {
            for pair in pairs {
                let (Some(left), Some(right)) = (
                    left_detections.get(pair.left),
                    right_detections.get(pair.right),
                ) else {
                    continue;
                };

                crops.push(CropPair {
                    left: crop_region(left_image, &left.bbox),
                    right: crop_region(right_image, &right.bbox),
                    label: *label,
                    distance: pair.distance,
                });
            }
        }

        crops
    }
}

/// Crops `bbox` out of `image` at integer pixel bounds clamped to the image.
///
/// Boxes that end up with no area yield a 0x0 image.
pub fn crop_region(image: &DynamicImage, bbox: &Bbox) -> DynamicImage {
    let (width, height) = image.dimensions();
    let bounds = bbox
        .clamp(Vec2::ZERO, Vec2::new(width as f32, height as f32))
        .pixel_bounds();

    if bounds.is_degenerate() {
        return DynamicImage::new_rgb8(0, 0);
    }

    image.crop_imm(
        bounds.x1 as u32,
        bounds.y1 as u32,
        bounds.width() as u32,
        bounds.height() as u32,
    )
}
