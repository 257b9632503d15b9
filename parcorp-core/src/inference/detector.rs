use image::DynamicImage;

use crate::{error::CorpusError, layout::element::Detection};

/// A layout detector run on one half-page image at a time.
///
/// Implementations must return detections in a stable order for a given
/// image: `bbox_id` is the position in that order and the matcher breaks
/// ties by it.
pub trait Detector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>, CorpusError>;
}
