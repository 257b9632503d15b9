use crate::analysis::{bbox::Bbox, labels::Label, labels::LabelSet};

/// One region found by the layout detector in a single half-page image.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: Bbox,
    pub label: Label,
    pub proba: f32,
    /// Position in the detector output this detection came from.
    pub bbox_id: usize,
}

impl Detection {
    pub fn new(bbox: Bbox, label: Label, proba: f32, bbox_id: usize) -> Self {
        Self {
            bbox,
            label,
            proba,
            bbox_id,
        }
    }
}

/// Drops detections whose class is in `excluded`, keeping the relative order
/// of the rest.
pub fn filter_excluded(detections: Vec<Detection>, excluded: &LabelSet) -> Vec<Detection> {
    if excluded.is_empty() {
        return detections;
    }
    detections
        .into_iter()
        .filter(|detection| !excluded.contains(detection.label))
        .collect()
}
