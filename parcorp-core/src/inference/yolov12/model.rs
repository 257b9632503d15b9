use std::path::{Path, PathBuf};

use ndarray::{ArrayBase, Dim, OwnedRepr};

use crate::{
    consts::{
        BACKGROUND_FILL_VALUE, CXYWH_OFFSET, LABEL_PROBA_SIZE, NMS_IOU_THRESHOLD, OUTPUT_SIZE,
        PROBA_THRESHOLD, REQUIRED_HEIGHT, REQUIRED_WIDTH, Y_TOLERANCE_THRESHOLD,
    },
    inference::model::Model,
};

/// YOLOv12 trained on DocLayNet, loaded from an ONNX file at runtime.
pub struct Yolov12 {
    model_path: PathBuf,
    config: Yolov12Config,
}

pub type Yolov12Input = ArrayBase<OwnedRepr<f32>, Dim<[usize; 4]>>;
pub type Yolov12Output = ArrayBase<OwnedRepr<f32>, Dim<[usize; 3]>>;

#[derive(Debug, Clone)]
pub struct Yolov12Config {
    pub required_width: usize,
    pub required_height: usize,
    pub batch_size: usize,
    pub input_channels: usize,
    pub background_fill_value: f32,
    pub output_size: [usize; 3],
    pub cxywh_size: usize,
    /// End of the class probability rows, i.e. `cxywh_size + label count`.
    pub label_proba_size: usize,
    pub proba_threshold: f32,
    pub iou_threshold: f32,
    pub y_tolerance_threshold: f32,
}

impl Default for Yolov12Config {
    fn default() -> Self {
        Self {
            required_width: REQUIRED_WIDTH as usize,
            required_height: REQUIRED_HEIGHT as usize,
            batch_size: 1,
            input_channels: 3,
            background_fill_value: BACKGROUND_FILL_VALUE,
            output_size: OUTPUT_SIZE,
            cxywh_size: CXYWH_OFFSET,
            label_proba_size: LABEL_PROBA_SIZE,
            proba_threshold: PROBA_THRESHOLD,
            iou_threshold: NMS_IOU_THRESHOLD,
            y_tolerance_threshold: Y_TOLERANCE_THRESHOLD,
        }
    }
}

impl Yolov12 {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self::with_config(model_path, Yolov12Config::default())
    }

    pub fn with_config<P: AsRef<Path>>(model_path: P, config: Yolov12Config) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            config,
        }
    }
}

impl Model for Yolov12 {
    type Input = Yolov12Input;

    type Output = Yolov12Output;
    type Config = Yolov12Config;

    const INPUT_NAME: &'static str = "images";

    const OUTPUT_NAME: &'static str = "output0";

    const MODEL_NAME: &'static str = "yolov12s-doclaynet";

    fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
