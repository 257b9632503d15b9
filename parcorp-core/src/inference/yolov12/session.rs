use glam::Vec2;
use image::{DynamicImage, GenericImageView, imageops::FilterType};
use ndarray::prelude::*;
use ort::{
    session::{Session, builder::SessionBuilder},
    value::TensorRef,
};
use snafu::{OptionExt, ResultExt};
use tracing::debug;

use crate::{
    analysis::{bbox::Bbox, labels::Label},
    error::*,
    inference::{
        detector::Detector,
        model::{Model, OnnxSession},
        yolov12::model::Yolov12,
    },
    layout::element::Detection,
};

pub struct YoloSession<M: Model> {
    session: Session,
    model: M,
}

/// Geometry of the letterboxed model input relative to the source image.
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    /// Resized image extent inside the model input canvas.
    pub image_size: Vec2,
    /// Model input pixels per source pixel.
    pub scale: f32,
}

impl YoloSession<Yolov12> {
    pub fn new(session: SessionBuilder, model: Yolov12) -> Result<Self, CorpusError> {
        let session = session
            .commit_from_file(model.model_path())
            .context(OrtInitSnafu { stage: "commit" })?;

        Ok(Self { session, model })
    }
}

impl Detector for YoloSession<Yolov12> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<Detection>, CorpusError> {
        let detections = self.run(image)?;
        debug!(
            model = Yolov12::MODEL_NAME,
            count = detections.len(),
            "layout detection finished"
        );
        Ok(detections)
    }
}

impl OnnxSession<Yolov12> for YoloSession<Yolov12> {
    type Output = Vec<Detection>;
    type Extra = Letterbox;

    fn preprocess(
        &self,
        image: &DynamicImage,
    ) -> Result<(<Yolov12 as Model>::Input, Self::Extra), CorpusError> {
        /// Calculates optimal scaling dimensions to fit an image within target dimensions while maintaining aspect ratio.
        fn scale_wh(w0: f32, h0: f32, target_w: f32, target_h: f32) -> (f32, f32, f32) {
            let scale = f32::min(target_w / w0, target_h / h0);
            let w_new = (w0 * scale).round();
            let h_new = (h0 * scale).round();
            (scale, w_new, h_new)
        }

        let model_config = self.model.config();

        let (w0, h0) = image.dimensions();
        let (scale, w_new, h_new) = scale_wh(
            w0 as f32,
            h0 as f32,
            model_config.required_width as f32,
            model_config.required_height as f32,
        );

        let resized_img = image.resize_exact(w_new as u32, h_new as u32, FilterType::Triangle);

        // Pixels outside the resized image keep the background value
        let mut input_tensor = Array4::from_elem(
            [
                model_config.batch_size,
                model_config.input_channels,
                model_config.required_height,
                model_config.required_width,
            ],
            model_config.background_fill_value,
        );

        for (x, y, pixel) in resized_img.pixels() {
            let x = x as usize;
            let y = y as usize;
            let [r, g, b, _] = pixel.0;
            input_tensor[[0, 0, y, x]] = r as f32 / 255.0;
            input_tensor[[0, 1, y, x]] = g as f32 / 255.0;
            input_tensor[[0, 2, y, x]] = b as f32 / 255.0;
        }

        let letterbox = Letterbox {
            image_size: Vec2::new(w_new, h_new),
            scale,
        };

        Ok((input_tensor, letterbox))
    }

    fn postprocess(
        &self,
        output: <Yolov12 as Model>::Output,
        extra: Self::Extra,
    ) -> Result<Self::Output, CorpusError> {
        let mut detections = self.extra_bbox(output, &extra);

        self.nms(&mut detections);

        sort_top_down(&mut detections, self.model.config().y_tolerance_threshold);

        Ok(detections)
    }

    fn infer(
        &mut self,
        input: <Yolov12 as Model>::Input,
        input_name: &str,
        output_name: &str,
    ) -> Result<<Yolov12 as Model>::Output, CorpusError> {
        let output = self
            .session
            .run(ort::inputs![
                input_name => TensorRef::from_array_view(&input).context(TensorSnafu{stage: "input"})?
            ])
            .context(InferenceSnafu {})?;

        let tensor = output
            .get(output_name)
            .context(NotFoundOutputSnafu { output_name })?
            .try_extract_array::<f32>()
            .context(TensorSnafu { stage: "extract" })?;

        let output = tensor
            .to_shape(self.model.config().output_size)
            .context(ShapeSnafu { stage: "output" })?
            .to_owned();

        Ok(output)
    }
}

impl YoloSession<Yolov12> {
    fn extra_bbox(&self, output: <Yolov12 as Model>::Output, extra: &Letterbox) -> Vec<Detection> {
        let mut detections = Vec::new();

        // batch size is 1
        let output = output.slice(s![0, .., ..]);

        let config = self.model.config();
        for prediction in output.axis_iter(Axis(1)) {
            // center_x, center_y, width, height
            let bbox = prediction.slice(s![0..config.cxywh_size]);
            let probas = prediction.slice(s![config.cxywh_size..config.label_proba_size]);

            let Some((max_prob_idx, &proba)) = probas
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
            else {
                continue;
            };

            if proba < config.proba_threshold {
                continue;
            }

            let Some(label) = Label::from_idx(max_prob_idx) else {
                continue;
            };

            let bbox = Bbox::from_center_size(
                Vec2::new(bbox[0_usize], bbox[1_usize]),
                Vec2::new(bbox[2_usize], bbox[3_usize]),
            )
            .clamp(Vec2::ZERO, extra.image_size)
            .scale(1. / extra.scale); // back to source pixels

            detections.push(Detection::new(bbox, label, proba, detections.len()));
        }

        detections
    }

    /// Merges overlapping detections into the most confident one.
    fn nms(&self, raw: &mut Vec<Detection>) {
        if raw.len() < 2 {
            return;
        }

        // Higher confidence detections are kept first
        raw.sort_by(|a, b| b.proba.total_cmp(&a.proba).then(a.bbox_id.cmp(&b.bbox_id)));

        let mut keep_flags = vec![true; raw.len()];

        for current_index in 0..raw.len() {
            let current_bbox = raw[current_index].bbox;

            for kept_index in 0..current_index {
                if !keep_flags[kept_index] {
                    continue;
                }

                let overlap_ratio = current_bbox.overlap_ratio(&raw[kept_index].bbox);

                if overlap_ratio > self.model.config().iou_threshold {
                    raw[kept_index].bbox = raw[kept_index].bbox.union(&current_bbox);
                    keep_flags[current_index] = false;
                    break;
                }
            }
        }

        let mut flags = keep_flags.into_iter();
        raw.retain(|_| flags.next().unwrap_or(false));
    }
}

/// Orders detections top-to-bottom, then left-to-right within a line.
///
/// A line starts at the topmost remaining center and takes every detection
/// whose center lies within `y_tolerance` below it. `bbox_id` is reassigned
/// to the final position.
pub fn sort_top_down(detections: &mut Vec<Detection>, y_tolerance: f32) {
    detections.sort_by(|a, b| {
        a.bbox
            .center()
            .y
            .total_cmp(&b.bbox.center().y)
            .then(a.bbox.center().x.total_cmp(&b.bbox.center().x))
    });

    let mut ordered = Vec::with_capacity(detections.len());
    let mut line: Vec<Detection> = Vec::new();
    let mut line_top = f32::NEG_INFINITY;

    for detection in detections.drain(..) {
        let y = detection.bbox.center().y;
        if !line.is_empty() && y - line_top > y_tolerance {
            flush_line(&mut line, &mut ordered);
        }
        if line.is_empty() {
            line_top = y;
        }
        line.push(detection);
    }
    flush_line(&mut line, &mut ordered);

    for (idx, detection) in ordered.iter_mut().enumerate() {
        detection.bbox_id = idx;
    }
    *detections = ordered;
}

fn flush_line(line: &mut Vec<Detection>, ordered: &mut Vec<Detection>) {
    // stable sort keeps the y order for equal x
    line.sort_by(|a, b| a.bbox.center().x.total_cmp(&b.bbox.center().x));
    ordered.append(line);
}
