use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb};
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use snafu::ResultExt;

use crate::{error::*, layout::element::Detection};

/// Draws labelled detection boxes onto page images for inspection.
pub struct Annotator {
    font: FontVec,
    scale: PxScale,
}

impl Annotator {
    /// Loads the TrueType font used for box captions.
    pub fn from_font_file<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let data = std::fs::read(path).context(IoReadSnafu {
            path: path.to_string_lossy(),
        })?;
        let font = FontVec::try_from_vec(data).context(FontSnafu {
            path: path.to_string_lossy(),
        })?;

        Ok(Self {
            font,
            scale: PxScale::from(16.0),
        })
    }

    pub fn draw(&self, image: &DynamicImage, detections: &[Detection]) -> DynamicImage {
        let mut output_img = image.to_rgb8();

        for detection in detections {
            let bounds = detection.bbox.pixel_bounds();
            if bounds.is_degenerate() {
                continue;
            }

            let x = bounds.x1 as i32;
            let y = bounds.y1 as i32;
            let width = bounds.width() as u32;
            let height = bounds.height() as u32;

            let color = Rgb(detection.label.color());

            // three nested rectangles for a thicker outline
            for offset in 0..3 {
                let thick_rect = Rect::at(x - offset, y - offset)
                    .of_size(width + (offset * 2) as u32, height + (offset * 2) as u32);
                draw_hollow_rect_mut(&mut output_img, thick_rect, color);
            }

            let caption = format!(
                "{} {:.2} {}",
                detection.label.name(),
                detection.proba,
                detection.bbox_id
            );

            let text_x = x.max(5);
            if text_x >= 0 && y >= 0 {
                draw_text_mut(
                    &mut output_img,
                    Rgb([255, 0, 0]),
                    text_x,
                    y,
                    self.scale,
                    &self.font,
                    &caption,
                );
            }
        }

        DynamicImage::ImageRgb8(output_img)
    }

    /// Draws and saves to `output`, the format following its extension.
    pub fn draw_to<P: AsRef<Path>>(
        &self,
        output: P,
        image: &DynamicImage,
        detections: &[Detection],
    ) -> Result<(), CorpusError> {
        let output = output.as_ref();
        self.draw(image, detections)
            .save(output)
            .context(ImageSnafu {
                stage: "annotate",
                path: output.to_string_lossy(),
            })
    }
}
