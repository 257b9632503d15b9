use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use base64::Engine;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, imageops::FilterType};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    consts::{CENTER_GAP_RATIO, TARGET_ASPECT_RATIOS},
    error::*,
};

/// Four page corners as fractions of the image size, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub x3: f32,
    pub y3: f32,
    pub x4: f32,
    pub y4: f32,
}

impl Corners {
    /// Builds corners from `[x1, y1, x2, y2, x3, y3, x4, y4]`.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        let [x1, y1, x2, y2, x3, y3, x4, y4] = <[f32; 8]>::try_from(values).ok()?;
        Some(Self {
            x1,
            y1,
            x2,
            y2,
            x3,
            y3,
            x4,
            y4,
        })
    }

    pub fn points(&self) -> [(f32, f32); 4] {
        [
            (self.x1, self.y1),
            (self.x2, self.y2),
            (self.x3, self.y3),
            (self.x4, self.y4),
        ]
    }
}

/// Base64-ready image bytes plus the media type the model is told about.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub media_type: &'static str,
    pub data: Bytes,
    /// File the pixels came from, for logging.
    pub source: PathBuf,
}

impl ImagePayload {
    /// Encodes `image` as `format`, falling back to PNG for formats the
    /// vision APIs do not accept.
    pub fn encode(
        image: &DynamicImage,
        format: ImageFormat,
        source: &Path,
    ) -> Result<Self, CorpusError> {
        let format = payload_format(format);
        let mut buf = Vec::new();

        // JPEG has no alpha channel
        let encodable = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
            _ => DynamicImage::ImageRgba8(image.to_rgba8()),
        };
        encodable
            .write_to(&mut Cursor::new(&mut buf), format)
            .context(ImageSnafu {
                stage: "encode",
                path: source.to_string_lossy(),
            })?;

        Ok(Self {
            media_type: media_type(format),
            data: Bytes::from(buf),
            source: source.to_path_buf(),
        })
    }

    pub fn base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

fn payload_format(format: ImageFormat) -> ImageFormat {
    match format {
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::Gif | ImageFormat::WebP => format,
        _ => ImageFormat::Png,
    }
}

fn media_type(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        _ => "image/png",
    }
}

/// A page scan with the format it was decoded from.
#[derive(Debug, Clone)]
pub struct PageImage {
    path: PathBuf,
    image: DynamicImage,
    format: ImageFormat,
}

impl PageImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .context(IoReadSnafu {
                path: path.to_string_lossy(),
            })?
            .with_guessed_format()
            .context(IoReadSnafu {
                path: path.to_string_lossy(),
            })?;
        let format = reader.format().unwrap_or(ImageFormat::Png);
        let image = reader.decode().context(ImageSnafu {
            stage: "decode",
            path: path.to_string_lossy(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            image,
            format,
        })
    }

    pub fn from_image<P: AsRef<Path>>(path: P, image: DynamicImage, format: ImageFormat) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            image,
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn media_type(&self) -> &'static str {
        media_type(payload_format(self.format))
    }

    /// Rotates clockwise by `degrees`, growing the canvas so no pixel is lost.
    pub fn rotate(mut self, degrees: f32) -> Self {
        let degrees = degrees.rem_euclid(360.0);
        let near = |target: f32| (degrees - target).abs() < 1e-3;

        self.image = if near(0.0) || near(360.0) {
            self.image
        } else if near(90.0) {
            self.image.rotate90()
        } else if near(180.0) {
            self.image.rotate180()
        } else if near(270.0) {
            self.image.rotate270()
        } else {
            rotate_expanded(&self.image, degrees.to_radians())
        };
        self
    }

    /// Crops to the axis-aligned bounding box of the corner quad.
    pub fn crop_to_quad(mut self, corners: &Corners) -> Result<Self, CorpusError> {
        let (width, height) = self.dimensions();

        let (mut x_min, mut y_min) = (i64::MAX, i64::MAX);
        let (mut x_max, mut y_max) = (i64::MIN, i64::MIN);
        for (x, y) in corners.points() {
            let x = (x * width as f32) as i64;
            let y = (y * height as f32) as i64;
            x_min = x_min.min(x);
            y_min = y_min.min(y);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }

        let x_min = x_min.clamp(0, width as i64);
        let y_min = y_min.clamp(0, height as i64);
        let x_max = x_max.clamp(0, width as i64);
        let y_max = y_max.clamp(0, height as i64);

        if x_max <= x_min || y_max <= y_min {
            return GeometrySnafu {
                path: self.path.to_string_lossy(),
                message: format!("corner quad {corners:?} covers no pixels"),
            }
            .fail();
        }

        self.image = self.image.crop_imm(
            x_min as u32,
            y_min as u32,
            (x_max - x_min) as u32,
            (y_max - y_min) as u32,
        );
        Ok(self)
    }

    /// Shrinks the image to fit the target canvas whose aspect ratio is
    /// closest to its own. Images already inside the canvas are untouched.
    pub fn resize_to_aspect(mut self) -> Self {
        let (width, height) = self.dimensions();
        let (_, target_width, target_height) = closest_aspect_ratio(width, height);

        if width > target_width || height > target_height {
            self.image = self
                .image
                .resize(target_width, target_height, FilterType::Lanczos3);
        }
        self
    }

    /// Splits a two-page spread at its vertical center, dropping a thin
    /// gutter strip between the halves.
    pub fn split(&self) -> (DynamicImage, DynamicImage) {
        let (width, height) = self.dimensions();
        let half_gap = (width as f32 * CENTER_GAP_RATIO / 2.0) as u32;
        let middle = width / 2;

        let left_end = middle.saturating_sub(half_gap);
        let right_start = (middle + half_gap).min(width);

        (
            self.image.crop_imm(0, 0, left_end, height),
            self.image.crop_imm(right_start, 0, width - right_start, height),
        )
    }

    pub fn to_payload(&self) -> Result<ImagePayload, CorpusError> {
        ImagePayload::encode(&self.image, self.format, &self.path)
    }
}

/// Picks the target canvas `(name, width, height)` by absolute aspect ratio
/// difference. The first entry wins on ties.
pub fn closest_aspect_ratio(width: u32, height: u32) -> (&'static str, u32, u32) {
    let ratio = width as f32 / height.max(1) as f32;

    let mut closest = TARGET_ASPECT_RATIOS[0];
    let mut closest_difference = f32::INFINITY;
    for target in TARGET_ASPECT_RATIOS {
        let (_, target_width, target_height) = target;
        let difference = (ratio - target_width as f32 / target_height as f32).abs();
        if difference < closest_difference {
            closest_difference = difference;
            closest = target;
        }
    }
    closest
}

/// Clockwise rotation by `radians` onto a canvas large enough for the result.
fn rotate_expanded(image: &DynamicImage, radians: f32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as f32, height as f32);
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());

    let new_width = (w * cos + h * sin).ceil() as u32;
    let new_height = (w * sin + h * cos).ceil() as u32;

    let projection = Projection::translate(new_width as f32 / 2.0, new_height as f32 / 2.0)
        * Projection::rotate(radians)
        * Projection::translate(-w / 2.0, -h / 2.0);

    let source = image.to_rgba8();
    let mut rotated = image::RgbaImage::new(new_width, new_height);
    warp_into(
        &source,
        &projection,
        Interpolation::Bilinear,
        Rgba([0, 0, 0, 255]),
        &mut rotated,
    );

    DynamicImage::ImageRgba8(rotated)
}
