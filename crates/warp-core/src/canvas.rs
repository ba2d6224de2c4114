//! Source decoding and warp canvas construction.
//!
//! The canvas is the buffer every frame is transformed from. It is wide
//! enough to hold the source plus the largest horizontal excursion the
//! plan will reach, so the warped image never runs off the edge:
//!
//! ```text
//! skew:  width = w + floor(h * tan(m)), source pasted at the left edge
//! widen: width = ceil(w * m),           source pasted centered
//! ```

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbaImage};
use skewbot_common::error::{SkewError, SkewResult};

use crate::schedule::{WarpMode, WarpPlan};

/// Default bounding box for the thumbnailed source.
pub const MAX_SOURCE_WIDTH: u32 = 480;
pub const MAX_SOURCE_HEIGHT: u32 = 480;

/// Default ceiling on canvas `width * height`.
pub const MAX_CANVAS_PIXELS: u64 = 480 * 960;

/// Each retry shrinks the scale by this factor until the canvas fits.
const SCALE_TIGHTENING: f64 = 0.99;

/// A decoded still image, converted to RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    /// Decode an in-memory image, sniffing the format from its contents.
    pub fn decode(bytes: &[u8]) -> SkewResult<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| SkewError::invalid_input(format!("Not a decodable image: {e}")))?;
        Ok(Self {
            pixels: image.to_rgba8(),
        })
    }

    /// Decode an image file, sniffing the format from its contents.
    pub fn open(path: &Path) -> SkewResult<Self> {
        let reader = ImageReader::open(path)
            .map_err(|e| {
                SkewError::invalid_input(format!("Failed to open {}: {e}", path.display()))
            })?
            .with_guessed_format()
            .map_err(|e| {
                SkewError::invalid_input(format!("Failed to read {}: {e}", path.display()))
            })?;
        let image = reader.decode().map_err(|e| {
            SkewError::invalid_input(format!("Not a decodable image {}: {e}", path.display()))
        })?;
        Ok(Self {
            pixels: image.to_rgba8(),
        })
    }

    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Shrink to fit inside `max_width x max_height`, keeping the aspect
    /// ratio. Images that already fit are returned unchanged.
    pub fn thumbnail(&self, max_width: u32, max_height: u32) -> SourceImage {
        let (w, h) = self.pixels.dimensions();
        if w <= max_width && h <= max_height {
            return self.clone();
        }
        let scale = (max_width as f64 / w as f64).min(max_height as f64 / h as f64);
        self.scaled(scale)
    }

    fn scaled(&self, scale: f64) -> SourceImage {
        let (w, h) = self.pixels.dimensions();
        let new_w = ((w as f64 * scale).round() as u32).clamp(1, w.max(1));
        let new_h = ((h as f64 * scale).round() as u32).clamp(1, h.max(1));
        if (new_w, new_h) == (w, h) {
            return self.clone();
        }
        SourceImage {
            pixels: imageops::resize(&self.pixels, new_w, new_h, FilterType::Nearest),
        }
    }
}

/// Size bounds applied while building a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasLimits {
    pub max_source_width: u32,
    pub max_source_height: u32,
    pub max_pixels: u64,
}

impl Default for CanvasLimits {
    fn default() -> Self {
        Self {
            max_source_width: MAX_SOURCE_WIDTH,
            max_source_height: MAX_SOURCE_HEIGHT,
            max_pixels: MAX_CANVAS_PIXELS,
        }
    }
}

/// The padded RGBA buffer frames are warped from.
#[derive(Debug, Clone)]
pub struct Canvas {
    pixels: RgbaImage,
    source_width: u32,
    source_height: u32,
    scale: f64,
}

impl Canvas {
    /// Canvas size needed to warp a `width x height` source through `plan`.
    pub fn natural_size(width: u32, height: u32, plan: &WarpPlan) -> (u32, u32) {
        let magnitude = plan.magnitude();
        let canvas_width = match plan.mode() {
            WarpMode::Skew => {
                let excursion = (height as f64 * magnitude.tan()).floor().max(0.0);
                width as u64 + excursion as u64
            }
            WarpMode::Widen => (width as f64 * magnitude.max(1.0)).ceil() as u64,
        };
        (canvas_width.min(u32::MAX as u64) as u32, height)
    }

    /// Thumbnail `source`, shrink it further if the canvas would exceed
    /// `limits.max_pixels`, and paste it into a transparent canvas.
    pub fn build(source: &SourceImage, plan: &WarpPlan, limits: &CanvasLimits) -> Canvas {
        let thumb = source.thumbnail(limits.max_source_width, limits.max_source_height);
        let (mut canvas_w, mut canvas_h) = Self::natural_size(thumb.width(), thumb.height(), plan);
        let natural_pixels = canvas_w as u64 * canvas_h as u64;

        let mut fitted = thumb.clone();
        let mut scale = 1.0;
        if natural_pixels > limits.max_pixels {
            scale = (limits.max_pixels as f64 / natural_pixels as f64).sqrt();
            loop {
                fitted = thumb.scaled(scale);
                (canvas_w, canvas_h) = Self::natural_size(fitted.width(), fitted.height(), plan);
                let fits = canvas_w as u64 * canvas_h as u64 <= limits.max_pixels;
                let smallest = fitted.width() == 1 && fitted.height() == 1;
                if fits || smallest {
                    break;
                }
                scale *= SCALE_TIGHTENING;
            }
            tracing::debug!(
                natural_pixels,
                max_pixels = limits.max_pixels,
                scale,
                canvas_w,
                canvas_h,
                "Canvas scaled down to fit pixel ceiling"
            );
        }

        let mut pixels = RgbaImage::new(canvas_w, canvas_h);
        let offset_x = match plan.mode() {
            WarpMode::Skew => 0,
            WarpMode::Widen => (canvas_w - fitted.width()) / 2,
        };
        imageops::replace(&mut pixels, fitted.pixels(), offset_x as i64, 0);

        Canvas {
            pixels,
            source_width: fitted.width(),
            source_height: fitted.height(),
            scale,
        }
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Bytes in one raw RGBA frame of this canvas.
    pub fn frame_len(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// Dimensions of the source as pasted.
    pub fn source_size(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    /// Extra uniform scale applied to fit the pixel ceiling (1.0 if none).
    pub fn scale(&self) -> f64 {
        self.scale
    }
}
