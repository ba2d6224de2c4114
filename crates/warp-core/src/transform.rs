//! Per-frame pixel remapping.
//!
//! Both warps only move pixels along rows, so every output pixel at
//! `(row, col)` is read from `(row, source_col)` of the canvas:
//!
//! - **Skew:** `source_col = col - floor(tan(angle) * (height - row))`
//! - **Widen:** `source_col = floor((col - center * (1 - ratio)) / ratio)`,
//!   `center = width / 2`
//!
//! Source columns outside `[0, width)` wrap around the row. The skew shift
//! is never negative, so the source offset `-shift` only reaches past the
//! left edge, where wrapping pulls in the transparent padding from the right
//! side of the canvas.

use image::RgbaImage;

use crate::schedule::WarpMode;

const CHANNELS: usize = 4;

/// Warp `canvas` by `parameter` and return a new buffer of the same size.
///
/// Pure and deterministic; safe to call from any number of jobs at once.
pub fn transform(canvas: &RgbaImage, mode: WarpMode, parameter: f64) -> RgbaImage {
    let (width, height) = canvas.dimensions();
    let mut out = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }

    match mode {
        WarpMode::Skew => skew_into(canvas, &mut out, parameter),
        WarpMode::Widen => widen_into(canvas, &mut out, parameter),
    }
    out
}

/// Source column for `col` under the skew of `row`.
pub fn skew_source_column(col: u32, row: u32, width: u32, height: u32, angle: f64) -> u32 {
    let shift = skew_shift(row, height, angle);
    wrap(col as i64 - shift, width)
}

/// Source column for `col` under a widen by `ratio`.
pub fn widen_source_column(col: u32, width: u32, ratio: f64) -> u32 {
    let ratio = sanitize_ratio(ratio);
    let center = width as f64 / 2.0;
    let source = ((col as f64 - center * (1.0 - ratio)) / ratio).floor();
    wrap(source as i64, width)
}

fn skew_into(canvas: &RgbaImage, out: &mut RgbaImage, angle: f64) {
    let (width, height) = canvas.dimensions();
    let row_len = width as usize * CHANNELS;
    let src = canvas.as_raw();

    for (row, dst_row) in out.chunks_exact_mut(row_len).enumerate() {
        let src_row = &src[row * row_len..(row + 1) * row_len];
        // The whole row moves by one shift, so the remap is a rotation.
        let start = wrap(-skew_shift(row as u32, height, angle), width) as usize * CHANNELS;
        let head = row_len - start;
        dst_row[..head].copy_from_slice(&src_row[start..]);
        dst_row[head..].copy_from_slice(&src_row[..start]);
    }
}

fn widen_into(canvas: &RgbaImage, out: &mut RgbaImage, ratio: f64) {
    let width = canvas.width();
    let row_len = width as usize * CHANNELS;
    let src = canvas.as_raw();

    let columns: Vec<usize> = (0..width)
        .map(|col| widen_source_column(col, width, ratio) as usize * CHANNELS)
        .collect();

    for (row, dst_row) in out.chunks_exact_mut(row_len).enumerate() {
        let src_row = &src[row * row_len..(row + 1) * row_len];
        for (dst_px, &offset) in dst_row.chunks_exact_mut(CHANNELS).zip(&columns) {
            dst_px.copy_from_slice(&src_row[offset..offset + CHANNELS]);
        }
    }
}

fn skew_shift(row: u32, height: u32, angle: f64) -> i64 {
    let shift = (angle.tan() * (height as f64 - row as f64)).floor();
    if shift.is_finite() {
        shift as i64
    } else {
        0
    }
}

fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

fn wrap(index: i64, len: u32) -> u32 {
    index.rem_euclid(len as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([x as u8, y as u8, (x * 7 + y * 13) as u8, 255])
        })
    }

    #[test]
    fn test_identity_parameters() {
        let canvas = gradient(17, 9);
        assert_eq!(transform(&canvas, WarpMode::Skew, 0.0), canvas);
        assert_eq!(transform(&canvas, WarpMode::Widen, 1.0), canvas);
    }

    #[test]
    fn test_skew_matches_formula() {
        let canvas = gradient(20, 8);
        let angle = 0.4;
        let out = transform(&canvas, WarpMode::Skew, angle);
        for row in 0..8 {
            for col in 0..20 {
                let shift = (angle.tan() * (8 - row) as f64).floor() as i64;
                let src_col = (col as i64 - shift).rem_euclid(20) as u32;
                assert_eq!(out.get_pixel(col, row), canvas.get_pixel(src_col, row));
            }
        }
    }

    #[test]
    fn test_skew_bottom_row_moves_least() {
        let canvas = gradient(30, 10);
        let out = transform(&canvas, WarpMode::Skew, 0.5);
        // Bottom row: tan(0.5) * 1 < 1, so it stays put.
        for col in 0..30 {
            assert_eq!(out.get_pixel(col, 9), canvas.get_pixel(col, 9));
        }
        // Top row shifts right by floor(tan(0.5) * 10) = 5.
        assert_eq!(out.get_pixel(5, 0), canvas.get_pixel(0, 0));
    }

    #[test]
    fn test_widen_stretches_about_center() {
        let canvas = gradient(16, 4);
        let out = transform(&canvas, WarpMode::Widen, 2.0);
        // Center column maps to itself.
        assert_eq!(out.get_pixel(8, 2), canvas.get_pixel(8, 2));
        // Columns 0 and 1 both read column 4.
        assert_eq!(out.get_pixel(0, 1), canvas.get_pixel(4, 1));
        assert_eq!(out.get_pixel(1, 1), canvas.get_pixel(4, 1));
        assert_eq!(out.get_pixel(15, 1), canvas.get_pixel(11, 1));
    }

    #[test]
    fn test_widen_invalid_ratio_is_identity() {
        let canvas = gradient(9, 3);
        assert_eq!(transform(&canvas, WarpMode::Widen, 0.0), canvas);
        assert_eq!(transform(&canvas, WarpMode::Widen, f64::NAN), canvas);
    }

    #[test]
    fn test_negative_columns_wrap() {
        assert_eq!(wrap(-1, 10), 9);
        assert_eq!(wrap(-21, 10), 9);
        assert_eq!(skew_source_column(0, 0, 10, 4, 0.4), 9);
    }

    #[test]
    fn test_empty_canvas() {
        let canvas = RgbaImage::new(0, 0);
        assert_eq!(transform(&canvas, WarpMode::Skew, 0.3).dimensions(), (0, 0));
    }
}
