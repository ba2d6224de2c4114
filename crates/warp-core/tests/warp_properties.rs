use image::{Rgba, RgbaImage};
use proptest::prelude::*;

use skewbot_warp_core::canvas::{Canvas, CanvasLimits, SourceImage};
use skewbot_warp_core::schedule::{WarpMode, WarpPlan, MAX_SKEW, MAX_WIDEN};
use skewbot_warp_core::transform;

fn noise(width: u32, height: u32, seed: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let v = x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503) ^ seed;
        Rgba([v as u8, (v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8])
    })
}

proptest! {
    #[test]
    fn skew_plan_is_quadratic_and_monotone(n in 2usize..200, m in 0.01f64..(MAX_SKEW - 0.01)) {
        let plan = WarpPlan::new(WarpMode::Skew, Some(m), n);
        let params = plan.parameters();
        prop_assert_eq!(params.len(), n);
        prop_assert_eq!(params[0], 0.0);
        prop_assert_eq!(params[n - 1], m);
        for w in params.windows(2) {
            prop_assert!(w[0] <= w[1]);
        }
        let span = ((n - 1) * (n - 1)) as f64;
        for (t, p) in params.iter().enumerate() {
            let expected = m * (t * t) as f64 / span;
            prop_assert!((p - expected).abs() <= 1e-12 * m.max(1.0));
        }
    }

    #[test]
    fn widen_plan_is_quadratic_and_monotone(n in 2usize..200, m in 1.0f64..=MAX_WIDEN) {
        let plan = WarpPlan::new(WarpMode::Widen, Some(m), n);
        let params = plan.parameters();
        prop_assert_eq!(params[0], 1.0);
        prop_assert_eq!(params[n - 1], m);
        for w in params.windows(2) {
            prop_assert!(w[0] <= w[1]);
        }
        let span = ((n - 1) * (n - 1)) as f64;
        for (t, p) in params.iter().enumerate() {
            let expected = 1.0 + (m - 1.0) * (t * t) as f64 / span;
            prop_assert!((p - expected).abs() <= 1e-9);
        }
    }

    #[test]
    fn identity_parameter_is_identity(w in 1u32..40, h in 1u32..40, seed in any::<u32>()) {
        let canvas = noise(w, h, seed);
        prop_assert_eq!(&transform(&canvas, WarpMode::Skew, 0.0), &canvas);
        prop_assert_eq!(&transform(&canvas, WarpMode::Widen, 1.0), &canvas);
    }

    #[test]
    fn transform_keeps_dimensions_and_rows(
        w in 1u32..40,
        h in 1u32..40,
        p in 0.0f64..1.4,
        seed in any::<u32>(),
    ) {
        let canvas = noise(w, h, seed);
        for (mode, param) in [(WarpMode::Skew, p), (WarpMode::Widen, 1.0 + p * 5.0)] {
            let out = transform(&canvas, mode, param);
            prop_assert_eq!(out.dimensions(), canvas.dimensions());
            // Pixels only move within their row.
            for row in 0..h {
                let before: Vec<[u8; 4]> = (0..w).map(|c| canvas.get_pixel(c, row).0).collect();
                let after: Vec<[u8; 4]> = (0..w).map(|c| out.get_pixel(c, row).0).collect();
                for px in &after {
                    prop_assert!(before.contains(px));
                }
            }
        }
    }

    #[test]
    fn canvas_never_exceeds_ceiling(
        w in 1u32..600,
        h in 1u32..600,
        skew in 0.01f64..(MAX_SKEW - 0.01),
        ratio in 1.0f64..=MAX_WIDEN,
        max_pixels in 4_096u64..500_000,
    ) {
        let source = SourceImage::from_rgba(RgbaImage::new(w, h));
        let limits = CanvasLimits { max_pixels, ..CanvasLimits::default() };
        for plan in [
            WarpPlan::new(WarpMode::Skew, Some(skew), 4),
            WarpPlan::new(WarpMode::Widen, Some(ratio), 4),
        ] {
            let canvas = Canvas::build(&source, &plan, &limits);
            let (sw, sh) = canvas.source_size();
            let pixels = canvas.width() as u64 * canvas.height() as u64;
            prop_assert!(pixels <= max_pixels || (sw, sh) == (1, 1));
            prop_assert!(canvas.width() >= sw);
            prop_assert_eq!(canvas.height(), sh);
        }
    }
}
