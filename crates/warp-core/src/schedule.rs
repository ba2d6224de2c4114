//! Warp schedules: one warp parameter per output frame.
//!
//! The parameter grows quadratically from the identity value to the
//! requested magnitude, so the warp starts slowly and accelerates:
//!
//! ```text
//! skew:  p(t) = m * t² / (n - 1)²
//! widen: p(t) = 1 + (m - 1) * t² / (n - 1)²
//! ```

use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use skewbot_common::error::SkewError;

/// Frames in one animation loop.
pub const DEFAULT_FRAME_COUNT: usize = 70;

/// Playback rate in frames per second.
pub const DEFAULT_FRAME_RATE: u32 = 50;

/// Default final shear angle in radians.
pub const DEFAULT_SKEW: f64 = 0.5;

/// Default final stretch ratio.
pub const DEFAULT_WIDEN: f64 = 2.0;

/// Exclusive upper bound on the shear angle; `tan` explodes near π/2.
pub const MAX_SKEW: f64 = FRAC_PI_2 - 0.1;

/// Inclusive upper bound on the stretch ratio.
pub const MAX_WIDEN: f64 = 20.0;

/// The geometric distortion applied per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WarpMode {
    /// Rows are sheared horizontally by a growing angle.
    #[default]
    Skew,
    /// The image is stretched horizontally around its center line.
    Widen,
}

impl WarpMode {
    /// Magnitude used when the caller gives none or an invalid one.
    pub fn default_magnitude(self) -> f64 {
        match self {
            WarpMode::Skew => DEFAULT_SKEW,
            WarpMode::Widen => DEFAULT_WIDEN,
        }
    }

    /// Parameter value at which the transform leaves the image unchanged.
    pub fn identity_parameter(self) -> f64 {
        match self {
            WarpMode::Skew => 0.0,
            WarpMode::Widen => 1.0,
        }
    }

    /// Whether `magnitude` lies in this mode's valid range.
    pub fn accepts(self, magnitude: f64) -> bool {
        match self {
            WarpMode::Skew => magnitude > 0.0 && magnitude < MAX_SKEW,
            WarpMode::Widen => (1.0..=MAX_WIDEN).contains(&magnitude),
        }
    }

    /// Resolve a requested magnitude, replacing missing or out-of-range
    /// values with the mode default.
    pub fn resolve_magnitude(self, requested: Option<f64>) -> f64 {
        match requested {
            Some(m) if self.accepts(m) => m,
            _ => self.default_magnitude(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WarpMode::Skew => "skew",
            WarpMode::Widen => "widen",
        }
    }
}

impl fmt::Display for WarpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarpMode {
    type Err = SkewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skew" | "italic" | "italics" => Ok(WarpMode::Skew),
            "widen" | "wide" => Ok(WarpMode::Widen),
            other => Err(SkewError::invalid_input(format!(
                "Unknown warp mode: {other}. Use: skew, widen"
            ))),
        }
    }
}

/// Ordered warp parameters for every frame of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpPlan {
    mode: WarpMode,
    magnitude: f64,
    parameters: Vec<f64>,
}

impl WarpPlan {
    /// Build a plan of `frame_count` parameters.
    ///
    /// A single-frame plan holds only the identity parameter; an empty plan
    /// is allowed here and rejected by the encoder.
    pub fn new(mode: WarpMode, magnitude: Option<f64>, frame_count: usize) -> Self {
        let magnitude = mode.resolve_magnitude(magnitude);
        let identity = mode.identity_parameter();

        let parameters = match frame_count {
            0 => Vec::new(),
            1 => vec![identity],
            n => {
                let span = ((n - 1) * (n - 1)) as f64;
                let mut params: Vec<f64> = (0..n)
                    .map(|t| {
                        let t2 = (t * t) as f64;
                        match mode {
                            WarpMode::Skew => magnitude * t2 / span,
                            WarpMode::Widen => 1.0 + (magnitude - 1.0) * t2 / span,
                        }
                    })
                    .collect();
                // Pin the endpoint against `1 + (m - 1)` rounding.
                params[n - 1] = magnitude;
                params
            }
        };

        Self {
            mode,
            magnitude,
            parameters,
        }
    }

    /// Build the standard 70-frame plan.
    pub fn standard(mode: WarpMode, magnitude: Option<f64>) -> Self {
        Self::new(mode, magnitude, DEFAULT_FRAME_COUNT)
    }

    pub fn mode(&self) -> WarpMode {
        self.mode
    }

    /// The resolved final magnitude.
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Frames actually sent to the encoder: the last one goes out twice so
    /// the hold filter can retime it.
    pub fn emitted_frames(&self) -> usize {
        if self.parameters.is_empty() {
            0
        } else {
            self.parameters.len() + 1
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.parameters.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_plan_shape() {
        let plan = WarpPlan::standard(WarpMode::Skew, None);
        assert_eq!(plan.len(), 70);
        assert_eq!(plan.emitted_frames(), 71);
        assert_eq!(plan.parameters()[0], 0.0);
        assert_eq!(plan.parameters()[69], 0.5);
        let a = 0.5 / (69.0 * 69.0);
        assert!((plan.parameters()[10] - a * 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_widen_plan_starts_at_identity() {
        let plan = WarpPlan::standard(WarpMode::Widen, Some(3.0));
        assert_eq!(plan.parameters()[0], 1.0);
        assert_eq!(*plan.parameters().last().unwrap(), 3.0);
    }

    #[test]
    fn test_out_of_range_magnitudes_use_defaults() {
        assert_eq!(WarpMode::Skew.resolve_magnitude(Some(5.0)), 0.5);
        assert_eq!(WarpMode::Skew.resolve_magnitude(Some(0.0)), 0.5);
        assert_eq!(WarpMode::Skew.resolve_magnitude(Some(-0.2)), 0.5);
        assert_eq!(WarpMode::Skew.resolve_magnitude(Some(f64::NAN)), 0.5);
        assert_eq!(WarpMode::Widen.resolve_magnitude(Some(0.5)), 2.0);
        assert_eq!(WarpMode::Widen.resolve_magnitude(Some(20.5)), 2.0);
        assert_eq!(WarpMode::Widen.resolve_magnitude(None), 2.0);
    }

    #[test]
    fn test_range_edges() {
        assert_eq!(WarpMode::Widen.resolve_magnitude(Some(1.0)), 1.0);
        assert_eq!(WarpMode::Widen.resolve_magnitude(Some(20.0)), 20.0);
        assert_eq!(WarpMode::Skew.resolve_magnitude(Some(MAX_SKEW)), 0.5);
        assert_eq!(WarpMode::Skew.resolve_magnitude(Some(1.2)), 1.2);
    }

    #[test]
    fn test_degenerate_frame_counts() {
        assert!(WarpPlan::new(WarpMode::Skew, None, 0).is_empty());
        assert_eq!(WarpPlan::new(WarpMode::Skew, None, 0).emitted_frames(), 0);
        assert_eq!(WarpPlan::new(WarpMode::Widen, None, 1).parameters(), &[1.0]);
        assert_eq!(WarpPlan::new(WarpMode::Skew, None, 2).parameters(), &[0.0, 0.5]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Skew".parse::<WarpMode>().unwrap(), WarpMode::Skew);
        assert_eq!(" widen ".parse::<WarpMode>().unwrap(), WarpMode::Widen);
        assert!("rotate".parse::<WarpMode>().is_err());
        assert_eq!(WarpMode::Widen.to_string(), "widen");
    }

    #[test]
    fn test_mode_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&WarpMode::Skew).unwrap(), "\"skew\"");
        let mode: WarpMode = serde_json::from_str("\"widen\"").unwrap();
        assert_eq!(mode, WarpMode::Widen);
    }
}
