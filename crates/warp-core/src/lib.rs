//! Skewbot Warp Core
//!
//! Everything needed to turn one still image into the frames of a warp
//! animation:
//! - **Schedule:** per-frame warp parameters with quadratic easing
//! - **Canvas:** source decoding, thumbnailing, and canvas sizing
//! - **Transform:** the per-frame skew/widen pixel remap
//!
//! This crate is pure computation with no processes, async, or shared state.
//! All inputs are data; all outputs are data.

pub mod canvas;
pub mod schedule;
pub mod transform;

pub use canvas::{Canvas, CanvasLimits, SourceImage};
pub use schedule::{WarpMode, WarpPlan};
pub use transform::transform;
