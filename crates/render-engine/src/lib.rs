//! Skewbot Render Engine
//!
//! Turns one still image into a looping warp GIF by streaming warped
//! frames through an external encoder.
//!
//! # Pipeline Architecture
//!
//! ```text
//! request ──▶ gate (FIFO, capacity N) ──▶ deadline = T * max(1, queued - N)
//!                                                 │
//!   source ──▶ decode + thumbnail ──▶ canvas ─────┤
//!     │                                           │
//!     └──▶ palette process ──▶ palette.png        │
//!                                  │              ▼
//!   plan ──▶ frame producer ──▶ [stream process] ──▶ GIF bytes
//! ```
//!
//! Deadline expiry or cancellation drops the job future, which kills any
//! live subprocess, deletes the palette, and frees the gate slot.

pub mod encoder;
pub mod frames;
pub mod gate;
pub mod job;
pub mod palette;
pub mod pipeline;

pub use encoder::{EncoderBackend, EncoderSession, FfmpegBackend, StreamSpec};
pub use gate::{GatePermit, GateTicket, RenderGate, TimeoutPolicy};
pub use job::{JobId, JobStage, RenderOutput, RenderRequest, SourceInput, StageCallback};
pub use palette::PaletteArtifact;
pub use pipeline::Renderer;
