//! Frame producer: warps the canvas once per plan parameter.
//!
//! Frames are produced on the blocking pool and handed to the encoder
//! through a bounded channel, so at most a couple of frames are held in
//! memory regardless of the schedule length.

use std::sync::Arc;

use skewbot_warp_core::{transform, Canvas, WarpPlan};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Frames buffered between the producer and the encoder writer.
pub const FRAME_QUEUE_DEPTH: usize = 2;

/// Start producing frames for `plan` from `canvas`.
///
/// Returns the receiving end and a handle resolving to the number of frames
/// produced. Production stops early if the receiver is dropped.
pub fn spawn_producer(
    canvas: Arc<Canvas>,
    plan: Arc<WarpPlan>,
) -> (mpsc::Receiver<Vec<u8>>, JoinHandle<usize>) {
    let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
    let handle = tokio::task::spawn_blocking(move || {
        let mut produced = 0usize;
        for &parameter in plan.parameters() {
            let frame = transform(canvas.pixels(), plan.mode(), parameter).into_raw();
            if tx.blocking_send(frame).is_err() {
                tracing::debug!(produced, "Frame consumer went away; stopping producer");
                break;
            }
            produced += 1;
        }
        produced
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use skewbot_warp_core::{CanvasLimits, SourceImage, WarpMode};

    fn canvas() -> Arc<Canvas> {
        let source = SourceImage::from_rgba(RgbaImage::from_pixel(6, 4, Rgba([9, 9, 9, 255])));
        let plan = WarpPlan::new(WarpMode::Skew, None, 5);
        Arc::new(Canvas::build(&source, &plan, &CanvasLimits::default()))
    }

    #[tokio::test]
    async fn test_produces_one_frame_per_parameter() {
        let canvas = canvas();
        let plan = Arc::new(WarpPlan::new(WarpMode::Skew, None, 5));
        let (mut rx, handle) = spawn_producer(canvas.clone(), plan);

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            assert_eq!(frame.len(), canvas.frame_len());
            frames.push(frame);
        }
        assert_eq!(frames.len(), 5);
        assert_eq!(handle.await.unwrap(), 5);
        // The identity frame is the canvas itself.
        assert_eq!(frames[0], canvas.pixels().as_raw().clone());
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let plan = Arc::new(WarpPlan::new(WarpMode::Skew, None, 50));
        let (mut rx, handle) = spawn_producer(canvas(), plan);
        assert!(rx.recv().await.is_some());
        drop(rx);
        let produced = handle.await.unwrap();
        assert!(produced < 50);
    }
}
