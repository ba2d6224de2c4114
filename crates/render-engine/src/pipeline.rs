//! Render orchestration: gate, deadline, canvas, palette, and stream.

use std::sync::Arc;

use skewbot_common::config::{AppConfig, RenderConfig};
use skewbot_common::error::{SkewError, SkewResult};
use skewbot_warp_core::{Canvas, CanvasLimits, WarpPlan};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::encoder::{EncoderBackend, EncoderSession, FfmpegBackend, StreamSpec};
use crate::frames::spawn_producer;
use crate::gate::{GateTicket, RenderGate, TimeoutPolicy};
use crate::job::{JobId, JobStage, RenderOutput, RenderRequest, StageCallback};

/// Shared entry point for rendering warp animations.
///
/// One `Renderer` is shared by every caller in the process so that all jobs
/// pass through the same gate.
pub struct Renderer {
    gate: RenderGate,
    timeout: TimeoutPolicy,
    backend: Arc<dyn EncoderBackend>,
    settings: RenderConfig,
}

impl Renderer {
    /// Create a renderer driving ffmpeg as configured.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_backend(
            &config.render,
            Arc::new(FfmpegBackend::new(config.encoder.clone())),
        )
    }

    pub fn with_backend(settings: &RenderConfig, backend: Arc<dyn EncoderBackend>) -> Self {
        Self {
            gate: RenderGate::new(settings.concurrency),
            timeout: TimeoutPolicy::new(settings.base_timeout()),
            backend,
            settings: settings.clone(),
        }
    }

    pub fn gate(&self) -> &RenderGate {
        &self.gate
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout
    }

    /// Render one request to an animated GIF.
    ///
    /// The job waits for a gate slot, then runs under a deadline scaled by
    /// the queue length it saw on entry. Cancelling `cancel` or hitting the
    /// deadline kills any live subprocess and removes the palette file.
    pub async fn render(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
        on_stage: Option<&StageCallback>,
    ) -> SkewResult<RenderOutput> {
        let job_id = JobId::new();
        let span = tracing::info_span!("render_job", %job_id, mode = %request.mode);

        async move {
            let started = Instant::now();
            let ticket = self.gate.enqueue();
            let deadline = self
                .timeout
                .deadline(ticket.outstanding_at_entry(), self.gate.capacity());
            report(on_stage, job_id, JobStage::Queued);
            tracing::debug!(
                source = %request.source.describe(),
                outstanding = ticket.outstanding_at_entry(),
                deadline_secs = deadline.as_secs_f64(),
                "Job queued"
            );

            let work = self.run_admitted(job_id, ticket, &request, on_stage, started);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SkewError::Cancelled),
                outcome = tokio::time::timeout(deadline, work) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(SkewError::Timeout { deadline }),
                },
            };

            report(on_stage, job_id, JobStage::terminal_for(&result));
            match &result {
                Ok(output) => tracing::info!(
                    "took {:.2} s, size {:.2} MB",
                    output.elapsed.as_secs_f64(),
                    output.bytes.len() as f64 / 1_000_000.0
                ),
                Err(SkewError::Cancelled) => tracing::info!("Render cancelled"),
                Err(e) => tracing::warn!(error = %e, "Render failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_admitted(
        &self,
        job_id: JobId,
        ticket: GateTicket,
        request: &RenderRequest,
        on_stage: Option<&StageCallback>,
        started: Instant,
    ) -> SkewResult<RenderOutput> {
        let _permit = ticket.admit().await?;
        report(on_stage, job_id, JobStage::Admitted);

        let plan = Arc::new(WarpPlan::new(
            request.mode,
            request.magnitude,
            self.settings.frame_count,
        ));
        if plan.is_empty() {
            return Err(SkewError::invalid_input("Warp plan has no frames"));
        }

        let limits = CanvasLimits {
            max_source_width: self.settings.max_source_width,
            max_source_height: self.settings.max_source_height,
            max_pixels: self.settings.max_canvas_pixels,
        };
        let source = request.source.clone();
        let canvas_plan = plan.clone();
        let canvas = tokio::task::spawn_blocking(move || -> SkewResult<Canvas> {
            let image = source.decode()?;
            Ok(Canvas::build(&image, &canvas_plan, &limits))
        })
        .await
        .map_err(|e| SkewError::Other(anyhow::anyhow!("Canvas task failed: {e}")))??;
        let canvas = Arc::new(canvas);
        tracing::debug!(
            width = canvas.width(),
            height = canvas.height(),
            magnitude = plan.magnitude(),
            "Canvas ready"
        );

        let session = EncoderSession::new(self.backend.as_ref(), job_id, &self.settings.work_dir);

        report(on_stage, job_id, JobStage::PaletteBuilding);
        let palette = session.build_palette(&request.source).await?;

        report(on_stage, job_id, JobStage::Encoding);
        let spec = StreamSpec {
            width: canvas.width(),
            height: canvas.height(),
            frame_rate: self.settings.frame_rate,
            frame_count: plan.len(),
            hold_secs: self.settings.hold_secs,
        };
        let (frames, producer) = spawn_producer(canvas.clone(), plan.clone());
        let bytes = session.stream_frames(&spec, &palette, frames).await?;
        let produced = producer
            .await
            .map_err(|e| SkewError::Other(anyhow::anyhow!("Frame producer failed: {e}")))?;
        drop(palette);

        Ok(RenderOutput {
            job_id,
            bytes,
            width: spec.width,
            height: spec.height,
            frames: produced + 1,
            elapsed: started.elapsed(),
        })
    }
}

fn report(on_stage: Option<&StageCallback>, job_id: JobId, stage: JobStage) {
    if let Some(callback) = on_stage {
        callback(job_id, stage);
    }
}
