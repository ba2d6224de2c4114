//! Render requests, job identity, and job lifecycle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use skewbot_common::error::{SkewError, SkewResult};
use skewbot_warp_core::{SourceImage, WarpMode};
use uuid::Uuid;

/// Unique identifier for one render job.
///
/// Also names the job's palette file, so concurrent jobs never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// The still image a job warps, before decoding.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Encoded image bytes held in memory.
    Bytes(Arc<[u8]>),
    /// An image file on disk.
    Path(PathBuf),
}

impl SourceInput {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(Arc::from(bytes.into()))
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Decode into RGBA pixels.
    pub fn decode(&self) -> SkewResult<SourceImage> {
        match self {
            SourceInput::Bytes(bytes) => SourceImage::decode(bytes),
            SourceInput::Path(path) => SourceImage::open(path),
        }
    }

    /// The file path, if the source lives on disk.
    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceInput::Bytes(_) => None,
            SourceInput::Path(path) => Some(path),
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            SourceInput::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            SourceInput::Path(path) => path.display().to_string(),
        }
    }
}

/// What the command layer asks the pipeline to render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: SourceInput,
    pub mode: WarpMode,
    /// Final warp magnitude; `None` or out-of-range uses the mode default.
    pub magnitude: Option<f64>,
}

impl RenderRequest {
    pub fn new(source: SourceInput, mode: WarpMode, magnitude: Option<f64>) -> Self {
        Self {
            source,
            mode,
            magnitude,
        }
    }
}

/// Lifecycle of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    /// Waiting for a gate slot.
    Queued,
    /// Holding a gate slot; decoding and building the canvas.
    Admitted,
    /// Running the palette subprocess.
    PaletteBuilding,
    /// Streaming frames through the encoder subprocess.
    Encoding,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStage::Completed | JobStage::Failed | JobStage::TimedOut | JobStage::Cancelled
        )
    }

    /// Terminal stage for a finished job.
    pub fn terminal_for<T>(result: &SkewResult<T>) -> JobStage {
        match result {
            Ok(_) => JobStage::Completed,
            Err(SkewError::Timeout { .. }) => JobStage::TimedOut,
            Err(SkewError::Cancelled) => JobStage::Cancelled,
            Err(_) => JobStage::Failed,
        }
    }
}

/// Observer for job stage transitions.
pub type StageCallback = Box<dyn Fn(JobId, JobStage) + Send + Sync>;

/// A finished render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub job_id: JobId,
    /// The encoded GIF.
    pub bytes: Vec<u8>,
    /// Canvas (and therefore GIF) dimensions.
    pub width: u32,
    pub height: u32,
    /// Frames written to the encoder, including the repeated last frame.
    pub frames: usize,
    /// Time from entering the queue to completion.
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 32);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(!JobStage::Encoding.is_terminal());
        assert!(JobStage::TimedOut.is_terminal());
        let timeout: SkewResult<()> = Err(SkewError::Timeout {
            deadline: Duration::from_secs(1),
        });
        assert_eq!(JobStage::terminal_for(&timeout), JobStage::TimedOut);
        assert_eq!(JobStage::terminal_for(&Ok(())), JobStage::Completed);
        assert_eq!(
            JobStage::terminal_for::<()>(&Err(SkewError::encoding("x"))),
            JobStage::Failed
        );
    }

    #[test]
    fn test_source_describe() {
        assert_eq!(SourceInput::from_bytes(vec![0u8; 12]).describe(), "<12 bytes>");
        let path = SourceInput::from_path("/tmp/cat.png");
        assert_eq!(path.path(), Some(Path::new("/tmp/cat.png")));
    }
}
