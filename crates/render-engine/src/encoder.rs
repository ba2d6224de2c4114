//! Streaming encoder session: palette generation and frame streaming.
//!
//! One job runs two subprocesses back to back:
//!
//! ```text
//! source ──stdin──▶ [palette] ──▶ skewbot-palette-<job>.png
//!                                        │
//! frames ──stdin──▶ [stream] ◀───────────┘
//!                      │
//!                      └──stdout──▶ GIF bytes
//! ```
//!
//! The stream process is written to and drained at the same time; writing
//! every frame before reading would fill its stdout pipe while we block on
//! its stdin pipe.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use skewbot_common::config::EncoderConfig;
use skewbot_common::error::{SkewError, SkewResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::job::{JobId, SourceInput};
use crate::palette::PaletteArtifact;

/// Geometry and timing of the raw frame stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Frames in the schedule, not counting the repeated last frame.
    pub frame_count: usize,
    /// Seconds the last frame is held before the loop restarts.
    pub hold_secs: u32,
}

impl StreamSpec {
    /// Bytes in one raw RGBA frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Timestamp offset added to the repeated last frame, in stream ticks.
    pub fn hold_ticks(&self) -> u64 {
        self.frame_rate as u64 * self.hold_secs as u64
    }

    /// Filter graph: pace frames, apply the palette, and delay the repeated
    /// last frame so the loop pauses on it.
    pub fn filter_graph(&self) -> String {
        format!(
            "fps={rate},paletteuse=alpha_threshold=128,setpts='if(eq(N,{frames}), PTS+{hold}, 1*PTS)'",
            rate = self.frame_rate,
            frames = self.frame_count,
            hold = self.hold_ticks(),
        )
    }
}

/// Trait for the external programs that build palettes and encode frames.
pub trait EncoderBackend: Send + Sync {
    /// Command that reads the source still and writes a palette to
    /// `palette_path`. Receives the source on stdin unless it is a path.
    fn palette_command(&self, source: &SourceInput, palette_path: &Path) -> Command;

    /// Command that reads raw RGBA frames on stdin plus the palette, and
    /// writes the animation to stdout.
    fn stream_command(&self, spec: &StreamSpec, palette_path: &Path) -> Command;

    /// Check if the backend's program can run on this system.
    fn is_available(&self) -> bool;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Encoder backend driving the system `ffmpeg` binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    config: EncoderConfig,
}

impl FfmpegBackend {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.args(["-y", "-loglevel", self.config.loglevel.as_str(), "-hide_banner"]);
        cmd
    }
}

impl EncoderBackend for FfmpegBackend {
    fn palette_command(&self, source: &SourceInput, palette_path: &Path) -> Command {
        let mut cmd = self.base_command();
        cmd.args(["-f", "image2pipe", "-i"]);
        match source.path() {
            Some(path) => cmd.arg(path),
            None => cmd.arg("-"),
        };
        cmd.args(["-vf", "palettegen=reserve_transparent=1"])
            .arg(palette_path);
        cmd
    }

    fn stream_command(&self, spec: &StreamSpec, palette_path: &Path) -> Command {
        let queue_size = self.config.thread_queue_size.to_string();
        let size = format!("{}x{}", spec.width, spec.height);
        let rate = spec.frame_rate.to_string();
        let filter = spec.filter_graph();

        let mut cmd = self.base_command();
        cmd.args([
            "-thread_queue_size",
            queue_size.as_str(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            size.as_str(),
            "-r",
            rate.as_str(),
            "-i",
            "-",
            "-i",
        ])
        .arg(palette_path)
        .args([
            "-filter_complex",
            filter.as_str(),
            "-gifflags",
            "-offsetting",
            "-f",
            "gif",
            "-",
        ]);
        cmd
    }

    fn is_available(&self) -> bool {
        std::process::Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// The subprocess work of one job.
///
/// Every child is spawned with `kill_on_drop`, so dropping a session future
/// mid-flight (timeout, cancellation) terminates whatever is running.
pub struct EncoderSession<'a> {
    backend: &'a dyn EncoderBackend,
    job_id: JobId,
    work_dir: &'a Path,
}

impl<'a> EncoderSession<'a> {
    pub fn new(backend: &'a dyn EncoderBackend, job_id: JobId, work_dir: &'a Path) -> Self {
        Self {
            backend,
            job_id,
            work_dir,
        }
    }

    /// Phase 1: build the palette from the original still.
    ///
    /// The returned guard deletes the palette when dropped.
    pub async fn build_palette(&self, source: &SourceInput) -> SkewResult<PaletteArtifact> {
        let artifact = PaletteArtifact::reserve(self.work_dir, self.job_id);

        let mut cmd = self.backend.palette_command(source, artifact.path());
        let stdin = match source {
            SourceInput::Bytes(_) => Stdio::piped(),
            SourceInput::Path(_) => Stdio::null(),
        };
        cmd.stdin(stdin)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            SkewError::palette(format!(
                "Failed to start {} (is it installed and on PATH?): {e}",
                self.backend.name()
            ))
        })?;
        tracing::debug!(pid = child.id(), source = %source.describe(), "Palette process started");

        let stderr_task = child.stderr.take().map(drain_stderr);
        let stdin = child.stdin.take();

        let feed = async move {
            if let (Some(mut stdin), SourceInput::Bytes(bytes)) = (stdin, source) {
                stdin.write_all(bytes).await.map_err(|e| {
                    SkewError::palette(format!("Failed to write source to palette stdin: {e}"))
                })?;
                stdin.shutdown().await.map_err(|e| {
                    SkewError::palette(format!("Failed to close palette stdin: {e}"))
                })?;
            }
            Ok::<(), SkewError>(())
        };
        let wait = async {
            child
                .wait()
                .await
                .map_err(|e| SkewError::palette(format!("Failed to wait on palette process: {e}")))
        };

        let status = match tokio::try_join!(feed, wait) {
            Ok(((), status)) => status,
            Err(e) => {
                terminate(&mut child, "palette").await;
                return Err(e);
            }
        };

        if !status.success() {
            let stderr = collect_stderr(stderr_task).await;
            return Err(SkewError::palette(format!(
                "{} palette process failed (status {status}): {}",
                self.backend.name(),
                stderr.trim()
            )));
        }

        tracing::debug!(path = %artifact.path().display(), "Palette generated");
        Ok(artifact)
    }

    /// Phase 2: stream frames through the encoder and collect its output.
    ///
    /// Frames are written in the order received; the last one is written a
    /// second time before stdin is closed.
    pub async fn stream_frames(
        &self,
        spec: &StreamSpec,
        palette: &PaletteArtifact,
        frames: mpsc::Receiver<Vec<u8>>,
    ) -> SkewResult<Vec<u8>> {
        if spec.frame_count == 0 {
            return Err(SkewError::invalid_input("No frames to encode"));
        }

        let mut cmd = self.backend.stream_command(spec, palette.path());
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            SkewError::encoding(format!(
                "Failed to start {} (is it installed and on PATH?): {e}",
                self.backend.name()
            ))
        })?;
        tracing::debug!(
            pid = child.id(),
            width = spec.width,
            height = spec.height,
            frames = spec.frame_count,
            "Encoder process started"
        );

        let (stdin, stdout, stderr) = match take_pipes(&mut child) {
            Ok(pipes) => pipes,
            Err(e) => {
                terminate(&mut child, "encoder").await;
                return Err(e);
            }
        };
        let stderr_task = drain_stderr(stderr);

        let streamed = async {
            let (written, output) = tokio::try_join!(
                write_frames(stdin, frames, spec),
                read_output(stdout)
            )?;
            let status = child
                .wait()
                .await
                .map_err(|e| SkewError::encoding(format!("Failed to wait on encoder: {e}")))?;
            Ok::<(usize, Vec<u8>, ExitStatus), SkewError>((written, output, status))
        }
        .await;

        let (written, output, status) = match streamed {
            Ok(done) => done,
            Err(e) => {
                terminate(&mut child, "encoder").await;
                return Err(e);
            }
        };

        let stderr = collect_stderr(Some(stderr_task)).await;
        if !status.success() {
            return Err(SkewError::encoding(format!(
                "{} exited with status {status}: {}",
                self.backend.name(),
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim(), "Encoder diagnostics");
        }

        tracing::debug!(frames = written, bytes = output.len(), "Encoder finished");
        Ok(output)
    }
}

fn take_pipes(child: &mut Child) -> SkewResult<(ChildStdin, ChildStdout, ChildStderr)> {
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| SkewError::encoding("Failed to open encoder stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SkewError::encoding("Failed to capture encoder stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SkewError::encoding("Failed to capture encoder stderr"))?;
    Ok((stdin, stdout, stderr))
}

/// Write every frame from `frames`, then the last one again, then EOF.
async fn write_frames(
    mut stdin: ChildStdin,
    mut frames: mpsc::Receiver<Vec<u8>>,
    spec: &StreamSpec,
) -> SkewResult<usize> {
    let frame_len = spec.frame_len();
    let mut last: Option<Vec<u8>> = None;
    let mut written = 0usize;

    while let Some(frame) = frames.recv().await {
        if frame.len() != frame_len {
            return Err(SkewError::encoding(format!(
                "Frame {written} has {} bytes, expected {frame_len}",
                frame.len()
            )));
        }
        stdin
            .write_all(&frame)
            .await
            .map_err(|e| SkewError::encoding(format!("Failed to write frame {written}: {e}")))?;
        written += 1;
        last = Some(frame);
    }

    if written != spec.frame_count {
        return Err(SkewError::encoding(format!(
            "Frame source stopped after {written} of {} frames",
            spec.frame_count
        )));
    }
    let last = last.ok_or_else(|| SkewError::invalid_input("No frames to encode"))?;

    // Repeated so the setpts filter can retime the final frame.
    stdin
        .write_all(&last)
        .await
        .map_err(|e| SkewError::encoding(format!("Failed to write final frame: {e}")))?;
    written += 1;

    stdin
        .shutdown()
        .await
        .map_err(|e| SkewError::encoding(format!("Failed to close encoder stdin: {e}")))?;
    drop(stdin);

    Ok(written)
}

async fn read_output(mut stdout: ChildStdout) -> SkewResult<Vec<u8>> {
    let mut output = Vec::new();
    stdout
        .read_to_end(&mut output)
        .await
        .map_err(|e| SkewError::encoding(format!("Failed reading encoder output: {e}")))?;
    Ok(output)
}

/// Drain stderr concurrently to avoid the child blocking on a full pipe.
fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut raw = Vec::new();
        match stderr.read_to_end(&mut raw).await {
            Ok(_) => String::from_utf8_lossy(&raw).into_owned(),
            Err(err) => format!("<failed to read stderr: {err}>"),
        }
    })
}

async fn collect_stderr(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string()),
        None => String::new(),
    }
}

/// Kill a child that may still be running and reap it.
async fn terminate(child: &mut Child, what: &str) {
    let pid = child.id();
    if child.start_kill().is_ok() {
        tracing::warn!(pid, "Killing {what} process");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(pid, error = %e, "Failed to reap {what} process");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::PathBuf;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a: &OsStr| a.to_string_lossy().into_owned())
            .collect()
    }

    fn spec() -> StreamSpec {
        StreamSpec {
            width: 143,
            height: 80,
            frame_rate: 50,
            frame_count: 70,
            hold_secs: 4,
        }
    }

    #[test]
    fn test_filter_graph_holds_repeated_frame() {
        assert_eq!(
            spec().filter_graph(),
            "fps=50,paletteuse=alpha_threshold=128,setpts='if(eq(N,70), PTS+200, 1*PTS)'"
        );
        assert_eq!(spec().frame_len(), 143 * 80 * 4);
    }

    #[test]
    fn test_palette_command_reads_stdin_for_bytes() {
        let backend = FfmpegBackend::default();
        let cmd = backend.palette_command(
            &SourceInput::from_bytes(vec![1, 2, 3]),
            Path::new("/work/p.png"),
        );
        let args = args(&cmd);
        assert_eq!(cmd.as_std().get_program(), OsStr::new("ffmpeg"));
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "-");
        assert_eq!(args.last().unwrap(), "/work/p.png");
        assert!(args.contains(&"palettegen=reserve_transparent=1".to_string()));
    }

    #[test]
    fn test_palette_command_uses_path_input() {
        let backend = FfmpegBackend::default();
        let cmd = backend.palette_command(
            &SourceInput::from_path(PathBuf::from("/in/cat.png")),
            Path::new("/work/p.png"),
        );
        let args = args(&cmd);
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[i + 1], "/in/cat.png");
    }

    #[test]
    fn test_stream_command_layout() {
        let backend = FfmpegBackend::default();
        let cmd = backend.stream_command(&spec(), Path::new("/work/p.png"));
        let args = args(&cmd);
        let joined = args.join(" ");
        assert!(joined.contains("-thread_queue_size 32 -f rawvideo -pix_fmt rgba -s 143x80 -r 50 -i - -i /work/p.png"));
        assert!(joined.ends_with("-gifflags -offsetting -f gif -"));
        assert!(args.contains(&spec().filter_graph()));
    }
}
