//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{SkewError, SkewResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Rendering pipeline settings.
    pub render: RenderConfig,

    /// External encoder settings.
    pub encoder: EncoderConfig,

    /// Per-caller request limiting.
    pub rate_limit: RateLimitConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Rendering pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of renders allowed to run at the same time.
    pub concurrency: usize,

    /// Deadline for a job that did not have to queue, in seconds.
    pub base_timeout_secs: f64,

    /// Frames in one animation loop.
    pub frame_count: usize,

    /// Playback rate in frames per second.
    pub frame_rate: u32,

    /// How long the last frame is held before the loop restarts.
    pub hold_secs: u32,

    /// Bounding box the source image is shrunk into before warping.
    pub max_source_width: u32,
    pub max_source_height: u32,

    /// Ceiling on `width * height` of the warp canvas.
    pub max_canvas_pixels: u64,

    /// Scratch directory for job-scoped palette files.
    pub work_dir: PathBuf,
}

/// External encoder invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// ffmpeg executable (name on PATH or absolute path).
    pub ffmpeg_path: PathBuf,

    /// Value passed to `-loglevel`.
    pub loglevel: String,

    /// Value passed to `-thread_queue_size` for the raw frame input.
    pub thread_queue_size: u32,
}

/// Sliding-window request limiting for the command layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Actions allowed per caller within one window.
    pub limit: usize,

    /// Window length in seconds.
    pub bucket_secs: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "skewbot=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            base_timeout_secs: 5.0,
            frame_count: 70,
            frame_rate: 50,
            hold_secs: 4,
            max_source_width: 480,
            max_source_height: 480,
            max_canvas_pixels: 480 * 960,
            work_dir: std::env::temp_dir(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            loglevel: "warning".to_string(),
            thread_queue_size: 32,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 3,
            bucket_secs: 60.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl RenderConfig {
    /// Base timeout as a `Duration`.
    pub fn base_timeout(&self) -> std::time::Duration {
        seconds_to_duration(self.base_timeout_secs)
    }
}

impl RateLimitConfig {
    /// Window length as a `Duration`.
    pub fn bucket_time(&self) -> std::time::Duration {
        seconds_to_duration(self.bucket_secs)
    }
}

/// Seconds to `Duration`, clamping negatives to zero and overflow to `Duration::MAX`.
fn seconds_to_duration(secs: f64) -> std::time::Duration {
    std::time::Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(std::time::Duration::MAX)
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults,
    /// then apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file(&config_file_path());
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_file(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Apply `CONCURRENCY`, `LOG_FILE` and `SKEWBOT_FFMPEG` overrides.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.render.concurrency = value,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring invalid CONCURRENCY"),
            }
        }
        if let Some(file) = lookup("LOG_FILE").filter(|f| !f.trim().is_empty()) {
            self.logging.file = Some(PathBuf::from(file));
        }
        if let Some(ffmpeg) = lookup("SKEWBOT_FFMPEG").filter(|f| !f.trim().is_empty()) {
            self.encoder.ffmpeg_path = PathBuf::from(ffmpeg);
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> SkewResult<()> {
        if self.render.concurrency == 0 {
            return Err(SkewError::config("render.concurrency must be at least 1"));
        }
        if self.render.frame_rate == 0 {
            return Err(SkewError::config("render.frame_rate must be non-zero"));
        }
        if self.render.frame_count == 0 {
            return Err(SkewError::config("render.frame_count must be non-zero"));
        }
        let timeout = self.render.base_timeout_secs;
        if !(timeout > 0.0 && std::time::Duration::try_from_secs_f64(timeout).is_ok()) {
            return Err(SkewError::config(
                "render.base_timeout_secs must be a positive number of seconds",
            ));
        }
        if self.render.max_source_width == 0 || self.render.max_source_height == 0 {
            return Err(SkewError::config("render.max_source_* must be non-zero"));
        }
        if self.render.max_canvas_pixels == 0 {
            return Err(SkewError::config("render.max_canvas_pixels must be non-zero"));
        }
        if std::time::Duration::try_from_secs_f64(self.rate_limit.bucket_secs).is_err() {
            return Err(SkewError::config(
                "rate_limit.bucket_secs must be a non-negative number of seconds",
            ));
        }
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&config_path, json)?;
        Ok(config_path)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("skewbot").join("config.json")
}
