//! Render one picture to a warp GIF.

use std::io::Write;
use std::path::{Path, PathBuf};

use skewbot_common::config::AppConfig;
use skewbot_common::error::{FailureKind, SkewError};
use skewbot_render_engine::{JobStage, RenderRequest, Renderer, SourceInput, StageCallback};
use skewbot_warp_core::WarpMode;
use tokio_util::sync::CancellationToken;

/// File extensions accepted as pictures.
const PICTURE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

pub async fn run(
    mut config: AppConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    mode: WarpMode,
    magnitude: Option<f64>,
    concurrency: Option<usize>,
    timeout_secs: Option<f64>,
) -> anyhow::Result<()> {
    if let Some(concurrency) = concurrency {
        config.render.concurrency = concurrency;
    }
    if let Some(timeout_secs) = timeout_secs {
        config.render.base_timeout_secs = timeout_secs;
    }
    config.validate()?;

    if !is_picture(&input) {
        return Err(anyhow::anyhow!("Not a picture :( ({})", input.display()));
    }
    let output_path = output.unwrap_or_else(|| output_path_for(&input, mode, None));

    println!("Rendering: {}", input.display());
    println!("  Mode: {mode}");
    println!("  Output: {}", output_path.display());

    let renderer = Renderer::new(&config);
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let progress: StageCallback = Box::new(|_, stage| {
        if let Some(label) = stage_label(stage) {
            print!("\r  {label:<24}");
            let _ = std::io::stdout().flush();
        }
    });

    let request = RenderRequest::new(SourceInput::from_path(&input), mode, magnitude);
    match renderer.render(request, &cancel, Some(&progress)).await {
        Ok(output) => {
            tokio::fs::write(&output_path, &output.bytes).await?;
            println!(
                "\nDone: {} ({}x{}, {} frames, {:.2}s)",
                output_path.display(),
                output.width,
                output.height,
                output.frames,
                output.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            println!();
            Err(anyhow::anyhow!(failure_message(&e)))
        }
    }
}

/// Whether `path` names a picture by its extension.
pub fn is_picture(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            PICTURE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// `<file name>  but in italics.gif` for skew, `<file name>  but wider.gif`
/// for widen, next to the input or inside `out_dir`.
pub fn output_path_for(input: &Path, mode: WarpMode, out_dir: Option<&Path>) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "picture".to_string());
    let suffix = match mode {
        WarpMode::Skew => "but in italics",
        WarpMode::Widen => "but wider",
    };
    let name = format!("{file_name}  {suffix}.gif");
    match out_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// One-line explanation of a failed render.
pub fn failure_message(error: &SkewError) -> String {
    match error.kind() {
        FailureKind::InvalidInput => format!("Not a picture :( ({error})"),
        FailureKind::Timeout => format!("Took too long, gave up. {error}"),
        FailureKind::Cancelled => "Cancelled.".to_string(),
        FailureKind::PaletteGenerationFailed
        | FailureKind::EncodingFailed
        | FailureKind::Internal => format!("Render failed: {error}"),
    }
}

fn stage_label(stage: JobStage) -> Option<&'static str> {
    match stage {
        JobStage::Queued => Some("Waiting for a slot..."),
        JobStage::Admitted => Some("Preparing canvas..."),
        JobStage::PaletteBuilding => Some("Building palette..."),
        JobStage::Encoding => Some("Encoding frames..."),
        _ => None,
    }
}
