//! Render several pictures concurrently through one shared renderer.

use std::path::PathBuf;
use std::sync::Arc;

use skewbot_common::config::AppConfig;
use skewbot_common::RateLimiter;
use skewbot_render_engine::{RenderRequest, Renderer, SourceInput};
use skewbot_warp_core::WarpMode;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::render::{failure_message, is_picture, output_path_for};

/// Outcome of one batch entry.
#[derive(Debug)]
enum Outcome {
    Rendered(PathBuf),
    Skipped(String),
    Failed(String),
}

pub async fn run(
    config: AppConfig,
    inputs: Vec<PathBuf>,
    caller: String,
    out_dir: Option<PathBuf>,
    mode: WarpMode,
    magnitude: Option<f64>,
) -> anyhow::Result<()> {
    config.validate()?;
    if let Some(dir) = &out_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let renderer = Arc::new(Renderer::new(&config));
    let limiter = RateLimiter::from_config(&config.rate_limit);
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    println!(
        "Submitting {} picture(s) as '{caller}' (concurrency {}, base timeout {:.1}s, limit {} per {:.0}s)",
        inputs.len(),
        renderer.gate().capacity(),
        renderer.timeout_policy().base().as_secs_f64(),
        limiter.limit(),
        limiter.bucket_time().as_secs_f64()
    );

    let mut jobs = JoinSet::new();
    let mut outcomes: Vec<(usize, PathBuf, Outcome)> = Vec::new();

    for (index, input) in inputs.into_iter().enumerate() {
        if !is_picture(&input) {
            outcomes.push((index, input, Outcome::Skipped("not a picture".to_string())));
            continue;
        }
        if !limiter.add(&caller) {
            let wait = limiter
                .retry_after(&caller)
                .map(|d| format!(", retry in {:.0}s", d.as_secs_f64().ceil()))
                .unwrap_or_default();
            tracing::info!(caller = %caller, input = %input.display(), "Rate limited");
            outcomes.push((index, input, Outcome::Skipped(format!("rate limited{wait}"))));
            continue;
        }

        let renderer = renderer.clone();
        let cancel = cancel.clone();
        let output_path = output_path_for(&input, mode, out_dir.as_deref());
        jobs.spawn(async move {
            let request = RenderRequest::new(SourceInput::from_path(&input), mode, magnitude);
            let outcome = match renderer.render(request, &cancel, None).await {
                Ok(output) => match tokio::fs::write(&output_path, &output.bytes).await {
                    Ok(()) => Outcome::Rendered(output_path),
                    Err(e) => Outcome::Failed(format!(
                        "Failed to write {}: {e}",
                        output_path.display()
                    )),
                },
                Err(e) => Outcome::Failed(failure_message(&e)),
            };
            (index, input, outcome)
        });
    }

    while let Some(joined) = jobs.join_next().await {
        outcomes.push(joined?);
    }
    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut failures = 0usize;
    for (_, input, outcome) in &outcomes {
        match outcome {
            Outcome::Rendered(path) => {
                println!("[OK]   {} -> {}", input.display(), path.display())
            }
            Outcome::Skipped(reason) => println!("[SKIP] {}: {reason}", input.display()),
            Outcome::Failed(reason) => {
                failures += 1;
                println!("[FAIL] {}: {reason}", input.display());
            }
        }
    }

    if failures > 0 {
        return Err(anyhow::anyhow!("{failures} render(s) failed"));
    }
    Ok(())
}
