//! Check that the encoder can run.

use skewbot_common::config::AppConfig;
use skewbot_render_engine::{EncoderBackend, FfmpegBackend};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Skewbot System Check");
    println!("{}", "=".repeat(50));

    let backend = FfmpegBackend::new(config.encoder.clone());
    let encoder_ok = backend.is_available();
    if encoder_ok {
        println!(
            "[OK] Encoder: {} ({})",
            backend.name(),
            config.encoder.ffmpeg_path.display()
        );
    } else {
        println!(
            "[FAIL] Encoder: {} not runnable at {}",
            backend.name(),
            config.encoder.ffmpeg_path.display()
        );
        println!("       Install ffmpeg or set SKEWBOT_FFMPEG to its path.");
    }

    let work_dir = &config.render.work_dir;
    let work_dir_ok = work_dir.is_dir();
    if work_dir_ok {
        println!("[OK] Work directory: {}", work_dir.display());
    } else {
        println!("[FAIL] Work directory missing: {}", work_dir.display());
    }

    match config.validate() {
        Ok(()) => println!("[OK] Configuration is valid"),
        Err(e) => println!("[FAIL] {e}"),
    }

    println!(
        "     Concurrency: {}, base timeout: {:.1}s",
        config.render.concurrency, config.render.base_timeout_secs
    );

    println!();
    if encoder_ok && work_dir_ok && config.validate().is_ok() {
        println!("Skewbot is ready.");
        Ok(())
    } else {
        Err(anyhow::anyhow!("Some checks failed. See above for fixes."))
    }
}
