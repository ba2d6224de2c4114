//! Skewbot CLI: turn still pictures into looping skew and widen GIFs.
//!
//! Usage:
//!   skewbot render <INPUT>       Render one picture
//!   skewbot batch <INPUTS...>    Render several pictures through one shared gate
//!   skewbot check                Check that the encoder is available
//!   skewbot config               Show (or write) the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use skewbot_common::config::AppConfig;
use skewbot_warp_core::WarpMode;

mod commands;

#[derive(Parser)]
#[command(
    name = "skewbot",
    about = "Picture, but in italics",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one picture to a warp GIF
    Render {
        /// Path to the picture
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Warp mode: skew|widen
        #[arg(long, default_value = "skew")]
        mode: WarpMode,

        /// Final warp magnitude (radians for skew, ratio for widen)
        #[arg(long)]
        magnitude: Option<f64>,

        /// Renders allowed to run at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Base render timeout (seconds)
        #[arg(long)]
        timeout_secs: Option<f64>,
    },

    /// Render several pictures concurrently, rate-limited per caller
    Batch {
        /// Paths to the pictures
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Caller the rate limit applies to
        #[arg(long, default_value = "local")]
        caller: String,

        /// Directory for the GIFs (defaults to next to each input)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Warp mode: skew|widen
        #[arg(long, default_value = "skew")]
        mode: WarpMode,

        /// Final warp magnitude (radians for skew, ratio for widen)
        #[arg(long)]
        magnitude: Option<f64>,
    },

    /// Check that the configured encoder can run
    Check,

    /// Print the effective configuration
    Config {
        /// Save it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    skewbot_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Render {
            input,
            output,
            mode,
            magnitude,
            concurrency,
            timeout_secs,
        } => {
            commands::render::run(
                config,
                input,
                output,
                mode,
                magnitude,
                concurrency,
                timeout_secs,
            )
            .await
        }
        Commands::Batch {
            inputs,
            caller,
            out_dir,
            mode,
            magnitude,
        } => commands::batch::run(config, inputs, caller, out_dir, mode, magnitude).await,
        Commands::Check => commands::check::run(&config),
        Commands::Config { write } => commands::config::run(&config, write),
    }
}
