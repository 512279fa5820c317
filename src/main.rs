use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use video_enhancer::{
    config::Config,
    extract::{InfoExtractor, YtDlpExtractor},
    server,
    video::Enhancer,
};

#[derive(Parser)]
#[command(
    name = "video-enhancer",
    version,
    about = "Stretch uploaded videos to 2560x1440 and serve them over HTTP",
    long_about = "Video-Enhancer runs a small web backend: uploads are resized frame by frame to 2K, remote video links can be resolved through yt-dlp, and processed files can be downloaded again."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Enhance one video file without the server
    Enhance {
        /// Video to stretch
        input: PathBuf,

        /// Directory to write `<name>_enhanced.avi` into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the direct download link and title of a remote video
    Info {
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Video-Enhancer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.apply_env_overrides();

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.validate()?;

            server::serve(config).await?;
        }
        Command::Enhance { input, output_dir } => {
            if let Some(dir) = output_dir {
                config.storage.processed_dir = dir;
            }
            config.validate()?;

            let enhancer = Enhancer::from_config(&config.enhance)?;
            let output_dir = config.storage.processed_dir.clone();
            info!("Enhancing {:?} into {:?}", input, output_dir);

            let enhanced = tokio::task::spawn_blocking(move || enhancer.enhance(&input, &output_dir))
                .await
                .context("enhancement task panicked")??;

            info!("Done! {} frames at {} fps saved to: {:?}",
                  enhanced.frames_written, enhanced.frame_rate, enhanced.path);
        }
        Command::Info { url } => {
            config.validate()?;

            let extractor = YtDlpExtractor::from_config(&config.extractor);
            let video_info = tokio::task::spawn_blocking(move || extractor.extract(&url))
                .await
                .context("extraction task panicked")??;

            println!("{}", serde_json::to_string_pretty(&video_info)?);
        }
    }

    Ok(())
}
