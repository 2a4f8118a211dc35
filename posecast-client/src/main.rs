//! posecast client entry point.
//!
//! ```text
//! posecast-client                    Run with posecast-client.toml (or defaults)
//! posecast-client --config <path>    Load a custom config TOML
//! posecast-client --server <url>     Override the inference endpoint
//! posecast-client --fps <n>          Override the capture frame rate
//! posecast-client --gen-config       Write default config to stdout
//! posecast-client --write-config     Write default config to the --config path
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use posecast_client::config::ClientConfig;
use posecast_client::service::ClientService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "posecast-client", about = "Stream camera frames to a keypoint inference service")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "posecast-client.toml")]
    config: PathBuf,

    /// WebSocket URL of the inference server.
    #[arg(short, long)]
    server: Option<String>,

    /// Capture frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    write_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }
    if cli.write_config {
        ClientConfig::write_default(&cli.config)?;
        println!("wrote default config to {}", cli.config.display());
        return Ok(());
    }

    let (mut config, source) = ClientConfig::load(&cli.config);
    if let Some(server) = cli.server {
        config.network.server_url = server;
    }
    if let Some(fps) = cli.fps {
        config.capture.fps = fps;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    source.log(&cli.config);

    info!("posecast-client v{}", env!("CARGO_PKG_VERSION"));
    info!("server: {}", config.network.server_url);
    info!(
        "capture: {}x{} @ {} fps, rotation {}",
        config.capture.width, config.capture.height, config.capture.fps, config.capture.rotation
    );
    info!(
        "downsample target: {}x{}",
        config.pipeline.target_width, config.pipeline.target_height
    );

    let service = ClientService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
