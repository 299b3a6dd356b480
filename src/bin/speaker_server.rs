//! HTTP speaker server binary.
//!
//! Loads the Chatterbox model once, then serves `POST /speak` until Ctrl-C.

use chatterbox_speaker::server::SpeakerServer;
use chatterbox_speaker::tts::chatterbox::ChatterboxOnnx;
use chatterbox_speaker::{SpeakerConfig, Synthesizer};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Serve Chatterbox text-to-speech over HTTP.
#[derive(Parser)]
#[command(name = "speaker-server", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatterbox_speaker::init_tracing();
    let cli = Cli::parse();

    let mut config = SpeakerConfig::load_or_default(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let model_config = config.model.clone();
    let model = tokio::task::spawn_blocking(move || ChatterboxOnnx::load(&model_config))
        .await
        .map_err(|e| anyhow::anyhow!("model loader panicked: {e}"))??;
    let synthesizer = Synthesizer::new(model, config.sampling, config.text.clone())?;

    let server = SpeakerServer::start(synthesizer, &config.server).await?;
    info!("ready on port {}", server.port());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    server.shutdown();
    Ok(())
}
