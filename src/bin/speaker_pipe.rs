//! Stdin/stdout speaker binary.
//!
//! Prints `READY` once the model is loaded, then answers each input line with
//! `AUDIO:<base64 WAV>` or `ERROR:<message>` until `EXIT` or EOF.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean protocol channel.

use chatterbox_speaker::pipe::run_stdio_pipe;
use chatterbox_speaker::tts::chatterbox::ChatterboxOnnx;
use chatterbox_speaker::{SpeakerConfig, Synthesizer};
use clap::Parser;
use std::path::PathBuf;

/// Speak lines from stdin, replying with base64 WAV on stdout.
#[derive(Parser)]
#[command(name = "speaker-pipe", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatterbox_speaker::init_tracing();
    let cli = Cli::parse();
    let config = SpeakerConfig::load_or_default(cli.config.as_deref())?;

    tracing::info!("speaker-pipe loading model");
    let model_config = config.model.clone();
    let model = tokio::task::spawn_blocking(move || ChatterboxOnnx::load(&model_config))
        .await
        .map_err(|e| anyhow::anyhow!("model loader panicked: {e}"))??;
    let synthesizer = Synthesizer::new(model, config.sampling, config.text)?;

    let summary = run_stdio_pipe(synthesizer).await.map_err(|e| {
        tracing::error!(error = %e, "speaker-pipe exited with error");
        anyhow::anyhow!("speaker-pipe failed: {e}")
    })?;

    tracing::info!(
        spoken = summary.spoken,
        failed = summary.failed,
        "speaker-pipe shut down cleanly"
    );
    Ok(())
}
