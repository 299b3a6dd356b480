//! One-shot speak CLI: synthesize the given text to a WAV file.

use chatterbox_speaker::audio::write_wav;
use chatterbox_speaker::tts::chatterbox::ChatterboxOnnx;
use chatterbox_speaker::{SamplingOverrides, SpeakerConfig, Synthesizer};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Speak text with Chatterbox.
#[derive(Parser)]
#[command(name = "speak", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output WAV path.
    #[arg(short, long, default_value = "speech.wav")]
    out: PathBuf,

    /// Player command to run on the output file (e.g. `afplay`, `aplay`).
    #[arg(long)]
    play: Option<String>,

    /// Sampling temperature override.
    #[arg(long)]
    temperature: Option<f32>,

    /// Seed for reproducible sampling.
    #[arg(long)]
    seed: Option<u64>,

    /// Text to speak.
    #[arg(required = true)]
    text: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    chatterbox_speaker::init_tracing();
    let cli = Cli::parse();
    let config = SpeakerConfig::load_or_default(cli.config.as_deref())?;
    let text = cli.text.join(" ");

    let model = ChatterboxOnnx::load(&config.model)?;
    let mut synthesizer = Synthesizer::new(model, config.sampling, config.text)?;

    let overrides = SamplingOverrides {
        temperature: cli.temperature,
        seed: cli.seed,
        ..SamplingOverrides::default()
    };
    let synthesis = synthesizer.synthesize(&text, &overrides)?;
    write_wav(&cli.out, &synthesis.samples, synthesis.sample_rate)?;
    info!(
        "wrote {:.2}s to {}",
        synthesis.duration_secs(),
        cli.out.display()
    );

    if let Some(player) = cli.play {
        let status = std::process::Command::new(&player).arg(&cli.out).status()?;
        if !status.success() {
            anyhow::bail!("{player} exited with {status}");
        }
    }
    Ok(())
}
