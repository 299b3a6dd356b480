//! Diagnostic token dump: arg-max decode with a repetition penalty, printing
//! every selected speech token.

use chatterbox_speaker::decode::{SpeechTokenDecoder, StepEvent};
use chatterbox_speaker::tts::chatterbox::ChatterboxOnnx;
use chatterbox_speaker::{SamplingConfig, SpeakerConfig, SpeechModel};
use clap::Parser;
use std::path::PathBuf;

/// Print the first speech tokens Chatterbox picks for a text.
#[derive(Parser)]
#[command(name = "debug-tokens", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of decode steps.
    #[arg(long, default_value_t = 20)]
    steps: usize,

    /// Repetition penalty.
    #[arg(long, default_value_t = 1.2)]
    repetition_penalty: f32,

    /// Text to decode.
    #[arg(default_value = "Hi there!")]
    text: String,
}

fn main() -> anyhow::Result<()> {
    chatterbox_speaker::init_tracing();
    let cli = Cli::parse();
    let config = SpeakerConfig::load_or_default(cli.config.as_deref())?;

    let sampling = SamplingConfig {
        temperature: 1.0,
        top_k: 0,
        top_p: 1.0,
        repetition_penalty: cli.repetition_penalty,
        max_steps: cli.steps,
        ..config.sampling
    };
    let mut decoder = SpeechTokenDecoder::diagnostic(sampling)?;

    for line in header_lines(&cli.text, &sampling) {
        println!("{line}");
    }

    let mut model = ChatterboxOnnx::load(&config.model)?;
    let context = model.prefill(&cli.text, sampling.start_token)?;
    println!(
        "Prefilled \"{}\" ({} positions)",
        cli.text,
        context.attention_len()
    );

    let output = decoder.decode_with_observer(&mut model, context, |event| {
        for line in step_lines(event) {
            println!("{line}");
        }
    })?;

    println!(
        "Generated {} tokens ({}): {:?}",
        output.tokens.len(),
        output.finish,
        output.tokens
    );
    Ok(())
}

fn header_lines(text: &str, sampling: &SamplingConfig) -> [String; 3] {
    [
        format!("Generating for: {text}"),
        format!("Start token: {}", sampling.start_token),
        format!("Stop token: {}", sampling.stop_token),
    ]
}

fn step_lines(event: &StepEvent) -> Vec<String> {
    let mut lines = vec![format!("  Step {}: token={}", event.step, event.token)];
    if event.is_stop {
        lines.push("  Hit stop token!".to_owned());
    }
    lines
}
