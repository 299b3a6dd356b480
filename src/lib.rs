//! Chatterbox speaker: text-to-speech service around an autoregressive
//! speech-token decoder.
//!
//! Text → sanitise → sentence chunks → T3 speech tokens → S3Gen vocoder → WAV
//!
//! # Architecture
//!
//! - **Decode**: the sampling loop over an opaque next-token oracle
//!   (repetition penalty, temperature, top-k, top-p, stop token, step cap)
//! - **TTS**: the [`tts::SpeechModel`] seam and the chunking [`tts::Synthesizer`],
//!   with a Chatterbox backend on ONNX Runtime via `ort`
//! - **Front ends**: an `axum` HTTP server and a stdin/stdout line pipe

pub mod audio;
pub mod config;
pub mod decode;
pub mod error;
pub mod pipe;
pub mod server;
pub mod text;
pub mod tts;

pub use config::SpeakerConfig;
pub use decode::{
    DecodeError, DecodeOutput, FinishReason, SamplingConfig, SamplingOverrides,
    SpeechTokenDecoder, SpeechTokenOracle,
};
pub use error::{Result, SpeakerError};
pub use tts::{SpeechModel, SpeechService, Synthesizer};

/// Install the stderr `tracing` subscriber used by every binary.
///
/// `RUST_LOG` takes precedence over the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("chatterbox_speaker=info,ort=warn")
            }),
        )
        .init();
}
