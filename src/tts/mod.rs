//! Text-to-speech on top of the speech-token decoder.
//!
//! A [`SpeechModel`] is a next-token oracle that can also build the initial
//! decoding context from text and turn finished token sequences into audio.
//! The [`Synthesizer`] drives one model through sanitising, chunking,
//! decoding and vocoding. Front ends talk to it through [`SpeechService`].

pub mod chatterbox;
mod shared;
mod synth;

pub use shared::{EncodedSpeech, SharedSpeaker, shared, speak_encoded};
pub use synth::{ChunkReport, Synthesis, Synthesizer};

use crate::decode::{SamplingOverrides, SpeechTokenOracle};
use crate::error::Result;
use tokio_util::sync::CancellationToken;

/// A speech-token model with a text front and an audio back.
pub trait SpeechModel: SpeechTokenOracle + Send {
    /// Sample rate of the audio returned by [`vocode`](Self::vocode).
    fn sample_rate(&self) -> u32;

    /// Build the initial decoding context for `text`, ending on `start_token`.
    fn prefill(&mut self, text: &str, start_token: u32) -> Result<Self::Context>;

    /// Render generated speech tokens to mono f32 samples.
    fn vocode(&mut self, tokens: &[u32]) -> Result<Vec<f32>>;
}

/// What the HTTP server and the stdio pipe need from a speaker.
pub trait SpeechService: Send + 'static {
    /// Synthesize `text` with per-request sampling overrides.
    fn speak(&mut self, text: &str, overrides: &SamplingOverrides) -> Result<Synthesis>;

    /// Token that aborts in-flight and future decodes, when supported.
    fn cancellation_token(&self) -> Option<CancellationToken> {
        None
    }
}
