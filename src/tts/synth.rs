//! Chunked synthesis driver.

use super::{SpeechModel, SpeechService};
use crate::audio::silence;
use crate::config::TextConfig;
use crate::decode::{FinishReason, SamplingConfig, SamplingOverrides, SpeechTokenDecoder};
use crate::error::{Result, SpeakerError};
use crate::text::{sanitize, split_sentences};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-chunk decode summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub text: String,
    pub tokens: usize,
    pub finish: FinishReason,
}

/// Audio for one request.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// Text actually spoken, after sanitising.
    pub text: String,
    /// Mono f32 samples, chunks joined with silence.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub chunks: Vec<ChunkReport>,
}

impl Synthesis {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Owns one loaded model and synthesizes requests against it sequentially.
pub struct Synthesizer<M: SpeechModel> {
    model: M,
    sampling: SamplingConfig,
    text: TextConfig,
    cancel: CancellationToken,
}

impl<M: SpeechModel> Synthesizer<M> {
    /// Wrap a loaded model.
    ///
    /// # Errors
    ///
    /// Returns an error if `sampling` is invalid.
    pub fn new(model: M, sampling: SamplingConfig, text: TextConfig) -> Result<Self> {
        sampling.validate()?;
        Ok(Self {
            model,
            sampling,
            text,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that aborts decoding for this synthesizer.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn sampling(&self) -> &SamplingConfig {
        &self.sampling
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Sanitised text and the chunks it will be spoken in.
    pub fn prepare(&self, text: &str) -> (String, Vec<String>) {
        let cleaned = if self.text.sanitize {
            sanitize(text, &self.text.fallback_greeting)
        } else {
            text.trim().to_owned()
        };
        let chunks = if self.text.split_sentences {
            split_sentences(&cleaned)
        } else if cleaned.is_empty() {
            Vec::new()
        } else {
            vec![cleaned.clone()]
        };
        (cleaned, chunks)
    }

    /// Synthesize `text` with `overrides` applied to the configured sampling.
    ///
    /// # Errors
    ///
    /// Fails on invalid overrides (before the model is touched), empty text,
    /// cancellation, or any model/decoder failure. A failed chunk fails the
    /// whole request.
    pub fn synthesize(&mut self, text: &str, overrides: &SamplingOverrides) -> Result<Synthesis> {
        let sampling = self.sampling.with_overrides(overrides)?;
        let (cleaned, chunks) = self.prepare(text);
        if chunks.is_empty() {
            return Err(SpeakerError::EmptyText);
        }

        let sample_rate = self.model.sample_rate();
        let gap = silence(sample_rate, self.text.chunk_silence_ms);
        let start = std::time::Instant::now();
        info!(chunks = chunks.len(), "synthesizing: \"{cleaned}\"");

        let mut samples = Vec::new();
        let mut reports = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.into_iter().enumerate() {
            let context = self.model.prefill(&chunk, sampling.start_token)?;
            let mut decoder =
                SpeechTokenDecoder::new(sampling)?.with_cancellation(self.cancel.clone());
            let output = decoder.decode(&mut self.model, context)?;

            match output.finish {
                FinishReason::Cancelled => return Err(SpeakerError::Cancelled),
                FinishReason::MaxSteps => warn!(
                    chunk = idx,
                    max_steps = sampling.max_steps,
                    "chunk hit the step limit before the stop token"
                ),
                FinishReason::StopToken => {
                    debug!(chunk = idx, tokens = output.tokens.len(), "chunk decoded")
                }
            }

            let audio = self.model.vocode(&output.tokens)?;
            samples.extend_from_slice(&audio);
            samples.extend_from_slice(&gap);
            reports.push(ChunkReport {
                text: chunk,
                tokens: output.tokens.len(),
                finish: output.finish,
            });
        }

        let synthesis = Synthesis {
            text: cleaned,
            samples,
            sample_rate,
            chunks: reports,
        };
        info!(
            "synthesized {:.2}s of audio in {:.2}s",
            synthesis.duration_secs(),
            start.elapsed().as_secs_f32()
        );
        Ok(synthesis)
    }
}

impl<M: SpeechModel + 'static> SpeechService for Synthesizer<M> {
    fn speak(&mut self, text: &str, overrides: &SamplingOverrides) -> Result<Synthesis> {
        self.synthesize(text, overrides)
    }

    fn cancellation_token(&self) -> Option<CancellationToken> {
        Some(self.cancel.clone())
    }
}
