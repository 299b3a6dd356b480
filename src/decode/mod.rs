//! Autoregressive speech-token decoding.
//!
//! A [`SpeechTokenDecoder`] repeatedly asks a [`SpeechTokenOracle`] for the
//! next-token logits, re-weights them through a [`LogitsPipeline`], picks a
//! token and feeds it back, until the stop token is drawn or the step limit
//! is reached.
//!
//! ```text
//! context ──► predict_next_logits ──► penalty ► temperature ► top-k ► top-p ──► select
//!    ▲                                                                          │
//!    └──────────────────────────── advance(token) ◄─────── not stop ◄───────────┘
//! ```

mod config;
mod error;
pub mod logits;
mod sampler;

pub use config::{
    DEFAULT_START_TOKEN, DEFAULT_STOP_TOKEN, MAX_STEPS_LIMIT, SamplingConfig, SamplingOverrides,
};
pub use error::{DecodeError, OracleError, error_codes};
pub use logits::{LogitStage, LogitsPipeline};
pub use sampler::{TokenSampler, TokenSelection, argmax};

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Upper bound on the token buffers reserved before decoding starts.
const PREALLOCATED_STEPS: usize = 2048;

/// Source of next-token scores for the decoder.
///
/// The context is owned by the decode call and threaded through
/// [`advance`](Self::advance) by value; it is dropped when decoding ends.
pub trait SpeechTokenOracle {
    /// Opaque per-sequence state (for transformer backends, the KV cache).
    type Context;

    /// Raw scores over the speech vocabulary for the next position.
    fn predict_next_logits(&mut self, context: &Self::Context) -> Result<Vec<f32>, OracleError>;

    /// Extend the context with `token`.
    fn advance(&mut self, context: Self::Context, token: u32)
    -> Result<Self::Context, OracleError>;
}

/// Why a decode call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The stop token was drawn.
    StopToken,
    /// `max_steps` tokens were produced.
    MaxSteps,
    /// The cancellation token fired between steps.
    Cancelled,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StopToken => "stop_token",
            Self::MaxSteps => "max_steps",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Result of one decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutput {
    /// Generated tokens, stop token excluded.
    pub tokens: Vec<u32>,
    pub finish: FinishReason,
}

/// Reported to a step observer for every selected token, stop token included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEvent {
    pub step: usize,
    pub token: u32,
    pub is_stop: bool,
}

/// The decoder loop, configured once and reusable across calls.
#[derive(Debug)]
pub struct SpeechTokenDecoder {
    config: SamplingConfig,
    pipeline: LogitsPipeline,
    sampler: TokenSampler,
    cancel: Option<CancellationToken>,
}

impl SpeechTokenDecoder {
    /// Multinomial decoder.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: SamplingConfig) -> Result<Self, DecodeError> {
        Self::with_selection(config, TokenSelection::Multinomial)
    }

    /// Arg-max decoder for diagnostics. Same pipeline and stopping rules.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidConfig`] if `config` fails validation.
    pub fn diagnostic(config: SamplingConfig) -> Result<Self, DecodeError> {
        Self::with_selection(config, TokenSelection::ArgMax)
    }

    /// Decoder with an explicit selection mode.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidConfig`] if `config` fails validation.
    pub fn with_selection(
        config: SamplingConfig,
        selection: TokenSelection,
    ) -> Result<Self, DecodeError> {
        config.validate()?;
        Ok(Self {
            pipeline: LogitsPipeline::from_config(&config),
            sampler: TokenSampler::new(selection, config.seed),
            config,
            cancel: None,
        })
    }

    /// Stop between steps once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn selection(&self) -> TokenSelection {
        self.sampler.selection()
    }

    /// Decode from `context` until the stop token or the step limit.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Oracle`] as soon as the oracle fails.
    pub fn decode<O: SpeechTokenOracle>(
        &mut self,
        oracle: &mut O,
        context: O::Context,
    ) -> Result<DecodeOutput, DecodeError> {
        self.decode_with_observer(oracle, context, |_| {})
    }

    /// Like [`decode`](Self::decode), calling `observer` after every selection.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Oracle`] as soon as the oracle fails.
    pub fn decode_with_observer<O, F>(
        &mut self,
        oracle: &mut O,
        context: O::Context,
        mut observer: F,
    ) -> Result<DecodeOutput, DecodeError>
    where
        O: SpeechTokenOracle,
        F: FnMut(&StepEvent),
    {
        let max_steps = self.config.max_steps;
        let stop_token = self.config.stop_token;

        let reserve = max_steps.min(PREALLOCATED_STEPS);
        let mut history = Vec::with_capacity(reserve + 1);
        history.push(self.config.start_token);
        let mut tokens = Vec::with_capacity(reserve);

        let mut context = context;
        let finish = loop {
            let step = tokens.len();
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                break FinishReason::Cancelled;
            }

            let mut logits = next_logits(oracle, &context, step)?;
            self.pipeline.apply(&mut logits, &history);
            let token = self.sampler.select(&logits).ok_or_else(|| {
                DecodeError::oracle(step, "logits admit no distribution after filtering")
            })?;

            let is_stop = token == stop_token;
            observer(&StepEvent {
                step,
                token,
                is_stop,
            });
            if is_stop {
                break FinishReason::StopToken;
            }

            tokens.push(token);
            history.push(token);
            if tokens.len() == max_steps {
                break FinishReason::MaxSteps;
            }

            context = oracle
                .advance(context, token)
                .map_err(|source| DecodeError::Oracle { step, source })?;
        };

        debug!(tokens = tokens.len(), finish = %finish, "speech-token decode finished");
        Ok(DecodeOutput { tokens, finish })
    }
}

/// Validate `config`, then decode with multinomial selection.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidConfig`] before touching `oracle`, or
/// [`DecodeError::Oracle`] if the oracle fails mid-decode.
pub fn decode_speech_tokens<O: SpeechTokenOracle>(
    oracle: &mut O,
    context: O::Context,
    config: &SamplingConfig,
) -> Result<DecodeOutput, DecodeError> {
    SpeechTokenDecoder::new(*config)?.decode(oracle, context)
}

fn next_logits<O: SpeechTokenOracle>(
    oracle: &mut O,
    context: &O::Context,
    step: usize,
) -> Result<Vec<f32>, DecodeError> {
    let logits = oracle
        .predict_next_logits(context)
        .map_err(|source| DecodeError::Oracle { step, source })?;
    if logits.is_empty() {
        return Err(DecodeError::oracle(step, "oracle returned empty logits"));
    }
    if logits.iter().any(|v| v.is_nan()) {
        return Err(DecodeError::oracle(step, "oracle returned NaN logits"));
    }
    Ok(logits)
}
