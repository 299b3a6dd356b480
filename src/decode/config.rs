//! Sampling configuration for the decoder loop.

use super::error::DecodeError;
use serde::{Deserialize, Serialize};

/// Speech token that opens every generated sequence.
pub const DEFAULT_START_TOKEN: u32 = 6561;

/// Speech token that terminates generation.
pub const DEFAULT_STOP_TOKEN: u32 = 6562;

/// Largest accepted `max_steps`; the speech positions of the language model
/// run out beyond it.
pub const MAX_STEPS_LIMIT: usize = 4096;

/// Knobs for one decode call.
///
/// `top_k == 0`, `top_p == 1.0`, `repetition_penalty == 1.0` and
/// `temperature == 1.0` each disable their stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Divisor applied to every score before truncation. Must be > 0.
    pub temperature: f32,
    /// Keep only the `top_k` highest-scoring tokens. 0 disables.
    pub top_k: usize,
    /// Nucleus mass to keep, in (0, 1]. 1.0 disables.
    pub top_p: f32,
    /// Penalty for tokens already in the history. Must be >= 1.0.
    pub repetition_penalty: f32,
    /// Maximum number of tokens to generate. In `1..=MAX_STEPS_LIMIT`.
    pub max_steps: usize,
    /// Token id seeded into the history before the first step.
    pub start_token: u32,
    /// Token id that ends generation. Never part of the output.
    pub stop_token: u32,
    /// Seed for multinomial sampling. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_k: 50,
            top_p: 0.95,
            repetition_penalty: 1.2,
            max_steps: 1500,
            start_token: DEFAULT_START_TOKEN,
            stop_token: DEFAULT_STOP_TOKEN,
            seed: None,
        }
    }
}

impl SamplingConfig {
    /// Check every field against its constraint.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(DecodeError::InvalidConfig(format!(
                "temperature must be > 0, got {}",
                self.temperature
            )));
        }
        if !self.top_p.is_finite() || self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(DecodeError::InvalidConfig(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if !self.repetition_penalty.is_finite() || self.repetition_penalty < 1.0 {
            return Err(DecodeError::InvalidConfig(format!(
                "repetition_penalty must be >= 1.0, got {}",
                self.repetition_penalty
            )));
        }
        if self.max_steps == 0 || self.max_steps > MAX_STEPS_LIMIT {
            return Err(DecodeError::InvalidConfig(format!(
                "max_steps must be in 1..={MAX_STEPS_LIMIT}, got {}",
                self.max_steps
            )));
        }
        Ok(())
    }

    /// Return a copy with `overrides` applied, validated.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidConfig`] if an override is out of range
    /// (including a negative `top_k`).
    pub fn with_overrides(&self, overrides: &SamplingOverrides) -> Result<Self, DecodeError> {
        let mut merged = *self;
        if let Some(t) = overrides.temperature {
            merged.temperature = t;
        }
        if let Some(k) = overrides.top_k {
            merged.top_k = usize::try_from(k).map_err(|_| {
                DecodeError::InvalidConfig(format!("top_k must be non-negative, got {k}"))
            })?;
        }
        if let Some(p) = overrides.top_p {
            merged.top_p = p;
        }
        if let Some(p) = overrides.repetition_penalty {
            merged.repetition_penalty = p;
        }
        if let Some(n) = overrides.max_steps {
            merged.max_steps = n;
        }
        if overrides.seed.is_some() {
            merged.seed = overrides.seed;
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// Per-request overrides for a [`SamplingConfig`].
///
/// `top_k` is signed so that a negative request value reaches validation
/// instead of failing deserialization with an opaque message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl SamplingOverrides {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
