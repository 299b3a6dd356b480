//! Error types for speech-token decoding.
//!
//! Each variant carries a stable error code that is included in the Display
//! output and accessible via [`DecodeError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Sampling configuration violates its constraints.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The next-token oracle (or its context advance) failed.
    pub const ORACLE_FAILED: &str = "ORACLE_FAILED";
}

/// Failure reported by a [`SpeechTokenOracle`](super::SpeechTokenOracle).
///
/// Oracles wrap whatever their backend raises into a message; the decoder
/// never inspects it beyond propagating it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OracleError {
    message: String,
}

impl OracleError {
    /// Create a new oracle error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The underlying message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors produced by the decoder loop.
///
/// Reaching the step limit is not an error; it is reported through
/// [`FinishReason::MaxSteps`](super::FinishReason::MaxSteps).
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Sampling configuration rejected before any oracle call.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    InvalidConfig(String),

    /// The oracle failed at the given step. Propagated without retry.
    #[error("[{}] step {step}: {source}", error_codes::ORACLE_FAILED)]
    Oracle {
        /// Zero-based decode step at which the failure occurred.
        step: usize,
        /// What the oracle reported.
        #[source]
        source: OracleError,
    },
}

impl DecodeError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => error_codes::CONFIG_INVALID,
            Self::Oracle { .. } => error_codes::ORACLE_FAILED,
        }
    }

    /// Whether this is a configuration error (caller fault).
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    pub(crate) fn oracle(step: usize, message: impl Into<String>) -> Self {
        Self::Oracle {
            step,
            source: OracleError::new(message),
        }
    }
}
