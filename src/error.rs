//! Error types for the speaker service.

use crate::decode::DecodeError;

/// Top-level error type for text-to-speech requests.
#[derive(Debug, thiserror::Error)]
pub enum SpeakerError {
    /// Speech-token decoding failed (bad sampling config or oracle fault).
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Request body could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Nothing left to synthesize after sanitising and chunking.
    #[error("no text to synthesize")]
    EmptyText,

    /// The request was cancelled while decoding.
    #[error("synthesis cancelled")]
    Cancelled,

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Model download or loading error.
    #[error("model error: {0}")]
    Model(String),

    /// WAV encoding or decoding error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// HTTP server error.
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeakerError {
    /// Whether the error was caused by the caller's input rather than the model.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Decode(e) => e.is_config_error(),
            Self::InvalidRequest(_) | Self::EmptyText => true,
            _ => false,
        }
    }

    /// Stable machine-readable code for protocol responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(e) => e.code(),
            Self::InvalidRequest(_) => "REQUEST_INVALID",
            Self::EmptyText => "EMPTY_TEXT",
            Self::Cancelled => "CANCELLED",
            Self::Tts(_) => "TTS_FAILED",
            Self::Model(_) => "MODEL_FAILED",
            Self::Audio(_) => "AUDIO_FAILED",
            Self::Config(_) => "CONFIG_INVALID",
            Self::Channel(_) => "CHANNEL_FAILED",
            Self::Server(_) => "SERVER_FAILED",
            Self::Io(_) => "IO_FAILED",
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SpeakerError>;
