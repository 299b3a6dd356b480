//! Configuration types for the speaker service.

use crate::decode::SamplingConfig;
use crate::error::{Result, SpeakerError};
use crate::text::DEFAULT_FALLBACK_GREETING;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// Speech-token sampling defaults. Requests may override per call.
    pub sampling: SamplingConfig,
    /// Input text cleanup and chunking.
    pub text: TextConfig,
    /// Model assets and runtime layout.
    pub model: ModelConfig,
    /// HTTP front end.
    pub server: ServerConfig,
}

/// Text preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Strip markdown artefacts and prompt scaffolding.
    pub sanitize: bool,
    /// Synthesize sentence by sentence instead of in one pass.
    pub split_sentences: bool,
    /// Silence appended after every chunk, in milliseconds.
    pub chunk_silence_ms: u32,
    /// Spoken instead of leaked prompt scaffolding.
    pub fallback_greeting: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            sanitize: true,
            split_sentences: true,
            chunk_silence_ms: 100,
            fallback_greeting: DEFAULT_FALLBACK_GREETING.to_owned(),
        }
    }
}

/// Chatterbox ONNX model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// HuggingFace repository holding the ONNX export.
    pub repo_id: String,
    /// Weight variant: `fp32`, `fp16`, `q8`, `q4`, `q4f16`.
    pub variant: String,
    /// Load assets from this directory instead of downloading.
    pub model_dir: Option<PathBuf>,
    /// Reference voice WAV used to condition the speaker.
    pub voice_reference: Option<PathBuf>,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
    /// Transformer layers in the language model (one KV pair per layer).
    pub num_layers: usize,
    /// Key/value heads per layer.
    pub num_kv_heads: usize,
    /// Dimension of each head.
    pub head_dim: usize,
    /// Token ids below this value are valid vocoder input.
    pub speech_vocab_size: u32,
    /// Output sample rate of the vocoder in Hz.
    pub sample_rate: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            repo_id: "onnx-community/chatterbox-ONNX".to_owned(),
            variant: "fp32".to_owned(),
            model_dir: None,
            voice_reference: None,
            intra_threads: 1,
            num_layers: 30,
            num_kv_heads: 16,
            head_dim: 64,
            speech_vocab_size: 6561,
            sample_rate: 24_000,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port. 0 picks a free port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8001,
        }
    }
}

impl SpeakerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or carries
    /// invalid sampling values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| SpeakerError::Config(e.to_string()))?;
        config.sampling.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from the default path when it exists,
    /// else defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_config_path();
                if default.is_file() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SpeakerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/chatterbox-speaker/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("chatterbox-speaker")
            .join("config.toml")
    }
}
