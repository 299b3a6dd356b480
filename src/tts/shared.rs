//! One speaker shared between async front ends.
//!
//! The model is not reentrant, so requests take turns on a mutex. Synthesis
//! runs on the blocking pool to keep the runtime responsive.

use super::SpeechService;
use crate::audio::encode_wav_base64;
use crate::decode::SamplingOverrides;
use crate::error::{Result, SpeakerError};
use std::sync::{Arc, Mutex};

/// A speaker behind a mutex, cloneable across tasks.
pub type SharedSpeaker<S> = Arc<Mutex<S>>;

/// Wrap a speaker for sharing.
pub fn shared<S: SpeechService>(speaker: S) -> SharedSpeaker<S> {
    Arc::new(Mutex::new(speaker))
}

/// Synthesized speech as a base64 WAV payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSpeech {
    /// Text actually spoken, after sanitising.
    pub text: String,
    /// Base64 of a 16-bit PCM mono WAV file.
    pub audio_b64: String,
    pub sample_rate: u32,
}

/// Synthesize on the blocking pool and encode the result.
///
/// # Errors
///
/// Returns the synthesis error, or [`SpeakerError::Channel`] if the worker
/// panicked or the lock is poisoned.
pub async fn speak_encoded<S: SpeechService>(
    speaker: SharedSpeaker<S>,
    text: String,
    overrides: SamplingOverrides,
) -> Result<EncodedSpeech> {
    tokio::task::spawn_blocking(move || -> Result<EncodedSpeech> {
        let mut guard = speaker
            .lock()
            .map_err(|_| SpeakerError::Channel("speaker lock poisoned".to_owned()))?;
        let synthesis = guard.speak(&text, &overrides)?;
        drop(guard);
        let audio_b64 = encode_wav_base64(&synthesis.samples, synthesis.sample_rate)?;
        Ok(EncodedSpeech {
            text: synthesis.text,
            audio_b64,
            sample_rate: synthesis.sample_rate,
        })
    })
    .await
    .map_err(|e| SpeakerError::Channel(format!("synthesis task failed: {e}")))?
}
