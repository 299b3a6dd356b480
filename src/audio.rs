//! WAV encoding/decoding and small sample-buffer helpers.

use crate::error::{Result, SpeakerError};
use base64::Engine as _;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

fn mono_pcm16(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_samples<W: Write + Seek>(writer: W, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = hound::WavWriter::new(writer, mono_pcm16(sample_rate))
        .map_err(|e| SpeakerError::Audio(format!("failed to create wav writer: {e}")))?;

    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let v = (clamped * i16::MAX as f32).round() as i16;
        writer
            .write_sample(v)
            .map_err(|e| SpeakerError::Audio(format!("failed to write wav sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| SpeakerError::Audio(format!("failed to finalize wav: {e}")))?;
    Ok(())
}

/// Encode f32 mono samples as an in-memory 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns [`SpeakerError::Audio`] if the WAV writer fails.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    write_samples(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}

/// [`encode_wav`] followed by standard base64.
///
/// # Errors
///
/// Returns [`SpeakerError::Audio`] if the WAV writer fails.
pub fn encode_wav_base64(samples: &[f32], sample_rate: u32) -> Result<String> {
    let wav = encode_wav(samples, sample_rate)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(wav))
}

/// Write f32 mono samples to a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns [`SpeakerError::Audio`] if the file cannot be created or written.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| {
        SpeakerError::Audio(format!("cannot create WAV {}: {e}", path.display()))
    })?;
    write_samples(std::io::BufWriter::new(file), samples, sample_rate)
}

/// Read a WAV file as mono f32 samples, returning the file's sample rate.
///
/// Multi-channel input is averaged down to mono.
///
/// # Errors
///
/// Returns [`SpeakerError::Audio`] if the file cannot be opened or decoded.
pub fn read_wav_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| SpeakerError::Audio(format!("cannot open WAV {}: {e}", path.display())))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map_err(|e| SpeakerError::Audio(format!("WAV read error: {e}")))
                        .map(|v| v as f32 / max)
                })
                .collect::<Result<Vec<f32>>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| SpeakerError::Audio(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
    };

    if spec.channels > 1 {
        let ch = spec.channels as usize;
        let mono = samples
            .chunks(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect();
        Ok((mono, spec.sample_rate))
    } else {
        Ok((samples, spec.sample_rate))
    }
}

/// `ms` milliseconds of digital silence.
pub fn silence(sample_rate: u32, ms: u32) -> Vec<f32> {
    let len = (u64::from(sample_rate) * u64::from(ms) / 1000) as usize;
    vec![0.0; len]
}

/// Linear-interpolation resampler for mono audio.
pub fn resample_linear(input: &[f32], from_sr: u32, to_sr: u32) -> Vec<f32> {
    if input.is_empty() || from_sr == to_sr {
        return input.to_vec();
    }

    let ratio = f64::from(to_sr) / f64::from(from_sr);
    let out_len = ((input.len() as f64) * ratio).round() as usize;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let src_pos = (i as f64) / ratio;
            let i0 = (src_pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let t = (src_pos - i0 as f64) as f32;
            input[i0] * (1.0 - t) + input[i1] * t
        })
        .collect()
}
