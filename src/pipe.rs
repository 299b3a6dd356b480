//! Stdin/stdout line protocol for the speaker.
//!
//! ```text
//! -> READY                     (once, on start)
//! <- Hello there.              (one request per line; blank lines ignored)
//! -> AUDIO:<base64 WAV>        or   ERROR:<message>
//! <- EXIT                      (or EOF) ends the session
//! ```
//!
//! Stdout is exclusively reserved for the protocol; all diagnostic output
//! (tracing, logs) must be routed to stderr.

use crate::decode::SamplingOverrides;
use crate::error::{Result, SpeakerError};
use crate::tts::{SpeechService, shared, speak_encoded};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

/// Written once the speaker is loaded and listening.
pub const READY: &str = "READY";
/// Request line that ends the session.
pub const EXIT: &str = "EXIT";
/// Prefix of a successful reply.
pub const AUDIO_PREFIX: &str = "AUDIO:";
/// Prefix of a failed reply.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Counts for one pipe session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeSummary {
    pub spoken: usize,
    pub failed: usize,
}

/// Serve requests from `reader` to `writer` until `EXIT` or EOF.
///
/// # Errors
///
/// Returns [`SpeakerError::Channel`] if reading or writing the streams fails.
/// Synthesis failures are reported in-band as `ERROR:` lines.
pub async fn run_pipe<S, R, W>(speaker: S, mut reader: R, mut writer: W) -> Result<PipeSummary>
where
    S: SpeechService,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let speaker = shared(speaker);
    let mut summary = PipeSummary::default();
    write_line(&mut writer, READY).await?;

    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| SpeakerError::Channel(format!("failed to read request: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down pipe");
            break;
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == EXIT {
            tracing::info!("EXIT received; shutting down pipe");
            break;
        }

        let reply = match speak_encoded(
            speaker.clone(),
            text.to_owned(),
            SamplingOverrides::default(),
        )
        .await
        {
            Ok(speech) => {
                summary.spoken += 1;
                format!("{AUDIO_PREFIX}{}", speech.audio_b64)
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(error = %e, "pipe request failed");
                format!("{ERROR_PREFIX}{}", single_line(&e.to_string()))
            }
        };
        write_line(&mut writer, &reply).await?;
    }

    Ok(summary)
}

/// [`run_pipe`] over the process's stdin and stdout.
///
/// # Errors
///
/// Returns [`SpeakerError::Channel`] if stdin or stdout fails.
pub async fn run_stdio_pipe<S: SpeechService>(speaker: S) -> Result<PipeSummary> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    run_pipe(speaker, reader, writer).await
}

fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<()> {
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| SpeakerError::Channel(format!("failed to write reply: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| SpeakerError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| SpeakerError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
