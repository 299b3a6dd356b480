//! Line protocol of the stdin/stdout pipe, driven through in-memory streams.

use crate::helpers::fake_synthesizer;
use base64::Engine as _;
use chatterbox_speaker::pipe::{AUDIO_PREFIX, ERROR_PREFIX, READY, run_pipe};
use tokio::io::BufReader;

async fn session(input: &str) -> (Vec<String>, chatterbox_speaker::pipe::PipeSummary) {
    let reader = BufReader::new(input.as_bytes());
    let mut out = Vec::new();
    let summary = run_pipe(fake_synthesizer(), reader, &mut out).await.unwrap();
    let lines = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect();
    (lines, summary)
}

#[tokio::test]
async fn ready_is_written_first() {
    let (lines, summary) = session("").await;
    assert_eq!(lines, vec![READY]);
    assert_eq!(summary.spoken, 0);
}

#[tokio::test]
async fn each_line_gets_one_audio_reply() {
    let (lines, summary) = session("Hello there.\nSecond line!\n").await;
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], READY);
    for reply in &lines[1..] {
        let b64 = reply.strip_prefix(AUDIO_PREFIX).expect("audio reply");
        let wav = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        assert_eq!(&wav[..4], b"RIFF");
    }
    assert_eq!(summary.spoken, 2);
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let (lines, _) = session("\n   \nHi.\n\n").await;
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with(AUDIO_PREFIX));
}

#[tokio::test]
async fn exit_ends_the_session() {
    let (lines, summary) = session("Hi.\nEXIT\nNever spoken.\n").await;
    assert_eq!(lines.len(), 2);
    assert_eq!(summary.spoken, 1);
}

#[tokio::test]
async fn failures_are_reported_in_band() {
    let (lines, summary) = session("this will fail\n**\nOkay.\n").await;
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with(ERROR_PREFIX));
    assert!(lines[1].contains("prefill exploded"));
    assert_eq!(lines[2], format!("{ERROR_PREFIX}no text to synthesize"));
    assert!(lines[3].starts_with(AUDIO_PREFIX));
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.spoken, 1);
}

#[tokio::test]
async fn surrounding_whitespace_is_trimmed() {
    let (lines, summary) = session("   EXIT   \nHi.\n").await;
    assert_eq!(lines, vec![READY]);
    assert_eq!(summary.spoken, 0);
}
