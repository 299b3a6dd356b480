//! Config files as users write them.

use chatterbox_speaker::SpeakerConfig;
use std::fs;

#[test]
fn full_config_file_loads() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(
        &path,
        r#"
[sampling]
temperature = 0.3
top_k = 40
top_p = 0.9
repetition_penalty = 1.1
max_steps = 800
seed = 42

[text]
sanitize = false
chunk_silence_ms = 250

[model]
model_dir = "/models/chatterbox"
voice_reference = "/voices/narrator.wav"
variant = "q4"
intra_threads = 2

[server]
host = "127.0.0.1"
port = 9100
"#,
    )
    .unwrap();

    let config = SpeakerConfig::from_file(&path).unwrap();
    assert_eq!(config.sampling.top_k, 40);
    assert_eq!(config.sampling.max_steps, 800);
    assert_eq!(config.sampling.seed, Some(42));
    assert_eq!(config.sampling.stop_token, 6562);
    assert!(!config.text.sanitize);
    assert!(config.text.split_sentences);
    assert_eq!(config.text.chunk_silence_ms, 250);
    assert_eq!(config.model.variant, "q4");
    assert_eq!(config.model.intra_threads, 2);
    assert_eq!(config.model.num_layers, 30);
    assert_eq!(config.server.port, 9100);
}

#[test]
fn saved_defaults_reload_identically() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("speaker").join("config.toml");

    let config = SpeakerConfig::default();
    config.save_to_file(&path).unwrap();
    let reloaded = SpeakerConfig::load_or_default(Some(&path)).unwrap();

    assert_eq!(reloaded.sampling, config.sampling);
    assert_eq!(reloaded.text.fallback_greeting, config.text.fallback_greeting);
    assert_eq!(reloaded.model.repo_id, config.model.repo_id);
    assert_eq!(reloaded.server.host, config.server.host);
}

#[test]
fn default_path_is_namespaced() {
    let path = SpeakerConfig::default_config_path();
    assert!(path.ends_with("chatterbox-speaker/config.toml"));
}
