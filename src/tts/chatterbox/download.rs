//! Model asset resolution: local directory or HuggingFace Hub.

use crate::config::ModelConfig;
use crate::error::{Result, SpeakerError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The four ONNX graphs of the export, in load order.
pub const GRAPHS: [&str; 4] = [
    "speech_encoder",
    "embed_tokens",
    "language_model",
    "conditional_decoder",
];

/// Paths to the Chatterbox assets.
#[derive(Debug, Clone)]
pub struct ChatterboxPaths {
    pub tokenizer_json: PathBuf,
    pub speech_encoder: PathBuf,
    pub embed_tokens: PathBuf,
    pub language_model: PathBuf,
    pub conditional_decoder: PathBuf,
}

/// Map a variant name to the ONNX filename of `graph` inside `onnx/`.
pub fn graph_filename(graph: &str, variant: &str) -> String {
    let suffix = match variant {
        "fp32" => "",
        "fp16" => "_fp16",
        "q8" | "quantized" => "_quantized",
        "q4" => "_q4",
        "q4f16" => "_q4f16",
        _ => {
            info!("unknown model variant '{variant}', falling back to fp32");
            ""
        }
    };
    format!("onnx/{graph}{suffix}.onnx")
}

/// Resolve assets under a local directory laid out like the hub repo.
///
/// # Errors
///
/// Returns [`SpeakerError::Model`] naming the first missing file.
pub fn local_chatterbox_assets(dir: &Path, variant: &str) -> Result<ChatterboxPaths> {
    let existing = |rel: &str| -> Result<PathBuf> {
        let path = dir.join(rel);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SpeakerError::Model(format!(
                "missing model file: {}",
                path.display()
            )))
        }
    };

    Ok(ChatterboxPaths {
        tokenizer_json: existing("tokenizer.json")?,
        speech_encoder: existing(&graph_filename(GRAPHS[0], variant))?,
        embed_tokens: existing(&graph_filename(GRAPHS[1], variant))?,
        language_model: existing(&graph_filename(GRAPHS[2], variant))?,
        conditional_decoder: existing(&graph_filename(GRAPHS[3], variant))?,
    })
}

/// Download (or verify cache of) all Chatterbox assets from HuggingFace Hub.
///
/// `HF_TOKEN` is forwarded when set. Graphs larger than 2 GB ship their
/// weights in a sibling `*.onnx_data` file, which is fetched alongside when
/// the repo has one.
///
/// # Errors
///
/// Returns an error if the API cannot be initialised or any required download fails.
pub fn download_chatterbox_assets(repo_id: &str, variant: &str) -> Result<ChatterboxPaths> {
    let mut builder = hf_hub::api::sync::ApiBuilder::new();
    if let Ok(token) = std::env::var("HF_TOKEN")
        && !token.is_empty()
    {
        builder = builder.with_token(Some(token));
    }
    let api = builder
        .build()
        .map_err(|e| SpeakerError::Model(format!("HF Hub API init failed: {e}")))?;
    let repo = api.model(repo_id.to_owned());

    let fetch = |file: &str| -> Result<PathBuf> {
        info!("ensuring {repo_id}/{file}");
        repo.get(file)
            .map_err(|e| SpeakerError::Model(format!("failed to download {file}: {e}")))
    };
    let fetch_graph = |graph: &str| -> Result<PathBuf> {
        let file = graph_filename(graph, variant);
        let path = fetch(&file)?;
        let data = format!("{file}_data");
        if let Err(e) = repo.get(&data) {
            debug!("no external data for {file}: {e}");
        }
        Ok(path)
    };

    Ok(ChatterboxPaths {
        tokenizer_json: fetch("tokenizer.json")?,
        speech_encoder: fetch_graph(GRAPHS[0])?,
        embed_tokens: fetch_graph(GRAPHS[1])?,
        language_model: fetch_graph(GRAPHS[2])?,
        conditional_decoder: fetch_graph(GRAPHS[3])?,
    })
}

/// Local directory when configured, hub download otherwise.
///
/// # Errors
///
/// Returns an error if the assets cannot be found or downloaded.
pub fn resolve_chatterbox_assets(config: &ModelConfig) -> Result<ChatterboxPaths> {
    match &config.model_dir {
        Some(dir) => local_chatterbox_assets(dir, &config.variant),
        None => download_chatterbox_assets(&config.repo_id, &config.variant),
    }
}
