//! Chatterbox TTS on ONNX Runtime.
//!
//! Adapted from the srv1n/cbx ONNX pipeline: speech encoder for voice
//! conditioning, token embedder plus KV-cached language model as the
//! next-token oracle, conditional decoder as the vocoder.

mod download;
mod engine;

pub use download::{
    ChatterboxPaths, GRAPHS, download_chatterbox_assets, graph_filename,
    local_chatterbox_assets, resolve_chatterbox_assets,
};
pub use engine::{ChatterboxOnnx, LmState};
