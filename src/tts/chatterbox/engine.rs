//! Chatterbox ONNX inference engine.
//!
//! Four graphs cooperate: the speech encoder turns a reference voice into
//! conditioning once at load time; `embed_tokens` and `language_model` act as
//! the next-token oracle (with a KV cache carried in [`LmState`]); the
//! conditional decoder renders finished speech tokens to 24 kHz audio.

use super::download::{ChatterboxPaths, resolve_chatterbox_assets};
use crate::audio::{read_wav_mono, resample_linear};
use crate::config::ModelConfig;
use crate::decode::{OracleError, SpeechTokenOracle};
use crate::error::{Result, SpeakerError};
use crate::tts::SpeechModel;
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::{DynValue, Tensor};
use std::collections::HashMap;
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Appended after generated tokens so the vocoder fades out cleanly.
const SILENCE_TOKEN: i64 = 4299;
const TRAILING_SILENCE_TOKENS: usize = 3;

/// Owned tensor contents, rebuilt into an ort value per call.
#[derive(Debug, Clone)]
struct TensorF32 {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl TensorF32 {
    fn to_value(&self) -> Result<DynValue> {
        Ok(Tensor::from_array((self.shape.clone(), self.data.clone()))
            .map_err(|e| SpeakerError::Tts(format!("failed to build tensor: {e}")))?
            .into_dyn())
    }

    fn seq_len(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(0)
    }
}

/// Speaker conditioning derived from the reference voice.
#[derive(Debug, Clone)]
struct VoiceConditioning {
    /// Prepended to the text embeddings on prefill.
    cond_emb: TensorF32,
    /// Speech tokens of the reference clip, prepended for the vocoder.
    prompt_tokens: Vec<i64>,
    speaker_embeddings: TensorF32,
    speaker_features: TensorF32,
}

/// KV cache geometry of the language model.
#[derive(Debug, Clone, Copy)]
struct KvLayout {
    num_layers: usize,
    num_kv_heads: usize,
    head_dim: usize,
}

impl KvLayout {
    fn past_names(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.num_layers).flat_map(|layer| {
            [
                format!("past_key_values.{layer}.key"),
                format!("past_key_values.{layer}.value"),
            ]
        })
    }
}

/// Decoding state for one sequence: the KV cache plus the logits it produced.
pub struct LmState {
    past: Vec<(String, DynValue)>,
    attention_len: usize,
    next_position: i64,
    logits: Vec<f32>,
}

impl LmState {
    /// Tokens (conditioning, text and speech) held in the cache.
    pub fn attention_len(&self) -> usize {
        self.attention_len
    }
}

/// Chatterbox TTS engine backed by ONNX Runtime.
pub struct ChatterboxOnnx {
    tokenizer: Tokenizer,
    embed_tokens: Session,
    language_model: Session,
    conditional_decoder: Session,
    voice: VoiceConditioning,
    layout: KvLayout,
    speech_vocab_size: u32,
    sample_rate: u32,
}

impl ChatterboxOnnx {
    /// Resolve assets (local or hub) and load the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if assets are missing, a graph fails to load, or the
    /// reference voice cannot be encoded.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let paths = resolve_chatterbox_assets(config)?;
        Self::from_paths(&paths, config)
    }

    /// Load the engine from already-resolved asset paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a graph fails to load, no voice reference is
    /// configured, or the reference voice cannot be encoded.
    pub fn from_paths(paths: &ChatterboxPaths, config: &ModelConfig) -> Result<Self> {
        let voice_path = config.voice_reference.as_deref().ok_or_else(|| {
            SpeakerError::Config("model.voice_reference is required".to_owned())
        })?;

        info!("loading Chatterbox ONNX graphs ({})", config.variant);
        let threads = config.intra_threads.max(1);
        let mut speech_encoder = load_session(&paths.speech_encoder, threads)?;
        let embed_tokens = load_session(&paths.embed_tokens, threads)?;
        let language_model = load_session(&paths.language_model, threads)?;
        let conditional_decoder = load_session(&paths.conditional_decoder, threads)?;

        info!("loading tokenizer");
        let tokenizer = Tokenizer::from_file(&paths.tokenizer_json)
            .map_err(|e| SpeakerError::Model(format!("failed to load tokenizer: {e}")))?;

        info!("encoding reference voice: {}", voice_path.display());
        let voice = encode_voice(&mut speech_encoder, voice_path, config.sample_rate)?;
        debug!(
            cond_len = voice.cond_emb.seq_len(),
            prompt_tokens = voice.prompt_tokens.len(),
            "voice conditioning ready"
        );

        info!("Chatterbox TTS ready");
        Ok(Self {
            tokenizer,
            embed_tokens,
            language_model,
            conditional_decoder,
            voice,
            layout: KvLayout {
                num_layers: config.num_layers,
                num_kv_heads: config.num_kv_heads,
                head_dim: config.head_dim,
            },
            speech_vocab_size: config.speech_vocab_size,
            sample_rate: config.sample_rate,
        })
    }

    fn embed(&mut self, ids: &[i64]) -> Result<TensorF32> {
        let input = Tensor::from_array(([1_usize, ids.len()], ids.to_vec()))
            .map_err(|e| SpeakerError::Tts(format!("failed to build input_ids: {e}")))?;
        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("input_ids".to_owned(), input.into());

        let outputs = self
            .embed_tokens
            .run(SessionInputs::from(feed))
            .map_err(|e| SpeakerError::Tts(format!("embed_tokens inference failed: {e}")))?;
        extract_f32(&outputs[0_usize], "inputs_embeds")
    }

    fn empty_past(&self) -> Result<Vec<(String, DynValue)>> {
        let KvLayout {
            num_kv_heads,
            head_dim,
            ..
        } = self.layout;
        self.layout
            .past_names()
            .map(|name| {
                let shape = [1_usize, num_kv_heads, 0, head_dim];
                let empty = Tensor::from_array((shape, Vec::<f32>::new()))
                    .map_err(|e| SpeakerError::Tts(format!("failed to build {name}: {e}")))?;
                Ok((name, empty.into_dyn()))
            })
            .collect()
    }

    /// One language-model pass. Consumes the previous cache, returns the
    /// last-position logits and the next cache.
    fn run_language_model(
        &mut self,
        embeds: &TensorF32,
        past: Vec<(String, DynValue)>,
        attention_len: usize,
        positions: Vec<i64>,
    ) -> Result<(Vec<f32>, Vec<(String, DynValue)>)> {
        let attention_mask =
            Tensor::from_array(([1_usize, attention_len], vec![1_i64; attention_len]))
                .map_err(|e| SpeakerError::Tts(format!("failed to build attention_mask: {e}")))?;
        let position_ids = Tensor::from_array(([1_usize, positions.len()], positions))
            .map_err(|e| SpeakerError::Tts(format!("failed to build position_ids: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("inputs_embeds".to_owned(), embeds.to_value()?.into());
        feed.insert("attention_mask".to_owned(), attention_mask.into());
        feed.insert("position_ids".to_owned(), position_ids.into());
        for (name, value) in past {
            feed.insert(name, value.into());
        }

        let mut outputs = self
            .language_model
            .run(SessionInputs::from(feed))
            .map_err(|e| SpeakerError::Tts(format!("language_model inference failed: {e}")))?;

        let logits = {
            let value = outputs.get("logits").unwrap_or(&outputs[0_usize]);
            last_position_logits(extract_f32(value, "logits")?)?
        };

        let mut present = Vec::with_capacity(self.layout.num_layers * 2);
        for past_name in self.layout.past_names() {
            let present_name = past_name.replacen("past_key_values.", "present.", 1);
            let value = outputs.remove(present_name.as_str()).ok_or_else(|| {
                SpeakerError::Tts(format!("language_model missing output {present_name}"))
            })?;
            present.push((past_name, value));
        }
        Ok((logits, present))
    }

    /// Feed one generated token through the cache.
    fn step(&mut self, state: LmState, token: u32) -> Result<LmState> {
        let LmState {
            past,
            attention_len,
            next_position,
            ..
        } = state;
        let embeds = self.embed(&[i64::from(token)])?;
        let attention_len = attention_len + 1;
        let (logits, past) =
            self.run_language_model(&embeds, past, attention_len, vec![next_position])?;
        Ok(LmState {
            past,
            attention_len,
            next_position: next_position + 1,
            logits,
        })
    }

    fn run_conditional_decoder(&mut self, speech_tokens: Vec<i64>) -> Result<Vec<f32>> {
        let tokens = Tensor::from_array(([1_usize, speech_tokens.len()], speech_tokens))
            .map_err(|e| SpeakerError::Tts(format!("failed to build speech_tokens: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("speech_tokens".to_owned(), tokens.into());
        feed.insert(
            "speaker_embeddings".to_owned(),
            self.voice.speaker_embeddings.to_value()?.into(),
        );
        feed.insert(
            "speaker_features".to_owned(),
            self.voice.speaker_features.to_value()?.into(),
        );

        let outputs = self
            .conditional_decoder
            .run(SessionInputs::from(feed))
            .map_err(|e| SpeakerError::Tts(format!("conditional_decoder inference failed: {e}")))?;
        let wav = extract_f32(&outputs[0_usize], "waveform")?;
        match wav.shape.as_slice() {
            [1, _] | [_] => Ok(wav.data),
            other => Err(SpeakerError::Tts(format!(
                "unexpected waveform shape: {other:?}"
            ))),
        }
    }
}

impl SpeechTokenOracle for ChatterboxOnnx {
    type Context = LmState;

    fn predict_next_logits(
        &mut self,
        context: &LmState,
    ) -> std::result::Result<Vec<f32>, OracleError> {
        Ok(context.logits.clone())
    }

    fn advance(
        &mut self,
        context: LmState,
        token: u32,
    ) -> std::result::Result<LmState, OracleError> {
        self.step(context, token)
            .map_err(|e| OracleError::new(e.to_string()))
    }
}

impl SpeechModel for ChatterboxOnnx {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn prefill(&mut self, text: &str, start_token: u32) -> Result<LmState> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| SpeakerError::Tts(format!("tokenization failed: {e}")))?;
        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        if ids.is_empty() {
            return Err(SpeakerError::Tts("tokenizer produced zero tokens".to_owned()));
        }
        // The tokenizer's post-processor normally ends on the start token.
        if ids.last() != Some(&i64::from(start_token)) {
            ids.push(i64::from(start_token));
        }
        debug!(tokens = ids.len(), "tokenized \"{text}\"");

        let text_embeds = self.embed(&ids)?;
        let merged = concat_sequence(&self.voice.cond_emb, &text_embeds)?;
        let seq_len = merged.seq_len();
        let positions = (0..seq_len as i64).collect();
        let past = self.empty_past()?;
        let (logits, past) = self.run_language_model(&merged, past, seq_len, positions)?;

        Ok(LmState {
            past,
            attention_len: seq_len,
            next_position: seq_len as i64,
            logits,
        })
    }

    fn vocode(&mut self, tokens: &[u32]) -> Result<Vec<f32>> {
        let vocab = i64::from(self.speech_vocab_size);
        let mut speech_tokens = self.voice.prompt_tokens.clone();
        speech_tokens.extend(
            tokens
                .iter()
                .map(|&t| i64::from(t))
                .filter(|&t| t < vocab),
        );
        speech_tokens.extend([SILENCE_TOKEN; TRAILING_SILENCE_TOKENS]);
        self.run_conditional_decoder(speech_tokens)
    }
}

fn load_session(path: &Path, threads: usize) -> Result<Session> {
    debug!("loading {}", path.display());
    Session::builder()
        .and_then(|b| Ok(b.with_intra_threads(threads)?))
        .and_then(|mut b| b.commit_from_file(path))
        .map_err(|e| SpeakerError::Model(format!("failed to load {}: {e}", path.display())))
}

fn encode_voice(
    speech_encoder: &mut Session,
    voice_path: &Path,
    sample_rate: u32,
) -> Result<VoiceConditioning> {
    let (samples, sr) = read_wav_mono(voice_path)?;
    let audio = resample_linear(&samples, sr, sample_rate);
    if audio.is_empty() {
        return Err(SpeakerError::Audio(format!(
            "voice reference has no samples: {}",
            voice_path.display()
        )));
    }

    let input = Tensor::from_array(([1_usize, audio.len()], audio))
        .map_err(|e| SpeakerError::Tts(format!("failed to build audio_values: {e}")))?;
    let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
    feed.insert("audio_values".to_owned(), input.into());

    let mut outputs = speech_encoder
        .run(SessionInputs::from(feed))
        .map_err(|e| SpeakerError::Tts(format!("speech_encoder inference failed: {e}")))?;

    let mut take = |names: &[&str]| -> Result<DynValue> {
        names
            .iter()
            .find_map(|n| outputs.remove(*n))
            .ok_or_else(|| SpeakerError::Tts(format!("speech_encoder missing output {}", names[0])))
    };
    let cond_emb = take(&["audio_features", "cond_emb"])?;
    let prompt = take(&["audio_tokens", "prompt_token"])?;
    let speaker_embeddings = take(&["speaker_embeddings"])?;
    let speaker_features = take(&["speaker_features"])?;

    let (_, prompt_tokens) = prompt
        .try_extract_tensor::<i64>()
        .map_err(|e| SpeakerError::Tts(format!("audio_tokens is not i64: {e}")))?;

    Ok(VoiceConditioning {
        cond_emb: extract_f32(&cond_emb, "audio_features")?,
        prompt_tokens: prompt_tokens.to_vec(),
        speaker_embeddings: extract_f32(&speaker_embeddings, "speaker_embeddings")?,
        speaker_features: extract_f32(&speaker_features, "speaker_features")?,
    })
}

fn extract_f32(value: &DynValue, what: &str) -> Result<TensorF32> {
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| SpeakerError::Tts(format!("failed to extract {what}: {e}")))?;
    Ok(TensorF32 {
        shape: shape.iter().map(|&d| d as usize).collect(),
        data: data.to_vec(),
    })
}

fn last_position_logits(logits: TensorF32) -> Result<Vec<f32>> {
    match logits.shape.as_slice() {
        [1, seq, vocab] if *seq > 0 => {
            let offset = (seq - 1) * vocab;
            Ok(logits.data[offset..offset + vocab].to_vec())
        }
        [1, _] => Ok(logits.data),
        other => Err(SpeakerError::Tts(format!(
            "unexpected logits shape: {other:?}"
        ))),
    }
}

/// Concatenate two `[1, seq, hidden]` tensors along the sequence axis.
fn concat_sequence(a: &TensorF32, b: &TensorF32) -> Result<TensorF32> {
    match (a.shape.as_slice(), b.shape.as_slice()) {
        ([1, a_seq, a_hidden], [1, b_seq, b_hidden]) if a_hidden == b_hidden => {
            let mut data = Vec::with_capacity(a.data.len() + b.data.len());
            data.extend_from_slice(&a.data);
            data.extend_from_slice(&b.data);
            Ok(TensorF32 {
                shape: vec![1, a_seq + b_seq, *a_hidden],
                data,
            })
        }
        (a_shape, b_shape) => Err(SpeakerError::Tts(format!(
            "embedding shapes incompatible: {a_shape:?} and {b_shape:?}"
        ))),
    }
}
