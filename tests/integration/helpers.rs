//! Shared fakes for integration tests.

use chatterbox_speaker::decode::{OracleError, SpeechTokenOracle};
use chatterbox_speaker::config::TextConfig;
use chatterbox_speaker::{SamplingConfig, SpeakerError, SpeechModel, Synthesizer};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Sample rate reported by [`FakeModel`].
pub(crate) const FAKE_SAMPLE_RATE: u32 = 16_000;

/// Samples produced per speech token by [`FakeModel`].
pub(crate) const SAMPLES_PER_TOKEN: usize = 160;

/// Stop token used by [`FakeModel`] and [`fake_sampling`].
pub(crate) const FAKE_STOP: u32 = 9;

/// Deterministic stand-in for a speech model.
///
/// Emits `min(len(text), 8)` tokens cycling through 1, 2, 3, then the stop
/// token. Text containing `fail` makes prefill error out.
pub(crate) struct FakeModel;

impl SpeechTokenOracle for FakeModel {
    /// `(tokens emitted, tokens to emit)`
    type Context = (usize, usize);

    fn predict_next_logits(&mut self, ctx: &(usize, usize)) -> Result<Vec<f32>, OracleError> {
        let mut logits = vec![-10.0; 10];
        if ctx.0 < ctx.1 {
            logits[1 + ctx.0 % 3] = 10.0;
        } else {
            logits[FAKE_STOP as usize] = 10.0;
        }
        Ok(logits)
    }

    fn advance(&mut self, ctx: (usize, usize), _token: u32) -> Result<(usize, usize), OracleError> {
        Ok((ctx.0 + 1, ctx.1))
    }
}

impl SpeechModel for FakeModel {
    fn sample_rate(&self) -> u32 {
        FAKE_SAMPLE_RATE
    }

    fn prefill(&mut self, text: &str, _start_token: u32) -> chatterbox_speaker::Result<(usize, usize)> {
        if text.contains("fail") {
            return Err(SpeakerError::Tts("prefill exploded".to_owned()));
        }
        Ok((0, text.len().min(8)))
    }

    fn vocode(&mut self, tokens: &[u32]) -> chatterbox_speaker::Result<Vec<f32>> {
        Ok(vec![0.1; tokens.len() * SAMPLES_PER_TOKEN])
    }
}

/// Greedy-equivalent sampling for [`FakeModel`].
pub(crate) fn fake_sampling() -> SamplingConfig {
    SamplingConfig {
        temperature: 1.0,
        top_k: 1,
        top_p: 1.0,
        repetition_penalty: 1.0,
        max_steps: 32,
        start_token: 0,
        stop_token: FAKE_STOP,
        seed: Some(7),
    }
}

pub(crate) fn fake_synthesizer() -> Synthesizer<FakeModel> {
    Synthesizer::new(FakeModel, fake_sampling(), TextConfig::default()).expect("valid sampling")
}

/// Oracle returning the same logits every step, counting calls.
pub(crate) struct ConstantOracle {
    pub logits: Vec<f32>,
    pub predicts: usize,
    pub advances: usize,
}

impl ConstantOracle {
    pub(crate) fn new(logits: Vec<f32>) -> Self {
        Self {
            logits,
            predicts: 0,
            advances: 0,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.predicts + self.advances
    }
}

impl SpeechTokenOracle for ConstantOracle {
    type Context = ();

    fn predict_next_logits(&mut self, _ctx: &()) -> Result<Vec<f32>, OracleError> {
        self.predicts += 1;
        Ok(self.logits.clone())
    }

    fn advance(&mut self, _ctx: (), _token: u32) -> Result<(), OracleError> {
        self.advances += 1;
        Ok(())
    }
}

/// Oracle whose logits vary with the step, so sampling paths differ by seed.
/// The stop token gets a small, rising score.
pub(crate) struct WanderingOracle {
    pub vocab: usize,
    pub stop: u32,
}

impl SpeechTokenOracle for WanderingOracle {
    type Context = usize;

    fn predict_next_logits(&mut self, step: &usize) -> Result<Vec<f32>, OracleError> {
        let mut logits: Vec<f32> = (0..self.vocab)
            .map(|i| (((i * 7 + step * 13) % 11) as f32) * 0.25)
            .collect();
        logits[self.stop as usize] = -2.0 + *step as f32 * 0.1;
        Ok(logits)
    }

    fn advance(&mut self, step: usize, _token: u32) -> Result<usize, OracleError> {
        Ok(step + 1)
    }
}

/// Context that counts how many instances are alive.
pub(crate) struct DropProbe {
    live: Arc<AtomicUsize>,
}

impl DropProbe {
    pub(crate) fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self { live: live.clone() }
    }
}

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Oracle that fails at a chosen step and tracks live contexts.
pub(crate) struct FailingOracle {
    pub fail_at_step: usize,
    pub live: Arc<AtomicUsize>,
    pub step: usize,
    pub predicts: usize,
}

impl FailingOracle {
    pub(crate) fn new(fail_at_step: usize) -> Self {
        Self {
            fail_at_step,
            live: Arc::new(AtomicUsize::new(0)),
            step: 0,
            predicts: 0,
        }
    }

    pub(crate) fn context(&self) -> DropProbe {
        DropProbe::new(&self.live)
    }

    pub(crate) fn live_contexts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl SpeechTokenOracle for FailingOracle {
    type Context = DropProbe;

    fn predict_next_logits(&mut self, _ctx: &DropProbe) -> Result<Vec<f32>, OracleError> {
        self.predicts += 1;
        if self.step == self.fail_at_step {
            return Err(OracleError::new("kv cache exhausted"));
        }
        Ok(vec![0.0, 5.0, -5.0])
    }

    fn advance(&mut self, ctx: DropProbe, _token: u32) -> Result<DropProbe, OracleError> {
        drop(ctx);
        self.step += 1;
        Ok(DropProbe::new(&self.live))
    }
}
