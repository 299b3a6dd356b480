//! Token selection over a re-weighted logit vector.

use super::logits::softmax;
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

/// How the next token is picked once the pipeline has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenSelection {
    /// Draw from the softmax distribution.
    #[default]
    Multinomial,
    /// Take the highest score, lowest id on ties. Diagnostic use.
    ArgMax,
}

/// Picks tokens according to a [`TokenSelection`].
#[derive(Debug)]
pub struct TokenSampler {
    selection: TokenSelection,
    rng: StdRng,
}

impl TokenSampler {
    /// Create a sampler; `seed` makes multinomial draws reproducible.
    pub fn new(selection: TokenSelection, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { selection, rng }
    }

    pub fn selection(&self) -> TokenSelection {
        self.selection
    }

    /// Pick a token id, or `None` when the logits admit no distribution.
    pub fn select(&mut self, logits: &[f32]) -> Option<u32> {
        match self.selection {
            TokenSelection::ArgMax => argmax(logits),
            TokenSelection::Multinomial => {
                let probs = softmax(logits)?;
                let dist = WeightedIndex::new(&probs).ok()?;
                u32::try_from(dist.sample(&mut self.rng)).ok()
            }
        }
    }
}

/// Index of the largest finite-or-infinite score, lowest index on ties.
///
/// Returns `None` for an empty slice or when every score is masked.
pub fn argmax(logits: &[f32]) -> Option<u32> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in logits.iter().enumerate() {
        if score == f32::NEG_INFINITY || score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.and_then(|(idx, _)| u32::try_from(idx).ok())
}
