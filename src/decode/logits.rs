//! Logit re-weighting stages and the fixed pipeline that chains them.
//!
//! Stages run in this order: repetition penalty, temperature, top-k, top-p.
//! Masked tokens are set to `f32::NEG_INFINITY` so they get zero probability
//! after [`softmax`].

use super::config::SamplingConfig;
use std::collections::HashSet;

/// Penalise every distinct token in `history`.
///
/// Negative scores are multiplied by `penalty`, non-negative scores divided
/// by it. A token repeated in the history is penalised once. Ids outside the
/// logit vector are ignored.
pub fn apply_repetition_penalty(logits: &mut [f32], history: &[u32], penalty: f32) {
    let mut seen = HashSet::with_capacity(history.len());
    for &token in history {
        if !seen.insert(token) {
            continue;
        }
        let Some(score) = logits.get_mut(token as usize) else {
            continue;
        };
        if *score < 0.0 {
            *score *= penalty;
        } else {
            *score /= penalty;
        }
    }
}

/// Divide every score by `temperature`.
///
/// When plain division would push a finite score out of `f32` range, every
/// score is first shifted down by the largest finite one. The shift leaves
/// the ranking and the softmax unchanged, and the top score lands on 0.
pub fn apply_temperature(logits: &mut [f32], temperature: f32) {
    let overflows = logits
        .iter()
        .any(|v| v.is_finite() && !(v / temperature).is_finite());
    let shift = if overflows {
        logits
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f32::NEG_INFINITY, f32::max)
    } else {
        0.0
    };
    for score in logits.iter_mut() {
        *score = (*score - shift) / temperature;
    }
}

/// Mask every token scoring strictly below the `k`-th largest score.
///
/// Ties with the `k`-th score survive, so more than `k` tokens may remain.
/// `k == 0` or `k >= logits.len()` leaves the vector untouched.
pub fn apply_top_k(logits: &mut [f32], k: usize) {
    if k == 0 || k >= logits.len() {
        return;
    }
    let mut sorted = logits.to_vec();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    let threshold = sorted[k - 1];
    for score in logits.iter_mut() {
        if *score < threshold {
            *score = f32::NEG_INFINITY;
        }
    }
}

/// Keep the smallest set of highest-probability tokens whose mass reaches `p`.
///
/// A token survives when the probability mass of all tokens ranked above it
/// is still below `p`, so the top token always survives.
/// `p >= 1.0` leaves the vector untouched.
pub fn apply_top_p(logits: &mut [f32], p: f32) {
    if p >= 1.0 || logits.is_empty() {
        return;
    }
    let Some(probs) = softmax(logits) else {
        return;
    };
    let mut order: Vec<usize> = (0..logits.len()).collect();
    order.sort_unstable_by(|&a, &b| logits[b].total_cmp(&logits[a]));

    let mut cumulative = 0.0_f32;
    for idx in order {
        if cumulative >= p {
            logits[idx] = f32::NEG_INFINITY;
        } else {
            cumulative += probs[idx];
        }
    }
}

/// Numerically stable softmax.
///
/// `+inf` scores share all of the mass equally. Returns `None` when no score
/// is finite or `+inf` (every token masked, or the input is empty), since no
/// distribution exists.
pub fn softmax(logits: &[f32]) -> Option<Vec<f32>> {
    let certain = logits.iter().filter(|&&v| v == f32::INFINITY).count();
    if certain > 0 {
        let share = 1.0 / certain as f32;
        return Some(
            logits
                .iter()
                .map(|&v| if v == f32::INFINITY { share } else { 0.0 })
                .collect(),
        );
    }

    let max = logits
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return None;
    }
    let exps: Vec<f32> = logits
        .iter()
        .map(|&v| if v.is_finite() { (v - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();
    Some(exps.into_iter().map(|e| e / sum).collect())
}

/// One stage of the pipeline, in application order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogitStage {
    RepetitionPenalty(f32),
    Temperature(f32),
    TopK(usize),
    TopP(f32),
}

/// The configured stages, with disabled ones left out.
#[derive(Debug, Clone, PartialEq)]
pub struct LogitsPipeline {
    stages: Vec<LogitStage>,
}

impl LogitsPipeline {
    /// Build the pipeline for a (validated) config.
    pub fn from_config(config: &SamplingConfig) -> Self {
        let mut stages = Vec::with_capacity(4);
        if config.repetition_penalty != 1.0 {
            stages.push(LogitStage::RepetitionPenalty(config.repetition_penalty));
        }
        if config.temperature != 1.0 {
            stages.push(LogitStage::Temperature(config.temperature));
        }
        if config.top_k > 0 {
            stages.push(LogitStage::TopK(config.top_k));
        }
        if config.top_p < 1.0 {
            stages.push(LogitStage::TopP(config.top_p));
        }
        Self { stages }
    }

    /// Active stages in application order.
    pub fn stages(&self) -> &[LogitStage] {
        &self.stages
    }

    /// Run every active stage over `logits` in place.
    pub fn apply(&self, logits: &mut [f32], history: &[u32]) {
        for stage in &self.stages {
            match *stage {
                LogitStage::RepetitionPenalty(p) => apply_repetition_penalty(logits, history, p),
                LogitStage::Temperature(t) => apply_temperature(logits, t),
                LogitStage::TopK(k) => apply_top_k(logits, k),
                LogitStage::TopP(p) => apply_top_p(logits, p),
            }
        }
    }
}
