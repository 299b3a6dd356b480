//! Behavioural properties of the speech-token decoder loop, checked against
//! scripted oracles.

use crate::helpers::{ConstantOracle, FailingOracle, WanderingOracle};
use chatterbox_speaker::decode::{
    DecodeError, FinishReason, MAX_STEPS_LIMIT, SamplingConfig, SpeechTokenDecoder,
    TokenSelection, decode_speech_tokens,
};
use tokio_util::sync::CancellationToken;

const STOP: u32 = 3;

fn neutral(max_steps: usize) -> SamplingConfig {
    SamplingConfig {
        temperature: 1.0,
        top_k: 0,
        top_p: 1.0,
        repetition_penalty: 1.0,
        max_steps,
        start_token: 0,
        stop_token: STOP,
        seed: None,
    }
}

// ─── Length and stop-token invariants ─────────────────────────────────────────

#[test]
fn output_never_exceeds_max_steps_or_contains_stop() {
    let configs = [
        neutral(1),
        neutral(7),
        SamplingConfig {
            temperature: 0.7,
            top_k: 5,
            top_p: 0.9,
            repetition_penalty: 1.3,
            ..neutral(25)
        },
        SamplingConfig {
            temperature: 1.5,
            top_p: 0.5,
            ..neutral(60)
        },
    ];
    for cfg in configs {
        for seed in 0..20_u64 {
            let cfg = SamplingConfig {
                seed: Some(seed),
                ..cfg
            };
            let mut oracle = WanderingOracle { vocab: 16, stop: STOP };
            let out = decode_speech_tokens(&mut oracle, 0, &cfg).unwrap();
            assert!(out.tokens.len() <= cfg.max_steps, "{cfg:?}");
            assert!(!out.tokens.contains(&STOP), "{cfg:?}");
            if out.finish == FinishReason::MaxSteps {
                assert_eq!(out.tokens.len(), cfg.max_steps);
            }
        }
    }
}

#[test]
fn stop_peaked_first_step_yields_empty_output() {
    let mut logits = vec![0.0; 8];
    logits[STOP as usize] = 50.0;
    let mut oracle = ConstantOracle::new(logits);

    let out = decode_speech_tokens(&mut oracle, (), &neutral(100)).unwrap();
    assert!(out.tokens.is_empty());
    assert_eq!(out.finish, FinishReason::StopToken);
    assert_eq!(oracle.advances, 0);
}

#[test]
fn never_stopping_oracle_hits_exact_limit() {
    let mut logits = vec![1.0; 8];
    logits[STOP as usize] = f32::NEG_INFINITY;
    let mut oracle = ConstantOracle::new(logits);

    let out = decode_speech_tokens(&mut oracle, (), &neutral(5)).unwrap();
    assert_eq!(out.tokens.len(), 5);
    assert_eq!(out.finish, FinishReason::MaxSteps);
}

// ─── Determinism ──────────────────────────────────────────────────────────────

#[test]
fn argmax_with_neutral_settings_is_deterministic() {
    let run = || {
        let mut oracle = WanderingOracle { vocab: 16, stop: STOP };
        SpeechTokenDecoder::diagnostic(neutral(40))
            .unwrap()
            .decode(&mut oracle, 0)
            .unwrap()
    };
    let first = run();
    assert_eq!(first, run());
    assert_eq!(first, run());
}

#[test]
fn seeded_multinomial_is_reproducible() {
    let cfg = SamplingConfig {
        temperature: 1.2,
        seed: Some(1234),
        ..neutral(50)
    };
    let run = || {
        let mut oracle = WanderingOracle { vocab: 16, stop: STOP };
        decode_speech_tokens(&mut oracle, 0, &cfg).unwrap()
    };
    assert_eq!(run(), run());
}

// ─── Repetition penalty ───────────────────────────────────────────────────────

#[test]
fn repetition_penalty_steers_away_from_repeats() {
    // Token 1 narrowly beats token 2; the stop token is unreachable.
    let logits = vec![0.0, 2.0, 1.5, f32::NEG_INFINITY];

    let mut oracle = ConstantOracle::new(logits.clone());
    let plain = SpeechTokenDecoder::diagnostic(neutral(5))
        .unwrap()
        .decode(&mut oracle, ())
        .unwrap();
    assert_eq!(plain.tokens, vec![1, 1, 1, 1, 1]);

    let mut oracle = ConstantOracle::new(logits);
    let cfg = SamplingConfig {
        repetition_penalty: 2.0,
        ..neutral(5)
    };
    let penalised = SpeechTokenDecoder::diagnostic(cfg)
        .unwrap()
        .decode(&mut oracle, ())
        .unwrap();
    assert_eq!(penalised.tokens, vec![1, 2, 1, 1, 1]);
}

// ─── Configuration validation ─────────────────────────────────────────────────

#[test]
fn invalid_config_never_touches_the_oracle() {
    let invalid = [
        SamplingConfig {
            temperature: 0.0,
            ..neutral(10)
        },
        SamplingConfig {
            top_p: 0.0,
            ..neutral(10)
        },
        SamplingConfig {
            top_p: 1.01,
            ..neutral(10)
        },
        SamplingConfig {
            repetition_penalty: 0.5,
            ..neutral(10)
        },
        neutral(0),
    ];
    for cfg in invalid {
        let mut oracle = ConstantOracle::new(vec![1.0; 8]);
        let err = decode_speech_tokens(&mut oracle, (), &cfg).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidConfig(_)), "{cfg:?}");
        assert_eq!(oracle.calls(), 0, "{cfg:?}");

        let err = SpeechTokenDecoder::with_selection(cfg, TokenSelection::ArgMax).unwrap_err();
        assert!(err.is_config_error());
    }
}

// ─── Failure and cancellation ─────────────────────────────────────────────────

#[test]
fn oracle_failure_propagates_immediately() {
    let mut oracle = FailingOracle::new(3);
    let context = oracle.context();
    let cfg = SamplingConfig {
        stop_token: 2,
        ..neutral(10)
    };

    let err = SpeechTokenDecoder::diagnostic(cfg)
        .unwrap()
        .decode(&mut oracle, context)
        .unwrap_err();
    match err {
        DecodeError::Oracle { step, source } => {
            assert_eq!(step, 3);
            assert_eq!(source.message(), "kv cache exhausted");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(oracle.predicts, 4, "no retries after failure");
    assert_eq!(oracle.live_contexts(), 0, "context released on error");
}

#[test]
fn context_is_released_on_success() {
    let mut oracle = FailingOracle::new(usize::MAX);
    let context = oracle.context();
    let cfg = SamplingConfig {
        stop_token: 2,
        ..neutral(6)
    };

    let out = SpeechTokenDecoder::diagnostic(cfg)
        .unwrap()
        .decode(&mut oracle, context)
        .unwrap();
    assert_eq!(out.tokens.len(), 6);
    assert_eq!(oracle.live_contexts(), 0);
}

#[test]
fn cancellation_stops_between_steps() {
    let mut logits = vec![1.0; 8];
    logits[STOP as usize] = f32::NEG_INFINITY;
    let mut oracle = ConstantOracle::new(logits);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let mut decoder = SpeechTokenDecoder::diagnostic(neutral(100))
        .unwrap()
        .with_cancellation(cancel);
    let out = decoder
        .decode_with_observer(&mut oracle, (), |event| {
            if event.step == 1 {
                trigger.cancel();
            }
        })
        .unwrap();

    assert_eq!(out.finish, FinishReason::Cancelled);
    assert_eq!(out.tokens.len(), 2);
}

#[test]
fn decoder_is_reusable_across_calls() {
    let mut logits = vec![0.0; 8];
    logits[5] = 3.0;
    let mut decoder = SpeechTokenDecoder::diagnostic(neutral(3)).unwrap();
    for _ in 0..3 {
        let mut oracle = ConstantOracle::new(logits.clone());
        let out = decoder.decode(&mut oracle, ()).unwrap();
        assert_eq!(out.tokens, vec![5, 5, 5]);
    }
}

#[test]
fn pre_cancelled_decoder_costs_no_oracle_calls() {
    let mut oracle = ConstantOracle::new(vec![1.0; 8]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let out = SpeechTokenDecoder::new(neutral(10))
        .unwrap()
        .with_cancellation(cancel)
        .decode(&mut oracle, ())
        .unwrap();
    assert_eq!(out.finish, FinishReason::Cancelled);
    assert!(out.tokens.is_empty());
    assert_eq!(oracle.calls(), 0);
}

// ─── Extreme configuration and non-finite scores ──────────────────────────────

#[test]
fn oversized_step_limits_are_rejected_up_front() {
    let mut logits = vec![0.0; 8];
    logits[STOP as usize] = 50.0;

    for max_steps in [MAX_STEPS_LIMIT + 1, 1 << 40, usize::MAX] {
        let mut oracle = ConstantOracle::new(logits.clone());
        let err = decode_speech_tokens(&mut oracle, (), &neutral(max_steps)).unwrap_err();
        assert!(err.is_config_error(), "max_steps {max_steps}");
        assert_eq!(oracle.calls(), 0);
    }

    let mut oracle = ConstantOracle::new(logits);
    let out = decode_speech_tokens(&mut oracle, (), &neutral(MAX_STEPS_LIMIT)).unwrap();
    assert!(out.tokens.is_empty());
    assert_eq!(out.finish, FinishReason::StopToken);
}

#[test]
fn infinite_stop_score_ends_decoding_in_both_modes() {
    let logits = vec![0.0, 0.0, 0.0, f32::INFINITY];
    for selection in [TokenSelection::Multinomial, TokenSelection::ArgMax] {
        for seed in 0..10_u64 {
            let cfg = SamplingConfig {
                seed: Some(seed),
                ..neutral(5)
            };
            let mut oracle = ConstantOracle::new(logits.clone());
            let out = SpeechTokenDecoder::with_selection(cfg, selection)
                .unwrap()
                .decode(&mut oracle, ())
                .unwrap();
            assert!(out.tokens.is_empty(), "{selection:?}");
            assert_eq!(out.finish, FinishReason::StopToken, "{selection:?}");
        }
    }
}

#[test]
fn tiny_temperature_behaves_like_argmax() {
    for logits in [
        vec![5.0, 1.0, 0.5, f32::NEG_INFINITY],
        vec![-5.0, -6.0, -7.0, f32::NEG_INFINITY],
    ] {
        let cfg = SamplingConfig {
            temperature: 1e-38,
            seed: Some(11),
            ..neutral(5)
        };
        let mut oracle = ConstantOracle::new(logits);
        let out = decode_speech_tokens(&mut oracle, (), &cfg).unwrap();
        assert_eq!(out.tokens, vec![0; 5]);
    }
}

#[test]
fn fully_masked_oracle_output_is_an_oracle_fault() {
    let mut oracle = ConstantOracle::new(vec![f32::NEG_INFINITY; 8]);
    let err = decode_speech_tokens(&mut oracle, (), &neutral(5)).unwrap_err();
    assert!(matches!(err, DecodeError::Oracle { step: 0, .. }));
    assert_eq!(oracle.advances, 0);
}
