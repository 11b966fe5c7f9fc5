//! Every effect except the block-local spectral filter must produce the same
//! output no matter how a signal is cut into blocks.

use flux_engine::dsp::{Effect, EffectContext, Sample, REGISTRY};
use proptest::prelude::*;

/// Longer than a full second of delay line and the slowest modulation table,
/// so delay and table positions wrap several times.
const LEN: usize = 48_000;

/// Two tones, a slow swell and a burst of silence, so gates and dynamics
/// cross their thresholds somewhere in the middle.
fn signal() -> Vec<Sample> {
    (0..LEN)
        .map(|i| {
            let t = i as f64 / 44_100.0;
            let swell = (i as f64 / LEN as f64 * std::f64::consts::PI).sin();
            let tone = (2.0 * std::f64::consts::PI * 220.0 * t).sin() * 9_000.0
                + (2.0 * std::f64::consts::PI * 3_300.0 * t).sin() * 2_500.0;
            if (1200..1400).contains(&i) {
                0.0
            } else {
                tone * swell
            }
        })
        .collect()
}

/// Spread `knobs` (each in `0..=1`) across the effect's parameters: numeric
/// ones scale into their range, discrete ones pick a choice.
fn configure(fx: &dyn Effect, knobs: &[f64]) {
    for ((_, p), &k) in fx.parameters().iter().zip(knobs.iter().cycle()) {
        let choices = p.choices();
        if choices.is_empty() {
            p.set_value(p.minimum() + k * (p.maximum() - p.minimum()));
        } else {
            let i = ((k * choices.len() as f64) as usize).min(choices.len() - 1);
            p.set_choice(choices[i].name);
        }
    }
}

fn build(name: &str, settings: &[(&str, f64)]) -> Box<dyn Effect> {
    let desc = flux_engine::dsp::registry::lookup(name).unwrap();
    let fx = desc.build(&EffectContext::default());
    for &(pname, value) in settings {
        assert!(fx.parameters().get(pname).unwrap().set_value(value), "{name}: {pname}");
    }
    fx
}

fn process_in_pieces(mut fx: Box<dyn Effect>, input: &[Sample], cuts: &[usize]) -> Vec<Sample> {
    let mut out = input.to_vec();
    let mut rest = &mut out[..];
    for &cut in cuts {
        let (head, tail) = rest.split_at_mut(cut.min(rest.len()));
        fx.process(head);
        rest = tail;
    }
    fx.process(rest);
    out
}

fn assert_same(name: &str, whole: &[Sample], pieces: &[Sample]) {
    for (i, (a, b)) in whole.iter().zip(pieces).enumerate() {
        assert!(
            (a - b).abs() <= 1e-6 * a.abs().max(1.0),
            "{name} differs at {i}: {a} vs {b}"
        );
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn block_boundaries_do_not_change_output(
        cuts in prop::collection::vec(0usize..6000, 1..16),
        knobs in prop::collection::vec(0.0f64..=1.0, 1..6),
    ) {
        let input = signal();
        for desc in REGISTRY.iter().filter(|d| d.name != "Generic Filter") {
            let whole = build(desc.name, &[]);
            let pieces = build(desc.name, &[]);
            configure(whole.as_ref(), &knobs);
            configure(pieces.as_ref(), &knobs);
            let whole = process_in_pieces(whole, &input, &[]);
            let pieces = process_in_pieces(pieces, &input, &cuts);
            for (i, (a, b)) in whole.iter().zip(&pieces).enumerate() {
                prop_assert!(
                    (a - b).abs() <= 1e-6 * a.abs().max(1.0),
                    "{} differs at {}: {} vs {} with {:?}", desc.name, i, a, b, knobs
                );
            }
        }
    }
}

#[test]
fn short_lines_and_tables_wrap_identically() {
    let input = signal();
    let cuts = [1, 255, 4410, 0, 3, 7000, 512, 10_000];
    let cases: [(&str, &[(&str, f64)]); 6] = [
        ("Delay", &[("Delay", 4410.0), ("Feedback", 0.9)]),
        ("Tremolo", &[("Speed", 600.0), ("Mix", 1.0)]),
        ("Pulse Modulation", &[("Duration", 0.01), ("Duty", 0.3)]),
        ("Decimation", &[("Sample rate", 7.0), ("Bitrate", 4.0)]),
        ("Foldback Distortion", &[("Threshold", 2000.0)]),
        ("Reverb", &[("Amount", 0.5)]),
    ];
    for (name, settings) in cases {
        let whole = process_in_pieces(build(name, settings), &input, &[]);
        let pieces = process_in_pieces(build(name, settings), &input, &cuts);
        assert_same(name, &whole, &pieces);
    }
}

#[test]
fn empty_blocks_leave_state_alone() {
    let input = signal();
    let ctx = EffectContext::default();
    for desc in REGISTRY.iter() {
        let mut touched = desc.build(&ctx);
        let mut fresh = desc.build(&ctx);

        let mut empty: [Sample; 0] = [];
        touched.process(&mut empty);
        touched.process(&mut empty);

        let mut a = input.clone();
        let mut b = input.clone();
        touched.process(&mut a);
        fresh.process(&mut b);
        assert_eq!(a, b, "{}", desc.name);
    }
}

#[test]
fn reset_restores_a_fresh_instance() {
    let input = signal();
    let ctx = EffectContext::default();
    for desc in REGISTRY.iter() {
        let mut used = desc.build(&ctx);
        let mut scratch = input.clone();
        used.process(&mut scratch);
        used.reset();

        let mut fresh = desc.build(&ctx);
        let mut a = input.clone();
        let mut b = input.clone();
        used.process(&mut a);
        fresh.process(&mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() <= 1e-9 * x.abs().max(1.0), "{}", desc.name);
        }
    }
}
