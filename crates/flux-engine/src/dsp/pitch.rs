use std::f64::consts::PI;
use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{ParamWatch, Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::SAMPLE_RATE;

/// Length of the FIR Hilbert transformer. Odd, so the group delay is whole.
pub const HILBERT_TAPS: usize = 63;
const HILBERT_DELAY: usize = HILBERT_TAPS / 2;

/// Hamming-windowed ideal Hilbert impulse response.
fn hilbert_kernel() -> [f64; HILBERT_TAPS] {
    let mut h = [0.0; HILBERT_TAPS];
    for (k, tap) in h.iter_mut().enumerate() {
        let m = k as i64 - HILBERT_DELAY as i64;
        if m % 2 != 0 {
            let window = 0.54 - 0.46 * (2.0 * PI * k as f64 / (HILBERT_TAPS - 1) as f64).cos();
            *tap = 2.0 / (PI * m as f64) * window;
        }
    }
    h
}

/// Frequency shifter using single-sideband modulation:
/// `y = x[n - D]·cos(φ) - H{x}[n]·sin(φ)`.
///
/// The Hilbert filter history and carrier phase persist across blocks; the
/// output lags the input by [`HILBERT_TAPS`]` / 2` samples.
pub struct PitchShift {
    params: Parameters,
    frequency: Arc<Parameter>,
    watch: ParamWatch,
    kernel: [f64; HILBERT_TAPS],
    history: [f64; HILBERT_TAPS],
    head: usize,
    sin: Vec<f64>,
    cos: Vec<f64>,
    phase: usize,
}

impl PitchShift {
    fn rebuild_carrier(&mut self) {
        let old_len = self.sin.len();
        let len = ((f64::from(SAMPLE_RATE) / self.frequency.value()).round() as usize).max(1);
        self.sin.clear();
        self.cos.clear();
        for i in 0..len {
            let (s, c) = (2.0 * PI * i as f64 / len as f64).sin_cos();
            self.sin.push(s);
            self.cos.push(c);
        }
        self.phase = if old_len == 0 {
            0
        } else {
            (self.phase * len / old_len).min(len - 1)
        };
    }

    /// Push `x` into the history and return the Hilbert output and the delayed input.
    #[inline]
    fn filter(&mut self, x: f64) -> (f64, f64) {
        self.head = (self.head + 1) % HILBERT_TAPS;
        self.history[self.head] = x;

        let mut acc = 0.0;
        // taps at odd offsets from the centre are the only non-zero ones
        for k in (0..HILBERT_TAPS).step_by(2) {
            let idx = (self.head + HILBERT_TAPS - k) % HILBERT_TAPS;
            acc += self.kernel[k] * self.history[idx];
        }
        let delayed = self.history[(self.head + HILBERT_TAPS - HILBERT_DELAY) % HILBERT_TAPS];
        (acc, delayed)
    }
}

impl EffectType for PitchShift {
    const NAME: &'static str = "Pitch Shift";
    const DESCRIPTION: &'static str = "Frequency shifting in the time domain";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let frequency = params.add("Frequency", Parameter::real(1.0, 5000.0, 50.0));
        let watch = ParamWatch::new(&[&frequency]);
        let capacity = SAMPLE_RATE as usize;
        let mut fx = Self {
            params,
            frequency,
            watch,
            kernel: hilbert_kernel(),
            history: [0.0; HILBERT_TAPS],
            head: 0,
            sin: Vec::with_capacity(capacity),
            cos: Vec::with_capacity(capacity),
            phase: 0,
        };
        fx.rebuild_carrier();
        fx
    }
}

impl Effect for PitchShift {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
    fn parameters(&self) -> &Parameters {
        &self.params
    }

    fn process(&mut self, block: &mut [Sample]) {
        if block.is_empty() {
            return;
        }
        if self.watch.changed() {
            self.rebuild_carrier();
        }
        for s in block.iter_mut() {
            let (hilbert, delayed) = self.filter(*s);
            *s = delayed * self.cos[self.phase] - hilbert * self.sin[self.phase];
            self.phase += 1;
            if self.phase == self.sin.len() {
                self.phase = 0;
            }
        }
    }

    fn reset(&mut self) {
        self.history = [0.0; HILBERT_TAPS];
        self.head = 0;
        self.phase = 0;
    }
}
