//! IIR filters.
//!
//! Biquads run in transposed direct form II. The two state registers are the
//! filter's zero-input memory and are carried from one block to the next, so
//! consecutive blocks filter as one continuous signal. When coefficients are
//! redesigned the registers are kept: a tiny discontinuity is preferable to
//! the click a full re-initialisation would cause.

use std::f64::consts::PI;
use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{ParamWatch, Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::{NYQUIST, SAMPLE_RATE};

/*
| response  | passes          | rejects         |
| --------- | --------------- | --------------- |
| LP        | below center    | above center    |
| HP        | above center    | below center    |
| BP        | around center   | far from center |
| BS        | far from center | around center   |
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResponse {
    LowPass,
    HighPass,
    BandPass,
    BandStop,
}

impl FilterResponse {
    pub const CHOICES: [(&'static str, Option<&'static str>); 4] =
        [("LP", None), ("HP", None), ("BP", None), ("BS", None)];

    pub fn from_index(index: usize) -> Self {
        match index {
            1 => Self::HighPass,
            2 => Self::BandPass,
            3 => Self::BandStop,
            _ => Self::LowPass,
        }
    }

    /// Quality factor tuned per response for guitar-range material.
    pub fn default_q(self) -> f64 {
        match self {
            Self::LowPass => 0.8,
            Self::HighPass => 20.0,
            Self::BandPass => 0.8,
            Self::BandStop => 5.0,
        }
    }
}

/// Normalised biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Coefficients {
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Audio EQ cookbook design for a second-order section at `center` Hz.
    pub fn design(response: FilterResponse, center: f64, q: f64) -> Self {
        // keep w0 strictly inside (0, pi) so the poles stay inside the unit circle
        let center = center.clamp(1.0, NYQUIST * 0.98);
        let w0 = PI * center / NYQUIST;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        let (b0, b1, b2) = match response {
            FilterResponse::LowPass => ((1.0 - cos_w0) / 2.0, 1.0 - cos_w0, (1.0 - cos_w0) / 2.0),
            FilterResponse::HighPass => ((1.0 + cos_w0) / 2.0, -(1.0 + cos_w0), (1.0 + cos_w0) / 2.0),
            FilterResponse::BandPass => (alpha, 0.0, -alpha),
            FilterResponse::BandStop => (1.0, -2.0 * cos_w0, 1.0),
        };
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Bilinear-transformed first-order low or high pass at `cutoff` Hz.
    pub fn first_order(high_pass: bool, cutoff: f64) -> Self {
        let k = (PI * cutoff.clamp(1.0, NYQUIST * 0.98) / f64::from(SAMPLE_RATE)).tan();
        let a1 = (k - 1.0) / (k + 1.0);
        let (b0, b1) = if high_pass {
            (1.0 / (1.0 + k), -1.0 / (1.0 + k))
        } else {
            (k / (1.0 + k), k / (1.0 + k))
        };
        Self {
            b0,
            b1,
            b2: 0.0,
            a1,
            a2: 0.0,
        }
    }
}

impl Default for Coefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Default)]
pub struct Biquad {
    c: Coefficients,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(c: Coefficients) -> Self {
        Self { c, z1: 0.0, z2: 0.0 }
    }

    /// Swap coefficients, keeping the carried state.
    pub fn set_coefficients(&mut self, c: Coefficients) {
        self.c = c;
    }

    pub fn coefficients(&self) -> Coefficients {
        self.c
    }

    #[inline]
    pub fn next_sample(&mut self, x: f64) -> f64 {
        let c = &self.c;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    pub fn render(&mut self, block: &mut [Sample]) {
        for s in block.iter_mut() {
            *s = self.next_sample(*s);
        }
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// Single biquad with selectable response.
pub struct BasicFilter {
    params: Parameters,
    center: Arc<Parameter>,
    response: Arc<Parameter>,
    watch: ParamWatch,
    biquad: Biquad,
}

fn basic_design(response: &Parameter, center: &Parameter) -> Coefficients {
    let response = FilterResponse::from_index(response.choice_index());
    Coefficients::design(response, center.value(), response.default_q())
}

impl EffectType for BasicFilter {
    const NAME: &'static str = "Basic Filter";
    const DESCRIPTION: &'static str = "Filters the incoming signal using an IIR filter design";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let center = params.add("Center", Parameter::real(20.0, NYQUIST, 5000.0));
        let response = params.add("Type", Parameter::discrete(&FilterResponse::CHOICES, "LP"));
        let watch = ParamWatch::new(&[&center, &response]);
        let biquad = Biquad::new(basic_design(&response, &center));
        Self {
            params,
            center,
            response,
            watch,
            biquad,
        }
    }
}

impl Effect for BasicFilter {
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
        let (response, center) = (&self.response, &self.center);
        if let Some(c) = self.watch.refresh(|| basic_design(response, center)) {
            self.biquad.set_coefficients(c);
        }
        self.biquad.render(block);
    }

    fn reset(&mut self) {
        self.biquad.reset();
    }
}

const EQ_LOW_HZ: f64 = 880.0;
const EQ_HIGH_HZ: f64 = 5000.0;

/// Three band equalizer. Low and high bands come from fixed filters; the
/// mid band is whatever both leave behind.
pub struct Equalizer {
    params: Parameters,
    low: Arc<Parameter>,
    mid: Arc<Parameter>,
    high: Arc<Parameter>,
    watch: ParamWatch,
    gains: [f64; 3],
    lp: Biquad,
    hp: Biquad,
}

fn band_gains(low: &Parameter, mid: &Parameter, high: &Parameter) -> [f64; 3] {
    [low.value(), mid.value(), high.value()]
}

impl EffectType for Equalizer {
    const NAME: &'static str = "3-Band Equalizer";
    const DESCRIPTION: &'static str = "A test equalizer function using an IIR filter design";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let low = params.add("Low", Parameter::real(0.0, 2.0, 1.0));
        let mid = params.add("Mid", Parameter::real(0.0, 2.0, 1.0));
        let high = params.add("High", Parameter::real(0.0, 2.0, 1.0));
        let lp = FilterResponse::LowPass;
        let hp = FilterResponse::HighPass;
        let watch = ParamWatch::new(&[&low, &mid, &high]);
        let gains = band_gains(&low, &mid, &high);
        Self {
            params,
            low,
            mid,
            high,
            watch,
            gains,
            lp: Biquad::new(Coefficients::design(lp, EQ_LOW_HZ, lp.default_q())),
            hp: Biquad::new(Coefficients::design(hp, EQ_HIGH_HZ, hp.default_q())),
        }
    }
}

impl Effect for Equalizer {
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
        let (l, m, h) = (&self.low, &self.mid, &self.high);
        if let Some(gains) = self.watch.refresh(|| band_gains(l, m, h)) {
            self.gains = gains;
        }
        let [low, mid, high] = self.gains;
        for s in block.iter_mut() {
            let l = self.lp.next_sample(*s);
            let h = self.hp.next_sample(*s);
            let m = *s - (l + h);
            *s = l * low + m * mid + h * high;
        }
    }

    fn reset(&mut self) {
        self.lp.reset();
        self.hp.reset();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sine(freq: f64, len: usize, amplitude: f64) -> Vec<Sample> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * freq * n as f64 / f64::from(SAMPLE_RATE)).sin())
            .collect()
    }

    pub(crate) fn peak_after(block: &[Sample], skip: usize) -> f64 {
        block[skip.min(block.len())..]
            .iter()
            .fold(0.0f64, |acc, &x| acc.max(x.abs()))
    }

    fn basic(kind: &str, center: f64) -> BasicFilter {
        let fx = BasicFilter::create(&EffectContext::default());
        fx.parameters().get("Type").unwrap().set_choice(kind);
        fx.parameters().get("Center").unwrap().set_value(center);
        fx
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut fx = basic("LP", 500.0);
        let mut block = vec![1000.0; 4096];
        fx.process(&mut block);
        assert!((block[4095] - 1000.0).abs() < 1.0, "got {}", block[4095]);
    }

    #[test]
    fn lowpass_attenuates_high_frequencies() {
        let mut fx = basic("LP", 500.0);
        let mut block = sine(8000.0, 4096, 10_000.0);
        fx.process(&mut block);
        assert!(peak_after(&block, 512) < 500.0);
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut fx = basic("HP", 500.0);
        let mut block = vec![1000.0; 44_100];
        fx.process(&mut block);
        assert!(block[44_099].abs() < 1.0, "got {}", block[44_099]);
    }

    #[test]
    fn bandstop_rejects_center() {
        let mut stop = basic("BS", 1000.0);
        let mut center = sine(1000.0, 8192, 10_000.0);
        stop.process(&mut center);

        let mut stop = basic("BS", 1000.0);
        let mut off = sine(100.0, 8192, 10_000.0);
        stop.process(&mut off);

        assert!(peak_after(&center, 4096) * 4.0 < peak_after(&off, 4096));
    }

    #[test]
    fn coefficient_change_keeps_memory() {
        let mut fx = basic("LP", 500.0);
        let mut block = vec![1000.0; 2048];
        fx.process(&mut block);
        let settled = block[2047];

        fx.parameters().get("Center").unwrap().set_value(600.0);
        let mut next = [1000.0];
        fx.process(&mut next);
        // a cold filter would restart near zero
        assert!((next[0] - settled).abs() < 50.0, "jumped to {}", next[0]);
    }

    #[test]
    fn type_and_center_changes_land_in_one_design() {
        let mut fx = basic("LP", 500.0);
        fx.process(&mut [0.0; 16]);

        fx.parameters().get("Type").unwrap().set_choice("HP");
        fx.parameters().get("Center").unwrap().set_value(200.0);
        fx.process(&mut [0.0; 16]);
        let hp = FilterResponse::HighPass;
        assert_eq!(
            fx.biquad.coefficients(),
            Coefficients::design(hp, 200.0, hp.default_q())
        );
    }

    #[test]
    fn flat_equalizer_is_transparent() {
        let mut eq = Equalizer::create(&EffectContext::default());
        let input = sine(440.0, 1024, 8000.0);
        let mut block = input.clone();
        eq.process(&mut block);
        for (a, b) in input.iter().zip(&block) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn equalizer_low_cut_removes_bass() {
        let mut eq = Equalizer::create(&EffectContext::default());
        eq.low.set_value(0.0);
        eq.mid.set_value(0.0);
        let mut block = sine(100.0, 8192, 10_000.0);
        eq.process(&mut block);
        assert!(peak_after(&block, 4096) < 1000.0);
    }

    #[test]
    fn equalizer_gain_change_applies_on_next_block() {
        let mut eq = Equalizer::create(&EffectContext::default());
        eq.process(&mut [0.0; 16]);
        eq.high.set_value(0.5);
        eq.process(&mut [0.0; 16]);
        assert_eq!(eq.gains, [1.0, 1.0, 0.5]);
    }
}
