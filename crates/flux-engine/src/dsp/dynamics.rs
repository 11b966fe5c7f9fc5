//! Level-dependent effects: compression, sustain and gating.

use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{ParamWatch, Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::SAMPLE_MAX;

const LEVEL_EPSILON: f64 = 1e-9;

#[inline]
pub fn level_to_db(level: f64) -> f64 {
    20.0 * level.max(LEVEL_EPSILON).log10()
}

#[inline]
pub fn db_to_level(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// `-1`, `0` or `1`; unlike `f64::signum`, zero maps to zero.
#[inline]
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Threshold and ratio shared by [`Compressor`] and [`Sustain`].
#[derive(Debug, Clone, Copy, PartialEq)]
struct Curve {
    threshold_db: f64,
    amount: f64,
}

struct Knee {
    params: Parameters,
    amount: Arc<Parameter>,
    sensitivity: Arc<Parameter>,
    watch: ParamWatch,
    curve: Curve,
    threshold: fn(f64) -> f64,
}

impl Knee {
    fn new(threshold: fn(f64) -> f64) -> Self {
        let max = i64::from(SAMPLE_MAX);
        let mut params = Parameters::new();
        let amount = params.add("Amount", Parameter::real(1.0, 5.0, 1.0));
        let sensitivity = params.add("Sensitivity", Parameter::integer(0, max / 4, max / 10));
        let watch = ParamWatch::new(&[&amount, &sensitivity]);
        let curve = Self::read(&amount, &sensitivity, threshold);
        Self {
            params,
            amount,
            sensitivity,
            watch,
            curve,
            threshold,
        }
    }

    fn read(amount: &Parameter, sensitivity: &Parameter, threshold: fn(f64) -> f64) -> Curve {
        Curve {
            threshold_db: threshold(sensitivity.value()),
            amount: amount.value(),
        }
    }

    fn threshold_db(&self) -> f64 {
        (self.threshold)(self.sensitivity.value())
    }

    fn curve(&mut self) -> Curve {
        let (amount, sensitivity, threshold) = (&self.amount, &self.sensitivity, self.threshold);
        if let Some(curve) = self.watch.refresh(|| Self::read(amount, sensitivity, threshold)) {
            self.curve = curve;
        }
        self.curve
    }
}

fn compressor_threshold(sensitivity: f64) -> f64 {
    level_to_db(f64::from(SAMPLE_MAX) - sensitivity)
}

/// Peak compressor. Levels above the threshold are divided down in dB.
pub struct Compressor {
    knee: Knee,
}

impl Compressor {
    pub fn threshold_db(&self) -> f64 {
        self.knee.threshold_db()
    }
}

impl EffectType for Compressor {
    const NAME: &'static str = "Compressor";
    const DESCRIPTION: &'static str = "Peak limiting compressor";

    fn create(_ctx: &EffectContext) -> Self {
        Self {
            knee: Knee::new(compressor_threshold),
        }
    }
}

impl Effect for Compressor {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
    fn parameters(&self) -> &Parameters {
        &self.knee.params
    }

    fn process(&mut self, block: &mut [Sample]) {
        let Curve {
            threshold_db: t,
            amount,
        } = self.knee.curve();
        for s in block.iter_mut() {
            let db = level_to_db(s.abs());
            if db > t {
                *s = sign(*s) * db_to_level(t + (db - t) / amount);
            }
        }
    }
}

/// Small-signal expander. Levels below the threshold are pulled up towards it.
pub struct Sustain {
    knee: Knee,
}

impl Sustain {
    pub fn threshold_db(&self) -> f64 {
        self.knee.threshold_db()
    }
}

impl EffectType for Sustain {
    const NAME: &'static str = "Sustain";
    const DESCRIPTION: &'static str = "Small signal gain";

    fn create(_ctx: &EffectContext) -> Self {
        Self {
            knee: Knee::new(level_to_db),
        }
    }
}

impl Effect for Sustain {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
    fn parameters(&self) -> &Parameters {
        &self.knee.params
    }

    fn process(&mut self, block: &mut [Sample]) {
        let Curve {
            threshold_db: t,
            amount,
        } = self.knee.curve();
        for s in block.iter_mut() {
            let db = level_to_db(s.abs());
            if db < t {
                *s = sign(*s) * db_to_level(t - (t - db) / amount);
            }
        }
    }
}

fn gate_threshold(default_divisor: i64) -> Parameter {
    let max = i64::from(SAMPLE_MAX);
    Parameter::integer(0, max / 100, max / default_divisor)
}

pub struct NoiseGate {
    params: Parameters,
    attenuation: Arc<Parameter>,
    threshold: Arc<Parameter>,
}

impl EffectType for NoiseGate {
    const NAME: &'static str = "Noise Gate";
    const DESCRIPTION: &'static str = "Basic noise gate (no hysteresis)";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let attenuation = params.add("Attenuation", Parameter::real(0.0, 1.0, 1.0).inverted());
        let threshold = params.add("Threshold", gate_threshold(200));
        Self {
            params,
            attenuation,
            threshold,
        }
    }
}

impl Effect for NoiseGate {
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
        let threshold = self.threshold.value();
        let attenuation = self.attenuation.value();
        for s in block.iter_mut() {
            if s.abs() < threshold {
                *s *= attenuation;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Passing,
    Muted,
}

/// Two-threshold gate. Opens when the signal rises above the pass threshold
/// and closes once it falls to the mute threshold.
pub struct HysteresisGate {
    params: Parameters,
    attenuation: Arc<Parameter>,
    pass: Arc<Parameter>,
    mute: Arc<Parameter>,
    state: GateState,
}

impl HysteresisGate {
    pub fn state(&self) -> GateState {
        self.state
    }
}

impl EffectType for HysteresisGate {
    const NAME: &'static str = "Hysteresis Gate";
    const DESCRIPTION: &'static str = "Noise gate with hysteresis";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let attenuation = params.add("Attenuation", Parameter::real(0.0, 1.0, 1.0).inverted());
        let pass = params.add("Pass Threshold", gate_threshold(200));
        let mute = params.add("Mute Threshold", gate_threshold(300));
        Self {
            params,
            attenuation,
            pass,
            mute,
            state: GateState::Muted,
        }
    }
}

impl Effect for HysteresisGate {
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
        let attenuation = self.attenuation.value();
        let pass = self.pass.value();
        // mute above pass would chatter; cap it
        let mute = self.mute.value().min(pass);

        for s in block.iter_mut() {
            let level = s.abs();
            match self.state {
                GateState::Muted if level > pass => self.state = GateState::Passing,
                GateState::Passing if level <= mute => self.state = GateState::Muted,
                _ => {}
            }
            if self.state == GateState::Muted {
                *s *= attenuation;
            }
        }
    }

    fn reset(&mut self) {
        self.state = GateState::Muted;
    }
}
