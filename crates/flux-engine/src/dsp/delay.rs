//! Delay line and comb-filter reverb.

use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{ParamWatch, Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::SAMPLE_RATE;

pub fn samples_from_ms(ms: f64) -> usize {
    (ms * 0.001 * f64::from(SAMPLE_RATE)) as usize
}

/// Feedback comb filter over a circular buffer.
///
/// Each sample reads the oldest entry, mixes it in scaled by `wet`, and writes
/// the input plus the scaled echo times `feedback` back into the same slot.
#[derive(Debug, Default)]
pub struct CombFilter {
    line: Vec<Sample>,
    pos: usize,
}

impl CombFilter {
    pub fn new(len: usize) -> Self {
        Self {
            line: vec![0.0; len],
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// Replace the buffer with a silent one of `len` samples. History is lost.
    pub fn resize(&mut self, len: usize) {
        self.line.clear();
        self.line.resize(len, 0.0);
        self.pos = 0;
    }

    pub fn clear(&mut self) {
        self.line.fill(0.0);
        self.pos = 0;
    }

    pub fn process(&mut self, block: &mut [Sample], wet: Sample, feedback: Sample) {
        // a zero-length line is the identity
        if self.line.is_empty() {
            return;
        }
        let dry = 1.0 - wet;
        for s in block.iter_mut() {
            let mixin = self.line[self.pos] * wet;
            self.line[self.pos] = *s + mixin * feedback;
            *s = *s * dry + mixin;
            self.pos += 1;
            if self.pos == self.line.len() {
                self.pos = 0;
            }
        }
    }
}

/// One tap delay. Changing the delay length reallocates the line and drops
/// the echo tail.
pub struct Delay {
    params: Parameters,
    delay: Arc<Parameter>,
    mix: Arc<Parameter>,
    feedback: Arc<Parameter>,
    watch: ParamWatch,
    comb: CombFilter,
}

impl EffectType for Delay {
    const NAME: &'static str = "Delay";
    const DESCRIPTION: &'static str = "One tap, 100ms-1s delay";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let delay = params.add(
            "Delay",
            Parameter::integer(
                samples_from_ms(100.0) as i64,
                samples_from_ms(1000.0) as i64,
                samples_from_ms(150.0) as i64,
            ),
        );
        let mix = params.add("Mix", Parameter::real(0.0, 1.0, 0.5));
        let feedback = params.add("Feedback", Parameter::real(0.0, 1.0, 0.5));
        let watch = ParamWatch::new(&[&delay]);
        let comb = CombFilter::new(delay.value() as usize);
        Self {
            params,
            delay,
            mix,
            feedback,
            watch,
            comb,
        }
    }
}

impl Effect for Delay {
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
            self.comb.resize(self.delay.value() as usize);
        }
        self.comb
            .process(block, self.mix.value(), self.feedback.value());
    }

    fn reset(&mut self) {
        self.comb.clear();
    }
}

const REVERB_DELAY_MS: f64 = 75.0;
const REVERB_FEEDBACK: Sample = 0.5;

/// Short fixed comb filter; only the wet amount is adjustable.
pub struct Reverb {
    params: Parameters,
    amount: Arc<Parameter>,
    comb: CombFilter,
}

impl EffectType for Reverb {
    const NAME: &'static str = "Reverb";
    const DESCRIPTION: &'static str = "Reverb";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let amount = params.add("Amount", Parameter::real(0.0, 0.5, 0.1));
        Self {
            params,
            amount,
            comb: CombFilter::new(samples_from_ms(REVERB_DELAY_MS)),
        }
    }
}

impl Effect for Reverb {
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
        self.comb
            .process(block, self.amount.value(), REVERB_FEEDBACK);
    }
    fn reset(&mut self) {
        self.comb.clear();
    }
}
