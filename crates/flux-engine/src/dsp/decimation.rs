use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::SAMPLE_BITS;

/// Bit crusher and sample-rate reducer.
///
/// Bit reduction shifts the integer sample right then left, zeroing the low
/// bits. Rate reduction holds every Nth sample for N samples. The hold phase
/// and held value carry over into the next block, so N need not divide the
/// block length.
pub struct Decimation {
    params: Parameters,
    bits: Arc<Parameter>,
    rate: Arc<Parameter>,
    held: Sample,
    remaining: usize,
}

impl EffectType for Decimation {
    const NAME: &'static str = "Decimation";
    const DESCRIPTION: &'static str = "Reduce signal sample rate and/or bit accuracy";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let bits = params.add(
            "Bitrate",
            Parameter::integer(0, i64::from(SAMPLE_BITS), 0).inverted(),
        );
        let rate = params.add("Sample rate", Parameter::integer(1, 25, 1).inverted());
        Self {
            params,
            bits,
            rate,
            held: 0.0,
            remaining: 0,
        }
    }
}

#[inline]
fn crush(x: Sample, shift: u32) -> Sample {
    if shift == 0 {
        return x;
    }
    (((x.trunc() as i64) >> shift) << shift) as Sample
}

impl Effect for Decimation {
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
        let shift = self.bits.value() as u32;
        // zero would mean "never advance"; treat it as no reduction
        let n = (self.rate.value() as usize).max(1);
        self.remaining = self.remaining.min(n);

        for s in block.iter_mut() {
            if self.remaining == 0 {
                self.held = crush(*s, shift);
                self.remaining = n;
            }
            *s = self.held;
            self.remaining -= 1;
        }
    }

    fn reset(&mut self) {
        self.held = 0.0;
        self.remaining = 0;
    }
}
