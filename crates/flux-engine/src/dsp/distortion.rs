//! Memoryless waveshapers.
//!
//! Each shaper is a pure function of the instantaneous amplitude, so these
//! effects carry no state between blocks.

use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::SAMPLE_MAX;

/// Fold samples beyond `threshold` back towards zero. The result is truncated
/// toward zero like the integer path it models.
#[inline]
pub fn foldback(x: Sample, threshold: Sample) -> Sample {
    if x > threshold || x < -threshold {
        ((((x - threshold) % (threshold * 4.0)).abs() - threshold * 2.0).abs() - threshold).trunc()
    } else {
        x
    }
}

/// Asymmetric fuzz: positive half amplified, negative half attenuated.
#[inline]
pub fn fuzz(x: Sample, amount: Sample) -> Sample {
    if x > 0.0 {
        x * amount
    } else if x < 0.0 {
        x / amount
    } else {
        0.0
    }
}

/// `x / (x² + knee)` on the normalised signal. A knee of 0.75 is close to
/// linear for |x| < 0.5.
#[inline]
pub fn overdrive(x: Sample, knee: Sample, scale: Sample) -> Sample {
    let u = x / scale;
    u / (u * u + knee) * scale
}

pub struct FoldbackDistortion {
    params: Parameters,
    threshold: Arc<Parameter>,
}

impl EffectType for FoldbackDistortion {
    const NAME: &'static str = "Foldback Distortion";
    const DESCRIPTION: &'static str = "A rudimentary distortion utilizing a threshold amplitude";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let max = i64::from(SAMPLE_MAX);
        let threshold = params.add("Threshold", Parameter::integer(1, max, max));
        Self { params, threshold }
    }
}

impl Effect for FoldbackDistortion {
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
        let t = self.threshold.value().max(1.0);
        for s in block.iter_mut() {
            *s = foldback(*s, t);
        }
    }
}

pub struct Fuzzbox {
    params: Parameters,
    amount: Arc<Parameter>,
}

impl EffectType for Fuzzbox {
    const NAME: &'static str = "Fuzzbox";
    const DESCRIPTION: &'static str = "Asymmetrical distortion";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let amount = params.add("Amount", Parameter::real(1.0, 5.0, 1.0));
        Self { params, amount }
    }
}

impl Effect for Fuzzbox {
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
        let a = self.amount.value();
        for s in block.iter_mut() {
            *s = fuzz(*s, a);
        }
    }
}

pub struct Overdrive {
    params: Parameters,
    knee: Arc<Parameter>,
    sensitivity: Arc<Parameter>,
}

impl EffectType for Overdrive {
    const NAME: &'static str = "Overdrive";
    const DESCRIPTION: &'static str = "Non-linear distortion";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let knee = params.add("Amount", Parameter::real(0.1, 0.75, 0.75).inverted());
        let sensitivity = params.add("Sensitivity", Parameter::real(0.01, 1.0, 1.0).inverted());
        Self {
            params,
            knee,
            sensitivity,
        }
    }
}

impl Effect for Overdrive {
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
        let knee = self.knee.value();
        let scale = f64::from(SAMPLE_MAX) * self.sensitivity.value();
        for s in block.iter_mut() {
            *s = overdrive(*s, knee, scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn foldback_passes_signal_inside_threshold() {
        assert_eq!(foldback(999.0, 1000.0), 999.0);
        assert_eq!(foldback(-1000.0, 1000.0), -1000.0);
    }

    #[test]
    fn foldback_reflects_excursions() {
        assert_eq!(foldback(1100.0, 1000.0), 900.0);
        assert_eq!(foldback(-1100.0, 1000.0), -900.0);
        assert_eq!(foldback(3000.0, 1000.0), -1000.0);
    }

    #[test]
    fn fuzz_is_asymmetric() {
        assert_eq!(fuzz(100.0, 4.0), 400.0);
        assert_eq!(fuzz(-100.0, 4.0), -25.0);
        assert_eq!(fuzz(0.0, 4.0), 0.0);
    }

    #[test]
    fn overdrive_is_odd_and_saturates() {
        let scale = 32767.0;
        let small = overdrive(1000.0, 0.75, scale);
        assert_relative_eq!(small, 1000.0 / 0.75, max_relative = 0.01);
        assert_relative_eq!(overdrive(-1000.0, 0.75, scale), -small);
        // Beyond the peak at u = sqrt(knee) the curve bends back down.
        assert!(overdrive(scale * 2.0, 0.75, scale) < overdrive(scale * 0.9, 0.75, scale));
    }

    #[test]
    fn effects_apply_per_sample() {
        let ctx = EffectContext::default();
        let mut fold = FoldbackDistortion::create(&ctx);
        fold.parameters().get("Threshold").unwrap().set_value(1000.0);
        let mut block = [500.0, 1100.0, -1100.0];
        fold.process(&mut block);
        assert_eq!(block, [500.0, 900.0, -900.0]);

        let mut fuzzbox = Fuzzbox::create(&ctx);
        fuzzbox.parameters().get("Amount").unwrap().set_value(2.0);
        let mut block = [10.0, -10.0];
        fuzzbox.process(&mut block);
        assert_eq!(block, [20.0, -5.0]);
    }
}
