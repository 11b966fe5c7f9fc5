//! Frequency-domain filtering of a whole block at once.
//!
//! Unlike the IIR effects this one keeps no memory between blocks: each block
//! is transformed, shaped and transformed back on its own, so block edges are
//! audible at high settings.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::effect::{Effect, Sample};
use super::param::{Parameter, Parameters};
use super::registry::{EffectContext, EffectType};

/// Magnitude response at `bin` of an `n` point transform.
#[inline]
pub fn response(amount: f64, bin: usize, n: usize) -> f64 {
    // frequency in cycles per sample, mirrored above Nyquist
    let f = bin.min(n - bin) as f64 / n as f64;
    1.0 / (1.0 + amount * f)
}

struct Plan {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

pub struct GenericFilter {
    params: Parameters,
    amount: Arc<Parameter>,
    plan: Option<Plan>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl GenericFilter {
    /// Plans are cached for the last block length; the driver keeps that fixed.
    fn plan_for(&mut self, len: usize) -> (Arc<dyn Fft<f64>>, Arc<dyn Fft<f64>>) {
        if let Some(plan) = self.plan.as_ref().filter(|p| p.len == len) {
            return (Arc::clone(&plan.forward), Arc::clone(&plan.inverse));
        }
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        self.scratch.resize(scratch, Complex::default());
        self.plan = Some(Plan {
            len,
            forward: Arc::clone(&forward),
            inverse: Arc::clone(&inverse),
        });
        (forward, inverse)
    }
}

impl EffectType for GenericFilter {
    const NAME: &'static str = "Generic Filter";
    const DESCRIPTION: &'static str = "Testing fft and filtering";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let amount = params.add("Amount", Parameter::real(0.0, 10.0, 1.0));
        Self {
            params,
            amount,
            plan: None,
            buffer: Vec::new(),
            scratch: Vec::new(),
        }
    }
}

impl Effect for GenericFilter {
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
        let amount = self.amount.value();
        let n = block.len();
        if n == 0 || amount == 0.0 {
            return;
        }
        let (forward, inverse) = self.plan_for(n);

        self.buffer.clear();
        self.buffer.extend(block.iter().map(|&x| Complex::new(x, 0.0)));
        forward.process_with_scratch(&mut self.buffer, &mut self.scratch);
        for (bin, c) in self.buffer.iter_mut().enumerate() {
            *c *= response(amount, bin, n);
        }
        inverse.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / n as f64;
        for (s, c) in block.iter_mut().zip(&self.buffer) {
            *s = c.re * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn filter(amount: f64) -> GenericFilter {
        let fx = GenericFilter::create(&EffectContext::default());
        fx.amount.set_value(amount);
        fx
    }

    #[test]
    fn zero_amount_is_exact_identity() {
        let mut fx = filter(0.0);
        let input = [1.0, -7.5, 3.25, 32767.0];
        let mut block = input;
        fx.process(&mut block);
        assert_eq!(block, input);
    }

    #[test]
    fn dc_is_untouched() {
        let mut fx = filter(10.0);
        let mut block = [500.0; 64];
        fx.process(&mut block);
        for s in block {
            assert_relative_eq!(s, 500.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn nyquist_is_attenuated() {
        let mut fx = filter(2.0);
        let mut block: Vec<Sample> = (0..64)
            .map(|i| if i % 2 == 0 { 1000.0 } else { -1000.0 })
            .collect();
        fx.process(&mut block);
        // H(0.5) = 1 / (1 + 2 * 0.5)
        for (i, s) in block.iter().enumerate() {
            let expected = if i % 2 == 0 { 500.0 } else { -500.0 };
            assert_relative_eq!(*s, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn plan_follows_block_length() {
        let mut fx = filter(1.0);
        fx.process(&mut [1.0; 16]);
        fx.process(&mut [1.0; 24]);
        assert_eq!(fx.plan.as_ref().map(|p| p.len), Some(24));
    }
}
