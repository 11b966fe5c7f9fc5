//! Butterworth low/high pass designed from a cutoff and a transition width.

use std::f64::consts::PI;
use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::filter::{Biquad, Coefficients, FilterResponse};
use super::param::{ParamWatch, Parameter, Parameters};
use super::registry::{EffectContext, EffectType};
use crate::{NYQUIST, SAMPLE_RATE};

pub const MAX_ORDER: usize = 12;
const STOPBAND_DB: f64 = 40.0;

/// Smallest order meeting [`STOPBAND_DB`] at `stop` Hz with a 3 dB edge at
/// `pass` Hz, after bilinear pre-warping. Clamped to `1..=MAX_ORDER`.
pub fn butterworth_order(pass: f64, stop: f64) -> usize {
    let fs = f64::from(SAMPLE_RATE);
    let warp = |f: f64| (PI * f / fs).tan();
    let (wp, ws) = (warp(pass), warp(stop));
    let ratio = ws.max(wp) / ws.min(wp);
    let spread = ratio.log10();
    if !spread.is_finite() || spread <= 0.0 {
        return MAX_ORDER;
    }
    let needed = (10f64.powf(STOPBAND_DB / 10.0) - 1.0).log10() / (2.0 * spread);
    (needed.ceil() as usize).clamp(1, MAX_ORDER)
}

/// Q of the `k`th conjugate pole pair of an order `n` Butterworth prototype.
fn section_q(k: usize, n: usize) -> f64 {
    1.0 / (2.0 * ((2 * k + 1) as f64 * PI / (2 * n) as f64).sin())
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Shape {
    high_pass: bool,
    cutoff: f64,
    transition: f64,
}

impl Shape {
    fn read(cutoff: &Parameter, transition: &Parameter, response: &Parameter) -> Self {
        Self {
            high_pass: response.choice_index() == 1,
            cutoff: cutoff.value(),
            transition: transition.value(),
        }
    }
}

pub struct ButterworthFilter {
    params: Parameters,
    cutoff: Arc<Parameter>,
    transition: Arc<Parameter>,
    response: Arc<Parameter>,
    watch: ParamWatch,
    sections: Vec<Biquad>,
    order: usize,
}

impl ButterworthFilter {
    pub fn order(&self) -> usize {
        self.order
    }

    fn redesign(&mut self, shape: Shape) {
        let high_pass = shape.high_pass;
        let cutoff = shape.cutoff.min(NYQUIST * 0.98);
        let transition = shape.transition;
        let stop = if high_pass {
            (cutoff - transition).max(1.0)
        } else {
            (cutoff + transition).min(NYQUIST * 0.998)
        };

        let n = butterworth_order(cutoff, stop);
        let pairs = n / 2;
        // resize keeps surviving sections and their state
        self.sections.resize_with(pairs + n % 2, Biquad::default);

        let response = if high_pass {
            FilterResponse::HighPass
        } else {
            FilterResponse::LowPass
        };
        for (k, section) in self.sections.iter_mut().take(pairs).enumerate() {
            section.set_coefficients(Coefficients::design(response, cutoff, section_q(k, n)));
        }
        if n % 2 == 1 {
            if let Some(last) = self.sections.last_mut() {
                last.set_coefficients(Coefficients::first_order(high_pass, cutoff));
            }
        }
        self.order = n;
    }
}

impl EffectType for ButterworthFilter {
    const NAME: &'static str = "Butterworth Filter";
    const DESCRIPTION: &'static str = "Filters the incoming signal using a Butterworth design";

    fn create(_ctx: &EffectContext) -> Self {
        let mut params = Parameters::new();
        let cutoff = params.add("Cutoff", Parameter::real(20.0, 20_000.0, 2000.0));
        let transition = params.add("Transition", Parameter::real(50.0, 10_000.0, 1000.0));
        let response = params.add(
            "Type",
            Parameter::discrete(&[("LP", None), ("HP", None)], "LP"),
        );
        let watch = ParamWatch::new(&[&cutoff, &transition, &response]);
        let mut fx = Self {
            params,
            cutoff,
            transition,
            response,
            watch,
            sections: Vec::with_capacity(MAX_ORDER / 2 + 1),
            order: 0,
        };
        let shape = Shape::read(&fx.cutoff, &fx.transition, &fx.response);
        fx.redesign(shape);
        fx
    }
}

impl Effect for ButterworthFilter {
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
        let (cutoff, transition, response) = (&self.cutoff, &self.transition, &self.response);
        if let Some(shape) = self
            .watch
            .refresh(|| Shape::read(cutoff, transition, response))
        {
            self.redesign(shape);
        }
        for section in self.sections.iter_mut() {
            section.render(block);
        }
    }

    fn reset(&mut self) {
        self.sections.iter_mut().for_each(Biquad::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::filter::tests::{peak_after, sine};

    fn butterworth(kind: &str, cutoff: f64, transition: f64) -> ButterworthFilter {
        let mut fx = ButterworthFilter::create(&EffectContext::default());
        let p = fx.parameters().clone();
        p.get("Type").unwrap().set_choice(kind);
        p.get("Cutoff").unwrap().set_value(cutoff);
        p.get("Transition").unwrap().set_value(transition);
        fx.process(&mut [0.0]);
        fx.reset();
        fx
    }

    #[test]
    fn order_grows_as_transition_narrows() {
        assert_eq!(butterworth_order(1000.0, 11_000.0), 2);
        assert_eq!(butterworth_order(1000.0, 6000.0), 3);
        assert_eq!(butterworth_order(2000.0, 3000.0), MAX_ORDER);
        assert_eq!(butterworth_order(1000.0, 1000.0), MAX_ORDER);
    }

    #[test]
    fn section_q_matches_prototype() {
        assert!((section_q(0, 2) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((section_q(0, 3) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn odd_order_adds_first_order_section() {
        let fx = butterworth("LP", 1000.0, 5000.0);
        assert_eq!(fx.order(), 3);
        assert_eq!(fx.sections.len(), 2);
        let last = fx.sections[1].coefficients();
        assert_eq!((last.b2, last.a2), (0.0, 0.0));
    }

    #[test]
    fn lowpass_meets_stopband() {
        let mut fx = butterworth("LP", 1000.0, 10_000.0);
        assert_eq!(fx.order(), 2);
        let mut block = sine(11_000.0, 8192, 10_000.0);
        fx.process(&mut block);
        assert!(peak_after(&block, 2048) < 100.0);

        let mut dc = vec![1000.0; 8192];
        fx.process(&mut dc);
        assert!((dc[8191] - 1000.0).abs() < 1.0);
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut fx = butterworth("HP", 5000.0, 2000.0);
        let mut dc = vec![1000.0; 8192];
        fx.process(&mut dc);
        assert!(dc[8191].abs() < 1.0, "got {}", dc[8191]);
    }

    #[test]
    fn dropping_a_section_keeps_the_rest() {
        let mut fx = butterworth("LP", 1000.0, 5000.0);
        let mut dc = vec![1000.0; 4096];
        fx.process(&mut dc);

        fx.transition.set_value(10_000.0);
        let mut next = [1000.0];
        fx.process(&mut next);
        assert_eq!(fx.order(), 2);
        assert!((next[0] - 1000.0).abs() < 5.0, "jumped to {}", next[0]);
    }

    #[test]
    fn type_and_cutoff_switch_together() {
        let mut fx = butterworth("LP", 1000.0, 10_000.0);
        fx.response.set_choice("HP");
        fx.cutoff.set_value(12_000.0);
        fx.process(&mut [0.0]);
        assert_eq!(fx.order(), butterworth_order(12_000.0, 2000.0));
        let first = fx.sections[0].coefficients();
        let hp = Coefficients::design(FilterResponse::HighPass, 12_000.0, section_q(0, fx.order()));
        assert_eq!(first, hp);
    }
}
