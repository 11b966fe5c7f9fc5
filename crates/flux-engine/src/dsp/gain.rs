use std::sync::Arc;

use super::effect::{Effect, Sample};
use super::param::{Parameter, Parameters};
use super::registry::{EffectContext, EffectType};

/// Linear gain. Clipping is left to the audio path so chained gains don't
/// clip twice.
pub struct Gain {
    params: Parameters,
    amount: Arc<Parameter>,
}

impl Gain {
    pub fn new() -> Self {
        let mut params = Parameters::new();
        let amount = params.add("Amount", Parameter::real(0.0, 20.0, 1.0));
        Self { params, amount }
    }

    pub fn with_amount(amount: f64) -> Self {
        let gain = Self::new();
        gain.amount.set_value(amount);
        gain
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectType for Gain {
    const NAME: &'static str = "Gain";
    const DESCRIPTION: &'static str = "Scale the signal level";

    fn create(_ctx: &EffectContext) -> Self {
        Self::new()
    }
}

impl Effect for Gain {
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
        let g = self.amount.value();
        for s in block.iter_mut() {
            *s *= g;
        }
    }
}

/// Leaves the signal untouched.
#[derive(Default)]
pub struct Passthrough {
    params: Parameters,
}

impl EffectType for Passthrough {
    const NAME: &'static str = "Passthrough";
    const DESCRIPTION: &'static str = "Does not modify the signal";

    fn create(_ctx: &EffectContext) -> Self {
        Self::default()
    }
}

impl Effect for Passthrough {
    fn name(&self) -> &'static str {
        Self::NAME
    }
    fn description(&self) -> &'static str {
        Self::DESCRIPTION
    }
    fn parameters(&self) -> &Parameters {
        &self.params
    }
    fn process(&mut self, _block: &mut [Sample]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_without_clipping() {
        let mut gain = Gain::with_amount(4.0);
        let mut block = [10_000.0, -20_000.0, 0.5];
        gain.process(&mut block);
        assert_eq!(block, [40_000.0, -80_000.0, 2.0]);
        assert!(!gain.description().to_lowercase().contains("clip"));
    }

    #[test]
    fn picks_up_parameter_edits_on_next_block() {
        let mut gain = Gain::new();
        let handle = gain.parameters().clone();
        let mut block = [100.0];
        gain.process(&mut block);
        assert_eq!(block, [100.0]);

        handle.get("Amount").unwrap().set_value(0.5);
        gain.process(&mut block);
        assert_eq!(block, [50.0]);
    }
}
