use crate::dsp::effect::{Effect, Sample};
use crate::MAX_CHAIN_LEN;

/// A serial chain of effects. Owns the effects.
///
/// Storage is reserved for [`MAX_CHAIN_LEN`] slots up front so edits applied
/// on the audio thread never reallocate.
#[derive(Debug)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self {
            effects: Vec::with_capacity(MAX_CHAIN_LEN),
        }
    }

    pub fn is_full(&self) -> bool {
        self.effects.len() >= MAX_CHAIN_LEN
    }

    /// Add to the end. Hands the effect back if the chain is full.
    pub fn append(&mut self, fx: Box<dyn Effect>) -> Result<(), Box<dyn Effect>> {
        if self.is_full() {
            return Err(fx);
        }
        self.effects.push(fx);
        Ok(())
    }

    /// Insert before `index`; indices past the end append.
    pub fn insert(&mut self, index: usize, fx: Box<dyn Effect>) -> Result<(), Box<dyn Effect>> {
        if self.is_full() {
            return Err(fx);
        }
        let index = index.min(self.effects.len());
        self.effects.insert(index, fx);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<dyn Effect>> {
        (index < self.effects.len()).then(|| self.effects.remove(index))
    }

    /// Move the effect at `from` so it ends up at position `to`.
    pub fn move_effect(&mut self, from: usize, to: usize) -> bool {
        let len = self.effects.len();
        if from >= len || to >= len {
            return false;
        }
        if from < to {
            self.effects[from..=to].rotate_left(1);
        } else {
            self.effects[to..=from].rotate_right(1);
        }
        true
    }

    /// Process one mono block in place, in chain order.
    pub fn process_all(&mut self, block: &mut [Sample]) {
        if block.is_empty() {
            return;
        }
        for fx in self.effects.iter_mut() {
            fx.process(block);
        }
    }

    pub fn reset(&mut self) {
        for fx in self.effects.iter_mut() {
            fx.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Effect> {
        self.effects.get(index).map(|fx| fx.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Effect> {
        self.effects.iter().map(|fx| fx.as_ref())
    }

    /// Swap in a whole new chain and return the old one, storage included,
    /// so nothing is freed here. Callers allocate `effects` with room for
    /// [`MAX_CHAIN_LEN`] entries and keep it within that length.
    pub fn replace(&mut self, effects: Vec<Box<dyn Effect>>) -> Vec<Box<dyn Effect>> {
        debug_assert!(effects.len() <= MAX_CHAIN_LEN);
        std::mem::replace(&mut self.effects, effects)
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::distortion::FoldbackDistortion;
    use crate::dsp::gain::Gain;
    use crate::dsp::registry::{EffectContext, EffectType};

    fn gain(amount: f64) -> Box<dyn Effect> {
        Box::new(Gain::with_amount(amount))
    }

    fn foldback(threshold: f64) -> Box<dyn Effect> {
        let fx = FoldbackDistortion::create(&EffectContext::default());
        fx.parameters().get("Threshold").unwrap().set_value(threshold);
        Box::new(fx)
    }

    fn run(chain: &mut EffectChain, input: &[Sample]) -> Vec<Sample> {
        let mut block = input.to_vec();
        chain.process_all(&mut block);
        block
    }

    fn amounts(chain: &EffectChain) -> Vec<f64> {
        chain
            .iter()
            .map(|fx| fx.parameters().get("Amount").unwrap().value())
            .collect()
    }

    #[test]
    fn linear_effects_commute() {
        let input = [100.0, -250.0, 3.0];
        let mut a = EffectChain::new();
        a.append(gain(2.0)).unwrap();
        a.append(gain(3.0)).unwrap();
        let mut b = EffectChain::new();
        b.append(gain(3.0)).unwrap();
        b.append(gain(2.0)).unwrap();
        assert_eq!(run(&mut a, &input), run(&mut b, &input));
        assert_eq!(run(&mut a, &input), vec![600.0, -1500.0, 18.0]);
    }

    #[test]
    fn order_matters_with_nonlinear_effects() {
        let input = [800.0, -800.0];
        let mut a = EffectChain::new();
        a.append(gain(2.0)).unwrap();
        a.append(foldback(1000.0)).unwrap();
        let mut b = EffectChain::new();
        b.append(foldback(1000.0)).unwrap();
        b.append(gain(2.0)).unwrap();
        // fold(1600) = 400, while 2 * fold(800) = 1600
        assert_eq!(run(&mut a, &input), vec![400.0, -400.0]);
        assert_eq!(run(&mut b, &input), vec![1600.0, -1600.0]);
    }

    #[test]
    fn insert_remove_and_move() {
        let mut chain = EffectChain::new();
        chain.append(gain(1.0)).unwrap();
        chain.append(gain(2.0)).unwrap();
        chain.insert(1, gain(3.0)).unwrap();
        chain.insert(99, gain(4.0)).unwrap();
        assert_eq!(amounts(&chain), [1.0, 3.0, 2.0, 4.0]);

        assert!(chain.move_effect(0, 2));
        assert_eq!(amounts(&chain), [3.0, 2.0, 1.0, 4.0]);
        assert!(chain.move_effect(3, 0));
        assert_eq!(amounts(&chain), [4.0, 3.0, 2.0, 1.0]);
        assert!(!chain.move_effect(0, 4));

        let removed = chain.remove(1).unwrap();
        assert_eq!(removed.parameters().get("Amount").unwrap().value(), 3.0);
        assert!(chain.remove(3).is_none());
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.get(0).map(|fx| fx.name()), Some("Gain"));
    }

    #[test]
    fn empty_block_touches_nothing() {
        let mut chain = EffectChain::new();
        chain.append(gain(2.0)).unwrap();
        let mut block: [Sample; 0] = [];
        chain.process_all(&mut block);
        assert!(chain.get(0).is_some());
    }

    #[test]
    fn rejects_effects_past_capacity() {
        let mut chain = EffectChain::new();
        for _ in 0..MAX_CHAIN_LEN {
            chain.append(gain(1.0)).unwrap();
        }
        assert!(chain.is_full());
        assert!(chain.append(gain(1.0)).is_err());
        assert!(chain.insert(0, gain(1.0)).is_err());
        let old = chain.replace(Vec::with_capacity(MAX_CHAIN_LEN));
        assert_eq!(old.len(), MAX_CHAIN_LEN);
        assert!(chain.is_empty());
        assert!(chain.append(gain(1.0)).is_ok());
    }
}
