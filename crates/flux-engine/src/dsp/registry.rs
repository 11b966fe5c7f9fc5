//! Static effect registry: effect name -> constructor.

use std::sync::Arc;

use super::decimation::Decimation;
use super::delay::{Delay, Reverb};
use super::distortion::{FoldbackDistortion, Fuzzbox, Overdrive};
use super::dynamics::{Compressor, HysteresisGate, NoiseGate, Sustain};
use super::effect::Effect;
use super::filter::{BasicFilter, Equalizer};
use super::butterworth::ButterworthFilter;
use super::gain::{Gain, Passthrough};
use super::modulation::{PulseModulation, Tremolo};
use super::pitch::PitchShift;
use super::spectral::GenericFilter;
use super::tempo::TempoContext;
use crate::error::{EngineError, EngineResult};

/// Shared services handed to effect constructors.
#[derive(Debug, Clone, Default)]
pub struct EffectContext {
    pub tempo: Arc<TempoContext>,
}

impl EffectContext {
    pub fn new(tempo: Arc<TempoContext>) -> Self {
        Self { tempo }
    }
}

/// Implemented by every effect that can be created by name.
pub trait EffectType: Effect + Sized + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn create(ctx: &EffectContext) -> Self;
}

pub struct EffectDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    build: fn(&EffectContext) -> Box<dyn Effect>,
}

impl EffectDescriptor {
    pub fn build(&self, ctx: &EffectContext) -> Box<dyn Effect> {
        (self.build)(ctx)
    }
}

fn boxed<E: EffectType>(ctx: &EffectContext) -> Box<dyn Effect> {
    Box::new(E::create(ctx))
}

const fn entry<E: EffectType>() -> EffectDescriptor {
    EffectDescriptor {
        name: E::NAME,
        description: E::DESCRIPTION,
        build: boxed::<E>,
    }
}

pub static REGISTRY: [EffectDescriptor; 19] = [
    entry::<Gain>(),
    entry::<FoldbackDistortion>(),
    entry::<Fuzzbox>(),
    entry::<Overdrive>(),
    entry::<Decimation>(),
    entry::<Delay>(),
    entry::<Reverb>(),
    entry::<BasicFilter>(),
    entry::<Equalizer>(),
    entry::<ButterworthFilter>(),
    entry::<GenericFilter>(),
    entry::<Tremolo>(),
    entry::<PulseModulation>(),
    entry::<Compressor>(),
    entry::<Sustain>(),
    entry::<NoiseGate>(),
    entry::<HysteresisGate>(),
    entry::<PitchShift>(),
    entry::<Passthrough>(),
];

/// Find an effect by name, ignoring ASCII case.
pub fn lookup(name: &str) -> Option<&'static EffectDescriptor> {
    REGISTRY.iter().find(|d| d.name.eq_ignore_ascii_case(name))
}

pub fn create(name: &str, ctx: &EffectContext) -> EngineResult<Box<dyn Effect>> {
    lookup(name)
        .map(|d| d.build(ctx))
        .ok_or_else(|| EngineError::UnknownEffect(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_match_instances() {
        let ctx = EffectContext::default();
        for (i, descriptor) in REGISTRY.iter().enumerate() {
            assert!(
                REGISTRY[..i]
                    .iter()
                    .all(|d| !d.name.eq_ignore_ascii_case(descriptor.name)),
                "duplicate effect name {}",
                descriptor.name
            );
            let fx = descriptor.build(&ctx);
            assert_eq!(fx.name(), descriptor.name);
            assert_eq!(fx.description(), descriptor.description);
        }
    }

    #[test]
    fn defaults_lie_within_bounds() {
        let ctx = EffectContext::default();
        for descriptor in REGISTRY.iter() {
            let fx = descriptor.build(&ctx);
            for (name, p) in fx.parameters().iter() {
                let v = p.value();
                assert!(
                    p.minimum() <= v && v <= p.maximum(),
                    "{}::{name} default {v} outside [{}, {}]",
                    descriptor.name,
                    p.minimum(),
                    p.maximum()
                );
            }
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("hysteresis gate").map(|d| d.name), Some("Hysteresis Gate"));
        assert!(matches!(
            create("Wah", &EffectContext::default()),
            Err(EngineError::UnknownEffect(name)) if name == "Wah"
        ));
    }
}
