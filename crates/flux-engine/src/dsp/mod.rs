pub mod butterworth;
pub mod decimation;
pub mod delay;
pub mod distortion;
pub mod dynamics;
pub mod effect;
pub mod filter;
pub mod gain;
pub mod modulation;
pub mod param;
pub mod pitch;
pub mod registry;
pub mod spectral;
pub mod tempo;

pub use effect::{Effect, Sample};
pub use param::{Choice, NumericKind, ParamKind, ParamValue, ParamWatch, Parameter, Parameters};
pub use registry::{EffectContext, EffectDescriptor, EffectType, REGISTRY};
pub use tempo::TempoContext;
