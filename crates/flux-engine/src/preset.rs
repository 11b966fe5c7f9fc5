//! Chain presets: an ordered list of effect names with their parameter values,
//! stored as JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chain::EffectChain;
use crate::dsp::effect::Effect;
use crate::dsp::param::{ParamValue, Parameters};
use crate::dsp::registry::{self, EffectContext};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainPreset {
    pub effects: Vec<EffectPreset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectPreset {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
    /// Parameters following the shared tempo rather than their stored value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tempo_linked: Vec<String>,
}

impl EffectPreset {
    fn capture(name: &str, params: &Parameters) -> Self {
        let mut parameters = BTreeMap::new();
        let mut tempo_linked = Vec::new();
        for (pname, p) in params.iter() {
            parameters.insert(pname.to_owned(), p.get());
            if p.uses_tempo() {
                tempo_linked.push(pname.to_owned());
            }
        }
        Self {
            name: name.to_owned(),
            parameters,
            tempo_linked,
        }
    }

    /// Build the effect and apply the stored values. Values an effect rejects
    /// are skipped with a warning; unknown parameter names are errors.
    pub fn instantiate(&self, ctx: &EffectContext) -> EngineResult<Box<dyn Effect>> {
        let fx = registry::create(&self.name, ctx)?;
        let params = fx.parameters();
        for (pname, value) in &self.parameters {
            let p = params
                .get(pname)
                .ok_or_else(|| EngineError::UnknownParameter {
                    effect: self.name.clone(),
                    parameter: pname.clone(),
                })?;
            if !p.set(value) {
                log::warn!("{}: ignoring {pname} = {value}", self.name);
            }
        }
        for pname in &self.tempo_linked {
            if let Some(p) = params.get(pname) {
                p.set_use_tempo(true);
            }
        }
        Ok(fx)
    }
}

impl ChainPreset {
    /// Snapshot effect names and current parameter values in chain order.
    pub fn capture<'a>(
        effects: impl IntoIterator<Item = (&'static str, &'a Parameters)>,
    ) -> Self {
        Self {
            effects: effects
                .into_iter()
                .map(|(name, params)| EffectPreset::capture(name, params))
                .collect(),
        }
    }

    pub fn from_chain(chain: &EffectChain) -> Self {
        Self::capture(chain.iter().map(|fx| (fx.name(), fx.parameters())))
    }

    pub fn instantiate(&self, ctx: &EffectContext) -> EngineResult<Vec<Box<dyn Effect>>> {
        self.effects.iter().map(|e| e.instantiate(ctx)).collect()
    }

    pub fn build_chain(&self, ctx: &EffectContext) -> EngineResult<EffectChain> {
        let mut chain = EffectChain::new();
        for fx in self.instantiate(ctx)? {
            chain
                .append(fx)
                .map_err(|_| EngineError::ChainFull(crate::MAX_CHAIN_LEN))?;
        }
        Ok(chain)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> EngineResult<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
