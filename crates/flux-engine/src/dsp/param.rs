//! Effect parameters.
//!
//! A [`Parameter`] is a lock-free cell shared between the control thread,
//! which writes it, and the audio thread, which reads it at the top of every
//! block. Values are stored as `f64` bits in an `AtomicU64`, so a read may be
//! one block stale but is never torn.
//!
//! Every write bumps a version counter. Effects that cache state derived from
//! a parameter (filter coefficients, carrier tables, thresholds) keep a
//! [`ParamWatch`] and rebuild only when a watched version moves.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::tempo::TempoContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Integer,
    Real,
}

/// One entry of a discrete parameter: a name plus an optional icon path for
/// front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub name: &'static str,
    pub icon: Option<&'static str>,
}

#[derive(Debug, Clone)]
pub enum ParamKind {
    Numeric(NumericKind),
    /// Ordered, fixed set of named choices.
    Discrete(Vec<Choice>),
    /// Real value that can follow the shared tempo instead of its own value.
    Tempo(Arc<TempoContext>),
}

/// A parameter value as it appears in presets and on the console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Choice(String),
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Number(v) => write!(f, "{v}"),
            ParamValue::Choice(c) => f.write_str(c),
        }
    }
}

#[derive(Debug)]
pub struct Parameter {
    kind: ParamKind,
    minimum: f64,
    maximum: f64,
    inverted: bool,
    /// `f64` bits; the choice index for discrete parameters.
    bits: AtomicU64,
    use_tempo: AtomicBool,
    version: AtomicU64,
}

impl Parameter {
    fn with_kind(kind: ParamKind, minimum: f64, maximum: f64, default: f64) -> Self {
        Self {
            kind,
            minimum,
            maximum,
            inverted: false,
            bits: AtomicU64::new(default.clamp(minimum, maximum).to_bits()),
            use_tempo: AtomicBool::new(false),
            version: AtomicU64::new(0),
        }
    }

    pub fn integer(minimum: i64, maximum: i64, default: i64) -> Self {
        Self::with_kind(
            ParamKind::Numeric(NumericKind::Integer),
            minimum as f64,
            maximum as f64,
            default as f64,
        )
    }

    pub fn real(minimum: f64, maximum: f64, default: f64) -> Self {
        Self::with_kind(ParamKind::Numeric(NumericKind::Real), minimum, maximum, default)
    }

    /// Real parameter whose effective value can be switched to the shared tempo.
    pub fn tempo(context: Arc<TempoContext>, minimum: f64, maximum: f64, default: f64) -> Self {
        Self::with_kind(ParamKind::Tempo(context), minimum, maximum, default)
    }

    /// Discrete parameter over `choices` (name, optional icon). An unknown
    /// `default` selects the first choice.
    pub fn discrete(choices: &[(&'static str, Option<&'static str>)], default: &str) -> Self {
        let choices: Vec<Choice> = choices
            .iter()
            .map(|&(name, icon)| Choice { name, icon })
            .collect();
        let index = choices.iter().position(|c| c.name == default).unwrap_or(0);
        let maximum = choices.len().saturating_sub(1) as f64;
        Self::with_kind(ParamKind::Discrete(choices), 0.0, maximum, index as f64)
    }

    /// Mark the parameter as displayed high-to-low. Processing ignores it.
    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn choices(&self) -> &[Choice] {
        match &self.kind {
            ParamKind::Discrete(choices) => choices,
            _ => &[],
        }
    }

    /// Effective value: the tempo when tempo mode is on, otherwise the stored
    /// value. Discrete parameters report their choice index.
    #[inline]
    pub fn value(&self) -> f64 {
        if let ParamKind::Tempo(context) = &self.kind {
            if self.use_tempo.load(Ordering::Acquire) {
                return context.bpm();
            }
        }
        self.stored_value()
    }

    #[inline]
    pub fn stored_value(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Store a numeric value, clamped to `[minimum, maximum]` and rounded for
    /// integer parameters. Non-finite values and discrete parameters are
    /// rejected.
    pub fn set_value(&self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        let value = match self.kind {
            ParamKind::Numeric(NumericKind::Integer) => value.round(),
            ParamKind::Numeric(NumericKind::Real) | ParamKind::Tempo(_) => value,
            ParamKind::Discrete(_) => return false,
        };
        self.store(value.clamp(self.minimum, self.maximum));
        true
    }

    /// Select a choice by name (ASCII case-insensitive). Non-members are
    /// rejected and the previous choice is kept.
    pub fn set_choice(&self, name: &str) -> bool {
        match self
            .choices()
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
        {
            Some(index) => {
                self.store(index as f64);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn choice_index(&self) -> usize {
        self.stored_value() as usize
    }

    pub fn choice(&self) -> Option<&'static str> {
        self.choices().get(self.choice_index()).map(|c| c.name)
    }

    pub fn set(&self, value: &ParamValue) -> bool {
        match value {
            ParamValue::Number(v) => self.set_value(*v),
            ParamValue::Choice(name) => self.set_choice(name),
        }
    }

    /// The stored value in preset form.
    pub fn get(&self) -> ParamValue {
        match self.choice() {
            Some(name) => ParamValue::Choice(name.to_owned()),
            None => ParamValue::Number(self.stored_value()),
        }
    }

    /// Switch tempo mode. Returns `false` for parameters that are not tempo-linked.
    pub fn set_use_tempo(&self, on: bool) -> bool {
        if !matches!(self.kind, ParamKind::Tempo(_)) {
            return false;
        }
        if self.use_tempo.swap(on, Ordering::AcqRel) != on {
            self.version.fetch_add(1, Ordering::AcqRel);
        }
        true
    }

    pub fn uses_tempo(&self) -> bool {
        self.use_tempo.load(Ordering::Acquire)
    }

    /// Changes whenever the effective value may have changed, including tempo
    /// changes for tempo-linked parameters.
    #[inline]
    pub fn version(&self) -> u64 {
        let own = self.version.load(Ordering::Acquire);
        match &self.kind {
            ParamKind::Tempo(context) => own.wrapping_add(context.version()),
            _ => own,
        }
    }

    fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

/// Ordered name -> parameter map owned by an effect.
///
/// Cloning is cheap and shares the underlying cells, which is how the control
/// side keeps a handle on an effect's parameters after the effect itself has
/// moved to the audio thread.
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    entries: Vec<(&'static str, Arc<Parameter>)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &'static str, param: Parameter) -> Arc<Parameter> {
        let param = Arc::new(param);
        self.entries.push((name, Arc::clone(&param)));
        param
    }

    /// Lookup by name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, p)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Arc<Parameter>)> {
        self.entries.iter().map(|(n, p)| (*n, p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const SETTLE_ATTEMPTS: usize = 4;

/// Tracks the versions of the parameters an effect derives state from.
#[derive(Debug)]
pub struct ParamWatch {
    watched: Vec<(Arc<Parameter>, u64)>,
    pending: bool,
}

impl ParamWatch {
    pub fn new(params: &[&Arc<Parameter>]) -> Self {
        Self {
            watched: params
                .iter()
                .map(|p| (Arc::clone(p), p.version()))
                .collect(),
            pending: false,
        }
    }

    /// True if any watched parameter changed since the previous call.
    pub fn changed(&mut self) -> bool {
        let mut changed = std::mem::take(&mut self.pending);
        for (param, seen) in self.watched.iter_mut() {
            let version = param.version();
            if version != *seen {
                *seen = version;
                changed = true;
            }
        }
        changed
    }

    /// Snapshot the watched parameters with `read` if any of them changed.
    ///
    /// The snapshot is only accepted when no watched version moved while it
    /// was taken, so derived state never mixes values from either side of a
    /// concurrent write. If writes keep landing, the last read is returned
    /// and the next call reads again.
    pub fn refresh<T>(&mut self, mut read: impl FnMut() -> T) -> Option<T> {
        if !self.changed() {
            return None;
        }
        let mut snapshot = read();
        for _ in 0..SETTLE_ATTEMPTS {
            if !self.changed() {
                return Some(snapshot);
            }
            snapshot = read();
        }
        self.pending = true;
        Some(snapshot)
    }
}
