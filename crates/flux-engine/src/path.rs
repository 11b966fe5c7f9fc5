//! The per-block audio path and its control-thread handle.
//!
//! [`AudioPath`] is owned by the real-time callback. Everything the control
//! thread wants changed (chain edits, bypass, looper transport) travels as a
//! [`PathCommand`] through a lock-free SPSC queue and is applied at the start
//! of the next block, so a block always sees one consistent chain. Parameter
//! values are the exception: they are atomic cells shared directly.

use std::sync::Arc;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::chain::EffectChain;
use crate::dsp::effect::{Effect, Sample};
use crate::dsp::param::{ParamValue, Parameter, Parameters};
use crate::dsp::registry::{self, EffectContext};
use crate::dsp::tempo::TempoContext;
use crate::error::{EngineError, EngineResult};
use crate::looper::{LoopState, LoopStatus, Looper};
use crate::preset::ChainPreset;
use crate::{EngineConfig, MAX_BLOCK_SIZE, MAX_CHAIN_LEN, SAMPLE_MAX, SAMPLE_MIN, SAMPLE_RATE};

#[derive(Debug)]
pub enum PathCommand {
    Insert { index: usize, effect: Box<dyn Effect> },
    Remove { index: usize },
    Move { from: usize, to: usize },
    /// Swap in a complete chain, built with capacity for [`MAX_CHAIN_LEN`].
    Replace(Vec<Box<dyn Effect>>),
    SetProcessing(bool),
    StartRecording,
    StopRecording,
    StartLoop,
    StopLoop,
    EraseLoop,
}

/// Something the audio thread has let go of, on its way back to be dropped.
#[derive(Debug)]
enum Retired {
    Effect(Box<dyn Effect>),
    Chain(Vec<Box<dyn Effect>>),
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    /// Work buffer size reserved up front.
    pub max_block_size: usize,
    pub max_loop_samples: usize,
    pub command_capacity: usize,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            max_block_size: MAX_BLOCK_SIZE,
            max_loop_samples: 60 * SAMPLE_RATE as usize,
            command_capacity: 256,
        }
    }
}

impl From<&EngineConfig> for PathSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            max_block_size: cfg.nominal_block().max(MAX_BLOCK_SIZE),
            max_loop_samples: (cfg.max_loop_seconds * f64::from(SAMPLE_RATE)) as usize,
            ..Self::default()
        }
    }
}

/// Audio-thread side: widen, run the chain, overlay the loop, clip, narrow.
pub struct AudioPath {
    chain: EffectChain,
    looper: Looper,
    commands: Consumer<PathCommand>,
    retired: Producer<Retired>,
    work: Vec<Sample>,
    processing: bool,
}

impl AudioPath {
    pub fn new(settings: &PathSettings, tempo: Arc<TempoContext>) -> (Self, PathController) {
        let (command_tx, command_rx) = RingBuffer::new(settings.command_capacity);
        // one retiree per command at most, plus the one sent after a drain
        let (retired_tx, retired_rx) = RingBuffer::new(settings.command_capacity + 1);
        let looper = Looper::new(settings.max_loop_samples);
        let loop_status = looper.status();

        let path = Self {
            chain: EffectChain::new(),
            looper,
            commands: command_rx,
            retired: retired_tx,
            work: vec![0.0; settings.max_block_size],
            processing: true,
        };
        let controller = PathController {
            commands: command_tx,
            retired: retired_rx,
            slots: Vec::with_capacity(MAX_CHAIN_LEN),
            ctx: EffectContext::new(tempo),
            loop_status,
            processing: true,
        };
        (path, controller)
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn loop_state(&self) -> LoopState {
        self.looper.state()
    }

    /// Hand an effect or old chain back to the control thread for dropping.
    ///
    /// The controller drains this queue before every send, so it cannot fill
    /// while the controller is alive. Once the controller is gone the item is
    /// dropped here.
    fn retire(&mut self, item: Retired) {
        let _ = self.retired.push(item);
    }

    /// Apply pending commands (call at start of audio callback)
    fn process_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                PathCommand::Insert { index, effect } => {
                    if let Err(fx) = self.chain.insert(index, effect) {
                        self.retire(Retired::Effect(fx));
                    }
                }
                PathCommand::Remove { index } => {
                    if let Some(fx) = self.chain.remove(index) {
                        self.retire(Retired::Effect(fx));
                    }
                }
                PathCommand::Move { from, to } => {
                    self.chain.move_effect(from, to);
                }
                PathCommand::Replace(effects) => {
                    let old = self.chain.replace(effects);
                    self.retire(Retired::Chain(old));
                }
                PathCommand::SetProcessing(on) => self.processing = on,
                PathCommand::StartRecording => self.looper.start_recording(),
                PathCommand::StopRecording => self.looper.stop_recording(),
                PathCommand::StartLoop => {
                    self.looper.start_playback();
                }
                PathCommand::StopLoop => self.looper.stop_playback(),
                PathCommand::EraseLoop => self.looper.erase(),
            }
        }
    }

    /// Run one block of 16-bit mono PCM. `output` receives as many samples as
    /// `input` holds (or fewer, if it is shorter).
    pub fn process_block(&mut self, input: &[i16], output: &mut [i16]) {
        self.process_commands();

        let n = input.len().min(output.len());
        if n == 0 {
            return;
        }
        if self.work.len() < n {
            // device handed us a bigger block than negotiated
            self.work.resize(n, 0.0);
        }
        let block = &mut self.work[..n];
        for (w, &x) in block.iter_mut().zip(input) {
            *w = Sample::from(x);
        }

        if self.processing {
            self.chain.process_all(block);
        }
        self.looper.mix_into(block);

        let (lo, hi) = (Sample::from(SAMPLE_MIN), Sample::from(SAMPLE_MAX));
        for (w, out) in block.iter_mut().zip(output.iter_mut()) {
            *w = w.clamp(lo, hi);
            *out = *w as i16;
        }
        self.looper.record(block);
    }
}

struct Slot {
    name: &'static str,
    params: Parameters,
}

/// Control-thread handle to an [`AudioPath`].
///
/// Keeps a mirror of the chain (names and shared parameter cells) so lookups
/// and validation never touch the audio thread.
pub struct PathController {
    commands: Producer<PathCommand>,
    retired: Consumer<Retired>,
    slots: Vec<Slot>,
    ctx: EffectContext,
    loop_status: LoopStatus,
    processing: bool,
}

impl PathController {
    fn send(&mut self, cmd: PathCommand) -> EngineResult<()> {
        self.collect_retired();
        self.commands.push(cmd).map_err(|_| EngineError::QueueFull)
    }

    fn slot(&self, index: usize) -> EngineResult<&Slot> {
        self.slots.get(index).ok_or(EngineError::IndexOutOfRange {
            index,
            len: self.slots.len(),
        })
    }

    fn check_index(&self, index: usize) -> EngineResult<()> {
        self.slot(index).map(|_| ())
    }

    pub fn context(&self) -> &EffectContext {
        &self.ctx
    }

    pub fn tempo(&self) -> &Arc<TempoContext> {
        &self.ctx.tempo
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Effect names and parameter handles in chain order.
    pub fn effects(&self) -> impl Iterator<Item = (&'static str, &Parameters)> {
        self.slots.iter().map(|s| (s.name, &s.params))
    }

    pub fn parameters(&self, index: usize) -> EngineResult<&Parameters> {
        self.slot(index).map(|s| &s.params)
    }

    /// Create `name` from the registry and add it at the end. Returns its index.
    pub fn append(&mut self, name: &str) -> EngineResult<usize> {
        let fx = registry::create(name, &self.ctx)?;
        self.insert_effect(self.slots.len(), fx)
    }

    pub fn insert(&mut self, index: usize, name: &str) -> EngineResult<usize> {
        let fx = registry::create(name, &self.ctx)?;
        self.insert_effect(index, fx)
    }

    /// Insert an already-built effect before `index` (clamped to the end).
    pub fn insert_effect(&mut self, index: usize, effect: Box<dyn Effect>) -> EngineResult<usize> {
        if self.slots.len() >= MAX_CHAIN_LEN {
            return Err(EngineError::ChainFull(MAX_CHAIN_LEN));
        }
        let index = index.min(self.slots.len());
        let slot = Slot {
            name: effect.name(),
            params: effect.parameters().clone(),
        };
        self.send(PathCommand::Insert { index, effect })?;
        self.slots.insert(index, slot);
        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> EngineResult<()> {
        self.check_index(index)?;
        self.send(PathCommand::Remove { index })?;
        self.slots.remove(index);
        Ok(())
    }

    pub fn move_effect(&mut self, from: usize, to: usize) -> EngineResult<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        self.send(PathCommand::Move { from, to })?;
        let slot = self.slots.remove(from);
        self.slots.insert(to, slot);
        Ok(())
    }

    pub fn clear(&mut self) -> EngineResult<()> {
        self.replace(Vec::new())
    }

    /// Send `effects` as one chain swap; the mirror follows only on success.
    fn replace(&mut self, effects: Vec<Box<dyn Effect>>) -> EngineResult<()> {
        if effects.len() > MAX_CHAIN_LEN {
            return Err(EngineError::ChainFull(MAX_CHAIN_LEN));
        }
        let slots = effects
            .iter()
            .map(|fx| Slot {
                name: fx.name(),
                params: fx.parameters().clone(),
            })
            .collect();
        let mut chain = Vec::with_capacity(MAX_CHAIN_LEN);
        chain.extend(effects);
        self.send(PathCommand::Replace(chain))?;
        self.slots = slots;
        Ok(())
    }

    /// With processing off the chain is skipped; the looper still runs.
    pub fn set_processing_enabled(&mut self, on: bool) -> EngineResult<()> {
        self.send(PathCommand::SetProcessing(on))?;
        self.processing = on;
        Ok(())
    }

    pub fn processing_enabled(&self) -> bool {
        self.processing
    }

    pub fn start_recording(&mut self) -> EngineResult<()> {
        self.send(PathCommand::StartRecording)
    }

    pub fn stop_recording(&mut self) -> EngineResult<()> {
        self.send(PathCommand::StopRecording)
    }

    /// Ignored on the audio side unless a loop exists and nothing is recording.
    pub fn start_loop(&mut self) -> EngineResult<()> {
        self.send(PathCommand::StartLoop)
    }

    pub fn stop_loop(&mut self) -> EngineResult<()> {
        self.send(PathCommand::StopLoop)
    }

    pub fn erase_loop(&mut self) -> EngineResult<()> {
        self.send(PathCommand::EraseLoop)
    }

    /// As of the last processed block.
    pub fn loop_state(&self) -> LoopState {
        self.loop_status.get()
    }

    fn parameter(&self, index: usize, name: &str) -> EngineResult<&Arc<Parameter>> {
        let slot = self.slot(index)?;
        slot.params
            .get(name)
            .ok_or_else(|| EngineError::UnknownParameter {
                effect: slot.name.to_owned(),
                parameter: name.to_owned(),
            })
    }

    /// Write a parameter of the effect at `index`. `Ok(false)` means the value
    /// was rejected (NaN, or not one of a discrete parameter's choices).
    pub fn set_parameter(&self, index: usize, name: &str, value: &ParamValue) -> EngineResult<bool> {
        Ok(self.parameter(index, name)?.set(value))
    }

    /// `Ok(false)` if the parameter cannot follow the tempo.
    pub fn set_tempo_mode(&self, index: usize, name: &str, on: bool) -> EngineResult<bool> {
        Ok(self.parameter(index, name)?.set_use_tempo(on))
    }

    /// Drop effects the audio thread has let go of. Returns how many.
    pub fn collect_retired(&mut self) -> usize {
        let mut n = 0;
        while let Ok(item) = self.retired.pop() {
            match item {
                Retired::Effect(fx) => {
                    log::debug!("released {}", fx.name());
                    n += 1;
                }
                Retired::Chain(chain) => {
                    log::debug!("released a chain of {}", chain.len());
                    n += chain.len();
                }
            }
        }
        n
    }

    pub fn preset(&self) -> ChainPreset {
        ChainPreset::capture(self.effects())
    }

    /// Replace the whole chain in a single step. Every effect is built before
    /// anything is sent, and any error leaves the current chain untouched.
    pub fn load_preset(&mut self, preset: &ChainPreset) -> EngineResult<()> {
        if preset.effects.len() > MAX_CHAIN_LEN {
            return Err(EngineError::ChainFull(MAX_CHAIN_LEN));
        }
        let effects = preset.instantiate(&self.ctx)?;
        self.replace(effects)
    }
}
