//! Real-time effect engine for a 16-bit, 44.1 kHz mono signal.
//!
//! The pieces, bottom up: [`dsp`] holds parameters and effects, [`chain`]
//! runs them in series, [`path`] wraps a chain for the audio thread, and
//! [`Engine`] wires an [`AudioPath`] between a cpal input and output stream.

pub mod chain;
pub mod devices;
pub mod dsp;
pub mod error;
pub mod looper;
pub mod path;
pub mod preset;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::Deserialize;

pub use chain::EffectChain;
pub use devices::{Direction, StreamFormat};
pub use dsp::{Effect, EffectContext, ParamValue, Parameters, TempoContext, REGISTRY};
pub use error::{EngineError, EngineResult};
pub use looper::LoopState;
pub use path::{AudioPath, PathController, PathSettings};
pub use preset::ChainPreset;

pub const SAMPLE_RATE: u32 = 44_100;
pub const SAMPLE_BITS: u16 = 16;
pub const SAMPLE_MAX: i16 = i16::MAX;
pub const SAMPLE_MIN: i16 = i16::MIN;
pub const NYQUIST: f64 = SAMPLE_RATE as f64 / 2.0;

pub const DEFAULT_BLOCK_SIZE: usize = 1024;
/// Work buffers are reserved for at least this many samples.
pub const MAX_BLOCK_SIZE: usize = 8192;
pub const MAX_CHAIN_LEN: usize = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub input_name: Option<String>,   // match by substring (case-insensitive)
    pub output_name: Option<String>,
    pub input_index: Option<usize>,   // explicit index from device list
    pub output_index: Option<usize>,
    pub block_size: Option<u32>,      // frames per buffer (if backend supports)
    pub max_loop_seconds: f64,
    /// Capacity of the input -> output sample ring, in blocks.
    pub ring_blocks: usize,
    pub bpm: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_name: None,
            output_name: None,
            input_index: None,
            output_index: None,
            block_size: None,
            max_loop_seconds: 60.0,
            ring_blocks: 8,
            bpm: 120.0,
        }
    }
}

impl EngineConfig {
    pub fn nominal_block(&self) -> usize {
        self.block_size.map_or(DEFAULT_BLOCK_SIZE, |b| b as usize).max(1)
    }
}

/// Counters bumped by the audio callbacks and read by the control side.
#[derive(Debug, Default)]
pub struct EngineStats {
    overruns: AtomicU64,
    underruns: AtomicU64,
}

impl EngineStats {
    /// Input blocks that did not fit in the sample ring.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Output callbacks that found the sample ring short.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

pub struct Engine {
    input_stream: Option<cpal::Stream>,
    output_stream: Option<cpal::Stream>,
    cfg: EngineConfig,
    stats: Arc<EngineStats>,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self {
            input_stream: None,
            output_stream: None,
            cfg,
            stats: Arc::new(EngineStats::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.input_stream.is_some() && self.output_stream.is_some()
    }

    /// Negotiate both devices and run `path` between them: input callback ->
    /// path -> sample ring -> output callback.
    pub fn start(&mut self, path: AudioPath) -> EngineResult<()> {
        self.stop();
        let host = cpal::default_host();

        let in_dev = devices::pick_device(
            &host,
            Direction::Input,
            self.cfg.input_name.as_deref(),
            self.cfg.input_index,
        )?;
        let out_dev = devices::pick_device(
            &host,
            Direction::Output,
            self.cfg.output_name.as_deref(),
            self.cfg.output_index,
        )?;

        let in_fmt = devices::negotiate(&in_dev, Direction::Input, self.cfg.block_size)?;
        let out_fmt = devices::negotiate(&out_dev, Direction::Output, self.cfg.block_size)?;

        let block = self.cfg.nominal_block();
        let (mut tx, rx) = RingBuffer::<i16>::new(block * self.cfg.ring_blocks.max(2));
        // one block of latency so the output side starts with something to read
        for _ in 0..block {
            let _ = tx.push(0);
        }
        let max_block = block.max(MAX_BLOCK_SIZE);

        let input_stream = match in_fmt.sample_format {
            SampleFormat::I16 => build_input::<i16>(&in_dev, &in_fmt, path, tx, &self.stats, max_block)?,
            _ => build_input::<u16>(&in_dev, &in_fmt, path, tx, &self.stats, max_block)?,
        };
        let output_stream = match out_fmt.sample_format {
            SampleFormat::I16 => build_output::<i16>(&out_dev, &out_fmt, rx, &self.stats)?,
            _ => build_output::<u16>(&out_dev, &out_fmt, rx, &self.stats)?,
        };

        input_stream.play()?;
        output_stream.play()?;
        log::info!(
            "engine running: `{}` -> `{}`",
            in_dev.name().unwrap_or_default(),
            out_dev.name().unwrap_or_default()
        );

        self.input_stream = Some(input_stream);
        self.output_stream = Some(output_stream);
        Ok(())
    }

    /// Drops both streams; the audio path goes with the input stream.
    pub fn stop(&mut self) {
        if self.is_running() {
            log::info!(
                "engine stopped ({} overruns, {} underruns)",
                self.stats.overruns(),
                self.stats.underruns()
            );
        }
        self.input_stream = None;
        self.output_stream = None;
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input<T>(
    device: &cpal::Device,
    fmt: &StreamFormat,
    mut path: AudioPath,
    mut ring: Producer<i16>,
    stats: &Arc<EngineStats>,
    max_block: usize,
) -> EngineResult<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = usize::from(fmt.channels.max(1));
    let stats = Arc::clone(stats);
    // scratch reused in the callback (no allocs unless the device oversteps)
    let mut mono = vec![0i16; max_block];
    let mut processed = vec![0i16; max_block];

    let stream = device.build_input_stream(
        &fmt.config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let frames = data.len() / channels;
            if mono.len() < frames {
                mono.resize(frames, 0);
                processed.resize(frames, 0);
            }
            for (m, frame) in mono.iter_mut().zip(data.chunks_exact(channels)) {
                let sum: i32 = frame.iter().map(|&s| i32::from(i16::from_sample(s))).sum();
                *m = (sum / channels as i32) as i16;
            }
            path.process_block(&mono[..frames], &mut processed[..frames]);

            let n = frames.min(ring.slots());
            if n < frames {
                stats.overruns.fetch_add(1, Ordering::Relaxed);
            }
            if let Ok(chunk) = ring.write_chunk_uninit(n) {
                chunk.fill_from_iter(processed[..n].iter().copied());
            }
        },
        |err| log::warn!("input stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    fmt: &StreamFormat,
    mut ring: Consumer<i16>,
    stats: &Arc<EngineStats>,
) -> EngineResult<cpal::Stream>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = usize::from(fmt.channels.max(1));
    let stats = Arc::clone(stats);

    let stream = device.build_output_stream(
        &fmt.config,
        move |out: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = out.len() / channels;
            let available = ring.slots().min(frames);
            if available < frames {
                stats.underruns.fetch_add(1, Ordering::Relaxed);
            }
            match ring.read_chunk(available) {
                Ok(chunk) => {
                    let mut samples = chunk.into_iter();
                    for frame in out.chunks_mut(channels) {
                        let v = samples.next().map_or(T::EQUILIBRIUM, |v| T::from_sample(v));
                        frame.fill(v);
                    }
                }
                Err(_) => out.fill(T::EQUILIBRIUM),
            }
        },
        |err| log::warn!("output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
