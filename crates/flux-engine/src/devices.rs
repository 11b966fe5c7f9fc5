use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};

use crate::error::{EngineError, EngineResult};
use crate::SAMPLE_RATE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default_input: bool,
    pub is_default_output: bool,
    pub has_input: bool,
    pub has_output: bool,
}

fn device_error(e: impl std::fmt::Display) -> EngineError {
    EngineError::Device(e.to_string())
}

fn supports(dev: &cpal::Device, direction: Direction) -> bool {
    match direction {
        Direction::Input => dev
            .supported_input_configs()
            .map(|mut c| c.next().is_some())
            .unwrap_or(false),
        Direction::Output => dev
            .supported_output_configs()
            .map(|mut c| c.next().is_some())
            .unwrap_or(false),
    }
}

pub fn list_devices() -> EngineResult<Vec<DeviceInfo>> {
    let host = cpal::default_host();

    let default_in = host.default_input_device().and_then(|d| d.name().ok());
    let default_out = host.default_output_device().and_then(|d| d.name().ok());

    let mut out = Vec::new();
    for dev in host.devices().map_err(device_error)? {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        out.push(DeviceInfo {
            is_default_input: default_in.as_deref() == Some(name.as_str()),
            is_default_output: default_out.as_deref() == Some(name.as_str()),
            has_input: supports(&dev, Direction::Input),
            has_output: supports(&dev, Direction::Output),
            name,
        });
    }
    Ok(out)
}

/// Pretty-print for CLI
pub fn print_devices() -> EngineResult<()> {
    let list = list_devices()?;
    if list.is_empty() {
        println!("(no devices found)");
        return Ok(());
    }
    for (i, d) in list.iter().enumerate() {
        let caps = match (d.has_input, d.has_output) {
            (true, true) => "in/out",
            (true, false) => "in",
            (false, true) => "out",
            (false, false) => "-",
        };
        let mut marks = String::new();
        if d.is_default_input {
            marks.push_str("*I");
        }
        if d.is_default_output {
            if !marks.is_empty() {
                marks.push(' ');
            }
            marks.push_str("*O");
        }
        if !marks.is_empty() {
            print!("[{marks}] ");
        }
        println!("{:>2}  {:<6}  {}", i, caps, d.name);
    }
    Ok(())
}

/// Choose a device: explicit index (as printed by [`print_devices`]) first,
/// then a case-insensitive name substring, then the host default.
pub fn pick_device(
    host: &cpal::Host,
    direction: Direction,
    name_substr: Option<&str>,
    index: Option<usize>,
) -> EngineResult<cpal::Device> {
    if let Some(idx) = index {
        match host.devices().map_err(device_error)?.nth(idx) {
            Some(dev) if supports(&dev, direction) => return Ok(dev),
            _ => log::warn!("device #{idx} has no {} side, trying other selectors", direction.as_str()),
        }
    }

    if let Some(q) = name_substr {
        let q = q.to_lowercase();
        for dev in host.devices().map_err(device_error)? {
            let name = dev.name().unwrap_or_default();
            if name.to_lowercase().contains(&q) && supports(&dev, direction) {
                return Ok(dev);
            }
        }
        log::warn!("no {} device matches `{q}`, using default", direction.as_str());
    }

    let default = match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    };
    default.ok_or(EngineError::NoDevice(direction.as_str()))
}

/// The stream configuration negotiated for one side of the engine.
#[derive(Debug, Clone)]
pub struct StreamFormat {
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub channels: u16,
}

fn is_16_bit(format: SampleFormat) -> bool {
    matches!(format, SampleFormat::I16 | SampleFormat::U16)
}

/// Pick a 16-bit configuration at [`SAMPLE_RATE`] from `ranges`, preferring
/// mono, then the fewest channels, then signed samples.
pub fn choose_format(ranges: &[SupportedStreamConfigRange]) -> Option<(u16, SampleFormat)> {
    let rate = SampleRate(SAMPLE_RATE);
    ranges
        .iter()
        .filter(|r| is_16_bit(r.sample_format()))
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .min_by_key(|r| {
            (
                r.channels() != 1,
                r.channels(),
                r.sample_format() != SampleFormat::I16,
            )
        })
        .map(|r| (r.channels(), r.sample_format()))
}

/// Negotiate a 16-bit, 44.1 kHz stream. Anything else is fatal.
pub fn negotiate(
    device: &cpal::Device,
    direction: Direction,
    block_size: Option<u32>,
) -> EngineResult<StreamFormat> {
    let ranges: Vec<SupportedStreamConfigRange> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map_err(device_error)?
            .collect(),
        Direction::Output => device
            .supported_output_configs()
            .map_err(device_error)?
            .collect(),
    };

    let Some((channels, sample_format)) = choose_format(&ranges) else {
        let offered = ranges
            .iter()
            .map(|r| {
                format!(
                    "{}ch {:?} {}-{} Hz",
                    r.channels(),
                    r.sample_format(),
                    r.min_sample_rate().0,
                    r.max_sample_rate().0
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        return Err(EngineError::UnsupportedFormat {
            direction: direction.as_str(),
            device: device.name().unwrap_or_default(),
            rate: SAMPLE_RATE,
            offered,
        });
    };

    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: block_size.map_or(BufferSize::Default, BufferSize::Fixed),
    };
    log::info!(
        "{} `{}`: {channels}ch {sample_format:?} @ {SAMPLE_RATE} Hz, buffer {:?}",
        direction.as_str(),
        device.name().unwrap_or_default(),
        config.buffer_size
    );
    Ok(StreamFormat {
        config,
        sample_format,
        channels,
    })
}
