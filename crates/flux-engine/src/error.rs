//! Engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No {0} device available")]
    NoDevice(&'static str),

    #[error("Failed to query audio device: {0}")]
    Device(String),

    /// The device cannot deliver 16-bit samples at the fixed sample rate.
    /// Effects assume that width, so this is fatal at startup.
    #[error("{direction} device `{device}` has no 16-bit format at {rate} Hz (offered: {offered})")]
    UnsupportedFormat {
        direction: &'static str,
        device: String,
        rate: u32,
        offered: String,
    },

    #[error("Failed to build stream: {0}")]
    StreamBuild(#[from] cpal::BuildStreamError),

    #[error("Failed to start stream: {0}")]
    StreamPlay(#[from] cpal::PlayStreamError),

    #[error("Unknown effect `{0}`")]
    UnknownEffect(String),

    #[error("Effect `{effect}` has no parameter `{parameter}`")]
    UnknownParameter { effect: String, parameter: String },

    #[error("Chain slot {index} out of range (chain holds {len} effects)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Chain is full ({0} effects)")]
    ChainFull(usize),

    #[error("Control queue is full, audio thread is not draining commands")]
    QueueFull,

    #[error("Invalid preset: {0}")]
    Preset(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
