use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flux_engine::EngineConfig;
use serde::Deserialize;

/// Contents of a `--config` TOML file.
///
/// ```toml
/// preset = "presets/clean.json"
///
/// [engine]
/// input_name = "usb"
/// block_size = 512
/// bpm = 96.0
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub engine: EngineConfig,
    pub preset: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub input: Option<String>,
    pub output: Option<String>,
    pub input_index: Option<usize>,
    pub output_index: Option<usize>,
    pub block_size: Option<u32>,
    pub bpm: Option<f64>,
    pub max_loop_seconds: Option<f64>,
    pub preset: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, file: &mut FileConfig) {
        let cfg = &mut file.engine;
        if self.input.is_some() {
            cfg.input_name = self.input;
        }
        if self.output.is_some() {
            cfg.output_name = self.output;
        }
        if self.input_index.is_some() {
            cfg.input_index = self.input_index;
        }
        if self.output_index.is_some() {
            cfg.output_index = self.output_index;
        }
        if self.block_size.is_some() {
            cfg.block_size = self.block_size;
        }
        if let Some(bpm) = self.bpm {
            cfg.bpm = bpm;
        }
        if let Some(secs) = self.max_loop_seconds {
            cfg.max_loop_seconds = secs;
        }
        if self.preset.is_some() {
            file.preset = self.preset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let file = FileConfig::from_toml("[engine]\nblock_size = 256\n").unwrap();
        assert_eq!(file.engine.block_size, Some(256));
        assert_eq!(file.engine.ring_blocks, 8);
        assert_eq!(file.engine.bpm, 120.0);
        assert!(file.preset.is_none());
    }

    #[test]
    fn flags_override_file() {
        let mut file = FileConfig::from_toml(
            "preset = \"a.json\"\n[engine]\ninput_name = \"usb\"\nbpm = 90.0\n",
        )
        .unwrap();
        Overrides {
            input: Some("line".into()),
            bpm: None,
            preset: Some("b.json".into()),
            ..Overrides::default()
        }
        .apply(&mut file);
        assert_eq!(file.engine.input_name.as_deref(), Some("line"));
        assert_eq!(file.engine.bpm, 90.0);
        assert_eq!(file.preset, Some(PathBuf::from("b.json")));
    }

    #[test]
    fn loads_from_disk_and_names_the_file_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("flux.toml");
        fs::write(&good, "[engine]\nmax_loop_seconds = 10.0\n").unwrap();
        assert_eq!(FileConfig::load(&good).unwrap().engine.max_loop_seconds, 10.0);

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[engine]\nbpm = \"fast\"\n").unwrap();
        let err = format!("{:#}", FileConfig::load(&bad).unwrap_err());
        assert!(err.contains("bad.toml"), "{err}");
        assert!(FileConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        assert!(FileConfig::from_toml("volume = 3\n").is_err());
    }
}
