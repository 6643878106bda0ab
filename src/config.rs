use crate::app_dirs::AppDirs;
use crate::playback::Sampling;
use crate::selection::SelectionStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a positive number, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("{name} must not be negative, got {value}")]
    Negative { name: &'static str, value: f64 },
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Sample position on every rendered frame
    Frame,
    /// Coarse polling fallback
    Polled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub manifest_path: PathBuf,
    pub window_frames: u32,
    pub frame_rate_hz: f64,
    pub sampling: SamplingMode,
    pub poll_interval_ms: f64,
    pub selection: SelectionStrategy,
    pub seed: Option<u64>,
    pub react_key: char,
    pub result_hold_ms: f64,
    /// Length assumed for clips whose manifest entry has no duration.
    pub default_clip_secs: f64,
    pub record_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("sequences.json"),
            window_frames: 25,
            frame_rate_hz: 60.0,
            sampling: SamplingMode::Frame,
            poll_interval_ms: 250.0,
            selection: SelectionStrategy::Uniform,
            seed: None,
            react_key: ' ',
            result_hold_ms: 1000.0,
            default_clip_secs: 4.0,
            record_history: true,
        }
    }
}

impl Config {
    /// Range-check the timing values; frame and window lengths derive from them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("window_frames", self.window_frames as f64)?;
        positive("frame_rate_hz", self.frame_rate_hz)?;
        positive("poll_interval_ms", self.poll_interval_ms)?;
        positive("default_clip_secs", self.default_clip_secs)?;
        if !self.result_hold_ms.is_finite() || self.result_hold_ms < 0.0 {
            return Err(ConfigError::Negative {
                name: "result_hold_ms",
                value: self.result_hold_ms,
            });
        }
        Ok(())
    }

    pub fn window_ms(&self) -> f64 {
        self.window_frames as f64 * 1000.0 / self.frame_rate_hz
    }

    pub fn frame_ms(&self) -> f64 {
        1000.0 / self.frame_rate_hz
    }

    pub fn sampling(&self) -> Sampling {
        match self.sampling {
            SamplingMode::Frame => Sampling::per_frame(self.frame_rate_hz),
            SamplingMode::Polled => Sampling::Polled {
                interval_ms: self.poll_interval_ms,
            },
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice::<Config>(&bytes).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable config");
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_window_matches_25_frames_at_60hz() {
        let cfg = Config::default();
        assert!((cfg.window_ms() - 416.6667).abs() < 1e-3);
        assert_eq!(cfg.sampling(), Sampling::per_frame(60.0));
    }

    #[test]
    fn validate_rejects_zero_and_negative_timings() {
        assert_eq!(Config::default().validate(), Ok(()));

        let cfg = Config {
            frame_rate_hz: 0.0,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::NotPositive { name: "frame_rate_hz", value: 0.0 })
        );

        let cfg = Config {
            window_frames: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            poll_interval_ms: -5.0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            result_hold_ms: -1.0,
            ..Config::default()
        };
        assert_matches::assert_matches!(cfg.validate(), Err(ConfigError::Negative { .. }));

        let cfg = Config {
            result_hold_ms: 0.0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("nested").join("config.json"));
        let cfg = Config {
            manifest_path: PathBuf::from("/clips/sequences.json"),
            window_frames: 20,
            frame_rate_hz: 30.0,
            sampling: SamplingMode::Polled,
            poll_interval_ms: 100.0,
            selection: SelectionStrategy::ShuffleBag,
            seed: Some(3),
            react_key: 'j',
            result_hold_ms: 500.0,
            default_clip_secs: 6.0,
            record_history: false,
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
        assert_eq!(cfg.sampling(), Sampling::Polled { interval_ms: 100.0 });
    }

    #[test]
    fn partial_or_broken_files_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{"window_frames": 30}"#).unwrap();
        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.window_frames, 30);
        assert_eq!(cfg.frame_rate_hz, 60.0);

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(FileConfigStore::with_path(&path).load(), Config::default());
    }
}
