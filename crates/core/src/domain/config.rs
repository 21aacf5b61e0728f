//! Configuration management for eqtrain
//!
//! This module provides:
//! - Configuration structs for the audio stream, EQ catalog, game timing and playback
//! - TOML serialization with async file I/O
//! - A manager for the user config file with corrupt-file recovery

use crate::domain::audio::{ChannelCount, SampleRate, StreamConfig};
use crate::domain::chain::DEFAULT_VOLUME;
use crate::domain::dsp::params::MAX_CHANNELS;
use crate::domain::eq::EqCatalog;
use crate::domain::round::RoundTiming;
use crate::domain::source::BuiltinSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Audio buffer size in frames
    pub buffer_size: u32,

    /// Output channel count
    pub channels: u16,

    /// Output device ID (None = system default)
    pub output_device: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
            output_device: None,
        }
    }
}

impl AppConfig {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            sample_rate: SampleRate::from_hz(self.sample_rate),
            channels: ChannelCount::from_count(self.channels),
            buffer_size: self.buffer_size,
        }
    }
}

/// Round behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameConfig {
    pub timing: RoundTiming,

    /// Fixed RNG seed for reproducible sessions (None = entropy)
    pub seed: Option<u64>,
}

/// What plays when the session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Initial volume in [0, 1]
    pub volume: f32,

    pub source: BuiltinSource,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            source: BuiltinSource::WhiteNoise,
        }
    }
}

/// Complete eqtrain configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrainerConfig {
    pub app: AppConfig,
    pub eq: EqCatalog,
    pub game: GameConfig,
    pub playback: PlaybackConfig,
}

impl TrainerConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.app.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if self.app.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be positive".to_string()));
        }
        if self.app.channels == 0 || self.app.channels as usize > MAX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "channels must be between 1 and {}, got {}",
                MAX_CHANNELS, self.app.channels
            )));
        }
        if !(0.0..=1.0).contains(&self.playback.volume) {
            return Err(ConfigError::Invalid(format!(
                "volume {} is outside [0, 1]",
                self.playback.volume
            )));
        }
        self.eq
            .validate(self.app.sample_rate)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Configuration manager for the main eqtrain config
///
/// Manages the configuration file at `~/.config/eqtrain/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Manager for an explicit file, e.g. from `--config`
    pub fn for_file(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/eqtrain` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("eqtrain"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns the default.
    /// If the config file is corrupt, backs it up and returns the default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> TrainerConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating default"
            );

            let config = TrainerConfig::default();
            if let Err(e) = self.save(&config).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }
            return config;
        }

        match TrainerConfig::load_from_file(&self.config_path).await {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                TrainerConfig::default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &TrainerConfig) -> Result<()> {
        if !self.config_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.config_dir).await?;
        }
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
