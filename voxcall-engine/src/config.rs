//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Call engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Conversation backend endpoint (host:port)
    pub endpoint: String,

    /// Recording window length in milliseconds
    pub window_ms: u64,

    /// Silence timeout interval in milliseconds
    pub silence_timeout_ms: u64,

    /// Speech threshold on the 0-100 intensity scale
    pub activity_threshold: f32,

    /// Pipeline sample rate
    pub sample_rate: u32,

    /// Audio device index (None = default device)
    pub audio_device_index: Option<usize>,

    /// Allow raw pass-through when every decode strategy fails
    pub permissive_transcode: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            endpoint: "127.0.0.1:8765".to_string(),
            window_ms: 3000,
            silence_timeout_ms: 5000,
            activity_threshold: 15.0,
            sample_rate: 16000,
            audio_device_index: None,
            permissive_transcode: true,
        }
    }
}

impl CallConfig {
    /// Load configuration from the default path, creating it on first run
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path())
    }

    /// Load configuration from a specific path, creating it if missing
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let mut config: CallConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Default::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to its path
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Recording window length
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Silence timeout interval
    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxcall")
            .join("config.toml")
    }
}
