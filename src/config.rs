// Configuration management module
// Handles loading, saving, and validating configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between two polls of the player
    #[serde(default = "default_poll_rate")]
    pub poll_rate: u64,

    /// Strip features (e.g. "(feat. X)") from track and artist before submitting
    #[serde(default = "default_strip_features")]
    pub strip_features: bool,

    /// Text cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Last.fm configuration
    #[serde(default)]
    pub lastfm: LastFmConfig,

    /// Which player to watch
    #[serde(default)]
    pub player: PlayerConfig,
}

fn default_poll_rate() -> u64 {
    1
}

fn default_strip_features() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Enable text cleanup
    pub enabled: bool,

    /// Regex patterns to remove from track/album/artist names
    /// Applied in order, each pattern is removed from the text
    pub patterns: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            patterns: vec![
                r"\s*\[Explicit\]".to_string(),
                r"\s*\[Clean\]".to_string(),
                r"\s*\(Explicit\)".to_string(),
                r"\s*\(Clean\)".to_string(),
            ],
        }
    }
}

/// Last.fm API credentials. Generate a key at https://www.last.fm/api/account/create
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Filled in by the authorization flow on first start
    #[serde(default)]
    pub session_key: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Any MPRIS player on the D-Bus session bus
    #[default]
    Mpris,
    /// A Music Player Daemon
    Mpd,
}

impl Backend {
    /// Only the MPD backend keeps a last-scrobbled record for duplicate suppression
    pub fn suppresses_duplicates(self) -> bool {
        matches!(self, Backend::Mpd)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(default)]
    pub mpd: MpdConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MpdProtocol {
    #[default]
    Tcp,
    Unix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpdConfig {
    #[serde(default)]
    pub protocol: MpdProtocol,

    /// "host:port" for TCP, a socket path for Unix
    pub address: String,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            protocol: MpdProtocol::Tcp,
            address: "localhost:6600".to_string(),
            password: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_rate: default_poll_rate(),
            strip_features: default_strip_features(),
            cleanup: CleanupConfig::default(),
            lastfm: LastFmConfig::default(),
            player: PlayerConfig::default(),
        }
    }
}

impl Config {
    /// Get the default path to the configuration file
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join("desktop-scrobbler.toml"))
    }

    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", path);

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_rate == 0 {
            anyhow::bail!("poll_rate must be greater than 0");
        }

        if self.lastfm.api_key.is_empty() || self.lastfm.api_secret.is_empty() {
            anyhow::bail!("Couldn't get Last.fm api_key/api_secret from config");
        }

        if self.player.backend == Backend::Mpd && self.player.mpd.address.is_empty() {
            anyhow::bail!("player.mpd.address is required when the MPD backend is selected");
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_rate)
    }
}
