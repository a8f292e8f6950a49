//! Connection configuration for embedders (ambient convenience, not part of
//! the protocol core — the core always takes an already-open [`crate::Transport`]).

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Connection defaults a host application may persist between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// `tcp:`/`serial:` URL for [`crate::parse_transport_url`].
    pub transport_url: String,
    /// Default per-read timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Wake-up attempts before giving up with `NoDevice`.
    pub wake_retries: u8,
    /// Command-send attempts before giving up with `BadAck`.
    pub command_retries: u8,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            transport_url: "serial:/dev/ttyUSB0:19200:8N1".into(),
            timeout: Duration::from_secs(10),
            wake_retries: 3,
            command_retries: 3,
        }
    }
}

impl ConsoleConfig {
    /// Default config file path for this platform.
    pub fn path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "vantage-pro2").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load config from file, or create a default one if it doesn't exist.
    pub fn load_or_create() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;

        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save config to file, creating parent directories as needed.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::path().ok_or("could not determine config directory")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let config = ConsoleConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ConsoleConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.transport_url, config.transport_url);
        assert_eq!(parsed.timeout, config.timeout);
    }
}
