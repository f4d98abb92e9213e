//! Configuration loading
//!
//! TOML configuration with the resolution priority used across the project:
//! 1. Explicit path (command-line argument, highest priority)
//! 2. `LEDGER_CHIMES_CONFIG` environment variable
//! 3. Platform config dir (`~/.config/ledger-chimes/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! Individual fields can additionally be overridden by CLI flags in the
//! binary; the binary applies those on top of the loaded `Config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub audio: AudioConfig,
    pub engine: EngineConfig,
}

/// Ledger network endpoints and fallback-fetch behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Entry points tried in order; reconnection rotates through them
    pub endpoints: Vec<String>,
    /// How many expanded ledger entries a fallback fetch releases
    pub fallback_fetch_limit: usize,
    /// Artificial delay between staggered fallback releases
    pub fallback_stagger_ms: u64,
    /// Poll period while degraded (subscribe unavailable)
    pub poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "wss://xrplcluster.com".to_string(),
                "wss://s1.ripple.com".to_string(),
                "wss://s2.ripple.com".to_string(),
            ],
            fallback_fetch_limit: 5,
            fallback_stagger_ms: 250,
            poll_interval_ms: 4000,
        }
    }
}

/// Audio output selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,
    /// Initial master volume (0.0-1.0)
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            volume: 0.75,
        }
    }
}

/// Sonification engine parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Style profile selected at startup
    pub style: String,
    /// Concurrent voice cap (drone exempt)
    pub voice_cap: usize,
    /// Tempo floor in BPM
    pub min_bpm: f32,
    /// Tempo ceiling in BPM
    pub max_bpm: f32,
    /// Transaction count at which tempo saturates
    pub throughput_ceiling: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            style: "techno".to_string(),
            voice_cap: 32,
            min_bpm: 80.0,
            max_bpm: 180.0,
            throughput_ceiling: 30,
        }
    }
}

impl Config {
    /// Load configuration following the resolution priority order
    ///
    /// # Arguments
    /// * `cli_path` - Explicit config file path from the command line
    ///
    /// # Errors
    /// An explicitly named file (CLI or env) that is missing or malformed is
    /// an error; an absent default-location file silently yields defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: command-line argument
        if let Some(path) = cli_path {
            info!("Loading config from CLI path: {}", path.display());
            return Self::from_file(path);
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var("LEDGER_CHIMES_CONFIG") {
            info!("Loading config from LEDGER_CHIMES_CONFIG: {}", path);
            return Self::from_file(Path::new(&path));
        }

        // Priority 3: platform config dir
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                info!("Loading config from {}", path.display());
                return Self::from_file(&path);
            }
            debug!("No config file at {}, using defaults", path.display());
        }

        // Priority 4: compiled defaults
        Ok(Self::default())
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file path for the platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ledger-chimes").join("config.toml"))
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.network.endpoints.is_empty() {
            return Err(Error::Config("endpoints list is empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(Error::Config(format!(
                "volume {} outside [0.0, 1.0]",
                self.audio.volume
            )));
        }
        if self.engine.voice_cap == 0 {
            return Err(Error::Config("voice_cap must be at least 1".to_string()));
        }
        if self.engine.min_bpm >= self.engine.max_bpm {
            return Err(Error::Config(format!(
                "min_bpm {} must be below max_bpm {}",
                self.engine.min_bpm, self.engine.max_bpm
            )));
        }
        if self.engine.throughput_ceiling == 0 {
            return Err(Error::Config(
                "throughput_ceiling must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.endpoints.len(), 3);
        assert_eq!(config.engine.voice_cap, 32);
        assert_eq!(config.engine.min_bpm, 80.0);
        assert_eq!(config.engine.max_bpm, 180.0);
        assert_eq!(config.engine.throughput_ceiling, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            voice_cap = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.voice_cap, 16);
        assert_eq!(config.engine.style, "techno");
        assert_eq!(config.network.fallback_fetch_limit, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.engine.voice_cap = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.audio.volume = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.endpoints.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.engine.min_bpm = 200.0;
        assert!(config.validate().is_err());
    }
}
