//! TOML Configuration File Support
//!
//! Centralized configuration for the bridge, read from
//! `~/.config/console-bridge/bridge.toml` when present.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! listen = "http://127.0.0.1:8080/"
//!
//! [bus]
//! poll_timeout_ms = 1000
//!
//! [host]
//! idle_timeout_secs = 300
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file at {path}: {source}")]
    ReadFile {
        /// Path to the file that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML content
    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration is structurally valid but semantically wrong
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the effective configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Built-in defaults only
    #[default]
    Default,
    /// A TOML file was loaded
    File,
    /// Environment variables overrode at least one value
    Env,
    /// CLI arguments overrode at least one value
    Cli,
}

// =============================================================================
// Sections
// =============================================================================

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen URL, e.g. `http://127.0.0.1:8080/`
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "http://127.0.0.1:8080/".to_string(),
        }
    }
}

/// Command bus settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Long-poll bound for outbound pickup, in milliseconds
    pub poll_timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 1000,
        }
    }
}

impl BusConfig {
    /// Get the long-poll bound as a duration
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Interpreter host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Exit after this many seconds without input (0 = never)
    pub idle_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
        }
    }
}

impl HostConfig {
    /// Get the idle timeout, or `None` when disabled
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

// =============================================================================
// Top-level File
// =============================================================================

/// Complete bridge configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfigFile {
    /// HTTP server section
    pub server: ServerConfig,
    /// Command bus section
    pub bus: BusConfig,
    /// Interpreter host section
    pub host: HostConfig,
    /// Where the values came from (not read from the file)
    #[serde(skip)]
    source: ConfigSource,
}

impl BridgeConfigFile {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get where this configuration came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Record where this configuration came from
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Parse a configuration from TOML text
    ///
    /// Values are not validated here; later layers may still replace them.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.source = ConfigSource::File;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables:
    /// - `BRIDGE_LISTEN`: listen URL
    /// - `BRIDGE_POLL_TIMEOUT_MS`: long-poll bound in ms
    /// - `BRIDGE_IDLE_TIMEOUT_SECS`: idle exit timeout in seconds (0 = never)
    pub fn apply_env(&mut self) {
        let mut touched = false;

        if let Ok(listen) = std::env::var("BRIDGE_LISTEN") {
            self.server.listen = listen;
            touched = true;
        }
        if let Some(ms) = env_number("BRIDGE_POLL_TIMEOUT_MS") {
            self.bus.poll_timeout_ms = ms;
            touched = true;
        }
        if let Some(secs) = env_number("BRIDGE_IDLE_TIMEOUT_SECS") {
            self.host.idle_timeout_secs = secs;
            touched = true;
        }

        if touched {
            self.source = ConfigSource::Env;
        }
    }

    /// Check semantic constraints
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "bus.poll_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.server.listen.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "server.listen must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_number(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

/// Get the default configuration file path
///
/// `$XDG_CONFIG_HOME/console-bridge/bridge.toml`, or `None` if no config
/// directory can be determined.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("console-bridge").join("bridge.toml"))
}

/// Load configuration from the default location, then the environment
///
/// A missing default file is not an error.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<BridgeConfigFile, ConfigError> {
    load_config_from_path(None)
}

/// Load configuration from an explicit path (or the default), then the environment
///
/// An explicit path must exist; the default path may be absent. The result
/// is not validated: apply [`ConfigOverrides`] first, then call
/// [`BridgeConfigFile::validate`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or cannot be parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<BridgeConfigFile, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(&path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => read_file(&path)?,
            _ => BridgeConfigFile::default(),
        },
    };

    config.apply_env();
    Ok(config)
}

fn read_file(path: &Path) -> Result<BridgeConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let config = BridgeConfigFile::from_toml_str(&content)?;
    tracing::debug!(path = ?path, "Loaded configuration file");
    Ok(config)
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values supplied on the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    listen: Option<String>,
    poll_timeout_ms: Option<u64>,
    idle_timeout_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the listen URL
    #[must_use]
    pub fn with_listen(mut self, listen: String) -> Self {
        self.listen = Some(listen);
        self
    }

    /// Override the long-poll bound
    #[must_use]
    pub fn with_poll_timeout_ms(mut self, ms: u64) -> Self {
        self.poll_timeout_ms = Some(ms);
        self
    }

    /// Override the idle exit timeout
    #[must_use]
    pub fn with_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.idle_timeout_secs = Some(secs);
        self
    }

    /// Check if any override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listen.is_none() && self.poll_timeout_ms.is_none() && self.idle_timeout_secs.is_none()
    }

    /// Apply the overrides to a configuration
    pub fn apply(&self, config: &mut BridgeConfigFile) {
        if let Some(ref listen) = self.listen {
            config.server.listen.clone_from(listen);
        }
        if let Some(ms) = self.poll_timeout_ms {
            config.bus.poll_timeout_ms = ms;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.host.idle_timeout_secs = secs;
        }
        if !self.is_empty() {
            config.set_source(ConfigSource::Cli);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BridgeConfigFile::default();
        assert_eq!(config.server.listen, "http://127.0.0.1:8080/");
        assert_eq!(config.bus.poll_timeout(), Duration::from_secs(1));
        assert_eq!(config.host.idle_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BridgeConfigFile::from_toml_str("[bus]\npoll_timeout_ms = 250\n").unwrap();
        assert_eq!(config.bus.poll_timeout_ms, 250);
        assert_eq!(config.server, ServerConfig::default());
        assert_eq!(config.host, HostConfig::default());
        assert_eq!(config.source(), ConfigSource::File);
    }

    #[test]
    fn test_zero_poll_timeout_is_invalid() {
        let config = BridgeConfigFile::from_toml_str("[bus]\npoll_timeout_ms = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_cli_override_replaces_invalid_file_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[bus]\npoll_timeout_ms = 0").unwrap();

        let mut config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert!(config.validate().is_err());

        ConfigOverrides::new()
            .with_poll_timeout_ms(500)
            .apply(&mut config);
        assert!(config.validate().is_ok());
        assert_eq!(config.bus.poll_timeout_ms, 500);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_malformed_toml() {
        let err = BridgeConfigFile::from_toml_str("[bus\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_idle_timeout_zero_disables() {
        let host = HostConfig {
            idle_timeout_secs: 0,
        };
        assert_eq!(host.idle_timeout(), None);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nlisten = \"http://0.0.0.0:9000/\"\n\n[host]\nidle_timeout_secs = 0"
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.server.listen, "http://0.0.0.0:9000/");
        assert_eq!(config.host.idle_timeout(), None);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from_path(Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = BridgeConfigFile::from_toml_str("[bus]\npoll_timeout_ms = 250\n").unwrap();
        ConfigOverrides::new()
            .with_listen("127.0.0.1:7000".to_string())
            .with_poll_timeout_ms(50)
            .apply(&mut config);

        assert_eq!(config.server.listen, "127.0.0.1:7000");
        assert_eq!(config.bus.poll_timeout_ms, 50);
        assert_eq!(config.host.idle_timeout_secs, 300);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = BridgeConfigFile::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }
}
