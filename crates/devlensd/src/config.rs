//! Configuration loading from devlens.toml.

use std::path::{Path, PathBuf};

use devlens_core::{
    OverlayConfig, OverlayPosition, OverlayThresholds, DEFAULT_MAX_ERRORS, DEFAULT_MAX_LOGS,
    DEFAULT_MAX_SESSIONS, SLOW_FETCH_THRESHOLD_MS,
};
use serde::Deserialize;

use crate::store::StoreLimits;

/// Config file name looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "devlens.toml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FileConfig {
    /// When false the daemon exits without binding its socket.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub overlay_position: OverlayPosition,

    #[serde(default)]
    pub open_browser_on_start: bool,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub overlay: OverlaySection,
}

/// Store capacity limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
}

/// Overlay classification thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OverlaySection {
    /// Fetches slower than this mark the session as `warning`.
    #[serde(default = "default_slow_fetch_ms")]
    pub slow_fetch_ms: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

fn default_max_errors() -> usize {
    DEFAULT_MAX_ERRORS
}

fn default_max_logs() -> usize {
    DEFAULT_MAX_LOGS
}

fn default_slow_fetch_ms() -> f64 {
    SLOW_FETCH_THRESHOLD_MS
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_errors: DEFAULT_MAX_ERRORS,
            max_logs: DEFAULT_MAX_LOGS,
        }
    }
}

impl Default for OverlaySection {
    fn default() -> Self {
        Self {
            slow_fetch_ms: SLOW_FETCH_THRESHOLD_MS,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            overlay_position: OverlayPosition::default(),
            open_browser_on_start: false,
            store: StoreSection::default(),
            overlay: OverlaySection::default(),
        }
    }
}

impl FileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_sessions == 0 {
            return Err(ConfigError::Invalid("store.max_sessions must be at least 1".into()));
        }
        if self.store.max_errors == 0 || self.store.max_logs == 0 {
            return Err(ConfigError::Invalid(
                "store.max_errors and store.max_logs must be at least 1".into(),
            ));
        }
        if !self.overlay.slow_fetch_ms.is_finite() || self.overlay.slow_fetch_ms < 0.0 {
            return Err(ConfigError::Invalid(
                "overlay.slow_fetch_ms must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    /// Default config path for a project root.
    pub fn path_in(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_FILE_NAME)
    }

    /// Settings surfaced to the overlay and in diagnostic documents.
    pub fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig {
            enabled: self.enabled,
            overlay_position: self.overlay_position,
            open_browser_on_start: self.open_browser_on_start,
        }
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_sessions: self.store.max_sessions,
            max_errors: self.store.max_errors,
            max_logs: self.store.max_logs,
        }
    }

    pub fn thresholds(&self) -> OverlayThresholds {
        OverlayThresholds {
            slow_fetch_ms: self.overlay.slow_fetch_ms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
