//! tzsync configuration file parsing (tzsync.toml)

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TzError};

/// Config file name
pub const CONFIG_FILE: &str = "tzsync.toml";

const DEFAULT_REFRESH_DELAY_SECS: u64 = 3600;

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TzConfig {
    /// Archive origin: local path or http(s) URL
    pub tzdata_url: Option<String>,

    /// LMDB store directory; tried before the archive at startup
    pub store_path: Option<PathBuf>,

    /// Directory holding sync state
    pub state_dir: Option<PathBuf>,

    /// Archive origin of the primary, used by secondaries for updates
    pub primary_url: Option<String>,

    /// Whether this node is the primary
    pub primary_server: bool,

    /// Seconds between `watch` checks
    pub refresh_delay_secs: u64,

    /// Whole-request timeout for remote fetches
    pub fetch_timeout_secs: Option<u64>,

    /// dtstamp of the last applied update, written back after updates
    pub dtstamp: Option<String>,

    /// Dataset version label
    pub version: Option<String>,
}

impl Default for TzConfig {
    fn default() -> Self {
        Self {
            tzdata_url: None,
            store_path: None,
            state_dir: None,
            primary_url: None,
            primary_server: false,
            refresh_delay_secs: DEFAULT_REFRESH_DELAY_SECS,
            fetch_timeout_secs: None,
            dtstamp: None,
            version: None,
        }
    }
}

impl TzConfig {
    /// Load config from a file.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| TzError::Config(format!("{}: {e}", path.display())))?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| TzError::Config(format!("{}: {e}", path.display())))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write config as pretty TOML
    ///
    /// # Errors
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| TzError::Config(format!("{}: {e}", parent.display())))?;
        }
        std::fs::write(path, content)
            .map_err(|e| TzError::Config(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    /// Render as pretty TOML
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| TzError::Config(e.to_string()))
    }

    /// Refresh interval for `watch`
    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_delay_secs.max(1))
    }

    /// Remote fetch timeout, if configured
    #[must_use]
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    /// Sync state directory: `state_dir`, else the store directory
    #[must_use]
    pub fn state_dir(&self) -> Option<&Path> {
        self.state_dir.as_deref().or(self.store_path.as_deref())
    }
}
