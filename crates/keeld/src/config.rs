//! TOML configuration for the keel daemon.
//!
//! Every value has a default, so an absent file (or any subset of the
//! sections) works. CLI flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Repository and identity locations.
    pub node: NodeSection,
    /// Sync daemon tuning.
    pub daemon: DaemonSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Repository root. Discovered from the working directory when unset.
    pub repo_root: Option<PathBuf>,
    /// Identity root directory override (else `$KEEL_IDENTITY_DIR` or the
    /// platform config dir).
    pub identity_dir: Option<PathBuf>,
}

/// `[daemon]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    /// Address the gossip HTTP API listens on.
    pub listen_addr: String,
    /// Seconds between gossip passes.
    pub gossip_interval_secs: u64,
    /// Max operations per sync response.
    pub sync_limit: usize,
    /// Max anti-entropy rounds per peer per pass.
    pub max_sync_rounds: usize,
    /// Per-request HTTP timeout in seconds.
    pub http_timeout_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8787".to_string(),
            gossip_interval_secs: 15,
            sync_limit: 256,
            max_sync_rounds: 6,
            http_timeout_secs: 30,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                Ok(toml::from_str(&content)?)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn gossip_interval(&self) -> Duration {
        Duration::from_secs(self.daemon.gossip_interval_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.http_timeout_secs.max(1))
    }
}
