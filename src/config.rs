//! Configuration loading and management
//!
//! Handles parsing of `.cardsync.toml` at the vault root.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Config file name, relative to the vault root
pub const CONFIG_FILE: &str = ".cardsync.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which documents are card documents
    #[serde(default)]
    pub vault: VaultConfig,

    /// Remote task-list service
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Sync cadence and behaviour
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Vault-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Folder (relative to the vault root) holding card documents
    #[serde(default = "default_task_folder")]
    pub task_folder: String,

    /// Tag that marks a document as a card
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Text placed at the top of cards created from remote lists
    #[serde(default)]
    pub new_card_template: String,
}

fn default_task_folder() -> String {
    "/".to_string()
}

fn default_tag() -> String {
    "kanban_card".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            task_folder: default_task_folder(),
            tag: default_tag(),
            new_card_template: String::new(),
        }
    }
}

/// Remote service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token; `CARDSYNC_TOKEN` takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default = "default_max_calls_per_sec")]
    pub max_calls_per_sec: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Time zone attached to due dates sent to the remote
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_base_url() -> String {
    "https://graph.microsoft.com/v1.0/me/todo".to_string()
}

fn default_max_calls_per_sec() -> u32 {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            access_token: None,
            max_calls_per_sec: default_max_calls_per_sec(),
            timeout_secs: default_timeout_secs(),
            time_zone: default_time_zone(),
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Master switch for the watcher's periodic fetch and sync
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,

    /// Poll interval while a job waits for its turn
    #[serde(default = "default_job_poll_ms")]
    pub job_poll_ms: u64,

    /// Reorder checklists by status whenever a card is written
    #[serde(default)]
    pub reorder_on_write: bool,

    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_fetch_interval_ms() -> u64 {
    60_000
}

fn default_job_poll_ms() -> u64 {
    50
}

fn default_watch_debounce_ms() -> u64 {
    250
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fetch_interval_ms: default_fetch_interval_ms(),
            job_poll_ms: default_job_poll_ms(),
            reorder_on_write: false,
            watch_debounce_ms: default_watch_debounce_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `.cardsync.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the vault root, or return defaults when absent
    pub fn load_from_vault(vault_root: &Path) -> Result<Self> {
        let config_path = vault_root.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        crate::lock::write_atomic_str(path, &content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.vault.tag.trim().trim_start_matches('#').is_empty() {
            return Err(Error::InvalidConfig("vault.tag cannot be empty".to_string()));
        }
        if self.vault.tag.chars().any(char::is_whitespace) {
            return Err(Error::InvalidConfig(
                "vault.tag cannot contain whitespace".to_string(),
            ));
        }
        if self.vault.task_folder.split('/').any(|part| part == "..") {
            return Err(Error::InvalidConfig(
                "vault.task_folder must stay inside the vault".to_string(),
            ));
        }

        let base_url = self.remote.base_url.trim();
        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(Error::InvalidConfig(format!(
                "remote.base_url '{base_url}' must be an http(s) URL"
            )));
        }
        if self.remote.max_calls_per_sec == 0 {
            return Err(Error::InvalidConfig(
                "remote.max_calls_per_sec must be > 0".to_string(),
            ));
        }
        if self.remote.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "remote.timeout_secs must be > 0".to_string(),
            ));
        }
        if self.remote.time_zone.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "remote.time_zone cannot be empty".to_string(),
            ));
        }

        if self.sync.fetch_interval_ms < 1_000 {
            return Err(Error::InvalidConfig(
                "sync.fetch_interval_ms must be >= 1000".to_string(),
            ));
        }
        if self.sync.job_poll_ms == 0 {
            return Err(Error::InvalidConfig(
                "sync.job_poll_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
