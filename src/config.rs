//! Configuration parsing and validation.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. An optional TOML file (`--config`, default `./config/zt2rw.toml`).
//! 2. Environment variables (a `.env` file is loaded first by the CLI):
//!    `READWISE_TOKEN`, `ZOTERO_KEY`, `ZOTERO_LIBRARY_ID`, `LIBRARY_TYPE`.
//! 3. Command-line flags, applied by `main`.
//!
//! ```toml
//! [zotero]
//! library_id = "1234567"
//! library_type = "user"      # or "group"
//! page_size = 100
//!
//! [readwise]
//! batch_size = 100
//! tag_style = "bracketed"    # or "dotted"
//!
//! [sync]
//! include_annotations = true
//! include_notes = false
//! filter_colors = ["yellow", "#ff6666"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::mapper::TagStyle;

/// Largest page the Zotero API serves per request.
pub const ZOTERO_MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub zotero: ZoteroConfig,
    #[serde(default)]
    pub readwise: ReadwiseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    #[default]
    User,
    Group,
}

impl LibraryType {
    /// Path segment used in Zotero API URLs (`users` / `groups`).
    pub fn path_segment(&self) -> &'static str {
        match self {
            LibraryType::User => "users",
            LibraryType::Group => "groups",
        }
    }
}

impl fmt::Display for LibraryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            LibraryType::User => "user",
            LibraryType::Group => "group",
        })
    }
}

impl FromStr for LibraryType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(LibraryType::User),
            "group" => Ok(LibraryType::Group),
            other => bail!(
                "Unknown library type: '{}'. Must be user or group.",
                other
            ),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZoteroConfig {
    #[serde(default)]
    pub library_id: Option<String>,
    #[serde(default)]
    pub library_type: LibraryType,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_zotero_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ZoteroConfig {
    fn default() -> Self {
        Self {
            library_id: None,
            library_type: LibraryType::User,
            api_key: None,
            base_url: default_zotero_base_url(),
            page_size: default_page_size(),
        }
    }
}

fn default_zotero_base_url() -> String {
    "https://api.zotero.org".to_string()
}
fn default_page_size() -> usize {
    ZOTERO_MAX_PAGE_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadwiseConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_readwise_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub tag_style: TagStyle,
}

impl Default for ReadwiseConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_readwise_base_url(),
            batch_size: default_batch_size(),
            tag_style: TagStyle::default(),
        }
    }
}

fn default_readwise_base_url() -> String {
    "https://readwise.io/api/v2".to_string()
}
fn default_batch_size() -> usize {
    crate::upload::DEFAULT_BATCH_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub include_annotations: bool,
    #[serde(default)]
    pub include_notes: bool,
    /// Palette names or hex values; empty means every color.
    #[serde(default)]
    pub filter_colors: Vec<String>,
    #[serde(default = "default_failed_items_dir")]
    pub failed_items_dir: PathBuf,
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            include_annotations: true,
            include_notes: false,
            filter_colors: Vec::new(),
            failed_items_dir: default_failed_items_dir(),
            state_path: default_state_path(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_failed_items_dir() -> PathBuf {
    PathBuf::from("./failed_items")
}
fn default_state_path() -> PathBuf {
    PathBuf::from("./zt2rw-state.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Overlay credentials and library settings from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay settings from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("READWISE_TOKEN") {
            self.readwise.token = Some(token);
        }
        if let Some(key) = get("ZOTERO_KEY") {
            self.zotero.api_key = Some(key);
        }
        if let Some(id) = get("ZOTERO_LIBRARY_ID") {
            self.zotero.library_id = Some(id);
        }
        if let Some(kind) = get("LIBRARY_TYPE") {
            self.zotero.library_type = kind
                .parse()
                .with_context(|| "Invalid LIBRARY_TYPE environment variable")?;
        }
        Ok(())
    }

    /// Check settings that would otherwise fail halfway through a run.
    pub fn validate(&self) -> Result<()> {
        if self.zotero.page_size == 0 || self.zotero.page_size > ZOTERO_MAX_PAGE_SIZE {
            bail!(
                "zotero.page_size must be in [1, {}]",
                ZOTERO_MAX_PAGE_SIZE
            );
        }

        if self.readwise.batch_size == 0 {
            bail!("readwise.batch_size must be > 0");
        }

        if !self.sync.include_annotations && !self.sync.include_notes {
            bail!("Nothing to sync: both include_annotations and include_notes are disabled");
        }

        if self.http.timeout_secs == 0 {
            bail!("http.timeout_secs must be > 0");
        }

        for base in [&self.zotero.base_url, &self.readwise.base_url] {
            if !base.starts_with("https://") && !base.starts_with("http://") {
                bail!("Base URL must start with http:// or https://: '{}'", base);
            }
        }

        Ok(())
    }

    /// Zotero library id and API key, or an error naming what is missing.
    pub fn zotero_credentials(&self) -> Result<(&str, &str)> {
        let id = self.zotero.library_id.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "No Zotero library id configured. Set ZOTERO_LIBRARY_ID or zotero.library_id."
            )
        })?;
        let key = self.zotero.api_key.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No Zotero API key configured. Set ZOTERO_KEY or zotero.api_key.")
        })?;
        Ok((id, key))
    }

    pub fn readwise_token(&self) -> Result<&str> {
        self.readwise.token.as_deref().ok_or_else(|| {
            anyhow::anyhow!("No Readwise token configured. Set READWISE_TOKEN or readwise.token.")
        })
    }

    /// Stable label for the configured library, e.g. `user:1234567`.
    pub fn library_label(&self) -> String {
        format!(
            "{}:{}",
            self.zotero.library_type,
            self.zotero.library_id.as_deref().unwrap_or("?")
        )
    }
}

/// Load configuration from `path`.
///
/// When `required` is false a missing file yields the defaults, so a setup
/// driven purely by environment variables needs no config file at all.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    if !path.exists() && !required {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}
