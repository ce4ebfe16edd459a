//! Application configuration.
//!
//! Configuration is assembled in three layers:
//! 1. Built-in defaults
//! 2. A TOML file at `$MIMEGATE_CONFIG`, or `~/.config/mimegate/config.toml`
//!    (`%APPDATA%\mimegate\config.toml` on Windows)
//! 3. Environment variables (`PORT`, `API_TOKEN`, `ATTACHMENT_TTL`, ...),
//!    optionally read from a `.env` file in the working directory
//!
//! All durations are expressed in milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub general: GeneralConfig,
    /// Listener and request settings.
    pub server: ServerConfig,
    /// Attachment storage and download policy.
    pub attachments: AttachmentConfig,
    /// Background eviction settings.
    pub cleanup: CleanupConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory for a daily-rotated log file. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

/// Listener and request settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Shared secret expected in `Authorization: Bearer <token>`. Required.
    pub api_token: Option<String>,
    /// Public base URL used to build absolute download links.
    /// Defaults to `http://localhost:{port}`.
    pub public_base_url: Option<String>,
    /// Maximum accepted request body in bytes.
    pub body_limit: usize,
}

/// How download links are handed out in `/parse` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    /// `downloadUrl` points straight at `/attachments/{id}`.
    Direct,
    /// `downloadUrl` points at `/attachments/{id}/link`, which issues a
    /// short-lived token URL.
    Token,
}

/// Attachment storage and download policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Directory holding one blob per attachment identifier.
    pub dir: PathBuf,
    /// Lifetime of a stored attachment.
    pub ttl_ms: u64,
    /// Lifetime of a temporary download token.
    pub temp_token_ttl_ms: u64,
    /// Largest attachment that will be stored, in bytes.
    pub max_size: u64,
    /// Direct or token-gated download links.
    pub download_mode: DownloadMode,
    /// Consume a temporary token on its first successful redemption.
    pub single_use_tokens: bool,
}

/// Background eviction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Period between eviction sweeps.
    pub interval_ms: u64,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            api_token: None,
            public_base_url: None,
            body_limit: 50 * 1024 * 1024, // 50 MB
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./attachments"),
            ttl_ms: 60 * 60 * 1000,       // 1 hour
            temp_token_ttl_ms: 5 * 60 * 1000, // 5 minutes
            max_size: 10 * 1024 * 1024,   // 10 MB
            download_mode: DownloadMode::Direct,
            single_use_tokens: false,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10 * 60 * 1000, // 10 minutes
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("public_base_url", &self.public_base_url)
            .field("body_limit", &self.body_limit)
            .finish()
    }
}

impl std::str::FromStr for DownloadMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "token" => Ok(Self::Token),
            other => Err(GateError::Config(format!(
                "unknown download mode '{other}' (expected 'direct' or 'token')"
            ))),
        }
    }
}

// ── Accessors ───────────────────────────────────────────────────

impl Config {
    /// Attachment lifetime.
    pub fn attachment_ttl(&self) -> Duration {
        Duration::from_millis(self.attachments.ttl_ms)
    }

    /// Temporary token lifetime.
    pub fn temp_token_ttl(&self) -> Duration {
        Duration::from_millis(self.attachments.temp_token_ttl_ms)
    }

    /// Period between eviction sweeps.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup.interval_ms)
    }

    /// Public base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.server.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }

    /// Check that every required value is present and usable.
    pub fn validate(&self) -> Result<()> {
        match self.server.api_token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => {
                return Err(GateError::Config(
                    "API_TOKEN environment variable is required".to_string(),
                ))
            }
        }
        if self.attachments.ttl_ms == 0 {
            return Err(GateError::Config("ATTACHMENT_TTL must be positive".into()));
        }
        if self.attachments.temp_token_ttl_ms == 0 {
            return Err(GateError::Config("TEMP_TOKEN_TTL must be positive".into()));
        }
        if self.attachments.max_size == 0 {
            return Err(GateError::Config(
                "MAX_ATTACHMENT_SIZE must be positive".into(),
            ));
        }
        if self.cleanup.interval_ms == 0 {
            return Err(GateError::Config("CLEANUP_INTERVAL must be positive".into()));
        }
        Ok(())
    }

    /// Apply environment-style overrides.
    ///
    /// `lookup` maps a variable name to its value; unset variables are left
    /// alone. Numeric values that fail to parse are reported, not ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("PORT") {
            self.server.port = parse_number("PORT", &v)?;
        }
        if let Some(v) = lookup("API_TOKEN") {
            self.server.api_token = Some(v);
        }
        if let Some(v) = lookup("BASE_URL") {
            self.server.public_base_url = Some(v);
        }
        if let Some(v) = lookup("BODY_LIMIT") {
            self.server.body_limit = parse_number("BODY_LIMIT", &v)?;
        }
        if let Some(v) = lookup("ATTACHMENT_TTL") {
            self.attachments.ttl_ms = parse_number("ATTACHMENT_TTL", &v)?;
        }
        if let Some(v) = lookup("TEMP_TOKEN_TTL") {
            self.attachments.temp_token_ttl_ms = parse_number("TEMP_TOKEN_TTL", &v)?;
        }
        if let Some(v) = lookup("MAX_ATTACHMENT_SIZE") {
            self.attachments.max_size = parse_number("MAX_ATTACHMENT_SIZE", &v)?;
        }
        if let Some(v) = lookup("ATTACHMENT_DIR") {
            self.attachments.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DOWNLOAD_MODE") {
            self.attachments.download_mode = v.parse()?;
        }
        if let Some(v) = lookup("SINGLE_USE_TOKENS") {
            self.attachments.single_use_tokens = parse_flag("SINGLE_USE_TOKENS", &v)?;
        }
        if let Some(v) = lookup("CLEANUP_INTERVAL") {
            self.cleanup.interval_ms = parse_number("CLEANUP_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.general.log_level = v;
        }
        Ok(())
    }

    /// Render as TOML with the API token masked.
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.server.api_token.is_some() {
            shown.server.api_token = Some("[REDACTED]".to_string());
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| GateError::Config(format!("cannot render config: {e}")))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GateError::Config(format!("{name} must be a non-negative integer, got '{value}'")))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(GateError::Config(format!("{name} must be a boolean, got '{value}'"))),
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration from the file layer, the `.env` file and the process
/// environment.
///
/// The result is not validated; call [`Config::validate`] before serving.
///
/// An explicit `path` that cannot be read is an error; a missing or broken
/// file at the default location falls back to the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => load_default_file(),
    };

    if let Ok(env_file) = dotenvy::dotenv() {
        tracing::debug!(path = %env_file.display(), "Loaded .env file");
    }
    config.apply_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| GateError::io(path, e))?;
    let cfg = toml::from_str::<Config>(&contents)
        .map_err(|e| GateError::Config(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

fn load_default_file() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match read_config_file(&path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load config, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MIMEGATE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mimegate").join("config.toml"))
}
