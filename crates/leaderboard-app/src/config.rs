use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use leaderboard_core::{Listing, PrefetchPolicy, DEFAULT_PAGE_SIZE, MAX_LIMIT};
use serde::Deserialize;

/// File name looked up when no `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "leaderboard.toml";

/// Top-level configuration loaded from `leaderboard.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub listings: ListingsConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

impl AppConfig {
    /// Load configuration from `path`, apply environment overrides and validate.
    ///
    /// A missing file yields the built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse `path` without consulting the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Override settings from environment variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = lookup("ALLOWED_ORIGIN") {
            self.server.allowed_origin = Some(origin);
        }
        if let Some(base) = lookup("LEADERBOARD_API_BASE") {
            self.client.api_base = base;
        }
        if let Some(host) = lookup("SMTP_HOST") {
            self.mail.host = Some(host);
        }
        if let Some(from) = lookup("EMAIL_FROM") {
            self.mail.from = Some(from);
        }
        if let Some(to) = lookup("EMAIL_TO") {
            self.mail.to = Some(to);
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_LIMIT).contains(&self.client.page_size) {
            bail!(
                "client.page_size must be between 1 and {MAX_LIMIT}, got {}",
                self.client.page_size
            );
        }
        if self.server.query_timeout_secs == 0 {
            bail!("server.query_timeout_secs must be greater than zero");
        }
        if self.client.request_timeout_secs == 0 {
            bail!("client.request_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

/// `[server]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address the HTTP server listens on.
    pub bind: String,
    /// Only origin allowed to call `/api/*`; unset disables the check.
    pub allowed_origin: Option<String>,
    /// Upper bound for one collection query.
    pub query_timeout_secs: u64,
    /// Directory holding the JSON collections.
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".into(),
            allowed_origin: None,
            query_timeout_secs: 10,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ServerConfig {
    /// Query timeout as a [`Duration`].
    pub const fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// `[client]` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the listing API.
    pub api_base: String,
    /// Rows requested per page.
    pub page_size: usize,
    /// Cache file; unset keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
    /// Byte quota of the cache storage.
    pub quota_bytes: Option<usize>,
    /// Timeout of one HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:3000".into(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_path: None,
            quota_bytes: Some(5 * 1024 * 1024),
            request_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Request timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `[listings.*]` blocks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListingsConfig {
    pub milb: ListingConfig,
    pub mlb: ListingConfig,
}

impl ListingsConfig {
    /// Effective prefetch policy of listing `L`.
    pub fn prefetch_for<L: Listing>(&self) -> PrefetchPolicy {
        let configured = match L::NAMESPACE {
            "milb" => self.milb.prefetch,
            "mlb" => self.mlb.prefetch,
            _ => None,
        };
        configured.unwrap_or(L::DEFAULT_PREFETCH)
    }
}

/// Per-listing overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListingConfig {
    pub prefetch: Option<PrefetchPolicy>,
}

/// `[mail]` block: the relay that carries contact-form messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailConfig {
    /// Mail domain of the relay host, used in message ids.
    pub host: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Directory the spool relay drops finished messages into.
    pub spool_dir: PathBuf,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: None,
            from: None,
            to: None,
            spool_dir: PathBuf::from("mail-spool"),
        }
    }
}
