//! # osky-config
//!
//! Layered settings: built-in defaults, then an optional `oldsky.toml`
//! (or the file named by `OLDSKY_CONFIG`), then `OLDSKY__*` environment
//! variables. A `.env` file is read into the environment first.
//!
//! ```text
//! OLDSKY__IDENTIFIER=me.bsky.social
//! OLDSKY__FEED__PAGE_SIZE=25
//! OLDSKY__LOG__JSON=true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use osky_core::{AppError, FeedConfig, ThreadConfig};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

const DEFAULT_FILE: &str = "oldsky";
const ENV_PREFIX: &str = "OLDSKY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// PDS the client signs in to.
    pub service_url: String,
    pub request_timeout_secs: u64,
    pub identifier: Option<String>,
    pub password: Option<SecretString>,
    /// Directory holding the session blob.
    pub session_dir: PathBuf,
    pub feed: FeedConfig,
    pub thread: ThreadConfig,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_url: "https://bsky.social".to_string(),
            request_timeout_secs: 30,
            identifier: None,
            password: None,
            session_dir: PathBuf::from(".oldsky"),
            feed: FeedConfig::default(),
            thread: ThreadConfig::default(),
            log: LogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads settings from the process environment and working directory.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = std::env::var("OLDSKY_CONFIG").ok().map(PathBuf::from);
        Self::build(file.as_deref(), None)
    }

    /// `file` replaces the default `oldsky.*` lookup; `env` replaces the
    /// process environment (tests pass a fixed map).
    pub fn build(file: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_FILE).required(false),
        };
        let env_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env);

        let settings: Settings = Config::builder()
            .add_source(file_source)
            .add_source(env_source)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        debug!(service = %settings.service_url, "settings loaded");
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &'static str, reason: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };
        if self.service_url.trim().is_empty() {
            return invalid("service_url", "must not be empty");
        }
        if self.feed.page_size == 0 {
            return invalid("feed.page_size", "must be at least 1");
        }
        if self.feed.fetch_multiplier == 0 {
            return invalid("feed.fetch_multiplier", "must be at least 1");
        }
        if self.thread.initial_depth == 0 {
            return invalid("thread.initial_depth", "must be at least 1");
        }
        if self.thread.replies_per_page == 0 {
            return invalid("thread.replies_per_page", "must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_file(&self) -> PathBuf {
        self.session_dir.join("atp-session.json")
    }
}
