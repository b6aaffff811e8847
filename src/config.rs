//! Configuration with layered resolution using figment.
//!
//! Resolution order (highest priority last):
//! 1. User config: `~/.config/gds-client/config.toml` (XDG) or platform config dir
//! 2. Project config: `.gds-client.toml`
//! 3. Environment variables: `GDS_*` (nested keys separated by `__`)
//!
//! # Example
//!
//! ```toml
//! [connection]
//! transport = "http"
//! uri = "http://localhost:7474"
//! user = "neo4j"
//! password = "secret"
//! database = "analytics"
//!
//! [runner]
//! progress_poll_interval_ms = 500
//! default_concurrency = 4
//! ```
//!
//! `GDS_CONNECTION__PASSWORD=secret` overrides the password from the
//! environment.

use std::ops::Deref;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Boxed wrapper for figment::Error to reduce Result size on the stack.
#[derive(Debug)]
pub struct ConfigError(Box<figment::Error>);

impl Deref for ConfigError {
    type Target = figment::Error;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Which wire the runner talks over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Bolt protocol through the neo4rs driver. Does not carry bookmarks.
    Bolt,
    /// Neo4j Query API over HTTP. Carries causal bookmarks.
    #[default]
    Http,
}

impl TransportKind {
    /// Server address used when none is configured.
    pub fn default_uri(self) -> &'static str {
        match self {
            TransportKind::Bolt => "neo4j://localhost:7687",
            TransportKind::Http => "http://localhost:7474",
        }
    }
}

/// Server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub transport: TransportKind,
    /// Server address, e.g. `neo4j://localhost:7687` or `http://localhost:7474`.
    /// Unset means the local default of the transport.
    pub uri: Option<String>,
    pub user: String,
    pub password: Option<String>,
    /// Initial session database. Unset means the server default.
    pub database: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            uri: None,
            user: "neo4j".to_string(),
            password: None,
            database: None,
        }
    }
}

impl ConnectionConfig {
    /// The configured server address, or the transport's local default.
    pub fn uri(&self) -> &str {
        self.uri
            .as_deref()
            .unwrap_or_else(|| self.transport.default_uri())
    }
}

/// Query runner behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How often progress is polled for procedures called with logging.
    #[serde(default = "default_progress_poll_interval_ms")]
    pub progress_poll_interval_ms: u64,
    /// Concurrency used for graph construction when none is given.
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,
}

fn default_progress_poll_interval_ms() -> u64 {
    500
}

fn default_concurrency() -> usize {
    4
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            progress_poll_interval_ms: default_progress_poll_interval_ms(),
            default_concurrency: default_concurrency(),
        }
    }
}

impl RunnerConfig {
    /// Progress poll interval as a [`Duration`].
    pub fn progress_poll_interval(&self) -> Duration {
        Duration::from_millis(self.progress_poll_interval_ms.max(1))
    }
}

impl Config {
    /// Load config with layered resolution (defaults → user → project → env).
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// The layered figment behind [`Config::load`].
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(Self::user_config_path()))
            .merge(Toml::file(".gds-client.toml"))
            .merge(Env::prefixed("GDS_").split("__"))
    }

    /// User config path: ~/.config/gds-client/config.toml (XDG) or platform config dir.
    fn user_config_path() -> std::path::PathBuf {
        if let Some(home) = dirs::home_dir() {
            let xdg_path = home.join(".config").join("gds-client").join("config.toml");
            if xdg_path.exists() {
                return xdg_path;
            }
        }
        dirs::config_dir()
            .map(|p| p.join("gds-client").join("config.toml"))
            .unwrap_or_default()
    }
}
