//! Load config from file and environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use hamchat_core::ErrorInjector;
use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// File: `--config <path>`, else ~/.config/hamchat/config.toml or /etc/hamchat/config.toml.
/// Env overrides: HAMCHAT_BIND_HOST, HAMCHAT_HOST, HAMCHAT_PORT, HAMCHAT_P_SINGLE,
/// HAMCHAT_P_DOUBLE, HAMCHAT_SEED.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Relay settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address (default all interfaces).
    #[serde(default = "default_bind_host")]
    pub host: String,
    /// TCP port (default 5000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Probability of flipping one bit of a forwarded payload.
    #[serde(default = "default_p_single")]
    pub p_single: f64,
    /// Probability of flipping two bits; rolled before the single-bit error.
    #[serde(default = "default_p_double")]
    pub p_double: f64,
    /// Fixed RNG seed for reproducible injection.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Chat client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Relay host (default localhost).
    #[serde(default = "default_connect_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}
fn default_connect_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_p_single() -> f64 {
    0.5
}
fn default_p_double() -> f64 {
    0.3
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_host(),
            port: default_port(),
            p_single: default_p_single(),
            p_double: default_p_double(),
            seed: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_connect_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Injector for these probabilities; fails if either is outside [0, 1].
    pub fn injector(&self) -> Result<ErrorInjector, ConfigError> {
        Ok(ErrorInjector::new(self.p_single, self.p_double)?)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ClientConfig {
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
/// An explicit `path` must exist and parse; the default locations are optional.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut c = match path {
        Some(p) => read_file(p)?,
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => read_file(&p)?,
            None => Config::default(),
        },
    };
    apply_env(&mut c);
    c.server.injector()?;
    Ok(c)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/hamchat/config.toml"));
    }
    out.push(PathBuf::from("/etc/hamchat/config.toml"));
    out
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env(c: &mut Config) {
    env_override("HAMCHAT_BIND_HOST", &mut c.server.host);
    env_override("HAMCHAT_HOST", &mut c.client.host);
    if let Some(port) = env_value::<u16>("HAMCHAT_PORT") {
        c.server.port = port;
        c.client.port = port;
    }
    env_override("HAMCHAT_P_SINGLE", &mut c.server.p_single);
    env_override("HAMCHAT_P_DOUBLE", &mut c.server.p_double);
    if let Some(seed) = env_value::<u64>("HAMCHAT_SEED") {
        c.server.seed = Some(seed);
    }
}

fn env_override<T: FromStr>(name: &str, slot: &mut T) {
    if let Some(v) = env_value(name) {
        *slot = v;
    }
}

/// Parsed env var; unparsable values are ignored with a warning.
fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
