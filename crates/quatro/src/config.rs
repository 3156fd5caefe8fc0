//! Server configuration loading.
//!
//! Settings come from a JSON file whose location can be overridden from
//! the environment. A missing or broken file never stops the server: it
//! logs and falls back to the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io::ErrorKind};

use quatro_match::LobbyConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default location on disk where the server looks for its JSON config.
const DEFAULT_CONFIG_PATH: &str = "config/quatro.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUATRO_CONFIG_PATH";
/// Environment variable that overrides the bind address.
const BIND_ENV: &str = "QUATRO_BIND";

/// Everything the binary needs to start.
///
/// ```json
/// { "bind": "0.0.0.0:9000", "lobby": { "max_queue_size": 50 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// How long a new connection may take to send `hello`.
    pub handshake_timeout_secs: u64,
    pub lobby: LobbyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            handshake_timeout_secs: 5,
            lobby: LobbyConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads the config file named by the environment, then applies the
    /// bind override.
    pub fn load() -> Self {
        let mut config = Self::load_from(&resolve_config_path());
        if let Some(bind) = env::var(BIND_ENV).ok().filter(|bind| !bind.is_empty()) {
            info!(%bind, "bind address overridden from environment");
            config.bind = bind;
        }
        config
    }

    /// Loads `path`, falling back to defaults when it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), bind = %config.bind, "loaded config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found; using built-in defaults");
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
