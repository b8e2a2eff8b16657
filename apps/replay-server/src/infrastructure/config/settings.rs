//! Replay Server Configuration Settings
//!
//! Configuration types for the replay server, loaded from environment
//! variables. Every key is optional; unparseable values fall back to the
//! default, while values that parse but make no sense are rejected.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::replay::ReplaySettings;
use crate::infrastructure::broadcast::BroadcastConfig;

/// Bind address and ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Address both servers bind to.
    pub bind_host: IpAddr,
    /// Control API and WebSocket port.
    pub api_port: u16,
    /// Health check and metrics port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::from([0, 0, 0, 0]),
            api_port: 8000,
            health_port: 8082,
        }
    }
}

/// Complete replay server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Server bind settings.
    pub server: ServerSettings,
    /// Directory holding `<session_id>.json` documents.
    pub data_dir: PathBuf,
    /// Playback tuning.
    pub replay: ReplaySettings,
    /// Subscriber delivery limits.
    pub broadcast: BroadcastConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            data_dir: PathBuf::from("./data/sessions"),
            replay: ReplaySettings::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is empty where a path is required, or
    /// outside its valid range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let defaults = Self::default();

        let server = ServerSettings {
            bind_host: env.parse("REPLAY_BIND_HOST", defaults.server.bind_host),
            api_port: env.parse("REPLAY_API_PORT", defaults.server.api_port),
            health_port: env.parse("REPLAY_HEALTH_PORT", defaults.server.health_port),
        };

        let data_dir = match env.get("REPLAY_DATA_DIR") {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("REPLAY_DATA_DIR".to_string()));
            }
            Some(value) => PathBuf::from(value),
            None => defaults.data_dir,
        };

        let replay = ReplaySettings {
            window_size: env.duration_secs("REPLAY_WINDOW_SECS", defaults.replay.window_size),
            prefetch_threshold: env.parse(
                "REPLAY_PREFETCH_THRESHOLD",
                defaults.replay.prefetch_threshold,
            ),
            pause_poll: env.duration_millis("REPLAY_PAUSE_POLL_MS", defaults.replay.pause_poll),
            seek_context: env.duration_secs(
                "REPLAY_SEEK_CONTEXT_SECS",
                defaults.replay.seek_context,
            ),
        };

        let broadcast = BroadcastConfig {
            subscriber_queue: env.parse(
                "REPLAY_SUBSCRIBER_QUEUE",
                defaults.broadcast.subscriber_queue,
            ),
            send_timeout: env.duration_millis(
                "REPLAY_SEND_TIMEOUT_MS",
                defaults.broadcast.send_timeout,
            ),
        };

        let config = Self {
            server,
            data_dir,
            replay,
            broadcast,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.replay.window_size.is_zero() {
            return Err(ConfigError::invalid("REPLAY_WINDOW_SECS", "must be positive"));
        }
        let threshold = self.replay.prefetch_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::invalid(
                "REPLAY_PREFETCH_THRESHOLD",
                "must be in (0, 1]",
            ));
        }
        if self.replay.pause_poll.is_zero() {
            return Err(ConfigError::invalid("REPLAY_PAUSE_POLL_MS", "must be positive"));
        }
        if self.broadcast.subscriber_queue == 0 {
            return Err(ConfigError::invalid(
                "REPLAY_SUBSCRIBER_QUEUE",
                "must be positive",
            ));
        }
        if self.broadcast.send_timeout.is_zero() {
            return Err(ConfigError::invalid("REPLAY_SEND_TIMEOUT_MS", "must be positive"));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable parsed but is out of range.
    #[error("environment variable {key} {reason}")]
    InvalidValue {
        /// Offending key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
