//! Application-level configuration loading for the formation engine timers.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_CLASH_BACK_CONFIG_PATH";

const DEFAULT_INVITATION_TTL_SECS: u64 = 300;
const DEFAULT_JOIN_REQUEST_TTL_SECS: u64 = 300;
const DEFAULT_COUNTDOWN_SECONDS: u32 = 5;
const DEFAULT_IDENT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    invitation_ttl: Duration,
    join_request_ttl: Duration,
    countdown_seconds: u32,
    ident_timeout: Duration,
    heartbeat_timeout: Duration,
    sweep_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            invitation_ttl: Duration::from_secs(DEFAULT_INVITATION_TTL_SECS),
            join_request_ttl: Duration::from_secs(DEFAULT_JOIN_REQUEST_TTL_SECS),
            countdown_seconds: DEFAULT_COUNTDOWN_SECONDS,
            ident_timeout: Duration::from_secs(DEFAULT_IDENT_TIMEOUT_SECS),
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded engine configuration");
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
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
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

    /// How long an invitation stays acceptable after creation.
    pub fn invitation_ttl(&self) -> Duration {
        self.invitation_ttl
    }

    /// How long a join request stays acceptable after creation.
    pub fn join_request_ttl(&self) -> Duration {
        self.join_request_ttl
    }

    /// Length of the synchronized countdown, in whole seconds.
    pub fn countdown_seconds(&self) -> u32 {
        self.countdown_seconds
    }

    /// How long a fresh socket may take to send its identification frame.
    pub fn ident_timeout(&self) -> Duration {
        self.ident_timeout
    }

    /// Silence window after which a connection is treated as gone.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Period of the background expiry sweep.
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }
}

/// On-disk configuration shape; every field optional so partial files work.
#[derive(Debug, Deserialize)]
struct RawConfig {
    invitation_ttl_secs: Option<u64>,
    join_request_ttl_secs: Option<u64>,
    countdown_seconds: Option<u32>,
    ident_timeout_secs: Option<u64>,
    heartbeat_timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            invitation_ttl: raw
                .invitation_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.invitation_ttl),
            join_request_ttl: raw
                .join_request_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.join_request_ttl),
            countdown_seconds: raw.countdown_seconds.unwrap_or(defaults.countdown_seconds),
            ident_timeout: raw
                .ident_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.ident_timeout),
            heartbeat_timeout: raw
                .heartbeat_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_timeout),
            sweep_interval: raw
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_raw_config_keeps_defaults_elsewhere() {
        let raw: RawConfig = serde_json::from_str(r#"{"countdown_seconds": 10}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.countdown_seconds(), 10);
        assert_eq!(
            config.invitation_ttl(),
            Duration::from_secs(DEFAULT_INVITATION_TTL_SECS)
        );
    }

    #[test]
    fn full_raw_config_overrides_everything() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "invitation_ttl_secs": 60,
                "join_request_ttl_secs": 90,
                "countdown_seconds": 3,
                "ident_timeout_secs": 5,
                "heartbeat_timeout_secs": 15,
                "sweep_interval_secs": 7
            }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.invitation_ttl(), Duration::from_secs(60));
        assert_eq!(config.join_request_ttl(), Duration::from_secs(90));
        assert_eq!(config.countdown_seconds(), 3);
        assert_eq!(config.ident_timeout(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(15));
        assert_eq!(config.sweep_interval(), Duration::from_secs(7));
    }
}
