use std::env;
use std::str::FromStr;
use std::time::Duration;

const CHANNEL_MOVE_GRACE_VAR: &str = "MUSIC_CHANNEL_MOVE_GRACE_SECS";
const MAX_REJOIN_ATTEMPTS_VAR: &str = "MUSIC_MAX_REJOIN_ATTEMPTS";
const REJOIN_BACKOFF_VAR: &str = "MUSIC_REJOIN_BACKOFF_SECS";
const READY_TIMEOUT_VAR: &str = "MUSIC_READY_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Timing policy of a subscription's connection reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long a 4014 close may take to turn back into `Connecting`.
    pub channel_move_grace: Duration,
    pub max_rejoin_attempts: u32,
    pub rejoin_backoff_step: Duration,
    /// How long `Signalling`/`Connecting` may last before the connection is destroyed.
    pub ready_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_move_grace: Duration::from_secs(5),
            max_rejoin_attempts: 5,
            rejoin_backoff_step: Duration::from_secs(5),
            ready_timeout: Duration::from_secs(20),
        }
    }
}

impl Config {
    /// Reads `.env` if present, then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            channel_move_grace: parse_or(&lookup, CHANNEL_MOVE_GRACE_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.channel_move_grace),
            max_rejoin_attempts: parse_or(&lookup, MAX_REJOIN_ATTEMPTS_VAR)?
                .unwrap_or(defaults.max_rejoin_attempts),
            rejoin_backoff_step: parse_or(&lookup, REJOIN_BACKOFF_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.rejoin_backoff_step),
            ready_timeout: parse_or(&lookup, READY_TIMEOUT_VAR)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.ready_timeout),
        })
    }

    /// Linear backoff before the rejoin that follows `prior_attempts` failed ones.
    pub fn rejoin_delay(&self, prior_attempts: u32) -> Duration {
        self.rejoin_backoff_step * (prior_attempts + 1)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}
