use core::time::Duration;

use serde::{Deserialize, Deserializer};
use typed_builder::TypedBuilder;

const DEFAULT_MAX_ROUNDS: u32 = 16;
const DEFAULT_ROUND_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 32;

/// Limits applied to every relay.
///
/// ```
/// use core::time::Duration;
/// use relayer_discovery_resolver::RelayerConfig;
///
/// let config = RelayerConfig::builder().max_rounds(4).build();
/// assert_eq!(config.round_timeout, Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayerConfig {
    /// How many relayer transactions may be decoded for a single message before the
    /// relay is abandoned.
    #[builder(default = DEFAULT_MAX_ROUNDS)]
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Upper bound for one round: materializing, simulating (or funding and
    /// executing) and decoding.
    #[builder(default = DEFAULT_ROUND_TIMEOUT)]
    #[serde(
        rename = "round_timeout_ms",
        default = "default_round_timeout",
        deserialize_with = "millis"
    )]
    pub round_timeout: Duration,

    /// Upper bound for the whole relay of a message.
    #[builder(default = DEFAULT_MESSAGE_TIMEOUT)]
    #[serde(
        rename = "message_timeout_ms",
        default = "default_message_timeout",
        deserialize_with = "millis"
    )]
    pub message_timeout: Duration,

    /// How many messages are relayed at the same time.
    #[builder(default = DEFAULT_MAX_CONCURRENT_MESSAGES)]
    #[serde(default = "default_max_concurrent_messages")]
    pub max_concurrent_messages: usize,
}

/// The configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The input is not a valid configuration document.
    #[error("invalid relayer config: {0}")]
    Parse(#[from] serde_json::Error),
    /// `max_rounds` is zero, so no relay could ever finish.
    #[error("max_rounds must be at least 1")]
    ZeroRounds,
    /// `max_concurrent_messages` is zero, so no relay could ever start.
    #[error("max_concurrent_messages must be at least 1")]
    ZeroConcurrency,
}

impl RelayerConfig {
    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed input or unknown fields, and a validation
    /// error if a limit is zero.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every limit allows a relay to complete.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ZeroRounds`] or [`ConfigError::ZeroConcurrency`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        if self.max_concurrent_messages == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

const fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

const fn default_round_timeout() -> Duration {
    DEFAULT_ROUND_TIMEOUT
}

const fn default_message_timeout() -> Duration {
    DEFAULT_MESSAGE_TIMEOUT
}

const fn default_max_concurrent_messages() -> usize {
    DEFAULT_MAX_CONCURRENT_MESSAGES
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
