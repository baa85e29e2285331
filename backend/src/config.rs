//! Runtime settings loaded via OrthoConfig.
//!
//! Every value can be supplied through a `FITLEDGER_*` environment variable
//! or a configuration file. Endpoints and the topic are required for the
//! commands that use them; tuning values fall back to the defaults below.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::{LogCacheConfig, TopicId};

const DEFAULT_LOG_CACHE_TTL_SECONDS: u64 = 300;
const DEFAULT_LOG_CACHE_MAX_MESSAGES: usize = 10_000;
const DEFAULT_LOG_REFRESH_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_CHALLENGE_SYNC_INTERVAL_SECONDS: u64 = 900;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;

/// Errors raised when a required or malformed setting is read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// The setting has no value.
    #[error("missing setting `{name}`")]
    Missing { name: &'static str },
    /// The setting could not be parsed.
    #[error("invalid setting `{name}`: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Settings for the sync daemon and its one-shot commands.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "FITLEDGER")]
pub struct SyncSettings {
    /// PostgreSQL connection URL for the activity cache.
    pub database_url: Option<String>,
    /// Base URL of the ledger JSON gateway.
    pub ledger_gateway_url: Option<String>,
    /// Base URL of the mirror node REST API.
    pub mirror_node_url: Option<String>,
    /// Log topic to mirror, in `shard.realm.num` notation.
    pub topic_id: Option<String>,
    /// Age after which the log mirror counts as stale.
    pub log_cache_ttl_seconds: Option<u64>,
    /// Messages kept by the log mirror.
    pub log_cache_max_messages: Option<usize>,
    /// Delay between background log refreshes.
    pub log_refresh_interval_seconds: Option<u64>,
    /// Delay between challenge definition batches.
    pub challenge_sync_interval_seconds: Option<u64>,
    /// Per-request timeout for outbound HTTP calls.
    pub request_timeout_seconds: Option<u64>,
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, SettingsError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SettingsError::Missing { name })
}

fn parse_url(value: Option<&str>, name: &'static str) -> Result<Url, SettingsError> {
    Url::parse(required(value, name)?).map_err(|error| SettingsError::Invalid {
        name,
        message: error.to_string(),
    })
}

impl SyncSettings {
    /// Return the database URL.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Missing`] when unset or blank.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        required(self.database_url.as_deref(), "database_url")
    }

    /// Return the parsed ledger gateway URL.
    ///
    /// # Errors
    ///
    /// Returns an error when unset or not a valid URL.
    pub fn ledger_gateway_url(&self) -> Result<Url, SettingsError> {
        parse_url(self.ledger_gateway_url.as_deref(), "ledger_gateway_url")
    }

    /// Return the parsed mirror node URL.
    ///
    /// # Errors
    ///
    /// Returns an error when unset or not a valid URL.
    pub fn mirror_node_url(&self) -> Result<Url, SettingsError> {
        parse_url(self.mirror_node_url.as_deref(), "mirror_node_url")
    }

    /// Return the parsed topic id.
    ///
    /// # Errors
    ///
    /// Returns an error when unset or not in `shard.realm.num` form.
    pub fn topic_id(&self) -> Result<TopicId, SettingsError> {
        required(self.topic_id.as_deref(), "topic_id")?
            .parse()
            .map_err(|error: crate::domain::IdentifierValidationError| SettingsError::Invalid {
                name: "topic_id",
                message: error.to_string(),
            })
    }

    /// Return the log mirror TTL, falling back to five minutes.
    pub fn log_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.log_cache_ttl_seconds
                .unwrap_or(DEFAULT_LOG_CACHE_TTL_SECONDS),
        )
    }

    /// Return the log mirror size bound.
    pub fn log_cache_max_messages(&self) -> usize {
        self.log_cache_max_messages
            .unwrap_or(DEFAULT_LOG_CACHE_MAX_MESSAGES)
            .max(1)
    }

    /// Return the background log refresh interval.
    pub fn log_refresh_interval(&self) -> Duration {
        Duration::from_secs(
            self.log_refresh_interval_seconds
                .unwrap_or(DEFAULT_LOG_REFRESH_INTERVAL_SECONDS)
                .max(1),
        )
    }

    /// Return the challenge definition batch interval.
    pub fn challenge_sync_interval(&self) -> Duration {
        Duration::from_secs(
            self.challenge_sync_interval_seconds
                .unwrap_or(DEFAULT_CHALLENGE_SYNC_INTERVAL_SECONDS)
                .max(1),
        )
    }

    /// Return the outbound HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_seconds
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS),
        )
    }

    /// Build the log mirror configuration from these settings.
    pub fn log_cache_config(&self) -> LogCacheConfig {
        LogCacheConfig {
            ttl: self.log_cache_ttl(),
            max_messages: self.log_cache_max_messages(),
            ..LogCacheConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for sync settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const KEYS: [&str; 9] = [
        "FITLEDGER_DATABASE_URL",
        "FITLEDGER_LEDGER_GATEWAY_URL",
        "FITLEDGER_MIRROR_NODE_URL",
        "FITLEDGER_TOPIC_ID",
        "FITLEDGER_LOG_CACHE_TTL_SECONDS",
        "FITLEDGER_LOG_CACHE_MAX_MESSAGES",
        "FITLEDGER_LOG_REFRESH_INTERVAL_SECONDS",
        "FITLEDGER_CHALLENGE_SYNC_INTERVAL_SECONDS",
        "FITLEDGER_REQUEST_TIMEOUT_SECONDS",
    ];

    fn cleared_env(overrides: &[(&str, &str)]) -> Vec<(&'static str, Option<String>)> {
        KEYS.iter()
            .map(|key| {
                let value = overrides
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, value)| (*value).to_owned());
                (*key, value)
            })
            .collect()
    }

    fn load_from_empty_args() -> SyncSettings {
        SyncSettings::load_from_iter([OsString::from("fitledger")]).expect("config should load")
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(cleared_env(&[]));

        let settings = load_from_empty_args();
        assert_eq!(settings.log_cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.log_cache_max_messages(), 10_000);
        assert_eq!(settings.log_refresh_interval(), Duration::from_secs(60));
        assert_eq!(settings.challenge_sync_interval(), Duration::from_secs(900));
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(
            settings.database_url(),
            Err(SettingsError::Missing {
                name: "database_url"
            })
        );
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env(cleared_env(&[
            ("FITLEDGER_DATABASE_URL", "postgres://localhost/fitledger"),
            ("FITLEDGER_LEDGER_GATEWAY_URL", "https://gateway.example/v1/"),
            ("FITLEDGER_MIRROR_NODE_URL", "https://mirror.example/"),
            ("FITLEDGER_TOPIC_ID", "0.0.4242"),
            ("FITLEDGER_LOG_CACHE_TTL_SECONDS", "30"),
            ("FITLEDGER_LOG_CACHE_MAX_MESSAGES", "500"),
        ]));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.database_url(),
            Ok("postgres://localhost/fitledger")
        );
        assert_eq!(
            settings
                .ledger_gateway_url()
                .expect("gateway url")
                .as_str(),
            "https://gateway.example/v1/"
        );
        assert_eq!(
            settings.topic_id().expect("topic"),
            TopicId::from_parts(0, 0, 4242)
        );
        let cache = settings.log_cache_config();
        assert_eq!(cache.ttl, Duration::from_secs(30));
        assert_eq!(cache.max_messages, 500);
        assert_eq!(cache.stats_top_n, LogCacheConfig::default().stats_top_n);
    }

    #[rstest]
    #[case::bad_topic("FITLEDGER_TOPIC_ID", "not-a-topic")]
    #[case::blank_topic("FITLEDGER_TOPIC_ID", "   ")]
    fn malformed_topic_is_reported(#[case] key: &str, #[case] value: &str) {
        let _guard = lock_env(cleared_env(&[(key, value)]));

        let settings = load_from_empty_args();
        assert!(settings.topic_id().is_err());
    }

    #[rstest]
    fn malformed_url_is_invalid() {
        let _guard = lock_env(cleared_env(&[("FITLEDGER_MIRROR_NODE_URL", "not a url")]));

        let settings = load_from_empty_args();
        assert!(matches!(
            settings.mirror_node_url(),
            Err(SettingsError::Invalid {
                name: "mirror_node_url",
                ..
            })
        ));
    }
}
