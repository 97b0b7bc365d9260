//! Gateway Configuration Settings
//!
//! Configuration types for the venue gateway, loaded from environment variables.
//! Unparseable numeric values fall back to their defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::DEFAULT_POLL_INTERVAL;
use crate::infrastructure::alphapoint::{
    CredentialsError, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_RECONNECT_DELAY, DEFAULT_VENUE_URL,
    DEFAULT_WRITE_TIMEOUT, ReconnectConfig, VenueClientConfig, VenueCredentials,
};
use crate::infrastructure::eventbus::DEFAULT_QUEUE_CAPACITY;

/// Venue connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueSettings {
    /// WebSocket endpoint.
    pub url: String,
    /// Connect and handshake bound.
    pub handshake_timeout: Duration,
    /// Per-send write bound.
    pub write_timeout: Duration,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_VENUE_URL.to_string(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl VenueSettings {
    /// Client configuration for these settings.
    #[must_use]
    pub fn client_config(&self) -> VenueClientConfig {
        VenueClientConfig {
            url: self.url.clone(),
            handshake_timeout: self.handshake_timeout,
            write_timeout: self.write_timeout,
            reconnect: ReconnectConfig::new(self.reconnect_delay),
        }
    }
}

/// Order processing and reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingSettings {
    /// Instrument mapping file.
    pub symbol_mapping_path: PathBuf,
    /// Provider name used in queue names.
    pub provider: String,
    /// Reconciliation poll interval.
    pub poll_interval: Duration,
    /// Per-subscriber event queue bound.
    pub event_queue_capacity: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            symbol_mapping_path: PathBuf::from("configs/symbol_mapping.json"),
            provider: "kiiex".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health and metrics HTTP port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 8082 }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Venue connection settings.
    pub venue: VenueSettings,
    /// Venue credentials, when configured.
    pub credentials: Option<VenueCredentials>,
    /// Processing settings.
    pub processing: ProcessingSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let venue_defaults = VenueSettings::default();
        let venue = VenueSettings {
            url: lookup("KIIEX_WEBSOCKET_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(venue_defaults.url),
            handshake_timeout: parse_duration_secs(
                lookup("KIIEX_HANDSHAKE_TIMEOUT_SECS"),
                venue_defaults.handshake_timeout,
            ),
            write_timeout: parse_duration_secs(
                lookup("KIIEX_WRITE_TIMEOUT_SECS"),
                venue_defaults.write_timeout,
            ),
            reconnect_delay: parse_duration_secs(
                lookup("KIIEX_RECONNECT_DELAY_SECS"),
                venue_defaults.reconnect_delay,
            ),
        };

        let processing_defaults = ProcessingSettings::default();
        let processing = ProcessingSettings {
            symbol_mapping_path: lookup("SYMBOL_MAPPING_PATH")
                .filter(|path| !path.trim().is_empty())
                .map_or(processing_defaults.symbol_mapping_path, PathBuf::from),
            provider: lookup("CHECKER_OTC_ADAPTER_PROVIDER")
                .filter(|provider| !provider.trim().is_empty())
                .unwrap_or(processing_defaults.provider),
            poll_interval: parse_duration_secs(
                lookup("KIIEX_POLL_INTERVAL_SECS"),
                processing_defaults.poll_interval,
            ),
            event_queue_capacity: parse_usize(
                lookup("KIIEX_EVENT_QUEUE_CAPACITY"),
                processing_defaults.event_queue_capacity,
            ),
        };

        let server = ServerSettings {
            port: parse_u16(lookup("SERVER_PORT"), ServerSettings::default().port),
        };

        let credentials = VenueCredentials::from_lookup(&lookup)?;

        Ok(Self {
            venue,
            credentials,
            processing,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Venue credentials are malformed.
    #[error("invalid venue credentials: {0}")]
    Credentials(#[from] CredentialsError),
}

fn parse_u16(value: Option<String>, default: u16) -> u16 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_usize(value: Option<String>, default: usize) -> usize {
    value
        .and_then(|v| v.trim().parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

fn parse_duration_secs(value: Option<String>, default: Duration) -> Duration {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&secs| secs > 0)
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.venue, VenueSettings::default());
        assert_eq!(config.venue.url, "wss://api.kiire.alphaprod.net/WSGateway");
        assert_eq!(config.venue.write_timeout, Duration::from_secs(10));
        assert_eq!(config.processing.poll_interval, Duration::from_secs(300));
        assert_eq!(config.processing.provider, "kiiex");
        assert_eq!(config.processing.event_queue_capacity, 1024);
        assert_eq!(
            config.processing.symbol_mapping_path,
            PathBuf::from("configs/symbol_mapping.json")
        );
        assert_eq!(config.server.port, 8082);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("KIIEX_WEBSOCKET_URL", "ws://127.0.0.1:9000"),
            ("KIIEX_RECONNECT_DELAY_SECS", "1"),
            ("KIIEX_POLL_INTERVAL_SECS", "30"),
            ("KIIEX_EVENT_QUEUE_CAPACITY", "16"),
            ("CHECKER_OTC_ADAPTER_PROVIDER", "otc"),
            ("SYMBOL_MAPPING_PATH", "/etc/kiiex/symbols.json"),
            ("SERVER_PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(config.venue.url, "ws://127.0.0.1:9000");
        assert_eq!(config.venue.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.processing.poll_interval, Duration::from_secs(30));
        assert_eq!(config.processing.event_queue_capacity, 16);
        assert_eq!(config.processing.provider, "otc");
        assert_eq!(
            config.processing.symbol_mapping_path,
            PathBuf::from("/etc/kiiex/symbols.json")
        );
        assert_eq!(config.server.port, 9100);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("KIIEX_WRITE_TIMEOUT_SECS", "soon"),
            ("KIIEX_EVENT_QUEUE_CAPACITY", "0"),
            ("SERVER_PORT", "70000"),
        ]))
        .unwrap();

        assert_eq!(config.venue.write_timeout, DEFAULT_WRITE_TIMEOUT);
        assert_eq!(config.processing.event_queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.server.port, 8082);
    }

    #[test]
    fn zero_durations_fall_back() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("KIIEX_POLL_INTERVAL_SECS", "0"),
            ("KIIEX_HANDSHAKE_TIMEOUT_SECS", "0"),
            ("KIIEX_WRITE_TIMEOUT_SECS", " 0 "),
            ("KIIEX_RECONNECT_DELAY_SECS", "0"),
        ]))
        .unwrap();
        let defaults = GatewayConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.processing.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.venue.handshake_timeout, defaults.venue.handshake_timeout);
        assert_eq!(config.venue.write_timeout, DEFAULT_WRITE_TIMEOUT);
        assert_eq!(config.venue.reconnect_delay, defaults.venue.reconnect_delay);
    }

    #[test]
    fn malformed_credentials_are_an_error() {
        let result = GatewayConfig::from_lookup(lookup(&[
            ("KIIEX_API_KEY", "k"),
            ("KIIEX_ACCOUNT_ID", "abc"),
        ]));
        assert!(matches!(result, Err(ConfigError::Credentials(_))));
    }

    #[test]
    fn client_config_follows_venue_settings() {
        let settings = VenueSettings {
            reconnect_delay: Duration::from_secs(2),
            ..VenueSettings::default()
        };
        let client = settings.client_config();
        assert_eq!(client.url, settings.url);
        assert_eq!(client.reconnect.delay, Duration::from_secs(2));
    }
}
