//! Listener configuration and broker URL handling.

use crate::listener::ListenerError;
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Default port for plain MQTT.
pub const DEFAULT_PORT: u16 = 1883;

/// Default port for MQTT over TLS.
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Reconnect delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failure
    pub initial: Duration,
    /// Upper bound for the doubling delay
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

/// Configuration for the schema listener.
#[derive(Debug, Clone)]
pub struct SchemaListenerConfig {
    /// Broker URL (e.g., <tcp://localhost:1883> or <ssl://broker:8883>)
    pub broker_url: String,
    /// Client ID for the MQTT connection
    pub client_id: String,
    /// Topic filter carrying schemas
    pub topic: String,
    /// Username, empty for anonymous access
    pub username: String,
    /// Password, used only together with a username
    pub password: String,
    /// Subscription QoS level (0, 1 or 2)
    pub qos: u8,
    /// Start a clean session on connect
    pub clean_session: bool,
    /// Connection timeout
    pub connection_timeout: Duration,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Keep reconnecting after the connection drops
    pub automatic_reconnect: bool,
    /// Reconnect delay bounds
    pub backoff: BackoffConfig,
}

impl Default for SchemaListenerConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: "schema-tag-provider".to_string(),
            topic: "ignition/schemas/#".to_string(),
            username: String::new(),
            password: String::new(),
            qos: 1,
            clean_session: true,
            connection_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(60),
            automatic_reconnect: true,
            backoff: BackoffConfig::default(),
        }
    }
}

impl SchemaListenerConfig {
    /// Whether a username is configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Resolved broker endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Connect over TLS
    pub tls: bool,
}

/// Parse a broker URL into host, port and transport.
///
/// Accepts `tcp://`, `mqtt://`, `ssl://`, `mqtts://` and `tls://` URLs as
/// well as bare `host[:port]`.
///
/// # Errors
///
/// Returns error if the scheme is unsupported, the host is missing or the
/// port is invalid.
pub fn parse_broker_url(input: &str) -> Result<BrokerAddress, ListenerError> {
    if input.contains("://") {
        let url =
            Url::parse(input).map_err(|e| ListenerError::InvalidUrl(format!("{input}: {e}")))?;

        let (tls, default_port) = match url.scheme() {
            "tcp" | "mqtt" => (false, DEFAULT_PORT),
            "ssl" | "mqtts" | "tls" => (true, DEFAULT_TLS_PORT),
            scheme => {
                return Err(ListenerError::InvalidUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ListenerError::InvalidUrl(format!("{input}: missing host")))?;

        return Ok(BrokerAddress {
            host: host.to_string(),
            port: url.port().unwrap_or(default_port),
            tls,
        });
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ListenerError::InvalidUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => DEFAULT_PORT,
        Some(port) => port
            .parse()
            .map_err(|_| ListenerError::InvalidUrl(format!("{input}: invalid port '{port}'")))?,
    };
    if parts.next().is_some() {
        return Err(ListenerError::InvalidUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls: false,
    })
}

/// Convert a numeric QoS level.
///
/// # Errors
///
/// Returns error for levels other than 0, 1 and 2.
pub fn qos_from_level(level: u8) -> Result<QoS, ListenerError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ListenerError::InvalidQos(other)),
    }
}
