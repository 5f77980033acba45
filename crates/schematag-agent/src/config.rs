//! Agent configuration.
//!
//! Settings live in a TOML file (`SCHEMATAG_CONFIG`, default
//! `./schematag.toml`). A missing file is created with the defaults.
//! `SCHEMATAG_*` environment variables override individual settings after
//! the file is read.

use anyhow::{Context, Result};
use schematag_mqtt::{BackoffConfig, SchemaListenerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "SCHEMATAG_CONFIG";

/// Config file used when `SCHEMATAG_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "schematag.toml";

/// Agent configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base directory for relative cache, provider and ledger paths
    pub data_dir: PathBuf,

    /// MQTT listener configuration
    pub mqtt: MqttConfig,

    /// Schema cache configuration
    pub cache: CacheConfig,

    /// Tag provider configuration
    pub provider: ProviderConfig,

    /// Sync ledger configuration
    pub ledger: LedgerConfig,
}

/// MQTT listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Start the listener at all
    pub enabled: bool,

    /// Broker URL
    pub broker_url: String,

    /// Client ID; empty generates a unique one
    pub client_id: String,

    /// Topic filter carrying schemas
    pub topic: String,

    /// Username, empty for anonymous access
    pub username: String,

    /// Password
    pub password: String,

    /// Subscription QoS (0, 1 or 2)
    pub qos: u8,

    /// Start a clean session on connect
    pub clean_session: bool,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,

    /// Keep reconnecting after the connection drops
    pub automatic_reconnect: bool,

    /// First reconnect delay in seconds
    pub backoff_initial_secs: u64,

    /// Reconnect delay cap in seconds
    pub backoff_max_secs: u64,
}

/// Schema cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding `<name>.json` schema files
    pub path: PathBuf,

    /// Seconds between directory scans; 0 disables scanning
    pub scan_interval_secs: u64,
}

/// Which tag provider backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Tag JSON files on disk
    #[default]
    File,
    /// Gateway HTTP import API
    Http,
    /// In-process store (dry run)
    Memory,
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "http" => Ok(Self::Http),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown provider kind: {other}"),
        }
    }
}

/// Tag provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend kind
    pub kind: ProviderKind,

    /// Target tag provider name
    pub name: String,

    /// Remove UDTs when their schema is deleted
    pub allow_delete: bool,

    /// Root directory for the file provider
    pub file_root: PathBuf,

    /// Gateway base URL for the HTTP provider
    pub gateway_url: String,

    /// Gateway API token for the HTTP provider
    pub api_token: Option<String>,

    /// Timeout for one provider operation in seconds
    pub operation_timeout_secs: u64,
}

/// Sync ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Record registrations in `SQLite`
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: "schema-tag-provider".to_string(),
            topic: "ignition/schemas/#".to_string(),
            username: String::new(),
            password: String::new(),
            qos: 1,
            clean_session: true,
            connection_timeout_secs: 30,
            keep_alive_secs: 60,
            automatic_reconnect: true,
            backoff_initial_secs: 1,
            backoff_max_secs: 60,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("schemas"),
            scan_interval_secs: 30,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::File,
            name: "default".to_string(),
            allow_delete: true,
            file_root: PathBuf::from("tags"),
            gateway_url: "http://localhost:8088".to_string(),
            api_token: None,
            operation_timeout_secs: 30,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("ledger.db"),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the file named by `SCHEMATAG_CONFIG`, then
    /// apply environment overrides.
    ///
    /// # Environment Variables
    ///
    /// - `SCHEMATAG_DATA_DIR`: Base directory for relative paths
    /// - `SCHEMATAG_MQTT_ENABLED`: "true" to start the listener
    /// - `SCHEMATAG_MQTT_BROKER`: MQTT broker URL
    /// - `SCHEMATAG_MQTT_CLIENT_ID`: MQTT client ID
    /// - `SCHEMATAG_MQTT_TOPIC`: Schema topic filter
    /// - `SCHEMATAG_MQTT_USERNAME` / `SCHEMATAG_MQTT_PASSWORD`: Credentials
    /// - `SCHEMATAG_MQTT_QOS`: Subscription QoS
    /// - `SCHEMATAG_CACHE_PATH`: Schema cache directory
    /// - `SCHEMATAG_SCAN_INTERVAL`: Seconds between cache scans
    /// - `SCHEMATAG_PROVIDER_KIND`: "file", "http" or "memory"
    /// - `SCHEMATAG_PROVIDER_NAME`: Target tag provider
    /// - `SCHEMATAG_ALLOW_DELETE`: "true" to remove UDTs of deleted schemas
    /// - `SCHEMATAG_GATEWAY_URL`: Gateway URL for the HTTP provider
    /// - `SCHEMATAG_API_TOKEN`: Gateway API token
    /// - `SCHEMATAG_LEDGER_PATH`: `SQLite` ledger path
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be parsed or an override is invalid.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.normalize();
        Ok(config)
    }

    /// Load configuration from a TOML file, writing defaults if it is missing.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, creating with defaults");
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::error!(error = %e, path = %path.display(), "Failed to write default config");
            }
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Apply `SCHEMATAG_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or enum override cannot be parsed.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("SCHEMATAG_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(enabled) = lookup("SCHEMATAG_MQTT_ENABLED") {
            self.mqtt.enabled = parse_bool(&enabled);
        }

        if let Some(broker) = lookup("SCHEMATAG_MQTT_BROKER") {
            self.mqtt.broker_url = broker;
        }

        if let Some(client_id) = lookup("SCHEMATAG_MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }

        if let Some(topic) = lookup("SCHEMATAG_MQTT_TOPIC") {
            self.mqtt.topic = topic;
        }

        if let Some(username) = lookup("SCHEMATAG_MQTT_USERNAME") {
            self.mqtt.username = username;
        }

        if let Some(password) = lookup("SCHEMATAG_MQTT_PASSWORD") {
            self.mqtt.password = password;
        }

        if let Some(qos) = lookup("SCHEMATAG_MQTT_QOS") {
            self.mqtt.qos = qos.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = %qos, "Invalid QoS value, using default 1");
                1
            });
        }

        if let Some(path) = lookup("SCHEMATAG_CACHE_PATH") {
            self.cache.path = PathBuf::from(path);
        }

        if let Some(interval) = lookup("SCHEMATAG_SCAN_INTERVAL") {
            self.cache.scan_interval_secs = interval
                .trim()
                .parse()
                .context("Invalid SCHEMATAG_SCAN_INTERVAL")?;
        }

        if let Some(kind) = lookup("SCHEMATAG_PROVIDER_KIND") {
            self.provider.kind = kind.parse().context("Invalid SCHEMATAG_PROVIDER_KIND")?;
        }

        if let Some(name) = lookup("SCHEMATAG_PROVIDER_NAME") {
            self.provider.name = name;
        }

        if let Some(allow) = lookup("SCHEMATAG_ALLOW_DELETE") {
            self.provider.allow_delete = parse_bool(&allow);
        }

        if let Some(url) = lookup("SCHEMATAG_GATEWAY_URL") {
            self.provider.gateway_url = url;
        }

        if let Some(token) = lookup("SCHEMATAG_API_TOKEN") {
            self.provider.api_token = Some(token).filter(|t| !t.is_empty());
        }

        if let Some(path) = lookup("SCHEMATAG_LEDGER_PATH") {
            self.ledger.path = PathBuf::from(path);
        }

        Ok(())
    }

    /// Replace out-of-range values with their defaults.
    pub fn normalize(&mut self) {
        if self.mqtt.qos > 2 {
            tracing::warn!(qos = self.mqtt.qos, "Invalid QoS value, using default 1");
            self.mqtt.qos = 1;
        }

        if self.mqtt.client_id.trim().is_empty() {
            self.mqtt.client_id = format!("schema-tag-provider-{}", Uuid::new_v4());
            tracing::info!(client_id = %self.mqtt.client_id, "Generated MQTT client ID");
        }

        if self.provider.name.trim().is_empty() {
            tracing::warn!("Empty provider name, using \"default\"");
            self.provider.name = "default".to_string();
        }
    }

    /// Resolve a configured path against `data_dir`.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// Schema cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.cache.path)
    }

    /// Ledger database path.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.ledger.path)
    }

    /// Cache scan period, `None` when scanning is disabled.
    #[must_use]
    pub fn scan_interval(&self) -> Option<Duration> {
        (self.cache.scan_interval_secs > 0).then(|| Duration::from_secs(self.cache.scan_interval_secs))
    }

    /// Timeout for a single provider operation.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.operation_timeout_secs.max(1))
    }

    /// Listener settings derived from the `mqtt` section.
    #[must_use]
    pub fn listener_config(&self) -> SchemaListenerConfig {
        let mqtt = &self.mqtt;
        SchemaListenerConfig {
            broker_url: mqtt.broker_url.clone(),
            client_id: mqtt.client_id.clone(),
            topic: mqtt.topic.clone(),
            username: mqtt.username.clone(),
            password: mqtt.password.clone(),
            qos: mqtt.qos,
            clean_session: mqtt.clean_session,
            connection_timeout: Duration::from_secs(mqtt.connection_timeout_secs),
            keep_alive: Duration::from_secs(mqtt.keep_alive_secs),
            automatic_reconnect: mqtt.automatic_reconnect,
            backoff: BackoffConfig {
                initial: Duration::from_secs(mqtt.backoff_initial_secs.max(1)),
                max: Duration::from_secs(mqtt.backoff_max_secs.max(mqtt.backoff_initial_secs).max(1)),
            },
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = AgentConfig::default();
        assert!(config.mqtt.enabled);
        assert_eq!(config.mqtt.topic, "ignition/schemas/#");
        assert_eq!(config.mqtt.qos, 1);
        assert_eq!(config.cache.path, PathBuf::from("schemas"));
        assert_eq!(config.scan_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.provider.name, "default");
        assert!(config.provider.allow_delete);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("schematag.toml");

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert!(path.exists());

        let reloaded = AgentConfig::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schematag.toml");
        std::fs::write(
            &path,
            r#"
            data_dir = "/var/lib/schematag"

            [mqtt]
            broker_url = "ssl://broker:8883"
            qos = 2

            [provider]
            kind = "http"
            allow_delete = false
            "#,
        )
        .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.mqtt.broker_url, "ssl://broker:8883");
        assert_eq!(config.mqtt.qos, 2);
        assert_eq!(config.mqtt.topic, "ignition/schemas/#");
        assert_eq!(config.provider.kind, ProviderKind::Http);
        assert!(!config.provider.allow_delete);
        assert_eq!(
            config.cache_dir(),
            PathBuf::from("/var/lib/schematag/schemas")
        );
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schematag.toml");
        std::fs::write(&path, "[mqtt\nqos = ").unwrap();
        assert!(AgentConfig::load(&path).is_err());
    }

    #[test]
    fn env_overrides() {
        let mut config = AgentConfig::default();
        config
            .apply_overrides(lookup(&[
                ("SCHEMATAG_MQTT_BROKER", "tcp://mqtt:1884"),
                ("SCHEMATAG_MQTT_ENABLED", "FALSE"),
                ("SCHEMATAG_SCAN_INTERVAL", "0"),
                ("SCHEMATAG_PROVIDER_KIND", "Memory"),
                ("SCHEMATAG_ALLOW_DELETE", "yes"),
                ("SCHEMATAG_API_TOKEN", "secret"),
            ]))
            .unwrap();

        assert_eq!(config.mqtt.broker_url, "tcp://mqtt:1884");
        assert!(!config.mqtt.enabled);
        assert_eq!(config.scan_interval(), None);
        assert_eq!(config.provider.kind, ProviderKind::Memory);
        // Only "true" enables a flag.
        assert!(!config.provider.allow_delete);
        assert_eq!(config.provider.api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn bad_overrides() {
        let mut config = AgentConfig::default();
        assert!(config
            .apply_overrides(lookup(&[("SCHEMATAG_PROVIDER_KIND", "opc")]))
            .is_err());
        assert!(config
            .apply_overrides(lookup(&[("SCHEMATAG_SCAN_INTERVAL", "soon")]))
            .is_err());
    }

    #[test]
    fn invalid_qos_falls_back_to_one() {
        let mut config = AgentConfig::default();
        config
            .apply_overrides(lookup(&[("SCHEMATAG_MQTT_QOS", "high")]))
            .unwrap();
        assert_eq!(config.mqtt.qos, 1);

        config.mqtt.qos = 7;
        config.normalize();
        assert_eq!(config.mqtt.qos, 1);
    }

    #[test]
    fn empty_client_id_is_generated() {
        let mut config = AgentConfig::default();
        config.mqtt.client_id = String::new();
        config.normalize();
        assert!(config.mqtt.client_id.starts_with("schema-tag-provider-"));
    }

    #[test]
    fn listener_config_from_mqtt_section() {
        let mut config = AgentConfig::default();
        config.mqtt.username = "ops".to_string();
        config.mqtt.keep_alive_secs = 10;

        let listener = config.listener_config();
        assert!(listener.has_credentials());
        assert_eq!(listener.keep_alive, Duration::from_secs(10));
        assert_eq!(listener.backoff, BackoffConfig::default());
    }
}
