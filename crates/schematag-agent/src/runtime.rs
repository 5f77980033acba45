//! Agent runtime orchestration.

use crate::cache::{CacheError, SchemaCache};
use crate::config::{AgentConfig, ProviderKind};
use crate::ledger::{SyncAction, SyncLedger};
use anyhow::{Context, Result};
use schematag_core::{SchemaModel, UdtDefinitionBuilder};
use schematag_mqtt::{ListenerHandle, SchemaEvent, SchemaListener};
use schematag_provider::{
    AnyTagProvider, FileTagProvider, HttpProviderConfig, HttpTagProvider, MemoryTagProvider,
    TagProvider, UdtSynchronizer,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Sync history entries logged at shutdown.
const RECENT_EVENTS: usize = 10;

/// Snapshot of the agent's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentStatus {
    /// Startup finished and shutdown not yet begun
    pub running: bool,
    /// Broker connection is up
    pub mqtt_connected: bool,
    /// Schemas in the cache
    pub cached_schemas: usize,
    /// UDTs imported during this run
    pub registered_udts: usize,
}

/// The main agent runtime.
pub struct Agent<P = AnyTagProvider> {
    config: AgentConfig,
    cache: SchemaCache,
    synchronizer: UdtSynchronizer<P>,
    ledger: Option<SyncLedger>,
    listener: Option<ListenerHandle>,
    events: Option<mpsc::Receiver<SchemaEvent>>,
    running: bool,
}

impl Agent<AnyTagProvider> {
    /// Create an agent with the provider selected by the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the provider or the ledger cannot be opened.
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        let provider = provider_from_config(&config)?;
        Self::new(config, provider)
    }
}

impl<P: TagProvider> Agent<P> {
    /// Create a new agent.
    ///
    /// # Errors
    ///
    /// Returns error if the ledger database cannot be opened.
    pub fn new(config: AgentConfig, provider: P) -> Result<Self> {
        let ledger = if config.ledger.enabled {
            let path = config.ledger_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            Some(SyncLedger::open(&path).context("Failed to open SQLite ledger")?)
        } else {
            None
        };

        let cache = SchemaCache::new(config.cache_dir());
        let synchronizer = UdtSynchronizer::new(provider).with_timeout(config.operation_timeout());

        Ok(Self {
            config,
            cache,
            synchronizer,
            ledger,
            listener: None,
            events: None,
            running: false,
        })
    }

    /// Bring the agent up: cache, listener, reconciliation, initial sync.
    ///
    /// Listener and cache failures are logged and startup continues, so the
    /// cached schemas are still served without a broker.
    pub async fn startup(&mut self) {
        tracing::info!(
            provider = %self.synchronizer.provider().name(),
            cache = %self.cache.cache_dir().display(),
            "Starting schema tag provider"
        );

        if let Err(e) = self.cache.initialize() {
            tracing::error!(error = %e, "Failed to initialize schema cache");
        }

        if self.config.mqtt.enabled {
            self.start_listener().await;
        } else {
            tracing::info!("MQTT listener disabled");
        }

        self.running = true;

        self.reconcile_ledger().await;
        self.sync_all_schemas().await;

        tracing::info!(
            cached = self.cache.schema_count(),
            registered = self.synchronizer.registered_types().len(),
            "Schema tag provider started"
        );
    }

    async fn start_listener(&mut self) {
        let listener = match SchemaListener::new(self.config.listener_config()) {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create MQTT listener; schema updates via MQTT will not be available");
                return;
            }
        };

        if let Err(e) = listener.subscribe().await {
            tracing::error!(error = %e, "Failed to subscribe to schema topic");
        }

        let (handle, events) = listener.start();
        self.listener = Some(handle);
        self.events = Some(events);
        tracing::info!(broker = %self.config.mqtt.broker_url, topic = %self.config.mqtt.topic, "MQTT listener started");
    }

    /// Run the agent's main loop until Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns error if any component fails.
    pub async fn run(mut self) -> Result<()> {
        self.startup().await;

        let mut scan = self.config.scan_interval().map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        tracing::info!("Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                event = next_event(&mut self.events) => {
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    } else {
                        tracing::warn!("MQTT listener stopped");
                        self.events = None;
                    }
                }

                () = next_tick(&mut scan) => {
                    self.scan_and_sync().await;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Dispatch one listener event.
    pub async fn handle_event(&mut self, event: SchemaEvent) {
        match event {
            SchemaEvent::Connected => self.on_connected(),
            SchemaEvent::Disconnected { reason } => self.on_disconnected(&reason),
            SchemaEvent::Received {
                schema_name,
                content,
            } => self.on_schema_received(&schema_name, &content).await,
            SchemaEvent::Deleted { schema_name } => self.on_schema_deleted(&schema_name).await,
        }
    }

    fn on_connected(&self) {
        tracing::info!(broker = %self.config.mqtt.broker_url, "MQTT connection established");
    }

    fn on_disconnected(&self, reason: &str) {
        tracing::warn!(reason, "MQTT connection lost, will attempt reconnect");
    }

    /// Cache and sync a schema received over MQTT.
    pub async fn on_schema_received(&mut self, name: &str, content: &str) {
        if !self.running {
            tracing::warn!(schema = %name, "Ignoring schema update, provider not running");
            return;
        }

        tracing::info!(schema = %name, "Processing schema update");
        tracing::debug!(schema = %name, content, "Schema content");

        let previous = self
            .cache
            .get_schema(name)
            .map(udt_names)
            .or_else(|| self.recorded_udts(name));

        match self.cache.save_schema(name, content) {
            Ok(schema) => {
                self.sync_schema(name, &schema, content, previous).await;
            }
            Err(CacheError::Parse(e)) => {
                tracing::error!(schema = %name, error = %e, "Invalid JSON Schema received");
            }
            Err(e) => {
                tracing::error!(schema = %name, error = %e, "Failed to save schema to cache");
            }
        }
    }

    /// Remove a schema deleted over MQTT, and its UDT when allowed.
    pub async fn on_schema_deleted(&mut self, name: &str) {
        if !self.running {
            tracing::warn!(schema = %name, "Ignoring schema deletion, provider not running");
            return;
        }

        tracing::info!(schema = %name, "Schema deletion requested");

        if self.config.provider.allow_delete {
            let types = self.udt_names_for(name, self.cache.get_schema(name));
            self.remove_udts(name, &types).await;
        } else {
            tracing::info!(schema = %name, "UDT deletion disabled, keeping UDT");
        }

        if let Err(e) = self.cache.remove_schema(name) {
            tracing::error!(schema = %name, error = %e, "Failed to remove schema from cache");
        }
    }

    /// Reload the cache directory and sync what changed on disk.
    pub async fn scan_and_sync(&mut self) {
        if !self.running {
            return;
        }

        let report = self.cache.reload();

        if !report.removed.is_empty() {
            if self.config.provider.allow_delete {
                for (name, model) in &report.removed {
                    let types = self.udt_names_for(name, Some(model));
                    self.remove_udts(name, &types).await;
                }
            } else {
                tracing::info!(
                    count = report.removed.len(),
                    "Schemas removed from cache, UDT deletion disabled"
                );
            }
        }

        let to_sync: Vec<String> = report.to_sync().cloned().collect();
        if to_sync.is_empty() {
            tracing::debug!("No schema changes detected");
            return;
        }

        tracing::info!(count = to_sync.len(), "Detected schema changes");
        for name in to_sync {
            self.sync_cached(&name).await;
        }
    }

    async fn sync_all_schemas(&mut self) {
        let names = self.cache.schema_names();
        if names.is_empty() {
            return;
        }

        tracing::info!(count = names.len(), "Syncing cached schemas");
        let mut synced = 0;
        for name in &names {
            if self.sync_cached(name).await {
                synced += 1;
            }
        }
        tracing::info!(synced, total = names.len(), "Initial sync complete");
    }

    async fn sync_cached(&mut self, name: &str) -> bool {
        let (Some(schema), Some(raw)) = (
            self.cache.get_schema(name).cloned(),
            self.cache.get_raw_schema(name).map(str::to_string),
        ) else {
            return false;
        };

        let previous = self.recorded_udts(name);
        self.sync_schema(name, &schema, &raw, previous).await
    }

    /// Import a schema's UDTs, then retire the types it no longer produces.
    async fn sync_schema(
        &mut self,
        name: &str,
        schema: &SchemaModel,
        content: &str,
        previous: Option<Vec<String>>,
    ) -> bool {
        let success = self.synchronizer.sync_udt_definition(schema).await;
        if success {
            if let Some(previous) = previous {
                self.retire_stale_udts(name, schema, previous).await;
            }
        }
        self.record_sync(name, schema, content, success);
        success
    }

    /// Remove types imported for an earlier version of a schema, such as the
    /// old main type of a retitled schema or the nested type of a dropped
    /// object property.
    async fn retire_stale_udts(&mut self, name: &str, schema: &SchemaModel, previous: Vec<String>) {
        let current = udt_names(schema);
        let stale: Vec<String> = previous.into_iter().filter(|t| !current.contains(t)).collect();
        if stale.is_empty() {
            return;
        }

        if !self.config.provider.allow_delete {
            tracing::info!(schema = %name, stale = ?stale, "UDT deletion disabled, keeping replaced UDTs");
            return;
        }

        tracing::info!(schema = %name, stale = ?stale, "Removing UDTs replaced by schema update");
        let mut success = true;
        for udt in &stale {
            success &= self.synchronizer.remove_udt_definition(udt).await;
        }
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record_event(name, SyncAction::Remove, success) {
                tracing::warn!(error = %e, schema = %name, "Failed to record sync event");
            }
        }
    }

    /// Remove UDTs whose schema vanished while the agent was down.
    async fn reconcile_ledger(&mut self) {
        let registrations = match &self.ledger {
            Some(ledger) => match ledger.registered_schemas() {
                Ok(registrations) => registrations,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read sync ledger");
                    return;
                }
            },
            None => return,
        };

        let stale: Vec<_> = registrations
            .into_iter()
            .filter(|r| !self.cache.has_schema(&r.schema_name))
            .collect();
        if stale.is_empty() {
            return;
        }

        if !self.config.provider.allow_delete {
            tracing::info!(count = stale.len(), "Registered schemas missing from cache, UDT deletion disabled");
            return;
        }

        tracing::info!(count = stale.len(), "Removing UDTs of schemas deleted while stopped");
        for registration in stale {
            tracing::debug!(
                schema = %registration.schema_name,
                udt = %registration.type_name,
                hash = %registration.content_hash,
                synced_at = %registration.synced_at,
                "Stale registration"
            );
            self.remove_udts(&registration.schema_name, &registration.udt_names())
                .await;
        }
    }

    /// UDT names created for a schema, from its model or else the ledger.
    fn udt_names_for(&self, name: &str, schema: Option<&SchemaModel>) -> Vec<String> {
        schema
            .map(udt_names)
            .or_else(|| self.recorded_udts(name))
            .unwrap_or_else(|| vec![name.to_string()])
    }

    /// UDT names the ledger recorded for a schema.
    fn recorded_udts(&self, name: &str) -> Option<Vec<String>> {
        let ledger = self.ledger.as_ref()?;
        match ledger.registration_for(name) {
            Ok(registration) => registration.map(|r| r.udt_names()),
            Err(e) => {
                tracing::warn!(error = %e, schema = %name, "Failed to read sync ledger");
                None
            }
        }
    }

    async fn remove_udts(&mut self, schema_name: &str, types: &[String]) {
        let Some((main, nested)) = types.split_first() else {
            return;
        };

        let success = self.synchronizer.remove_udt_definition(main).await;
        for name in nested {
            self.synchronizer.remove_udt_definition(name).await;
        }

        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.remove_registration(main) {
                tracing::warn!(error = %e, udt = %main, "Failed to update sync ledger");
            }
            if let Err(e) = ledger.record_event(schema_name, SyncAction::Remove, success) {
                tracing::warn!(error = %e, schema = %schema_name, "Failed to record sync event");
            }
        }
    }

    fn record_sync(&self, schema_name: &str, schema: &SchemaModel, content: &str, success: bool) {
        let Some(ledger) = &self.ledger else {
            return;
        };

        if success {
            let names = udt_names(schema);
            if let Err(e) = ledger.record_registration(&schema.name, &names[1..], schema_name, content) {
                tracing::warn!(error = %e, schema = %schema_name, "Failed to update sync ledger");
            }
        }
        if let Err(e) = ledger.record_event(schema_name, SyncAction::Sync, success) {
            tracing::warn!(error = %e, schema = %schema_name, "Failed to record sync event");
        }
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            running: self.running,
            mqtt_connected: self.listener.as_ref().is_some_and(ListenerHandle::is_connected),
            cached_schemas: self.cache.schema_count(),
            registered_udts: self.synchronizer.registered_types().len(),
        }
    }

    /// Stop handling events and disconnect from the broker.
    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down schema tag provider");
        self.running = false;

        if let Some(listener) = self.listener.take() {
            listener.disconnect().await;
        }
        self.events = None;

        if let Some(ledger) = &self.ledger {
            match ledger.recent_events(RECENT_EVENTS) {
                Ok(events) => {
                    for event in events {
                        tracing::debug!(
                            schema = %event.schema_name,
                            action = event.action.as_str(),
                            success = event.success,
                            at = %event.occurred_at,
                            "Recent sync event"
                        );
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Failed to read sync history"),
            }
        }

        tracing::info!(status = ?self.status(), "Schema tag provider stopped");
    }
}

/// UDT names created for a schema: main type first, then nested types.
fn udt_names(schema: &SchemaModel) -> Vec<String> {
    std::iter::once(schema.name.clone())
        .chain(
            UdtDefinitionBuilder::new()
                .build_nested_udts(schema)
                .into_iter()
                .map(|udt| udt.name),
        )
        .collect()
}

/// Build the provider named by `provider.kind`.
///
/// # Errors
///
/// Returns error if the provider cannot be created.
pub fn provider_from_config(config: &AgentConfig) -> Result<AnyTagProvider> {
    let provider = &config.provider;
    let built = match provider.kind {
        ProviderKind::File => {
            let root = config.resolve(&provider.file_root);
            AnyTagProvider::File(
                FileTagProvider::new(&root, provider.name.clone())
                    .context("Failed to create file tag provider")?,
            )
        }
        ProviderKind::Http => AnyTagProvider::Http(
            HttpTagProvider::new(HttpProviderConfig {
                base_url: provider.gateway_url.clone(),
                provider: provider.name.clone(),
                api_token: provider.api_token.clone(),
                timeout: config.operation_timeout(),
                ..HttpProviderConfig::default()
            })
            .context("Failed to create HTTP tag provider")?,
        ),
        ProviderKind::Memory => AnyTagProvider::Memory(MemoryTagProvider::new(provider.name.clone())),
    };

    tracing::info!(kind = ?provider.kind, provider = %provider.name, "Tag provider configured");
    Ok(built)
}

async fn next_event(events: &mut Option<mpsc::Receiver<SchemaEvent>>) -> Option<SchemaEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(scan: &mut Option<Interval>) {
    match scan {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const TANK: &str = r#"{
        "title": "Tank",
        "properties": {
            "level": { "type": "number" },
            "inlet": {
                "type": "object",
                "properties": { "open": { "type": "boolean" } }
            }
        }
    }"#;

    const SENSOR: &str = r#"{"properties": {"value": {"type": "number"}}}"#;

    fn config(dir: &Path) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.data_dir = dir.to_path_buf();
        config.mqtt.enabled = false;
        config
    }

    fn agent(config: AgentConfig) -> Agent<MemoryTagProvider> {
        Agent::new(config, MemoryTagProvider::new("default")).unwrap()
    }

    fn paths(agent: &Agent<MemoryTagProvider>) -> Vec<String> {
        agent.synchronizer.provider().paths()
    }

    #[tokio::test]
    async fn startup_syncs_cached_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("schemas");
        std::fs::create_dir_all(&cache_dir).unwrap();
        std::fs::write(cache_dir.join("tank.json"), TANK).unwrap();

        let mut agent = agent(config(dir.path()));
        agent.startup().await;

        assert_eq!(paths(&agent), ["_types_/Tank", "_types_/Tank_inlet"]);
        assert_eq!(
            agent.status(),
            AgentStatus {
                running: true,
                mqtt_connected: false,
                cached_schemas: 1,
                registered_udts: 1,
            }
        );
    }

    #[tokio::test]
    async fn received_schema_is_cached_and_synced() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));
        agent.startup().await;

        agent
            .handle_event(SchemaEvent::Received {
                schema_name: "Sensor".to_string(),
                content: SENSOR.to_string(),
            })
            .await;

        assert!(dir.path().join("schemas").join("Sensor.json").exists());
        assert_eq!(paths(&agent), ["_types_/Sensor"]);

        let ledger = agent.ledger.as_ref().unwrap();
        assert_eq!(ledger.registration_for("Sensor").unwrap().unwrap().type_name, "Sensor");
        assert_eq!(ledger.recent_events(1).unwrap()[0].action, SyncAction::Sync);
    }

    #[tokio::test]
    async fn invalid_schema_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));
        agent.startup().await;

        agent.on_schema_received("Broken", "{not json").await;

        assert_eq!(agent.status().cached_schemas, 0);
        assert!(paths(&agent).is_empty());
    }

    #[tokio::test]
    async fn events_ignored_before_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));

        agent.on_schema_received("Sensor", SENSOR).await;

        assert!(!agent.status().running);
        assert!(paths(&agent).is_empty());
    }

    #[tokio::test]
    async fn deletion_removes_udt_and_nested_types() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));
        agent.startup().await;
        agent.on_schema_received("tank", TANK).await;

        agent
            .handle_event(SchemaEvent::Deleted {
                schema_name: "tank".to_string(),
            })
            .await;

        assert!(paths(&agent).is_empty());
        assert_eq!(agent.status().cached_schemas, 0);
        assert!(agent
            .ledger
            .as_ref()
            .unwrap()
            .registration_for("tank")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deletion_keeps_udt_when_disallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.provider.allow_delete = false;
        let mut agent = agent(config);
        agent.startup().await;
        agent.on_schema_received("Sensor", SENSOR).await;

        agent.on_schema_deleted("Sensor").await;

        assert_eq!(paths(&agent), ["_types_/Sensor"]);
        assert_eq!(agent.status().cached_schemas, 0);
    }

    #[tokio::test]
    async fn scan_picks_up_disk_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));
        agent.startup().await;
        agent.on_schema_received("Sensor", SENSOR).await;

        let cache_dir = dir.path().join("schemas");
        std::fs::write(cache_dir.join("tank.json"), TANK).unwrap();
        std::fs::remove_file(cache_dir.join("Sensor.json")).unwrap();

        agent.scan_and_sync().await;

        assert_eq!(paths(&agent), ["_types_/Tank", "_types_/Tank_inlet"]);
        assert_eq!(agent.status().cached_schemas, 1);
    }

    #[tokio::test]
    async fn restart_removes_schemas_deleted_while_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let provider_root = dir.path().join("tags");

        let mut config = config(dir.path());
        config.provider.file_root = provider_root;

        {
            let mut agent = Agent::from_config(config.clone()).unwrap();
            agent.startup().await;
            agent.on_schema_received("Sensor", SENSOR).await;
            agent.shutdown().await;
        }

        let sensor_file = dir
            .path()
            .join("tags")
            .join("default")
            .join("_types_")
            .join("Sensor.json");
        assert!(sensor_file.exists());

        std::fs::remove_file(dir.path().join("schemas").join("Sensor.json")).unwrap();

        let mut agent = Agent::from_config(config).unwrap();
        agent.startup().await;

        assert!(!sensor_file.exists());
        assert!(agent
            .ledger
            .as_ref()
            .unwrap()
            .registered_schemas()
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn restart_removes_nested_types_of_deleted_schema() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.provider.file_root = dir.path().join("tags");

        {
            let mut agent = Agent::from_config(config.clone()).unwrap();
            agent.startup().await;
            agent.on_schema_received("tank", TANK).await;
            agent.shutdown().await;
        }

        let types_dir = dir.path().join("tags").join("default").join("_types_");
        assert!(types_dir.join("Tank.json").exists());
        assert!(types_dir.join("Tank_inlet.json").exists());

        std::fs::remove_file(dir.path().join("schemas").join("tank.json")).unwrap();

        let mut agent = Agent::from_config(config).unwrap();
        agent.startup().await;

        assert!(!types_dir.join("Tank.json").exists());
        assert!(!types_dir.join("Tank_inlet.json").exists());
    }

    #[tokio::test]
    async fn retitled_schema_removes_old_udt() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));
        agent.startup().await;

        agent.on_schema_received("s", r#"{"title": "A"}"#).await;
        agent.on_schema_received("s", r#"{"title": "B"}"#).await;
        assert_eq!(paths(&agent), ["_types_/B"]);

        agent.on_schema_deleted("s").await;
        assert!(paths(&agent).is_empty());
    }

    #[tokio::test]
    async fn dropped_object_property_removes_nested_udt() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));
        agent.startup().await;
        agent.on_schema_received("tank", TANK).await;

        let cache_dir = dir.path().join("schemas");
        std::fs::write(
            cache_dir.join("tank.json"),
            r#"{"title": "Tank", "properties": {"level": {"type": "number"}}}"#,
        )
        .unwrap();
        agent.scan_and_sync().await;

        assert_eq!(paths(&agent), ["_types_/Tank"]);
        let registration = agent.ledger.as_ref().unwrap().registration_for("tank").unwrap().unwrap();
        assert!(registration.nested_types.is_empty());
    }

    #[tokio::test]
    async fn retitled_schema_keeps_old_udt_when_deletion_disallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.provider.allow_delete = false;
        let mut agent = agent(config);
        agent.startup().await;

        agent.on_schema_received("s", r#"{"title": "A"}"#).await;
        agent.on_schema_received("s", r#"{"title": "B"}"#).await;

        assert_eq!(paths(&agent), ["_types_/A", "_types_/B"]);
    }

    #[tokio::test]
    async fn shutdown_stops_handling() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(config(dir.path()));
        agent.startup().await;
        agent.shutdown().await;

        agent.on_schema_received("Sensor", SENSOR).await;
        assert!(paths(&agent).is_empty());
        assert!(!agent.status().running);
    }

    #[test]
    fn provider_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());

        config.provider.kind = ProviderKind::Memory;
        assert!(matches!(
            provider_from_config(&config).unwrap(),
            AnyTagProvider::Memory(_)
        ));

        config.provider.kind = ProviderKind::Http;
        assert!(matches!(
            provider_from_config(&config).unwrap(),
            AnyTagProvider::Http(_)
        ));

        config.provider.kind = ProviderKind::File;
        assert!(matches!(
            provider_from_config(&config).unwrap(),
            AnyTagProvider::File(_)
        ));
        assert!(dir.path().join("tags").join("default").is_dir());
    }
}
