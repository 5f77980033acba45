//! Synchronizes schema-derived UDT definitions into a tag provider.

use crate::path::{CollisionPolicy, QualityCode, TagPath};
use crate::provider::{ProviderError, TagProvider};
use schematag_core::{SchemaModel, UdtDefinitionBuilder};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

/// Folder holding UDT definitions in every provider.
pub const TYPES_FOLDER: &str = "_types_";

/// Default time allowed for a single provider operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Imports and removes UDT definitions, tracking which types are registered.
pub struct UdtSynchronizer<P> {
    provider: P,
    builder: UdtDefinitionBuilder,
    registered: BTreeSet<String>,
    timeout: Duration,
}

impl<P: TagProvider> UdtSynchronizer<P> {
    /// Create a synchronizer for a provider.
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            builder: UdtDefinitionBuilder::new(),
            registered: BTreeSet::new(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Override the per-operation timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn types_path(&self) -> TagPath {
        TagPath::new(self.provider.name(), TYPES_FOLDER)
    }

    /// Import the UDT for a schema, nested types first.
    ///
    /// Returns `true` when every quality code of the main import is good.
    pub async fn sync_udt_definition(&mut self, schema: &SchemaModel) -> bool {
        tracing::info!(schema = %schema.name, "Syncing UDT definition");

        let nested = self.builder.build_nested_udts(schema);
        if !nested.is_empty() {
            tracing::debug!(schema = %schema.name, count = nested.len(), "Importing nested UDT definitions");
            let imported = match self.builder.to_json_array(&nested) {
                Ok(json) => self.import(&json).await,
                Err(e) => {
                    tracing::error!(error = %e, schema = %schema.name, "Failed to render nested UDTs");
                    false
                }
            };
            if !imported {
                tracing::warn!(schema = %schema.name, "Failed to import nested UDTs");
            }
        }

        let udt = self.builder.build_udt(schema);
        let success = match self.builder.to_json(&udt) {
            Ok(json) => self.import(&json).await,
            Err(e) => {
                tracing::error!(error = %e, schema = %schema.name, "Failed to render UDT");
                false
            }
        };

        if success {
            self.registered.insert(schema.name.clone());
            tracing::info!(schema = %schema.name, "Successfully synced UDT");
        } else {
            tracing::error!(schema = %schema.name, "Failed to sync UDT");
        }

        success
    }

    /// Sync several schemas, returning how many succeeded.
    pub async fn sync_all<'a>(&mut self, schemas: impl IntoIterator<Item = &'a SchemaModel>) -> usize {
        let mut total = 0;
        let mut synced = 0;
        for schema in schemas {
            total += 1;
            if self.sync_udt_definition(schema).await {
                synced += 1;
            }
        }
        tracing::info!(synced, total, "Synced UDT definitions");
        synced
    }

    /// Remove the UDT `_types_/<name>` from the provider.
    pub async fn remove_udt_definition(&mut self, name: &str) -> bool {
        tracing::info!(udt = %name, "Removing UDT definition");

        let path = self.types_path().child(name);
        let result = self
            .within_timeout(self.provider.remove_tag_configs(std::slice::from_ref(&path)))
            .await;

        match result {
            Ok(results) if all_good(&results) => {
                self.registered.remove(name);
                tracing::info!(udt = %name, "Removed UDT");
                true
            }
            Ok(results) => {
                tracing::error!(udt = %name, results = ?results, "Failed to remove UDT");
                false
            }
            Err(e) => {
                tracing::error!(udt = %name, error = %e, "Error removing UDT");
                false
            }
        }
    }

    /// Names of types imported successfully during this run.
    #[must_use]
    pub fn registered_types(&self) -> BTreeSet<String> {
        self.registered.clone()
    }

    /// Whether a type was imported successfully during this run.
    #[must_use]
    pub fn is_type_registered(&self, name: &str) -> bool {
        self.registered.contains(name)
    }

    async fn import(&self, json: &str) -> bool {
        let base = self.types_path();
        let result = self
            .within_timeout(
                self.provider
                    .import_tags(&base, json, CollisionPolicy::Overwrite),
            )
            .await;

        match result {
            Ok(results) => {
                for (index, quality) in results.iter().enumerate() {
                    if !quality.is_good() {
                        tracing::error!(index, quality = %quality, "Import error");
                    }
                }
                all_good(&results)
            }
            Err(e) => {
                tracing::error!(error = %e, base = %base, "Error importing UDT JSON");
                false
            }
        }
    }

    async fn within_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| {
                ProviderError::Request(format!("operation timed out after {:?}", self.timeout))
            })?
    }
}

fn all_good(results: &[QualityCode]) -> bool {
    results.iter().all(QualityCode::is_good)
}
