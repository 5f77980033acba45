//! The tag provider interface.

use crate::file::FileTagProvider;
use crate::http::HttpTagProvider;
use crate::memory::MemoryTagProvider;
use crate::path::{CollisionPolicy, QualityCode, TagPath};
use serde_json::Value;

/// A store of tag configurations that accepts tag JSON imports.
///
/// Both operations return one quality code per item: per top-level
/// definition for imports, per path for removals.
#[allow(async_fn_in_trait)]
pub trait TagProvider {
    /// Provider name, as used in `[provider]` tag paths.
    fn name(&self) -> &str;

    /// Import tag JSON (one definition or an array) below `base`.
    async fn import_tags(
        &self,
        base: &TagPath,
        json: &str,
        policy: CollisionPolicy,
    ) -> Result<Vec<QualityCode>, ProviderError>;

    /// Remove tag configurations.
    async fn remove_tag_configs(&self, paths: &[TagPath]) -> Result<Vec<QualityCode>, ProviderError>;
}

/// Provider selected at runtime from configuration.
pub enum AnyTagProvider {
    /// Files on disk
    File(FileTagProvider),
    /// Gateway HTTP API
    Http(HttpTagProvider),
    /// In-process store
    Memory(MemoryTagProvider),
}

impl TagProvider for AnyTagProvider {
    fn name(&self) -> &str {
        match self {
            Self::File(p) => p.name(),
            Self::Http(p) => p.name(),
            Self::Memory(p) => p.name(),
        }
    }

    async fn import_tags(
        &self,
        base: &TagPath,
        json: &str,
        policy: CollisionPolicy,
    ) -> Result<Vec<QualityCode>, ProviderError> {
        match self {
            Self::File(p) => p.import_tags(base, json, policy).await,
            Self::Http(p) => p.import_tags(base, json, policy).await,
            Self::Memory(p) => p.import_tags(base, json, policy).await,
        }
    }

    async fn remove_tag_configs(&self, paths: &[TagPath]) -> Result<Vec<QualityCode>, ProviderError> {
        match self {
            Self::File(p) => p.remove_tag_configs(paths).await,
            Self::Http(p) => p.remove_tag_configs(paths).await,
            Self::Memory(p) => p.remove_tag_configs(paths).await,
        }
    }
}

/// Split import JSON into named top-level definitions.
pub(crate) fn split_definitions(json: &str) -> Result<Vec<(String, Value)>, ProviderError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ProviderError::InvalidDefinition(e.to_string()))?;

    let definitions = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(ProviderError::InvalidDefinition(format!(
                "expected object or array, got {other}"
            )))
        }
    };

    definitions
        .into_iter()
        .map(|definition| {
            let name = definition
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    ProviderError::InvalidDefinition("tag definition without a name".to_string())
                })?
                .to_string();
            Ok((name, definition))
        })
        .collect()
}

/// Shallow merge for `MergeOverwrite`: top-level keys of `update` replace
/// those of `existing`, other keys are kept.
pub(crate) fn merge_definition(existing: Value, update: Value) -> Value {
    match (existing, update) {
        (Value::Object(mut base), Value::Object(update)) => {
            for (key, value) in update {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, update) => update,
    }
}

/// Errors that can occur talking to a tag provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The provider does not exist
    #[error("tag provider not found: {0}")]
    NotFound(String),
    /// Local storage failed
    #[error("storage error: {0}")]
    Io(String),
    /// The import JSON is not a tag definition
    #[error("invalid tag definition: {0}")]
    InvalidDefinition(String),
    /// HTTP request failed
    #[error("request error: {0}")]
    Request(String),
    /// Gateway returned an error status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the gateway
        message: String,
    },
    /// Response parsing failed
    #[error("parse error: {0}")]
    Parse(String),
}
