//! In-process tag provider.

use crate::path::{CollisionPolicy, QualityCode, TagPath};
use crate::provider::{merge_definition, split_definitions, ProviderError, TagProvider};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Tag provider that keeps definitions in memory.
///
/// Backs the `memory` provider kind for dry runs. `set_failing` makes every
/// operation report a bad quality, which tests use to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryTagProvider {
    name: String,
    tags: Mutex<BTreeMap<String, Value>>,
    failing: AtomicBool,
}

impl MemoryTagProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Make subsequent operations fail with `Bad_Failure`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored definition at a path inside this provider.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        self.lock().get(path).cloned()
    }

    /// All stored paths.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        // A poisoned map is still consistent: every write is a single insert or remove.
        self.tags
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_provider(&self, path: &TagPath) -> Result<(), ProviderError> {
        if path.provider.is_empty() || path.provider == self.name {
            Ok(())
        } else {
            Err(ProviderError::NotFound(path.provider.clone()))
        }
    }

    fn failure(&self) -> Option<QualityCode> {
        self.failing
            .load(Ordering::SeqCst)
            .then(|| QualityCode::Bad("Bad_Failure".to_string()))
    }
}

impl TagProvider for MemoryTagProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn import_tags(
        &self,
        base: &TagPath,
        json: &str,
        policy: CollisionPolicy,
    ) -> Result<Vec<QualityCode>, ProviderError> {
        self.check_provider(base)?;
        let definitions = split_definitions(json)?;

        if let Some(bad) = self.failure() {
            return Ok(vec![bad; definitions.len()]);
        }

        let mut tags = self.lock();
        let results = definitions
            .into_iter()
            .map(|(name, mut definition)| {
                let path = base.child(&name).path;
                let Some(existing) = tags.get(&path).cloned() else {
                    tags.insert(path, definition);
                    return QualityCode::Good;
                };
                match policy {
                    CollisionPolicy::Abort => QualityCode::Bad("Bad_AlreadyExists".to_string()),
                    CollisionPolicy::Ignore => QualityCode::Good,
                    CollisionPolicy::Overwrite => {
                        tags.insert(path, definition);
                        QualityCode::Good
                    }
                    CollisionPolicy::MergeOverwrite => {
                        tags.insert(path, merge_definition(existing, definition));
                        QualityCode::Good
                    }
                    CollisionPolicy::Rename => {
                        let mut n = 1_u32;
                        let (candidate, path) = loop {
                            let candidate = format!("{name}_{n}");
                            let path = base.child(&candidate).path;
                            if !tags.contains_key(&path) {
                                break (candidate, path);
                            }
                            n += 1;
                        };
                        if let Value::Object(map) = &mut definition {
                            map.insert("name".to_string(), Value::String(candidate));
                        }
                        tags.insert(path, definition);
                        QualityCode::Good
                    }
                }
            })
            .collect();

        Ok(results)
    }

    async fn remove_tag_configs(&self, paths: &[TagPath]) -> Result<Vec<QualityCode>, ProviderError> {
        for path in paths {
            self.check_provider(path)?;
        }

        if let Some(bad) = self.failure() {
            return Ok(vec![bad; paths.len()]);
        }

        let mut tags = self.lock();
        Ok(paths
            .iter()
            .map(|path| match tags.remove(&path.path) {
                Some(_) => QualityCode::Good,
                None => QualityCode::Bad("Bad_NotFound".to_string()),
            })
            .collect())
    }
}
