//! On-disk schema cache.
//!
//! Every schema is stored as `<name>.json` in one directory. The cache keeps
//! both the parsed model and the raw text so reloads can tell changed files
//! from untouched ones.

use schematag_core::{parse_schema, ParseError, SchemaModel};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Schemas known to the service, mirrored to a directory.
#[derive(Debug)]
pub struct SchemaCache {
    dir: PathBuf,
    schemas: BTreeMap<String, SchemaModel>,
    raw: BTreeMap<String, String>,
}

/// Differences found by [`SchemaCache::reload`].
#[derive(Debug, Default)]
pub struct ReloadReport {
    /// Names that were not cached before
    pub added: BTreeSet<String>,
    /// Names whose file content changed
    pub changed: BTreeSet<String>,
    /// Names no longer on disk, with their last parsed model
    pub removed: BTreeMap<String, SchemaModel>,
}

impl ReloadReport {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Added and changed names, in order.
    pub fn to_sync(&self) -> impl Iterator<Item = &String> {
        self.added.iter().chain(self.changed.iter())
    }
}

impl SchemaCache {
    /// Create a cache over `dir`. Nothing is read until [`Self::initialize`].
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            schemas: BTreeMap::new(),
            raw: BTreeMap::new(),
        }
    }

    /// Create the directory and load every schema file in it.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or listed.
    pub fn initialize(&mut self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, &e))?;
        self.load_all()?;
        tracing::info!(count = self.schemas.len(), dir = %self.dir.display(), "Schema cache initialized");
        Ok(())
    }

    /// Load every `*.json` file, returning the names that failed to load.
    fn load_all(&mut self) -> Result<BTreeSet<String>, CacheError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, &e))?;
        let mut failed = BTreeSet::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if let Err(e) = self.load_file(&name, &path) {
                tracing::error!(error = %e, file = %path.display(), "Failed to load schema file");
                failed.insert(name);
            }
        }

        Ok(failed)
    }

    fn load_file(&mut self, name: &str, path: &Path) -> Result<(), CacheError> {
        let content = std::fs::read_to_string(path).map_err(|e| CacheError::io(path, &e))?;
        let schema = parse_schema(name, &content)?;
        tracing::debug!(schema = %name, "Loaded schema");
        self.schemas.insert(name.to_string(), schema);
        self.raw.insert(name.to_string(), content);
        Ok(())
    }

    /// Parse, persist and cache a schema.
    ///
    /// The content is parsed before anything is written, so an invalid
    /// schema leaves the cache untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid, the content is not a schema, or
    /// the file cannot be written.
    pub fn save_schema(&mut self, name: &str, content: &str) -> Result<SchemaModel, CacheError> {
        validate_name(name)?;
        let schema = parse_schema(name, content)?;

        let path = self.file_for(name);
        std::fs::write(&path, content).map_err(|e| CacheError::io(&path, &e))?;

        self.schemas.insert(name.to_string(), schema.clone());
        self.raw.insert(name.to_string(), content.to_string());
        tracing::info!(schema = %name, "Saved schema");
        Ok(schema)
    }

    /// Delete a schema file and forget the schema.
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or the file cannot be deleted.
    pub fn remove_schema(&mut self, name: &str) -> Result<(), CacheError> {
        validate_name(name)?;

        let path = self.file_for(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(&path, &e)),
        }

        self.schemas.remove(name);
        self.raw.remove(name);
        tracing::info!(schema = %name, "Removed schema");
        Ok(())
    }

    /// Re-read the directory and report what changed since the last load.
    ///
    /// A file that exists but no longer parses keeps its previous version.
    pub fn reload(&mut self) -> ReloadReport {
        let previous_raw = std::mem::take(&mut self.raw);
        let mut previous = std::mem::take(&mut self.schemas);

        match self.load_all() {
            Ok(failed) => {
                for name in failed {
                    if let (Some(model), Some(raw)) = (previous.get(&name), previous_raw.get(&name)) {
                        self.schemas.insert(name.clone(), model.clone());
                        self.raw.insert(name, raw.clone());
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to reload schema cache");
                self.schemas = previous;
                self.raw = previous_raw;
                return ReloadReport::default();
            }
        }

        let mut report = ReloadReport::default();
        for (name, content) in &self.raw {
            match previous_raw.get(name) {
                None => {
                    report.added.insert(name.clone());
                }
                Some(old) if old != content => {
                    report.changed.insert(name.clone());
                }
                Some(_) => {}
            }
        }
        for name in previous_raw.keys() {
            if !self.raw.contains_key(name) {
                if let Some(model) = previous.remove(name) {
                    report.removed.insert(name.clone(), model);
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                added = report.added.len(),
                changed = report.changed.len(),
                removed = report.removed.len(),
                "Schema cache changed on disk"
            );
        }
        report
    }

    /// Parsed schema by name.
    #[must_use]
    pub fn get_schema(&self, name: &str) -> Option<&SchemaModel> {
        self.schemas.get(name)
    }

    /// Raw schema text by name.
    #[must_use]
    pub fn get_raw_schema(&self, name: &str) -> Option<&str> {
        self.raw.get(name).map(String::as_str)
    }

    /// All cached names.
    #[must_use]
    pub fn schema_names(&self) -> BTreeSet<String> {
        self.schemas.keys().cloned().collect()
    }

    /// Whether a schema is cached.
    #[must_use]
    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Number of cached schemas.
    #[must_use]
    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    /// Cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

fn validate_name(name: &str) -> Result<(), CacheError> {
    if name.is_empty() || name.starts_with('.') || name.contains(&['/', '\\'][..]) {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Schema cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The name cannot be used as a file name
    #[error("invalid schema name: {0:?}")]
    InvalidName(String),
    /// The content is not a usable schema
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Filesystem failure
    #[error("{0}")]
    Io(String),
}

impl CacheError {
    fn io(path: &Path, error: &std::io::Error) -> Self {
        Self::Io(format!("{}: {error}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENSOR: &str = r#"{"title": "Sensor", "properties": {"value": {"type": "number"}}}"#;

    fn cache() -> (tempfile::TempDir, SchemaCache) {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SchemaCache::new(dir.path().join("schemas"));
        cache.initialize().unwrap();
        (dir, cache)
    }

    #[test]
    fn initialize_loads_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Sensor.json"), SENSOR).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut cache = SchemaCache::new(dir.path());
        cache.initialize().unwrap();

        assert_eq!(cache.schema_count(), 1);
        assert_eq!(cache.get_schema("Sensor").unwrap().name, "Sensor");
        assert_eq!(cache.get_raw_schema("Sensor"), Some(SENSOR));
    }

    #[test]
    fn save_and_remove() {
        let (_dir, mut cache) = cache();

        let schema = cache.save_schema("Sensor", SENSOR).unwrap();
        assert_eq!(schema.properties.len(), 1);
        assert!(cache.has_schema("Sensor"));
        assert!(cache.cache_dir().join("Sensor.json").exists());

        cache.remove_schema("Sensor").unwrap();
        assert!(!cache.has_schema("Sensor"));
        assert!(!cache.cache_dir().join("Sensor.json").exists());

        // Removing twice is not an error.
        cache.remove_schema("Sensor").unwrap();
    }

    #[test]
    fn invalid_content_is_not_written() {
        let (_dir, mut cache) = cache();
        let err = cache.save_schema("Bad", "[1, 2]").unwrap_err();
        assert!(matches!(err, CacheError::Parse(_)));
        assert!(!cache.cache_dir().join("Bad.json").exists());
        assert_eq!(cache.schema_count(), 0);
    }

    #[test]
    fn names_are_validated() {
        let (_dir, mut cache) = cache();
        for name in ["", "../escape", "a/b", "a\\b", ".hidden"] {
            assert!(
                matches!(cache.save_schema(name, SENSOR), Err(CacheError::InvalidName(_))),
                "{name:?} accepted"
            );
        }
        assert!(cache.save_schema("devices_Temperature", SENSOR).is_ok());
    }

    #[test]
    fn reload_reports_differences() {
        let (_dir, mut cache) = cache();
        cache.save_schema("Sensor", SENSOR).unwrap();
        cache.save_schema("Pump", r#"{"properties": {}}"#).unwrap();

        let dir = cache.cache_dir().to_path_buf();
        std::fs::write(dir.join("Valve.json"), r#"{"title": "Valve"}"#).unwrap();
        std::fs::write(dir.join("Pump.json"), r#"{"properties": {"rpm": {"type": "integer"}}}"#)
            .unwrap();
        std::fs::remove_file(dir.join("Sensor.json")).unwrap();

        let report = cache.reload();
        assert_eq!(report.added.iter().collect::<Vec<_>>(), ["Valve"]);
        assert_eq!(report.changed.iter().collect::<Vec<_>>(), ["Pump"]);
        assert_eq!(report.removed.keys().collect::<Vec<_>>(), ["Sensor"]);
        assert_eq!(report.removed["Sensor"].name, "Sensor");
        assert_eq!(report.to_sync().collect::<Vec<_>>(), ["Valve", "Pump"]);

        assert!(cache.reload().is_empty());
    }

    #[test]
    fn broken_file_keeps_previous_version() {
        let (_dir, mut cache) = cache();
        cache.save_schema("Sensor", SENSOR).unwrap();
        std::fs::write(cache.cache_dir().join("Sensor.json"), "{oops").unwrap();

        assert!(cache.reload().is_empty());
        assert_eq!(cache.get_raw_schema("Sensor"), Some(SENSOR));
    }
}
