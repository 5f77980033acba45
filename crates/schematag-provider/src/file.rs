//! File-backed tag provider.
//!
//! Each imported definition is stored as one pretty-printed JSON file:
//! `<root>/<provider>/_types_/Sensor.json`. The resulting tree can be
//! imported into a gateway by hand or by a project sync job.

use crate::path::{CollisionPolicy, QualityCode, TagPath};
use crate::provider::{merge_definition, split_definitions, ProviderError, TagProvider};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Characters that must be percent-encoded in file names.
const FILE_NAME_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'*')
    .add(b'.')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'|')
    .add(b'/')
    .add(b'\\');

/// Tag provider writing definitions into a directory tree.
#[derive(Debug, Clone)]
pub struct FileTagProvider {
    name: String,
    dir: PathBuf,
}

impl FileTagProvider {
    /// Create a provider rooted at `<root>/<name>`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn new(root: &Path, name: impl Into<String>) -> Result<Self, ProviderError> {
        let name = name.into();
        let dir = root.join(encode_segment(&name));
        std::fs::create_dir_all(&dir)
            .map_err(|e| ProviderError::Io(format!("{}: {e}", dir.display())))?;

        tracing::debug!(provider = %name, dir = %dir.display(), "File tag provider ready");
        Ok(Self { name, dir })
    }

    /// Directory holding this provider's tags.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that stores the tag at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the path belongs to another provider or is empty.
    pub fn file_for(&self, path: &TagPath) -> Result<PathBuf, ProviderError> {
        self.check_provider(path)?;
        let segments: Vec<&str> = path.segments().collect();
        let Some((last, folders)) = segments.split_last() else {
            return Err(ProviderError::InvalidDefinition(format!(
                "empty tag path: {path}"
            )));
        };

        let mut file = self.folder_dir(folders);
        file.push(format!("{}.json", encode_segment(last)));
        Ok(file)
    }

    fn folder_dir(&self, folders: &[&str]) -> PathBuf {
        let mut dir = self.dir.clone();
        for folder in folders {
            dir.push(encode_segment(folder));
        }
        dir
    }

    fn check_provider(&self, path: &TagPath) -> Result<(), ProviderError> {
        if path.provider.is_empty() || path.provider == self.name {
            Ok(())
        } else {
            Err(ProviderError::NotFound(path.provider.clone()))
        }
    }

    async fn import_one(
        &self,
        base: &TagPath,
        name: &str,
        definition: Value,
        policy: CollisionPolicy,
    ) -> Result<QualityCode, ProviderError> {
        let file = self.file_for(&base.child(name))?;
        let exists = tokio::fs::try_exists(&file).await.unwrap_or(false);

        let (file, definition) = match (exists, policy) {
            (false, _) | (true, CollisionPolicy::Overwrite) => (file, definition),
            (true, CollisionPolicy::Abort) => {
                return Ok(QualityCode::Bad("Bad_AlreadyExists".to_string()));
            }
            (true, CollisionPolicy::Ignore) => return Ok(QualityCode::Good),
            (true, CollisionPolicy::Rename) => self.renamed(base, name, definition).await?,
            (true, CollisionPolicy::MergeOverwrite) => {
                let existing = read_json(&file).await?;
                (file, merge_definition(existing, definition))
            }
        };

        write_json(&file, &definition).await?;
        tracing::debug!(file = %file.display(), "Wrote tag definition");
        Ok(QualityCode::Good)
    }

    async fn renamed(
        &self,
        base: &TagPath,
        name: &str,
        mut definition: Value,
    ) -> Result<(PathBuf, Value), ProviderError> {
        for n in 1_u32.. {
            let candidate = format!("{name}_{n}");
            let file = self.file_for(&base.child(&candidate))?;
            if !tokio::fs::try_exists(&file).await.unwrap_or(false) {
                if let Value::Object(map) = &mut definition {
                    map.insert("name".to_string(), Value::String(candidate));
                }
                return Ok((file, definition));
            }
        }
        Err(ProviderError::Io(format!("no free name for {name}")))
    }
}

impl TagProvider for FileTagProvider {
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

        let mut results = Vec::with_capacity(definitions.len());
        for (name, definition) in definitions {
            results.push(self.import_one(base, &name, definition, policy).await?);
        }
        Ok(results)
    }

    async fn remove_tag_configs(&self, paths: &[TagPath]) -> Result<Vec<QualityCode>, ProviderError> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let file = self.file_for(path)?;
            let quality = match tokio::fs::remove_file(&file).await {
                Ok(()) => QualityCode::Good,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    QualityCode::Bad("Bad_NotFound".to_string())
                }
                Err(e) => QualityCode::Bad(e.to_string()),
            };
            results.push(quality);
        }
        Ok(results)
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, FILE_NAME_ESCAPE).to_string()
}

async fn read_json(file: &Path) -> Result<Value, ProviderError> {
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| ProviderError::Io(format!("{}: {e}", file.display())))?;
    serde_json::from_str(&content).map_err(|e| ProviderError::Parse(format!("{}: {e}", file.display())))
}

async fn write_json(file: &Path, value: &Value) -> Result<(), ProviderError> {
    if let Some(parent) = file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ProviderError::Io(format!("{}: {e}", parent.display())))?;
    }
    let content =
        serde_json::to_string_pretty(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
    tokio::fs::write(file, content)
        .await
        .map_err(|e| ProviderError::Io(format!("{}: {e}", file.display())))
}
