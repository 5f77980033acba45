//! Tag paths, quality codes and collision policies.

use serde::{Deserialize, Serialize};

/// A tag path qualified by its provider, written `[provider]folder/tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagPath {
    /// Provider name, empty for the default provider
    pub provider: String,
    /// Slash separated path inside the provider
    pub path: String,
}

impl TagPath {
    /// Create a path inside a provider.
    #[must_use]
    pub fn new(provider: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            path: path.into(),
        }
    }

    /// Parse `[provider]path`. A path without brackets has no provider.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        if let Some(rest) = input.strip_prefix('[') {
            if let Some((provider, path)) = rest.split_once(']') {
                return Self::new(provider, path.trim_start_matches('/'));
            }
        }
        Self::new("", input)
    }

    /// Append a path segment.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.path)
        };
        Self::new(self.provider.clone(), path)
    }

    /// Path segments, without empty ones.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for TagPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.provider.is_empty() {
            f.write_str(&self.path)
        } else {
            write!(f, "[{}]{}", self.provider, self.path)
        }
    }
}

/// Result of a single provider operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityCode {
    /// Operation succeeded
    Good,
    /// Operation failed with a diagnostic
    Bad(String),
}

impl QualityCode {
    /// Whether the operation succeeded.
    #[must_use]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }

    /// Interpret a gateway quality name such as `Good` or `Bad_NotFound`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("good") {
            Self::Good
        } else {
            Self::Bad(name.to_string())
        }
    }
}

impl std::fmt::Display for QualityCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Good => f.write_str("Good"),
            Self::Bad(diagnostic) => write!(f, "Bad({diagnostic})"),
        }
    }
}

/// What to do when an imported tag already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CollisionPolicy {
    /// Fail the import of that tag
    Abort,
    /// Replace the existing configuration
    #[default]
    Overwrite,
    /// Import under a new, unused name
    Rename,
    /// Keep the existing configuration
    Ignore,
    /// Merge new keys over the existing configuration
    MergeOverwrite,
}

impl CollisionPolicy {
    /// Single letter code used by the gateway's import API.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Abort => "a",
            Self::Overwrite => "o",
            Self::Rename => "r",
            Self::Ignore => "i",
            Self::MergeOverwrite => "m",
        }
    }
}
