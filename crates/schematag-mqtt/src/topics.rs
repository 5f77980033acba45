//! Topic to schema mapping and message classification.

/// Event produced by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaEvent {
    /// Connection to the broker established
    Connected,
    /// Connection to the broker lost
    Disconnected {
        /// Error that ended the connection
        reason: String,
    },
    /// A new or updated schema arrived
    Received {
        /// Schema name derived from the topic
        schema_name: String,
        /// JSON Schema text
        content: String,
    },
    /// An empty payload signalled deletion
    Deleted {
        /// Schema name derived from the topic
        schema_name: String,
    },
}

/// Subscription filter and the base topic schemas are published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    filter: String,
    base: String,
}

impl TopicFilter {
    /// Create from a subscription filter such as `ignition/schemas/#`.
    #[must_use]
    pub fn new(filter: impl Into<String>) -> Self {
        let filter = filter.into();
        let stripped = filter.replace(&['#', '+'][..], "");
        let base = stripped.strip_suffix('/').unwrap_or(&stripped).to_string();
        Self { filter, base }
    }

    /// The subscription filter.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// The filter without wildcards or trailing slash.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Derive the schema name from a topic.
    ///
    /// Below the base topic, the remaining levels are joined with `_`:
    /// `ignition/schemas/devices/Temperature` becomes `devices_Temperature`.
    /// Topics outside the base fall back to their last level.
    #[must_use]
    pub fn schema_name(&self, topic: &str) -> String {
        if let Some(suffix) = topic.strip_prefix(&self.base) {
            if suffix.is_empty() || suffix.starts_with('/') || self.base.is_empty() {
                let suffix = suffix.strip_prefix('/').unwrap_or(suffix);
                return suffix.replace('/', "_");
            }
        }

        topic.rsplit('/').next().unwrap_or(topic).to_string()
    }
}

/// Turn an incoming publish into a schema event.
///
/// # Errors
///
/// Returns error if no schema name can be derived from the topic or the
/// payload is not UTF-8.
pub fn classify(filter: &TopicFilter, topic: &str, payload: &[u8]) -> Result<SchemaEvent, MessageError> {
    let schema_name = filter.schema_name(topic);
    if schema_name.is_empty() {
        return Err(MessageError::NoSchemaName(topic.to_string()));
    }

    let content = std::str::from_utf8(payload).map_err(|e| MessageError::InvalidUtf8 {
        topic: topic.to_string(),
        message: e.to_string(),
    })?;

    if content.trim().is_empty() {
        return Ok(SchemaEvent::Deleted { schema_name });
    }

    Ok(SchemaEvent::Received {
        schema_name,
        content: content.to_string(),
    })
}

/// Errors that can occur classifying a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The topic does not name a schema
    #[error("could not extract schema name from topic: {0}")]
    NoSchemaName(String),
    /// The payload is not valid UTF-8
    #[error("payload on {topic} is not UTF-8: {message}")]
    InvalidUtf8 {
        /// Topic of the message
        topic: String,
        /// Decoder error
        message: String,
    },
}
