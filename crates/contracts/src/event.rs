//! Event - captured record handed to the publisher
//!
//! Content is an ordered JSON object. The side cache carries metadata between
//! publish attempts (resolved destination, partition hint) and is never encoded.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ContractError;

/// Structured event fields
pub type Fields = serde_json::Map<String, Value>;

/// Captured event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Structured content, serialized by the codec
    pub content: Fields,
    /// Cross-call metadata
    pub cache: EventCache,
}

impl Event {
    /// Create an event captured now
    pub fn new(content: Fields) -> Self {
        Self::with_timestamp(Utc::now(), content)
    }

    /// Create an event with an explicit capture time
    pub fn with_timestamp(timestamp: DateTime<Utc>, content: Fields) -> Self {
        Self {
            timestamp,
            content,
            cache: EventCache::default(),
        }
    }

    /// Build an event from a decoded JSON document
    ///
    /// A top-level `@timestamp` string (RFC 3339) becomes the capture time and is
    /// removed from content; anything else is kept as-is.
    ///
    /// # Errors
    /// Returns error if the document is not a JSON object.
    pub fn from_value(value: Value) -> Result<Self, ContractError> {
        let Value::Object(mut content) = value else {
            return Err(ContractError::invalid_event("event must be a JSON object"));
        };

        let timestamp = match content.get("@timestamp").and_then(Value::as_str) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| ContractError::invalid_event(format!("bad @timestamp '{raw}': {e}")))?,
            None => Utc::now(),
        };
        content.remove("@timestamp");

        Ok(Self::with_timestamp(timestamp, content))
    }

    /// Read a content field by dotted path
    pub fn field(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.content, path)
    }
}

/// Resolve a dotted path inside nested objects.
///
/// Literal keys win over nesting, so `labels._tag_profileId` matches either a flat
/// key of that name or `{"labels": {"_tag_profileId": ..}}`.
pub fn lookup_path<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    if let Some(value) = fields.get(path) {
        return Some(value);
    }

    for (idx, _) in path.match_indices('.') {
        let (head, rest) = (&path[..idx], &path[idx + 1..]);
        if let Some(Value::Object(inner)) = fields.get(head) {
            if let Some(value) = lookup_path(inner, rest) {
                return Some(value);
            }
        }
    }
    None
}

/// Per-event metadata cache
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventCache {
    values: Fields,
}

impl EventCache {
    /// Get cached value
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store a value, returning the previous one
    ///
    /// # Errors
    /// Returns error on an empty key.
    pub fn put(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, ContractError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ContractError::Other("cache key cannot be empty".to_string()));
        }
        Ok(self.values.insert(key, value.into()))
    }

    /// Remove a cached value
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
