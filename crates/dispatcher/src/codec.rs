//! JsonCodec - renders events as JSON documents
//!
//! Layout: `@timestamp` and `@metadata` first, then the event content.

use bytes::Bytes;
use chrono::SecondsFormat;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use contracts::{Codec, CodecConfig, EncodeError, Event};

const TIMESTAMP_KEY: &str = "@timestamp";
const METADATA_KEY: &str = "@metadata";

/// JSON event codec
#[derive(Debug, Clone)]
pub struct JsonCodec {
    version: String,
    pretty: bool,
}

impl JsonCodec {
    /// Create a compact codec reporting the given publisher version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            pretty: false,
        }
    }

    /// Toggle pretty printing
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Create from codec config
    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(env!("CARGO_PKG_VERSION")).pretty(config.pretty)
    }
}

#[derive(Serialize)]
struct Metadata<'a> {
    beat: &'a str,
    #[serde(rename = "type")]
    doc_type: &'static str,
    version: &'a str,
}

struct Document<'a> {
    timestamp: String,
    metadata: Metadata<'a>,
    event: &'a Event,
}

impl Serialize for Document<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(TIMESTAMP_KEY, &self.timestamp)?;
        map.serialize_entry(METADATA_KEY, &self.metadata)?;
        for (key, value) in &self.event.content {
            // Reserved keys are owned by the codec
            if key == TIMESTAMP_KEY || key == METADATA_KEY {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Codec for JsonCodec {
    fn encode(&self, index: &str, event: &Event) -> Result<Bytes, EncodeError> {
        let doc = Document {
            timestamp: event
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            metadata: Metadata {
                beat: index,
                doc_type: "_doc",
                version: &self.version,
            },
            event,
        };

        let encoded = if self.pretty {
            serde_json::to_vec_pretty(&doc)
        } else {
            serde_json::to_vec(&doc)
        };

        encoded
            .map(Bytes::from)
            .map_err(|e| EncodeError::new(index, e.to_string()))
    }
}
