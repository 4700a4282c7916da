//! PublisherConfig - config_loader output
//!
//! Output endpoints, routing rules, codec and sender selection.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Complete publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PublisherConfig {
    /// Output endpoint settings
    #[validate(nested)]
    pub output: OutputConfig,

    /// Content routing rules
    #[serde(default)]
    #[validate(nested)]
    pub routing: RoutingConfig,

    /// Codec settings
    #[serde(default)]
    pub codec: CodecConfig,

    /// Transport selection
    #[serde(default)]
    pub sender: SenderConfig,
}

/// Output endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Destination hosts (e.g. Kafka REST proxy base URLs)
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Index hint written into payload metadata
    #[serde(default = "default_index")]
    #[validate(length(min = 1))]
    pub index: String,

    /// Bearer token for the destination
    #[serde(default)]
    pub token: Option<String>,

    /// Message key format string, e.g. `%{[trace.id]}`
    #[serde(default)]
    pub key: Option<String>,

    /// Per-group request deadline
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,

    /// Whether publish waits for group completion
    #[serde(default)]
    pub delivery_mode: DeliveryMode,
}

fn default_index() -> String {
    "event-publisher".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl OutputConfig {
    /// Request deadline as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How publish relates to group completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Publish waits for every group and returns the last error
    #[default]
    Blocking,
    /// Publish returns once groups are dispatched; workers resolve the batch.
    /// The next publish still waits for those groups to finish.
    Detached,
}

/// Content routing rules
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Dotted path of the event-kind field
    #[serde(default = "default_suppress_field")]
    #[validate(length(min = 1))]
    pub suppress_field: String,

    /// Event kinds that are dropped
    #[serde(default = "default_suppress_kinds")]
    pub suppress_kinds: Vec<String>,

    /// Dotted path of the correlation field
    #[serde(default = "default_route_field")]
    #[validate(length(min = 1))]
    pub route_field: String,

    /// Prepended to the correlation value to form the destination key
    #[serde(default = "default_destination_prefix")]
    pub destination_prefix: String,
}

fn default_suppress_field() -> String {
    "processor.event".to_string()
}

fn default_suppress_kinds() -> Vec<String> {
    vec!["metric".to_string()]
}

fn default_route_field() -> String {
    "labels._tag_profileId".to_string()
}

fn default_destination_prefix() -> String {
    "trace-".to_string()
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            suppress_field: default_suppress_field(),
            suppress_kinds: default_suppress_kinds(),
            route_field: default_route_field(),
            destination_prefix: default_destination_prefix(),
        }
    }
}

/// Codec settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodecConfig {
    /// Pretty-print payloads
    #[serde(default)]
    pub pretty: bool,
}

/// Transport selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SenderConfig {
    /// Sender type
    #[serde(default)]
    pub sender_type: SenderType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sender type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    /// Kafka REST proxy over HTTP
    #[default]
    Rest,
    /// Log group summaries
    Log,
    /// Append NDJSON files per destination
    File,
}

impl PublisherConfig {
    /// Minimal config for the given hosts, everything else defaulted
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output: OutputConfig {
                hosts: hosts.into_iter().map(Into::into).collect(),
                index: default_index(),
                token: None,
                key: None,
                timeout_ms: default_timeout_ms(),
                delivery_mode: DeliveryMode::default(),
            },
            routing: RoutingConfig::default(),
            codec: CodecConfig::default(),
            sender: SenderConfig::default(),
        }
    }
}
