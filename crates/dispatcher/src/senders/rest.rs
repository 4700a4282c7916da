//! RestSender - produces destination groups through a Kafka REST proxy
//!
//! One group is one `POST {host}/topics/{destination}` request. Hosts are tried
//! in order; only connection-level failures move on to the next host.

use std::borrow::Cow;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tracing::{debug, instrument, warn};

use contracts::{
    ContractError, DestinationKey, Message, PublisherConfig, SendError, Sender, UnretryableReason,
};

const CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";
const ACCEPT: &str = "application/vnd.kafka.v2+json";
const ERROR_SNIPPET_BYTES: usize = 256;

/// Configuration for RestSender
#[derive(Debug, Clone)]
pub struct RestSenderConfig {
    /// Proxy base URLs, tried in order
    pub hosts: Vec<Url>,
    /// Bearer token
    pub token: Option<String>,
    /// Request timeout
    pub timeout: Duration,
}

impl RestSenderConfig {
    /// Create config from publisher config
    pub fn from_config(config: &PublisherConfig) -> Result<Self, String> {
        if config.output.hosts.is_empty() {
            return Err("at least one host is required".to_string());
        }

        let hosts = config
            .output
            .hosts
            .iter()
            .map(|raw| parse_host(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            hosts,
            token: config.output.token.clone(),
            timeout: config.output.timeout(),
        })
    }
}

fn parse_host(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid host '{raw}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(format!("host '{raw}' must be an http(s) URL"));
    }
    Ok(url)
}

#[derive(Serialize)]
struct ProduceRequest<'a> {
    records: Vec<Record<'a>>,
}

#[derive(Serialize)]
struct Record<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<Cow<'a, str>>,
    value: &'a RawValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition: Option<i32>,
}

#[derive(Deserialize, Default)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<RecordOffset>,
}

#[derive(Deserialize)]
struct RecordOffset {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

/// Sender that posts groups to a Kafka REST proxy
pub struct RestSender {
    name: String,
    config: RestSenderConfig,
    client: RwLock<Option<reqwest::Client>>,
}

impl RestSender {
    /// Create a new RestSender. Call `connect` before sending.
    pub fn new(name: impl Into<String>, config: RestSenderConfig) -> Self {
        Self {
            name: name.into(),
            config,
            client: RwLock::new(None),
        }
    }

    fn client(&self, destination: &str) -> Result<reqwest::Client, SendError> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SendError::NotConnected {
                destination: destination.to_string(),
            })
    }

    fn build_client(&self) -> Result<reqwest::Client, ContractError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        if let Some(token) = &self.config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ContractError::sender_connection(&self.name, e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("event-publisher/", env!("CARGO_PKG_VERSION")))
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| ContractError::sender_connection(&self.name, e.to_string()))
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

fn encode_records(destination: &str, messages: &[Message]) -> Result<Bytes, SendError> {
    let records = messages
        .iter()
        .map(|message| {
            let value = serde_json::from_slice::<&RawValue>(&message.payload).map_err(|e| {
                SendError::unretryable(
                    destination,
                    UnretryableReason::InvalidMessage,
                    format!("payload is not JSON: {e}"),
                )
            })?;
            Ok(Record {
                key: message.key.as_deref().map(String::from_utf8_lossy),
                value,
                partition: message.partition,
            })
        })
        .collect::<Result<Vec<_>, SendError>>()?;

    serde_json::to_vec(&ProduceRequest { records })
        .map(Bytes::from)
        .map_err(|e| {
            SendError::unretryable(destination, UnretryableReason::InvalidMessage, e.to_string())
        })
}

fn topic_url(host: &Url, destination: &str) -> Option<Url> {
    let mut url = host.clone();
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .push("topics")
        .push(destination);
    Some(url)
}

async fn classify_response(
    destination: &str,
    response: reqwest::Response,
) -> Result<(), SendError> {
    let status = response.status();
    let body = response.bytes().await.map_err(|e| {
        SendError::retryable(destination, format!("failed to read response: {e}"))
    })?;

    if status.is_success() {
        // Proxies report per-record failures inside a 2xx response
        let parsed: ProduceResponse = serde_json::from_slice(&body).unwrap_or_default();
        if let Some(rejected) = parsed.offsets.iter().find(|o| o.error_code.is_some()) {
            return Err(SendError::retryable(
                destination,
                format!(
                    "record rejected with code {}: {}",
                    rejected.error_code.unwrap_or_default(),
                    rejected.error.as_deref().unwrap_or("unknown error")
                ),
            ));
        }
        return Ok(());
    }

    let snippet = String::from_utf8_lossy(&body[..body.len().min(ERROR_SNIPPET_BYTES)]);
    let message = format!("status {status}: {snippet}");
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            SendError::unretryable(destination, UnretryableReason::InvalidMessage, message)
        }
        StatusCode::PAYLOAD_TOO_LARGE => {
            SendError::unretryable(destination, UnretryableReason::MessageTooLarge, message)
        }
        _ => SendError::retryable(destination, message),
    })
}

impl Sender for RestSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        let hosts: Vec<&str> = self
            .config
            .hosts
            .iter()
            .map(|h| h.as_str().trim_end_matches('/'))
            .collect();
        format!("{}({})", self.name, hosts.join(","))
    }

    #[instrument(name = "rest_sender_connect", skip(self), fields(sender = %self.name))]
    async fn connect(&self) -> Result<(), ContractError> {
        let mut slot = self.client.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(self.build_client()?);
            debug!(sender = %self.name, hosts = self.config.hosts.len(), "RestSender connected");
        }
        Ok(())
    }

    #[instrument(
        name = "rest_sender_send",
        skip(self, messages),
        fields(sender = %self.name, destination = %destination, messages = messages.len())
    )]
    async fn send(
        &self,
        destination: &DestinationKey,
        messages: &[Message],
    ) -> Result<(), SendError> {
        let client = self.client(destination)?;
        let body = encode_records(destination, messages)?;
        let mut last_error = String::from("no hosts configured");

        for host in &self.config.hosts {
            let Some(url) = topic_url(host, destination) else {
                last_error = format!("host '{host}' cannot carry a topic path");
                continue;
            };

            match client.post(url).body(body.clone()).send().await {
                Ok(response) => return classify_response(destination, response).await,
                Err(e) if e.is_timeout() => {
                    return Err(SendError::Timeout {
                        destination: destination.to_string(),
                        timeout_ms: self.timeout_ms(),
                    });
                }
                Err(e) => {
                    warn!(
                        sender = %self.name,
                        host = %host,
                        error = %e,
                        "Request failed, trying next host"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(SendError::retryable(
            destination.as_str(),
            format!("all hosts failed, last error: {last_error}"),
        ))
    }

    #[instrument(name = "rest_sender_close", skip(self), fields(sender = %self.name))]
    async fn close(&self) -> Result<(), ContractError> {
        let previous = self
            .client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            debug!(sender = %self.name, "RestSender closed");
        }
        Ok(())
    }
}
