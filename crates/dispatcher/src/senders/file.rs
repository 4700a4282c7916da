//! FileSender - appends groups to per-destination NDJSON files

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::value::RawValue;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument};

use contracts::{
    ContractError, DestinationKey, Message, SendError, Sender, UnretryableReason,
};

/// Configuration for FileSender
#[derive(Debug, Clone)]
pub struct FileSenderConfig {
    /// Output directory
    pub dir: PathBuf,
}

impl FileSenderConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let dir = params
            .get("dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { dir }
    }
}

#[derive(Serialize)]
struct Line<'a> {
    key: Option<String>,
    value: &'a RawValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition: Option<i32>,
}

/// Sender that writes one line per message to `<dir>/<destination>.ndjson`
pub struct FileSender {
    name: String,
    config: FileSenderConfig,
}

impl FileSender {
    /// Create a new FileSender. The directory is created on connect.
    pub fn new(name: impl Into<String>, config: FileSenderConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    fn path_for(&self, destination: &DestinationKey) -> PathBuf {
        // Destinations come from event content; keep them inside `dir`
        let file_name: String = destination
            .chars()
            .map(|c| match c {
                '/' | '\\' => '_',
                c => c,
            })
            .collect();
        self.config.dir.join(format!("{file_name}.ndjson"))
    }

    fn render(destination: &str, messages: &[Message]) -> Result<Vec<u8>, SendError> {
        let mut out = Vec::new();
        for message in messages {
            let value = serde_json::from_slice::<&RawValue>(&message.payload).map_err(|e| {
                SendError::unretryable(
                    destination,
                    UnretryableReason::InvalidMessage,
                    format!("payload is not JSON: {e}"),
                )
            })?;
            let line = Line {
                key: message
                    .key
                    .as_deref()
                    .map(|k| String::from_utf8_lossy(k).into_owned()),
                value,
                partition: message.partition,
            };
            serde_json::to_writer(&mut out, &line).map_err(|e| {
                SendError::unretryable(destination, UnretryableReason::InvalidMessage, e.to_string())
            })?;
            out.push(b'\n');
        }
        Ok(out)
    }
}

impl Sender for FileSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        format!("{}({})", self.name, self.config.dir.display())
    }

    #[instrument(name = "file_sender_connect", skip(self), fields(sender = %self.name))]
    async fn connect(&self) -> Result<(), ContractError> {
        fs::create_dir_all(&self.config.dir)
            .await
            .map_err(|e| ContractError::sender_connection(&self.name, e.to_string()))
    }

    #[instrument(
        name = "file_sender_send",
        skip(self, messages),
        fields(sender = %self.name, destination = %destination)
    )]
    async fn send(
        &self,
        destination: &DestinationKey,
        messages: &[Message],
    ) -> Result<(), SendError> {
        let buf = Self::render(destination, messages)?;
        let path = self.path_for(destination);

        let write = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(&buf).await?;
            file.flush().await
        };

        write.await.map_err(|e| {
            error!(sender = %self.name, path = %path.display(), error = %e, "Write failed");
            SendError::retryable(destination.as_str(), e.to_string())
        })
    }

    #[instrument(name = "file_sender_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        debug!(sender = %self.name, "FileSender closed");
        Ok(())
    }
}
