//! NDJSON event input.

use std::path::Path;

use contracts::Event;
use serde_json::Value;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::warn;

/// Reads events, one JSON object per line
///
/// Blank lines are skipped; malformed lines are logged, counted and skipped.
pub struct EventReader {
    lines: Lines<BufReader<Box<dyn AsyncRead + Unpin + Send>>>,
    lines_read: u64,
    invalid_lines: u64,
}

impl EventReader {
    /// Open a file, or stdin for `None` / `-`
    pub async fn open(path: Option<&Path>) -> io::Result<Self> {
        let source: Box<dyn AsyncRead + Unpin + Send> = match path {
            Some(path) if path != Path::new("-") => Box::new(tokio::fs::File::open(path).await?),
            _ => Box::new(io::stdin()),
        };
        Ok(Self::from_reader(source))
    }

    /// Read from any async source
    pub fn from_reader(reader: impl AsyncRead + Unpin + Send + 'static) -> Self {
        let boxed: Box<dyn AsyncRead + Unpin + Send> = Box::new(reader);
        Self {
            lines: BufReader::new(boxed).lines(),
            lines_read: 0,
            invalid_lines: 0,
        }
    }

    /// Read up to `max` events; an empty result means end of input
    pub async fn next_batch(&mut self, max: usize) -> io::Result<Vec<Event>> {
        let mut events = Vec::with_capacity(max);

        while events.len() < max {
            let Some(raw) = self.lines.next_line().await? else {
                break;
            };
            self.lines_read += 1;

            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            match parse_event(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(line = self.lines_read, error = %e, "Skipping invalid input line");
                    self.invalid_lines += 1;
                }
            }
        }

        Ok(events)
    }

    /// Lines consumed so far
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Lines skipped as malformed
    pub fn invalid_lines(&self) -> u64 {
        self.invalid_lines
    }
}

fn parse_event(line: &str) -> Result<Event, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    Event::from_value(value).map_err(|e| e.to_string())
}
