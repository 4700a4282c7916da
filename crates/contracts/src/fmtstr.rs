//! Event format strings
//!
//! Syntax: literal text mixed with field references `%{[dotted.path]}`, optionally
//! with a fallback `%{[dotted.path]:default}`. `@timestamp` resolves to the event
//! capture time when content does not carry it.

use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;
use serde_json::Value;

use crate::{Event, FormatError, KeyFormatter};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field {
        path: String,
        default: Option<String>,
    },
}

/// Compiled format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFormatString {
    source: String,
    segments: Vec<Segment>,
}

impl EventFormatString {
    /// Compile a format string
    ///
    /// # Errors
    /// Returns [`FormatError::Syntax`] on a malformed field reference.
    pub fn parse(source: &str) -> Result<Self, FormatError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("%{") {
            literal.push_str(&rest[..start]);
            let position = offset + start;
            let after = &rest[start + 2..];

            let body_end = after.find('}').ok_or_else(|| FormatError::Syntax {
                position,
                message: "unterminated field reference".to_string(),
            })?;
            let segment = parse_reference(&after[..body_end], position)?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);

            let consumed = start + 2 + body_end + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// True when the string references no fields
    pub fn is_const(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Field paths referenced by this format string
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field { path, .. } => Some(path.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render against one event
    ///
    /// # Errors
    /// Returns [`FormatError::MissingField`] when a referenced field is absent (or null)
    /// and has no default.
    pub fn run(&self, event: &Event) -> Result<String, FormatError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { path, default } => match resolve(event, path) {
                    Some(value) => out.push_str(&value),
                    None => match default {
                        Some(default) => out.push_str(default),
                        None => return Err(FormatError::MissingField { path: path.clone() }),
                    },
                },
            }
        }
        Ok(out)
    }
}

fn parse_reference(body: &str, position: usize) -> Result<Segment, FormatError> {
    let syntax = |message: &str| FormatError::Syntax {
        position,
        message: message.to_string(),
    };

    let inner = body
        .strip_prefix('[')
        .ok_or_else(|| syntax("field reference must start with '['"))?;
    let close = inner
        .find(']')
        .ok_or_else(|| syntax("field reference is missing ']'"))?;
    let path = inner[..close].trim();
    if path.is_empty() {
        return Err(syntax("empty field path"));
    }

    let default = match &inner[close + 1..] {
        "" => None,
        tail => Some(
            tail.strip_prefix(':')
                .ok_or_else(|| syntax("expected ':' before default value"))?
                .to_string(),
        ),
    };

    Ok(Segment::Field {
        path: path.to_string(),
        default,
    })
}

fn resolve(event: &Event, path: &str) -> Option<String> {
    match event.field(path) {
        None | Some(Value::Null) => (path == "@timestamp")
            .then(|| event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

impl FromStr for EventFormatString {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventFormatString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl KeyFormatter for EventFormatString {
    fn run_bytes(&self, event: &Event) -> Result<Vec<u8>, FormatError> {
        self.run(event).map(String::into_bytes)
    }
}
