//! ContentRouter - classifies a message from its decoded payload
//!
//! Every payload resolves to exactly one decision:
//! 1. `Suppressed` - the kind field matches a suppressed kind
//! 2. `Routed` - the correlation field is a non-empty string (or a destination was cached)
//! 3. `Excluded` - anything else, with the reason made explicit

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use contracts::{lookup_path, DestinationKey, Fields, RoutingConfig};

/// Routing outcome for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Dropped on purpose, never retried
    Suppressed { kind: String },
    /// Joins the group of this destination
    Routed { destination: DestinationKey },
    /// Matched no route; dropped and counted
    Excluded { reason: ExclusionReason },
}

/// Why a message matched no route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExclusionReason {
    /// Payload is not a JSON object
    UndecodablePayload,
    /// Correlation field absent, null or empty
    MissingField,
    /// Correlation field present but not a string
    MismatchedType,
}

impl ExclusionReason {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UndecodablePayload => "undecodable_payload",
            Self::MissingField => "missing_field",
            Self::MismatchedType => "mismatched_type",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content based router
#[derive(Debug, Clone)]
pub struct ContentRouter {
    suppress_field: String,
    suppress_kinds: HashSet<String>,
    route_field: String,
    destination_prefix: String,
}

impl ContentRouter {
    /// Create from routing config
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            suppress_field: config.suppress_field.clone(),
            suppress_kinds: config.suppress_kinds.iter().cloned().collect(),
            route_field: config.route_field.clone(),
            destination_prefix: config.destination_prefix.clone(),
        }
    }

    /// Decode a serialized payload and classify it
    pub fn route(&self, payload: &[u8], cached: Option<&DestinationKey>) -> RouteDecision {
        match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(doc)) => self.classify(&doc, cached),
            _ => RouteDecision::Excluded {
                reason: ExclusionReason::UndecodablePayload,
            },
        }
    }

    /// Classify decoded payload fields
    ///
    /// `cached` is a destination resolved by an earlier attempt; it is only used
    /// when the correlation field is absent.
    pub fn classify(&self, doc: &Fields, cached: Option<&DestinationKey>) -> RouteDecision {
        if let Some(kind) = lookup_path(doc, &self.suppress_field).and_then(Value::as_str) {
            if self.suppress_kinds.contains(kind) {
                return RouteDecision::Suppressed {
                    kind: kind.to_string(),
                };
            }
        }

        match lookup_path(doc, &self.route_field) {
            Some(Value::String(id)) if !id.is_empty() => RouteDecision::Routed {
                destination: DestinationKey::with_prefix(&self.destination_prefix, id),
            },
            Some(Value::String(_)) | Some(Value::Null) | None => match cached {
                Some(destination) => RouteDecision::Routed {
                    destination: destination.clone(),
                },
                None => RouteDecision::Excluded {
                    reason: ExclusionReason::MissingField,
                },
            },
            Some(_) => RouteDecision::Excluded {
                reason: ExclusionReason::MismatchedType,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn router() -> ContentRouter {
        ContentRouter::new(&RoutingConfig::default())
    }

    fn route(value: Value) -> RouteDecision {
        router().route(&serde_json::to_vec(&value).unwrap(), None)
    }

    #[test]
    fn test_suppressed_kind() {
        let decision = route(json!({
            "processor": {"event": "metric"},
            "labels": {"_tag_profileId": "p1"}
        }));
        assert_eq!(
            decision,
            RouteDecision::Suppressed {
                kind: "metric".to_string()
            }
        );
    }

    #[test]
    fn test_routed_by_correlation_field() {
        let decision = route(json!({
            "processor": {"event": "transaction"},
            "labels": {"_tag_profileId": "p1"}
        }));
        assert_eq!(
            decision,
            RouteDecision::Routed {
                destination: "trace-p1".into()
            }
        );
    }

    #[test]
    fn test_excluded_reasons() {
        let table = [
            (json!({"processor": {"event": "span"}}), ExclusionReason::MissingField),
            (json!({"labels": {"_tag_profileId": ""}}), ExclusionReason::MissingField),
            (json!({"labels": {"_tag_profileId": null}}), ExclusionReason::MissingField),
            (json!({"labels": {"_tag_profileId": 42}}), ExclusionReason::MismatchedType),
            (json!({"labels": "flat"}), ExclusionReason::MissingField),
            // processor is not an object: no suppression, still needs a route
            (json!({"processor": "metric"}), ExclusionReason::MissingField),
        ];

        for (doc, reason) in table {
            assert_eq!(
                route(doc.clone()),
                RouteDecision::Excluded { reason },
                "doc: {doc}"
            );
        }
    }

    #[test]
    fn test_undecodable_payload() {
        assert_eq!(
            router().route(b"not json", None),
            RouteDecision::Excluded {
                reason: ExclusionReason::UndecodablePayload
            }
        );
        assert_eq!(
            router().route(b"[1,2,3]", None),
            RouteDecision::Excluded {
                reason: ExclusionReason::UndecodablePayload
            }
        );
    }

    #[test]
    fn test_cached_destination_fallback() {
        let cached = DestinationKey::from("trace-cached");
        let doc = json!({"message": "no labels"});
        let Value::Object(fields) = doc else {
            unreachable!()
        };

        assert_eq!(
            router().classify(&fields, Some(&cached)),
            RouteDecision::Routed {
                destination: cached.clone()
            }
        );

        // content wins over the cache
        let doc = json!({"labels": {"_tag_profileId": "p2"}});
        let Value::Object(fields) = doc else {
            unreachable!()
        };
        assert_eq!(
            router().classify(&fields, Some(&cached)),
            RouteDecision::Routed {
                destination: "trace-p2".into()
            }
        );
    }

    #[test]
    fn test_custom_routing_config() {
        let config = RoutingConfig {
            suppress_field: "kind".to_string(),
            suppress_kinds: vec!["heartbeat".to_string(), "metric".to_string()],
            route_field: "tenant".to_string(),
            destination_prefix: "events.".to_string(),
        };
        let router = ContentRouter::new(&config);

        let heartbeat = serde_json::to_vec(&json!({"kind": "heartbeat", "tenant": "t"})).unwrap();
        let routed = serde_json::to_vec(&json!({"kind": "log", "tenant": "acme"})).unwrap();

        assert!(matches!(
            router.route(&heartbeat, None),
            RouteDecision::Suppressed { .. }
        ));
        assert_eq!(
            router.route(&routed, None),
            RouteDecision::Routed {
                destination: "events.acme".into()
            }
        );
    }
}
