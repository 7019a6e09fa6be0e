//! The `LogRecord` model and its queue payload representation.
//!
//! A record carries five fixed attributes plus an open `metadata` mapping.
//! Anything on an inbound payload that is not one of the fixed attributes
//! collapses into `metadata`, both at the ingress boundary and when decoding
//! queue payloads (older producers emitted extra fields flat, at the top level).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::topic;

/// Fixed attributes that never end up inside `metadata`.
pub const FIXED_FIELDS: [&str; 5] = ["timestamp", "service", "level", "message", "host"];

const METADATA_FIELD: &str = "metadata";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Invalid service name: {0}")]
    InvalidService(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Schemaless key/value document attached to every record.
///
/// Always a mapping once built; scalars never stand in for the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Fold the non-fixed fields of a payload into a single mapping.
    ///
    /// An object under `metadata` forms the base; remaining top-level extras are
    /// laid over it and win on key collision. A non-object `metadata` value is
    /// kept under its own key so nothing is lost.
    pub fn collapse(mut extra: Map<String, Value>) -> Self {
        let mut map = match extra.remove(METADATA_FIELD) {
            Some(Value::Object(nested)) => nested,
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                let mut map = Map::new();
                map.insert(METADATA_FIELD.to_string(), other);
                map
            }
        };

        for (key, value) in extra {
            map.insert(key, value);
        }

        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The unit of ingestion and storage.
///
/// Serializes to the queue payload `{timestamp, service, level, message, host?, metadata}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord")]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub metadata: Metadata,
}

impl LogRecord {
    /// Decode a queue payload.
    pub fn decode(payload: &[u8]) -> Result<Self, RecordError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode as a queue payload.
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Queue topic this record belongs to.
    pub fn topic(&self) -> String {
        topic::topic_for_service(&self.service)
    }
}

/// Tolerant decoding shape: fixed fields are optional here so that the
/// conversion can report which one is missing, extras are gathered for collapse.
#[derive(Deserialize)]
struct WireRecord {
    timestamp: Option<DateTime<Utc>>,
    service: Option<String>,
    level: Option<String>,
    message: Option<String>,
    host: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<WireRecord> for LogRecord {
    type Error = RecordError;

    fn try_from(wire: WireRecord) -> Result<Self, Self::Error> {
        let timestamp = wire.timestamp.ok_or(RecordError::MissingField("timestamp"))?;
        let service = non_empty(wire.service).ok_or(RecordError::MissingField("service"))?;
        let level = non_empty(wire.level).ok_or(RecordError::MissingField("level"))?;
        let message = non_empty(wire.message).ok_or(RecordError::MissingField("message"))?;

        Ok(Self {
            timestamp,
            service,
            level,
            message,
            host: non_empty(wire.host),
            metadata: Metadata::collapse(wire.extra),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// A validated inbound submission, before the gateway stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSubmission {
    pub service: String,
    pub level: String,
    pub message: String,
    /// Caller-supplied host, honored only when it is a non-empty string.
    pub host: Option<String>,
    pub metadata: Metadata,
}

impl LogSubmission {
    /// Validate an arbitrary JSON body.
    ///
    /// Any caller-supplied `timestamp` is discarded; the gateway stamps its own.
    pub fn from_value(body: Value) -> Result<Self, RecordError> {
        let Value::Object(mut fields) = body else {
            return Err(RecordError::NotAnObject);
        };

        let service = take_string(&mut fields, "service").ok_or(RecordError::MissingField("service"))?;
        let level = take_string(&mut fields, "level").ok_or(RecordError::MissingField("level"))?;
        let message = take_string(&mut fields, "message").ok_or(RecordError::MissingField("message"))?;

        topic::validate_service(&service)?;

        let host = take_string(&mut fields, "host");
        fields.remove("timestamp");
        // A non-string host is not a host; drop it instead of leaking it into metadata.
        fields.remove("host");

        Ok(Self {
            service,
            level,
            message,
            host,
            metadata: Metadata::collapse(fields),
        })
    }

    /// Stamp receipt time and origin, producing the record to enqueue.
    pub fn into_record(self, received_at: DateTime<Utc>, origin: Option<String>) -> LogRecord {
        LogRecord {
            timestamp: received_at,
            service: self.service,
            level: self.level,
            message: self.message,
            host: self.host.or(origin),
            metadata: self.metadata,
        }
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => {
            let owned = s.clone();
            fields.remove(key);
            Some(owned)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    // ── Metadata collapse ───────────────────────────────────────

    #[test]
    fn collapse_lifts_nested_metadata_object() {
        let md = Metadata::collapse(obj(json!({ "metadata": { "userId": 42 } })));
        assert_eq!(md.get("userId"), Some(&json!(42)));
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn collapse_keeps_flat_extras() {
        let md = Metadata::collapse(obj(json!({ "region": "eu-west-1", "attempt": 3 })));
        assert_eq!(md.get("region"), Some(&json!("eu-west-1")));
        assert_eq!(md.get("attempt"), Some(&json!(3)));
    }

    #[test]
    fn collapse_top_level_extra_wins_on_collision() {
        let md = Metadata::collapse(obj(json!({
            "metadata": { "requestId": "nested", "userId": 1 },
            "requestId": "top"
        })));
        assert_eq!(md.get("requestId"), Some(&json!("top")));
        assert_eq!(md.get("userId"), Some(&json!(1)));
    }

    #[test]
    fn collapse_keeps_scalar_metadata_under_its_key() {
        let md = Metadata::collapse(obj(json!({ "metadata": "opaque" })));
        assert_eq!(md.get("metadata"), Some(&json!("opaque")));
    }

    #[test]
    fn collapse_null_metadata_is_empty_map() {
        let md = Metadata::collapse(obj(json!({ "metadata": null })));
        assert!(md.is_empty());
        assert!(md.clone().into_value().is_object());
    }

    // ── Queue payload decoding ──────────────────────────────────

    #[test]
    fn decode_structured_payload() {
        let payload = br#"{"timestamp":"2026-10-18T12:00:00Z","service":"auth-service","level":"error","message":"login failed","host":"10.0.0.7","metadata":{"userId":42}}"#;
        let record = LogRecord::decode(payload).unwrap();
        assert_eq!(record.service, "auth-service");
        assert_eq!(record.host.as_deref(), Some("10.0.0.7"));
        assert_eq!(record.metadata.get("userId"), Some(&json!(42)));
        assert_eq!(record.timestamp, Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap());
    }

    #[test]
    fn decode_flat_legacy_payload_collapses_extras() {
        let payload = br#"{"timestamp":"2026-10-18T12:00:00.000Z","service":"web","level":"info","message":"ok","duration":12.5,"requestId":"req-1"}"#;
        let record = LogRecord::decode(payload).unwrap();
        assert_eq!(record.host, None);
        assert_eq!(record.metadata.get("duration"), Some(&json!(12.5)));
        assert_eq!(record.metadata.get("requestId"), Some(&json!("req-1")));
    }

    #[test]
    fn decode_rejects_missing_timestamp() {
        let payload = br#"{"service":"web","level":"info","message":"ok"}"#;
        let err = LogRecord::decode(payload).unwrap_err();
        assert!(err.to_string().contains("timestamp"), "unexpected error: {}", err);
    }

    #[test]
    fn decode_rejects_empty_message() {
        let payload = br#"{"timestamp":"2026-10-18T12:00:00Z","service":"web","level":"info","message":""}"#;
        assert!(LogRecord::decode(payload).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(LogRecord::decode(b"not json at all"), Err(RecordError::Json(_))));
    }

    #[test]
    fn encoded_payload_nests_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("userId", json!(42));
        let record = LogRecord {
            timestamp: Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap(),
            service: "auth-service".to_string(),
            level: "error".to_string(),
            message: "login failed".to_string(),
            host: None,
            metadata,
        };

        let value: Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();
        assert_eq!(value["metadata"]["userId"], json!(42));
        assert!(value.get("host").is_none());
        assert_eq!(LogRecord::decode(&record.encode().unwrap()).unwrap(), record);
    }

    // ── Submissions ─────────────────────────────────────────────

    #[test]
    fn submission_requires_all_fixed_fields() {
        for body in [
            json!({ "level": "info", "message": "m" }),
            json!({ "service": "s", "message": "m" }),
            json!({ "service": "s", "level": "info" }),
            json!({ "service": "", "level": "info", "message": "m" }),
            json!({ "service": 7, "level": "info", "message": "m" }),
        ] {
            let err = LogSubmission::from_value(body.clone()).unwrap_err();
            assert!(matches!(err, RecordError::MissingField(_)), "body {} gave {:?}", body, err);
        }
    }

    #[test]
    fn submission_rejects_non_object() {
        assert!(matches!(LogSubmission::from_value(json!([1, 2])), Err(RecordError::NotAnObject)));
    }

    #[test]
    fn submission_rejects_service_unusable_as_topic() {
        let err = LogSubmission::from_value(json!({ "service": "auth service", "level": "info", "message": "m" }))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidService(_)));
    }

    #[test]
    fn submission_discards_caller_timestamp() {
        let sub = LogSubmission::from_value(json!({
            "service": "s", "level": "info", "message": "m", "timestamp": "1999-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(sub.metadata.get("timestamp").is_none());

        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(sub.into_record(now, None).timestamp, now);
    }

    #[test]
    fn submission_host_falls_back_to_origin() {
        let now = Utc::now();
        let explicit = LogSubmission::from_value(json!({ "service": "s", "level": "l", "message": "m", "host": "app-1" }))
            .unwrap()
            .into_record(now, Some("192.168.1.9".to_string()));
        assert_eq!(explicit.host.as_deref(), Some("app-1"));

        let derived = LogSubmission::from_value(json!({ "service": "s", "level": "l", "message": "m", "host": "" }))
            .unwrap()
            .into_record(now, Some("192.168.1.9".to_string()));
        assert_eq!(derived.host.as_deref(), Some("192.168.1.9"));
        assert!(derived.metadata.get("host").is_none());
    }

    #[test]
    fn submission_extras_land_in_metadata() {
        let sub = LogSubmission::from_value(json!({
            "service": "auth-service",
            "level": "error",
            "message": "login failed",
            "metadata": { "userId": 42 },
            "region": "eu"
        }))
        .unwrap();
        assert_eq!(sub.metadata.get("userId"), Some(&json!(42)));
        assert_eq!(sub.metadata.get("region"), Some(&json!("eu")));
    }
}
