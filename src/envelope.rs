//! Versioned wrapper around the persisted state document.
//!
//! Every write to a backend stores an [`Envelope`]: a monotonically increasing
//! revision, the time of the write and the state object itself. Decoding is
//! deliberately soft: anything that does not look like an envelope is treated
//! the same as "nothing stored yet".

use crate::error::{ShapeError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Default ceiling for a serialized state payload.
pub const MAX_STATE_BYTES: usize = 900_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub state: Map<String, Value>,
}

/// Wrap `state` at `revision`, stamped with the current time.
pub fn encode(revision: u64, state: Map<String, Value>) -> Envelope {
    Envelope {
        revision,
        updated_at: Some(Utc::now()),
        state,
    }
}

/// Decode a raw stored value, returning `None` for anything malformed.
///
/// `raw` may be the envelope object itself or a JSON string holding it
/// (key/value stores hand values back as strings).
pub fn decode(raw: &Value) -> Option<Envelope> {
    match parse_envelope(raw) {
        Ok(envelope) => Some(envelope),
        Err(ShapeError::Empty) => None,
        Err(e) => {
            debug!("Ignoring stored envelope: {}", e);
            None
        }
    }
}

/// Decode from serialized text. Empty text is "no data".
pub fn decode_str(raw: &str) -> Option<Envelope> {
    if raw.trim().is_empty() {
        return None;
    }
    decode(&Value::String(raw.to_string()))
}

/// Strict variant of [`decode`] that reports why a value was rejected.
pub fn parse_envelope(raw: &Value) -> Result<Envelope, ShapeError> {
    let parsed;
    let raw = match raw {
        Value::Null => return Err(ShapeError::Empty),
        Value::String(s) if s.is_empty() => return Err(ShapeError::Empty),
        Value::String(s) => {
            parsed = serde_json::from_str::<Value>(s)
                .map_err(|e| ShapeError::NotJson(e.to_string()))?;
            &parsed
        }
        other => other,
    };

    let obj = raw.as_object().ok_or(ShapeError::NotAnObject)?;

    let revision = match obj.get("revision") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .ok_or(ShapeError::BadRevision)?,
        _ => return Err(ShapeError::BadRevision),
    };

    let state = match obj.get("state") {
        Some(Value::Object(state)) => state.clone(),
        _ => return Err(ShapeError::BadState),
    };

    let updated_at = obj
        .get("updatedAt")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Ok(Envelope {
        revision,
        updated_at,
        state,
    })
}

/// Parse an RFC 3339 timestamp, tolerating garbage by returning `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Check that `state` is a plain object whose serialized form fits in `limit` bytes.
pub fn validate_state(state: &Value, limit: usize) -> Result<Map<String, Value>, ValidationError> {
    let obj = state.as_object().ok_or(ValidationError::NotAnObject)?;
    let size = serialized_size(state)?;
    if size > limit {
        return Err(ValidationError::TooLarge { size, limit });
    }
    Ok(obj.clone())
}

/// UTF-8 byte length of the compact JSON encoding of `value`.
pub fn serialized_size(value: &Value) -> Result<usize, ValidationError> {
    serde_json::to_vec(value)
        .map(|bytes| bytes.len())
        .map_err(|e| ValidationError::Serialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> Map<String, Value> {
        json!({"phrases": {"p1": {"box": 2}}, "stats": {"totalSessions": 4}})
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_decode_reproduces_encoded_envelope() {
        let envelope = encode(7, sample_state());
        let raw = serde_json::to_value(&envelope).unwrap();
        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.revision, 7);
        assert_eq!(decoded.state, sample_state());
        assert!(decoded.updated_at.is_some());
    }

    #[test]
    fn test_decode_accepts_string_payload() {
        let text = r#"{"revision": 3, "updatedAt": null, "state": {"a": 1}}"#;
        let decoded = decode_str(text).unwrap();
        assert_eq!(decoded.revision, 3);
        assert_eq!(decoded.updated_at, None);
        assert_eq!(decoded.state["a"], 1);
    }

    #[test]
    fn test_decode_rejects_malformed_shapes() {
        assert!(decode(&Value::Null).is_none());
        assert!(decode_str("").is_none());
        assert!(decode_str("not json").is_none());
        assert!(decode(&json!([1, 2, 3])).is_none());
        assert!(decode(&json!({"revision": "3", "state": {}})).is_none());
        assert!(decode(&json!({"revision": 3, "state": [1]})).is_none());
        assert!(decode(&json!({"revision": 3})).is_none());
    }

    #[test]
    fn test_parse_envelope_reports_reason() {
        assert_eq!(
            parse_envelope(&json!({"revision": true, "state": {}})),
            Err(ShapeError::BadRevision)
        );
        assert_eq!(
            parse_envelope(&json!({"revision": 1, "state": null})),
            Err(ShapeError::BadState)
        );
    }

    #[test]
    fn test_garbage_timestamp_is_dropped() {
        let decoded = decode(&json!({"revision": 1, "updatedAt": "yesterday", "state": {}})).unwrap();
        assert_eq!(decoded.updated_at, None);
    }

    #[test]
    fn test_validate_state_rejects_arrays_and_oversized() {
        assert_eq!(
            validate_state(&json!([1, 2]), MAX_STATE_BYTES),
            Err(ValidationError::NotAnObject)
        );

        let big = json!({"blob": "x".repeat(200)});
        match validate_state(&big, 100) {
            Err(ValidationError::TooLarge { size, limit }) => {
                assert!(size > 100);
                assert_eq!(limit, 100);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }

        assert!(validate_state(&big, MAX_STATE_BYTES).is_ok());
    }
}
