//! Wire envelopes exchanged with the hub.
//!
//! One JSON object per transport frame, discriminated by `type`:
//!
//! | type            | fields                                  |
//! |-----------------|-----------------------------------------|
//! | `binding`       | `address`, `configuration`              |
//! | `forward`       | `to`, `from`, `data`                    |
//! | `register`      | `request_id`, `hostname`                |
//! | `register-ok`   | `request_id`, success payload fields    |
//! | `register-fail` | `request_id`, `reason`                  |
//! | `lookup`        | `request_id`, `hostname`                |
//! | `lookup-ok`     | `request_id`, success payload fields    |
//! | `lookup-fail`   | `request_id`, `reason`                  |

use crate::domain::{Binding, RequestId, RequestKind, SuccessPayload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Discriminant values of the `type` field.
pub mod tags {
    pub const BINDING: &str = "binding";
    pub const FORWARD: &str = "forward";
    pub const REGISTER: &str = "register";
    pub const REGISTER_OK: &str = "register-ok";
    pub const REGISTER_FAIL: &str = "register-fail";
    pub const LOOKUP: &str = "lookup";
    pub const LOOKUP_OK: &str = "lookup-ok";
    pub const LOOKUP_FAIL: &str = "lookup-fail";
}

const TYPE_FIELD: &str = "type";
const REQUEST_ID_FIELD: &str = "request_id";

/// Opaque payload relayed between peers through the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardEnvelope {
    pub to: String,
    pub from: String,
    pub data: Value,
}

/// A decoded hub message.
///
/// The request families share one shape, so register and lookup messages are
/// distinguished by `kind` rather than by separate variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Handshake assigning this client its address.
    Binding(Binding),
    /// Peer-to-peer payload.
    Forward(ForwardEnvelope),
    /// `register` / `lookup`
    Request {
        kind: RequestKind,
        request_id: RequestId,
        hostname: String,
    },
    /// `register-ok` / `lookup-ok`
    Success {
        kind: RequestKind,
        request_id: RequestId,
        payload: SuccessPayload,
    },
    /// `register-fail` / `lookup-fail`
    Failure {
        kind: RequestKind,
        request_id: RequestId,
        reason: String,
    },
}

/// Envelope encode/decode errors
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("missing or non-string `type` field")]
    MissingType,
    #[error("invalid `{tag}` message: {source}")]
    InvalidFields {
        tag: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Deserialize)]
struct RequestFields {
    request_id: RequestId,
    hostname: String,
}

#[derive(Deserialize)]
struct FailureFields {
    request_id: RequestId,
    reason: String,
}

impl Envelope {
    pub fn register(request_id: RequestId, hostname: impl Into<String>) -> Self {
        Self::Request {
            kind: RequestKind::Register,
            request_id,
            hostname: hostname.into(),
        }
    }

    pub fn lookup(request_id: RequestId, hostname: impl Into<String>) -> Self {
        Self::Request {
            kind: RequestKind::Lookup,
            request_id,
            hostname: hostname.into(),
        }
    }

    /// Wire discriminant of this envelope.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Binding(_) => tags::BINDING,
            Self::Forward(_) => tags::FORWARD,
            Self::Request { kind, .. } => request_tag(*kind),
            Self::Success { kind, .. } => success_tag(*kind),
            Self::Failure { kind, .. } => failure_tag(*kind),
        }
    }

    /// Decode one frame.
    ///
    /// `Ok(None)` means a well-formed object with a `type` this client does
    /// not know; such frames are meant to be skipped, not reported.
    pub fn decode(frame: &str) -> Result<Option<Self>, EnvelopeError> {
        let value: Value = serde_json::from_str(frame).map_err(EnvelopeError::InvalidJson)?;
        let Value::Object(mut fields) = value else {
            return Err(EnvelopeError::NotAnObject);
        };
        let tag = match fields.remove(TYPE_FIELD) {
            Some(Value::String(tag)) => tag,
            _ => return Err(EnvelopeError::MissingType),
        };

        let envelope = match tag.as_str() {
            tags::BINDING => Self::Binding(parse_fields(tags::BINDING, fields)?),
            tags::FORWARD => Self::Forward(parse_fields(tags::FORWARD, fields)?),
            tags::REGISTER => parse_request(RequestKind::Register, fields)?,
            tags::LOOKUP => parse_request(RequestKind::Lookup, fields)?,
            tags::REGISTER_OK => parse_success(RequestKind::Register, fields)?,
            tags::LOOKUP_OK => parse_success(RequestKind::Lookup, fields)?,
            tags::REGISTER_FAIL => parse_failure(RequestKind::Register, fields)?,
            tags::LOOKUP_FAIL => parse_failure(RequestKind::Lookup, fields)?,
            _ => return Ok(None),
        };

        Ok(Some(envelope))
    }

    /// Decode one frame, rejecting frames over `limit` bytes before parsing.
    pub fn decode_bounded(frame: &str, limit: usize) -> Result<Option<Self>, EnvelopeError> {
        if frame.len() > limit {
            return Err(EnvelopeError::TooLarge {
                size: frame.len(),
                limit,
            });
        }
        Self::decode(frame)
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(&self.to_value()?).map_err(EnvelopeError::Encode)
    }

    /// Encode as a JSON object, `type` included.
    pub fn to_value(&self) -> Result<Value, EnvelopeError> {
        let mut fields = match self {
            Self::Binding(binding) => to_object(binding)?,
            Self::Forward(forward) => to_object(forward)?,
            Self::Request {
                request_id,
                hostname,
                ..
            } => {
                let mut fields = Map::new();
                fields.insert(REQUEST_ID_FIELD.into(), Value::from(request_id.value()));
                fields.insert("hostname".into(), Value::from(hostname.as_str()));
                fields
            }
            Self::Success {
                request_id,
                payload,
                ..
            } => {
                let mut fields = payload.clone();
                fields.insert(REQUEST_ID_FIELD.into(), Value::from(request_id.value()));
                fields
            }
            Self::Failure {
                request_id, reason, ..
            } => {
                let mut fields = Map::new();
                fields.insert(REQUEST_ID_FIELD.into(), Value::from(request_id.value()));
                fields.insert("reason".into(), Value::from(reason.as_str()));
                fields
            }
        };

        fields.insert(TYPE_FIELD.into(), Value::from(self.tag()));
        Ok(Value::Object(fields))
    }
}

fn request_tag(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Register => tags::REGISTER,
        RequestKind::Lookup => tags::LOOKUP,
    }
}

fn success_tag(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Register => tags::REGISTER_OK,
        RequestKind::Lookup => tags::LOOKUP_OK,
    }
}

fn failure_tag(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Register => tags::REGISTER_FAIL,
        RequestKind::Lookup => tags::LOOKUP_FAIL,
    }
}

fn parse_fields<T: for<'de> Deserialize<'de>>(
    tag: &'static str,
    fields: Map<String, Value>,
) -> Result<T, EnvelopeError> {
    serde_json::from_value(Value::Object(fields))
        .map_err(|source| EnvelopeError::InvalidFields { tag, source })
}

fn parse_request(kind: RequestKind, fields: Map<String, Value>) -> Result<Envelope, EnvelopeError> {
    let RequestFields {
        request_id,
        hostname,
    } = parse_fields(request_tag(kind), fields)?;
    Ok(Envelope::Request {
        kind,
        request_id,
        hostname,
    })
}

fn parse_failure(kind: RequestKind, fields: Map<String, Value>) -> Result<Envelope, EnvelopeError> {
    let FailureFields { request_id, reason } = parse_fields(failure_tag(kind), fields)?;
    Ok(Envelope::Failure {
        kind,
        request_id,
        reason,
    })
}

fn parse_success(
    kind: RequestKind,
    mut fields: Map<String, Value>,
) -> Result<Envelope, EnvelopeError> {
    let tag = success_tag(kind);
    let request_id = match fields.remove(REQUEST_ID_FIELD) {
        Some(value) => serde_json::from_value(value)
            .map_err(|source| EnvelopeError::InvalidFields { tag, source })?,
        None => {
            return Err(EnvelopeError::InvalidFields {
                tag,
                source: serde::de::Error::missing_field(REQUEST_ID_FIELD),
            })
        }
    };

    Ok(Envelope::Success {
        kind,
        request_id,
        payload: fields,
    })
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, EnvelopeError> {
    match serde_json::to_value(value).map_err(EnvelopeError::Encode)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(EnvelopeError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> Option<Envelope> {
        Envelope::decode(&value.to_string()).unwrap()
    }

    #[test]
    fn test_decode_binding() {
        let envelope = decode(json!({
            "type": "binding",
            "address": "peer-42",
            "configuration": {"ice": ["stun:example.org"]}
        }));
        assert_eq!(
            envelope,
            Some(Envelope::Binding(Binding::new(
                "peer-42",
                json!({"ice": ["stun:example.org"]})
            )))
        );
    }

    #[test]
    fn test_decode_success_strips_type_and_id() {
        let envelope = decode(json!({"type": "register-ok", "request_id": 0, "quota": 5}));
        let Some(Envelope::Success {
            kind,
            request_id,
            payload,
        }) = envelope
        else {
            panic!("expected success envelope");
        };
        assert_eq!(kind, RequestKind::Register);
        assert_eq!(request_id, RequestId::new(0));
        assert_eq!(Value::Object(payload), json!({"quota": 5}));
    }

    #[test]
    fn test_decode_lookup_failure() {
        let envelope = decode(json!({"type": "lookup-fail", "request_id": 3, "reason": "not-found"}));
        assert_eq!(
            envelope,
            Some(Envelope::Failure {
                kind: RequestKind::Lookup,
                request_id: RequestId::new(3),
                reason: "not-found".into(),
            })
        );
    }

    #[test]
    fn test_decode_forward_keeps_data() {
        let envelope = decode(json!({
            "type": "forward", "to": "peer-42", "from": "peer-7", "data": {"hello": 1}
        }));
        assert_eq!(
            envelope,
            Some(Envelope::Forward(ForwardEnvelope {
                to: "peer-42".into(),
                from: "peer-7".into(),
                data: json!({"hello": 1}),
            }))
        );
    }

    #[test]
    fn test_unknown_tag_is_none() {
        assert_eq!(decode(json!({"type": "presence", "who": "x"})), None);
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            Envelope::decode("{not json"),
            Err(EnvelopeError::InvalidJson(_))
        ));
        assert!(matches!(
            Envelope::decode("[1, 2]"),
            Err(EnvelopeError::NotAnObject)
        ));
        assert!(matches!(
            Envelope::decode(r#"{"request_id": 1}"#),
            Err(EnvelopeError::MissingType)
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type": 5}"#),
            Err(EnvelopeError::MissingType)
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type": "register-ok", "quota": 5}"#),
            Err(EnvelopeError::InvalidFields { tag: "register-ok", .. })
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type": "lookup-fail", "request_id": "x", "reason": "r"}"#),
            Err(EnvelopeError::InvalidFields { tag: "lookup-fail", .. })
        ));
        assert!(matches!(
            Envelope::decode(r#"{"type": "binding", "configuration": {}}"#),
            Err(EnvelopeError::InvalidFields { tag: "binding", .. })
        ));
    }

    #[test]
    fn test_decode_bounded() {
        let frame = json!({"type": "binding", "address": "a", "configuration": {}}).to_string();
        assert!(Envelope::decode_bounded(&frame, frame.len()).unwrap().is_some());
        assert!(matches!(
            Envelope::decode_bounded(&frame, 4),
            Err(EnvelopeError::TooLarge { limit: 4, .. })
        ));
    }

    #[test]
    fn test_encode_register_request() {
        let value = Envelope::register(RequestId::new(0), "alice").to_value().unwrap();
        assert_eq!(
            value,
            json!({"type": "register", "request_id": 0, "hostname": "alice"})
        );
    }

    #[test]
    fn test_encode_lookup_request() {
        let frame = Envelope::lookup(RequestId::new(2), "carol").encode().unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"type": "lookup", "request_id": 2, "hostname": "carol"})
        );
    }

    #[test]
    fn test_encode_forward() {
        let envelope = Envelope::Forward(ForwardEnvelope {
            to: "peer-7".into(),
            from: "peer-42".into(),
            data: json!({"sdp": "offer"}),
        });
        assert_eq!(
            envelope.to_value().unwrap(),
            json!({"type": "forward", "to": "peer-7", "from": "peer-42", "data": {"sdp": "offer"}})
        );
    }

    #[test]
    fn test_encode_success_flattens_payload() {
        let mut payload = SuccessPayload::new();
        payload.insert("addresses".into(), json!(["peer-9"]));
        let envelope = Envelope::Success {
            kind: RequestKind::Lookup,
            request_id: RequestId::new(5),
            payload,
        };
        assert_eq!(
            envelope.to_value().unwrap(),
            json!({"type": "lookup-ok", "request_id": 5, "addresses": ["peer-9"]})
        );
    }
}
