//! Wire envelope codec
//!
//! Every message crossing the channel is wrapped in an envelope carrying the
//! shared-secret tag and protocol version. Inbound payloads are validated
//! with strict equality on both before any interpretation happens; a mismatch
//! is a logged discard, never an error surfaced to callers. This is a
//! security and compatibility gate, fatal only to the single message.
//!
//! The decoded form is a tagged union over the three operations the protocol
//! knows, so routing can match exhaustively instead of probing optional
//! fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::PROTOCOL_VERSION;

// ----------------------------------------------------------------------------
// Decoded Envelope
// ----------------------------------------------------------------------------

/// A validated envelope, ready for routing
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Shared-secret tag this envelope was built or validated against
    pub tag: String,
    /// Protocol version (always [`PROTOCOL_VERSION`] after validation)
    pub version: u32,
    /// The operation this envelope carries
    pub body: EnvelopeBody,
}

/// The three operations that can cross the channel
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeBody {
    /// Invoke a named command on the receiving peer
    CommandRequest {
        name: String,
        id: String,
        args: Vec<Value>,
    },
    /// Answer a previously received command request
    CommandResponse {
        name: String,
        id: String,
        success: bool,
        response: Value,
    },
    /// Notify listeners of a named event; no reply expected
    Event { name: String, args: Vec<Value> },
}

impl Envelope {
    /// Build an outbound envelope under the given tag at the current
    /// protocol version.
    pub fn new(tag: impl Into<String>, body: EnvelopeBody) -> Self {
        Self {
            tag: tag.into(),
            version: PROTOCOL_VERSION,
            body,
        }
    }

    /// Serialize to the flat wire schema.
    pub fn encode(&self) -> serde_json::Result<Value> {
        let raw = match &self.body {
            EnvelopeBody::CommandRequest { name, id, args } => RawEnvelope {
                tag: self.tag.clone(),
                version: self.version,
                op: "command".to_string(),
                dir: Some("request".to_string()),
                name: name.clone(),
                id: Some(id.clone()),
                args: Some(args.clone()),
                success: None,
                response: None,
            },
            EnvelopeBody::CommandResponse {
                name,
                id,
                success,
                response,
            } => RawEnvelope {
                tag: self.tag.clone(),
                version: self.version,
                op: "command".to_string(),
                dir: Some("response".to_string()),
                name: name.clone(),
                id: Some(id.clone()),
                args: None,
                success: Some(*success),
                response: Some(response.clone()),
            },
            EnvelopeBody::Event { name, args } => RawEnvelope {
                tag: self.tag.clone(),
                version: self.version,
                op: "event".to_string(),
                dir: None,
                name: name.clone(),
                id: None,
                args: Some(args.clone()),
                success: None,
                response: None,
            },
        };
        serde_json::to_value(raw)
    }

    /// Validate and decode an inbound payload against `expected_tag`.
    ///
    /// Returns `None` for anything that must not be interpreted: payloads
    /// that do not parse as an envelope, tag or version mismatches, and
    /// unknown operations. All discards are logged.
    pub fn decode(payload: &Value, expected_tag: &str) -> Option<Envelope> {
        let raw: RawEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(raw) => raw,
            Err(err) => {
                debug!("discarding payload that is not an envelope: {err}");
                return None;
            }
        };

        if raw.tag != expected_tag {
            debug!(tag = %raw.tag, "discarding envelope with foreign tag");
            return None;
        }
        if raw.version != PROTOCOL_VERSION {
            warn!(
                "discarding envelope with version {} (expected {})",
                raw.version, PROTOCOL_VERSION
            );
            return None;
        }

        let body = match (raw.op.as_str(), raw.dir.as_deref()) {
            ("command", Some("request")) => {
                let Some(id) = raw.id else {
                    warn!(name = %raw.name, "discarding command request without id");
                    return None;
                };
                EnvelopeBody::CommandRequest {
                    name: raw.name,
                    id,
                    args: raw.args.unwrap_or_default(),
                }
            }
            ("command", Some("response")) => {
                let (Some(id), Some(success)) = (raw.id, raw.success) else {
                    warn!(name = %raw.name, "discarding command response without id or success");
                    return None;
                };
                EnvelopeBody::CommandResponse {
                    name: raw.name,
                    id,
                    success,
                    response: raw.response.unwrap_or(Value::Null),
                }
            }
            ("command", _) => {
                warn!(name = %raw.name, "discarding command envelope without direction");
                return None;
            }
            ("event", _) => EnvelopeBody::Event {
                name: raw.name,
                args: raw.args.unwrap_or_default(),
            },
            (op, _) => {
                warn!(op = %op, "discarding envelope with unknown operation");
                return None;
            }
        };

        Some(Envelope {
            tag: raw.tag,
            version: raw.version,
            body,
        })
    }
}

// ----------------------------------------------------------------------------
// Raw Wire Schema
// ----------------------------------------------------------------------------

/// Flat wire form bridging the tagged union to the JSON schema.
#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    tag: String,
    version: u32,
    op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dir: Option<String>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<Value>,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
