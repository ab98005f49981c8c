//! Error marshalling across the trust boundary
//!
//! A failure that crosses the channel travels as an [`ErrorRecord`]: a plain
//! data snapshot of the original failure, never a live reference. The
//! receiving side reconstructs a local [`RemoteError`] that displays the
//! remote name and message and keeps the full record for inspection.

use std::backtrace::Backtrace;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ----------------------------------------------------------------------------
// Error Record
// ----------------------------------------------------------------------------

/// Transportable snapshot of a failure.
///
/// Any additional fields attached to the failure ride along in `extra`,
/// deep-copied through JSON. Values that do not survive that copy are
/// silently dropped, which is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Failure name or type, e.g. `"ReferenceError"`
    #[serde(default)]
    pub name: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Captured backtrace text, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Any further fields carried by the original failure
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorRecord {
    /// Create a record for a locally raised failure, capturing a backtrace.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: Some(Backtrace::force_capture().to_string()),
            extra: Map::new(),
        }
    }

    /// Snapshot an arbitrary error. The concrete type is not recoverable
    /// from a trait object, so the name is the generic `"Error"`.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::new("Error", err.to_string())
    }
}

// ----------------------------------------------------------------------------
// Remote Error
// ----------------------------------------------------------------------------

/// A failure reported by the remote peer, reconstructed locally.
///
/// Constructed by handler code to describe its own failures (they are
/// serialized into a failure response) and by the receiving side from a wire
/// record. Reconstruction is best-effort and never fails: a malformed record
/// yields a `RemoteError` with placeholder name and empty message.
#[derive(Debug, Clone)]
pub struct RemoteError {
    record: ErrorRecord,
}

impl RemoteError {
    /// Create a new failure with the given name and message
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            record: ErrorRecord::new(name, message),
        }
    }

    /// Attach an additional field to the failure record
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.record.extra.insert(key.into(), value);
        self
    }

    /// Reconstruct a failure from a received record, normalizing a missing
    /// name to `"Error"`.
    pub fn from_record(mut record: ErrorRecord) -> Self {
        if record.name.is_empty() {
            record.name = "Error".to_string();
        }
        Self { record }
    }

    /// Best-effort reconstruction from an arbitrary wire value.
    pub fn from_value(value: Value) -> Self {
        let record = serde_json::from_value(value).unwrap_or_default();
        Self::from_record(record)
    }

    /// Serialize this failure for the wire
    pub fn to_value(&self) -> Value {
        serde_json::to_value(&self.record).unwrap_or_else(|_| {
            json!({
                "name": self.record.name,
                "message": self.record.message,
            })
        })
    }

    /// The full record as received or constructed
    pub fn record(&self) -> &ErrorRecord {
        &self.record
    }

    /// Failure name or type
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// Failure message
    pub fn message(&self) -> &str {
        &self.record.message
    }

    /// Consume the failure and return its record
    pub fn into_record(self) -> ErrorRecord {
        self.record
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Remote error: <{}: {}>",
            self.record.name, self.record.message
        )
    }
}

impl std::error::Error for RemoteError {}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
