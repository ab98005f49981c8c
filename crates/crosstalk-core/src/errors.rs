//! Error types for the crosstalk protocol
//!
//! Two kinds of failure are kept strictly apart: local protocol errors
//! ([`CrosstalkError`]) that surface to the caller on this side of the
//! channel, and remote failures ([`RemoteError`]) that crossed the channel
//! as data. An invalid inbound message is neither; it is discarded inside
//! the router and never raised to application code.

pub use crate::protocol::remote_error::RemoteError;

/// Errors surfaced by the crosstalk protocol engine
#[derive(Debug, thiserror::Error)]
pub enum CrosstalkError {
    /// A command handler is already registered under this name
    #[error("Command handler already added: {name}")]
    DuplicateHandler { name: String },

    /// A response arrived for a call this link does not know about
    /// (already settled, foreign id, or post-teardown)
    #[error("Unknown correlation id: {id}")]
    UnknownCorrelation { id: String },

    /// The transport failed to accept an outbound envelope
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// An envelope could not be serialized
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The remote peer answered a command with a failure
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The link was torn down while a call was still outstanding
    #[error("Link closed while awaiting response for command {name}")]
    LinkClosed { name: String },
}

impl CrosstalkError {
    /// Create a transport error with a reason
    pub fn transport(reason: impl Into<String>) -> Self {
        CrosstalkError::Transport {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrosstalkError>;
