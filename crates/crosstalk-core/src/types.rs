//! Core types for the crosstalk protocol
//!
//! This module defines the fundamental types used throughout the protocol,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Protocol Constants
// ----------------------------------------------------------------------------

/// Protocol version spoken by this crate.
///
/// Inbound envelopes carrying any other version are discarded before
/// interpretation. There is no partial negotiation; a mismatch is fatal to
/// that single message only.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default shared-secret tag stamped on every envelope.
///
/// Links that need to coexist on one physical channel without seeing each
/// other's traffic override this per link via [`crate::LinkConfig`].
pub const DEFAULT_SHARED_TAG: &str = "crosstalk-tag-494581011";

// ----------------------------------------------------------------------------
// Handle Identifier
// ----------------------------------------------------------------------------

/// Opaque identifier for one peer endpoint reachable over the shared channel.
///
/// Handles are assigned by whatever resolves peer identity outside this
/// crate; the protocol only ever compares them for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    /// Create a new random handle id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a handle id from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Peer Handle
// ----------------------------------------------------------------------------

/// An externally resolved peer endpoint plus the secondary relations the
/// resolver knows about.
///
/// A link trusts messages from `id`; it may additionally opt in to trusting
/// the peer's opener or parent (popup / child-frame topologies) via
/// [`crate::LinkConfig`]. Relations are resolved outside this crate and
/// passed in as opaque handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerHandle {
    /// Primary identity of the peer endpoint
    pub id: HandleId,
    /// The endpoint that opened the peer, if known
    pub opener: Option<HandleId>,
    /// The endpoint embedding the peer, if known
    pub parent: Option<HandleId>,
}

impl PeerHandle {
    /// Create a peer handle with no known relations
    pub fn new(id: HandleId) -> Self {
        Self {
            id,
            opener: None,
            parent: None,
        }
    }

    /// Record the peer's opener
    pub fn with_opener(mut self, opener: HandleId) -> Self {
        self.opener = Some(opener);
        self
    }

    /// Record the peer's parent
    pub fn with_parent(mut self, parent: HandleId) -> Self {
        self.parent = Some(parent);
        self
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.id)
    }
}

// ----------------------------------------------------------------------------
// Origin
// ----------------------------------------------------------------------------

/// Reported origin of an inbound message, as stamped by the transport.
///
/// Origins are compared with strict equality when a link pins a trusted
/// origin; an unpinned link accepts any origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin(String);

impl Origin {
    /// Create an origin from its textual form
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    /// Get the textual form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Origin {
    fn from(origin: &str) -> Self {
        Self(origin.to_string())
    }
}

impl From<String> for Origin {
    fn from(origin: String) -> Self {
        Self(origin)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_id_uniqueness() {
        let a = HandleId::new();
        let b = HandleId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_peer_handle_relations() {
        let peer = HandleId::new();
        let opener = HandleId::new();
        let parent = HandleId::new();

        let handle = PeerHandle::new(peer).with_opener(opener).with_parent(parent);
        assert_eq!(handle.id, peer);
        assert_eq!(handle.opener, Some(opener));
        assert_eq!(handle.parent, Some(parent));

        let bare = PeerHandle::new(peer);
        assert_eq!(bare.opener, None);
        assert_eq!(bare.parent, None);
    }

    #[test]
    fn test_origin_equality() {
        let a = Origin::from("https://app.example");
        let b = Origin::new("https://app.example".to_string());
        let c = Origin::from("https://other.example");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "https://app.example");
    }
}
