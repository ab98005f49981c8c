//! Transport seam
//!
//! The protocol engine never talks to a network directly. Outbound traffic
//! goes through the [`Transport`] trait; inbound traffic arrives on a
//! subscription channel the transport writes into. Concrete transports live
//! outside this crate (the `crosstalk-harness` crate ships an in-memory one).

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::Result;
use crate::types::{HandleId, Origin};

// ----------------------------------------------------------------------------
// Inbound Subscription
// ----------------------------------------------------------------------------

/// One message as delivered by the transport's inbound subscription.
///
/// The transport stamps the sender handle and origin; the router performs
/// all per-link trust filtering, so transports deliver with broadcast
/// semantics and need no protocol knowledge.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Raw envelope payload, validated later by the codec
    pub payload: Value,
    /// Handle of the sending endpoint, as observed by the transport
    pub sender: HandleId,
    /// Origin reported for the sending endpoint
    pub origin: Origin,
}

pub type InboundSender = mpsc::UnboundedSender<InboundMessage>;
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundMessage>;

/// Create the inbound subscription channel shared by a transport (writer)
/// and a router (reader).
pub fn create_inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}

// ----------------------------------------------------------------------------
// Outbound Trait
// ----------------------------------------------------------------------------

/// Outbound half of the shared channel.
///
/// The destination is a hint addressing one peer endpoint; transports with
/// broadcast media may ignore it and deliver to every subscriber, since the
/// router filters per link on arrival. No delivery, ordering, or retry
/// guarantees are assumed beyond what the transport itself provides.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post an envelope payload toward `destination`.
    async fn post(&self, payload: Value, destination: HandleId) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
