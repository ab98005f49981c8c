//! In-memory shared channel
//!
//! [`MemoryBus`] simulates the unreliable broadcast medium the protocol is
//! designed for: every attached endpoint sees every other endpoint's
//! traffic, stamped with the sender's handle and origin. Nothing here
//! understands envelopes; trust filtering happens in the router.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crosstalk_core::{
    create_inbound_channel, HandleId, InboundMessage, InboundReceiver, InboundSender, Origin,
    Result, Transport,
};

// ----------------------------------------------------------------------------
// Memory Bus
// ----------------------------------------------------------------------------

struct BusEndpoint {
    id: HandleId,
    inbound: InboundSender,
}

/// A broadcast bus connecting any number of in-process endpoints.
#[derive(Clone, Default)]
pub struct MemoryBus {
    endpoints: Arc<Mutex<Vec<BusEndpoint>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an endpoint under `id` and `origin`.
    ///
    /// Returns the outbound transport for that endpoint and the inbound
    /// subscription to hand to a router.
    pub fn attach(
        &self,
        id: HandleId,
        origin: impl Into<Origin>,
    ) -> (Arc<MemoryEndpoint>, InboundReceiver) {
        let (inbound_tx, inbound_rx) = create_inbound_channel();
        self.endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BusEndpoint {
                id,
                inbound: inbound_tx,
            });
        let endpoint = Arc::new(MemoryEndpoint {
            bus: self.clone(),
            id,
            origin: origin.into(),
        });
        (endpoint, inbound_rx)
    }

    /// Push a payload onto the bus as if sent by an arbitrary party.
    ///
    /// Lets tests exercise forged, foreign, and malformed traffic without
    /// attaching a well-behaved endpoint for it.
    pub fn inject(&self, sender: HandleId, origin: impl Into<Origin>, payload: Value) {
        self.deliver(sender, &origin.into(), payload);
    }

    fn deliver(&self, from: HandleId, origin: &Origin, payload: Value) {
        let endpoints = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(sender = %from, subscribers = endpoints.len(), "bus delivering payload");
        for endpoint in endpoints.iter().filter(|e| e.id != from) {
            // A dropped receiver just means that endpoint went away.
            let _ = endpoint.inbound.send(InboundMessage {
                payload: payload.clone(),
                sender: from,
                origin: origin.clone(),
            });
        }
    }
}

// ----------------------------------------------------------------------------
// Memory Endpoint
// ----------------------------------------------------------------------------

/// Outbound half of one attached endpoint.
pub struct MemoryEndpoint {
    bus: MemoryBus,
    id: HandleId,
    origin: Origin,
}

impl MemoryEndpoint {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

#[async_trait]
impl Transport for MemoryEndpoint {
    async fn post(&self, payload: Value, _destination: HandleId) -> Result<()> {
        // Broadcast medium: the destination hint is ignored and receivers
        // filter per link.
        self.bus.deliver(self.id, &self.origin, payload);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
