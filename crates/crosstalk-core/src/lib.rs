//! # crosstalk-core
//!
//! Duplex RPC and event notification over an async, unreliable, shared
//! message channel.
//!
//! The crate separates three concerns:
//!
//! - **Protocol**: a versioned, tag-gated envelope codec and an error
//!   marshaller that carries failures across the channel as plain data
//!   ([`protocol`])
//! - **Correlation**: a pending-call table pairing command responses with
//!   suspended callers at most once ([`PendingCalls`])
//! - **Dispatch**: a [`Router`] that filters inbound traffic per link by
//!   sender, origin, and tag, and a [`PeerLink`] facade applications use
//!   to invoke commands, trigger events, and register handlers
//!
//! Transports are pluggable through the [`Transport`] trait plus an inbound
//! subscription channel; the engine assumes nothing about delivery or
//! ordering. See `crosstalk-harness` for an in-memory transport and
//! end-to-end examples.
//!
//! ```no_run
//! use std::sync::Arc;
//! use crosstalk_core::{
//!     command_handler, create_inbound_channel, LinkConfig, PeerHandle, PeerLink, Router,
//! };
//! # use crosstalk_core::Transport;
//! # async fn demo(transport: Arc<dyn Transport>, peer: PeerHandle) -> crosstalk_core::Result<()> {
//! let router = Router::new();
//! let (_inbound_tx, inbound_rx) = create_inbound_channel();
//! let _router_task = router.spawn(inbound_rx);
//!
//! let link = PeerLink::new(&router, transport, peer, LinkConfig::default());
//! link.add_command_handler(
//!     "ping",
//!     command_handler(|_args| async { Ok(serde_json::json!("pong")) }),
//! )?;
//! let reply = link.invoke_command("status", vec![]).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod link;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod transport;
pub mod types;

pub use errors::{CrosstalkError, Result};
pub use link::{LinkConfig, PeerLink, GET_COMMANDS_COMMAND, GET_LISTENERS_COMMAND};
pub use pending::{CallOutcome, PendingCalls};
pub use protocol::{Envelope, EnvelopeBody, ErrorRecord, RemoteError};
pub use registry::{command_handler, event_listener, CommandHandler, EventListener, HandlerRegistry};
pub use router::Router;
pub use transport::{
    create_inbound_channel, InboundMessage, InboundReceiver, InboundSender, Transport,
};
pub use types::{HandleId, Origin, PeerHandle, DEFAULT_SHARED_TAG, PROTOCOL_VERSION};
