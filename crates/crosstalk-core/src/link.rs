//! Per-peer link facade
//!
//! A [`PeerLink`] binds one peer endpoint to a transport and a set of
//! handlers, and is the application-facing surface for invoking commands
//! and triggering events. All inbound traffic for the link is delivered by
//! the [`crate::Router`] it registers with.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;

use crate::errors::{CrosstalkError, Result};
use crate::pending::PendingCalls;
use crate::protocol::{Envelope, EnvelopeBody};
use crate::registry::{command_handler, CommandHandler, EventListener, HandlerRegistry};
use crate::router::Router;
use crate::transport::Transport;
use crate::types::{HandleId, Origin, PeerHandle, DEFAULT_SHARED_TAG};

// ----------------------------------------------------------------------------
// Discovery Commands
// ----------------------------------------------------------------------------

/// Built-in command answering with the link's registered command names.
pub const GET_COMMANDS_COMMAND: &str = "crosstalk.get-commands";

/// Built-in command answering with the link's registered event names.
pub const GET_LISTENERS_COMMAND: &str = "crosstalk.get-listeners";

// ----------------------------------------------------------------------------
// Link Configuration
// ----------------------------------------------------------------------------

/// Trust and framing settings for one link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Shared-secret tag stamped on outbound envelopes and required on
    /// inbound ones
    pub shared_tag: String,
    /// When set, inbound messages must carry exactly this origin
    pub trusted_origin: Option<Origin>,
    /// Also trust messages sent by the peer's opener
    pub accept_opener: bool,
    /// Also trust messages sent by the peer's parent
    pub accept_parent: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            shared_tag: DEFAULT_SHARED_TAG.to_string(),
            trusted_origin: None,
            accept_opener: false,
            accept_parent: false,
        }
    }
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the shared tag, isolating this link from others on the
    /// same physical channel
    pub fn with_shared_tag(mut self, tag: impl Into<String>) -> Self {
        self.shared_tag = tag.into();
        self
    }

    /// Pin a trusted origin; inbound messages from any other origin are
    /// discarded
    pub fn with_trusted_origin(mut self, origin: impl Into<Origin>) -> Self {
        self.trusted_origin = Some(origin.into());
        self
    }

    /// Accept messages from the peer's opener as well
    pub fn with_accept_opener(mut self) -> Self {
        self.accept_opener = true;
        self
    }

    /// Accept messages from the peer's parent as well
    pub fn with_accept_parent(mut self) -> Self {
        self.accept_parent = true;
        self
    }
}

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Shared state behind one link, reachable from both the facade and the
/// router's dispatch path.
pub(crate) struct LinkState {
    pub(crate) peer: PeerHandle,
    pub(crate) config: LinkConfig,
    pub(crate) transport: Arc<dyn Transport>,
    registry: Mutex<HandlerRegistry>,
    pending: Mutex<PendingCalls>,
}

impl LinkState {
    /// Lock the handler registry. Poisoning is not treated as fatal; the
    /// registry holds no invariants that a panicked writer could break.
    pub(crate) fn locked_registry(&self) -> MutexGuard<'_, HandlerRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the pending-call table
    pub(crate) fn locked_pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// First trust gate: does this link accept traffic from `sender`?
    pub(crate) fn accepts_sender(&self, sender: HandleId) -> bool {
        sender == self.peer.id
            || (self.config.accept_opener && self.peer.opener == Some(sender))
            || (self.config.accept_parent && self.peer.parent == Some(sender))
    }

    /// Second trust gate: does this link accept traffic from `origin`?
    pub(crate) fn accepts_origin(&self, origin: &Origin) -> bool {
        match &self.config.trusted_origin {
            Some(trusted) => trusted == origin,
            None => true,
        }
    }
}

// ----------------------------------------------------------------------------
// Peer Link
// ----------------------------------------------------------------------------

/// Application-facing handle for one peer over the shared channel.
///
/// Cloning is cheap and clones share the same handlers and pending calls.
#[derive(Clone)]
pub struct PeerLink {
    state: Arc<LinkState>,
}

impl PeerLink {
    /// Create a link to `peer` over `transport` and register it with
    /// `router` for inbound dispatch.
    ///
    /// The discovery commands [`GET_COMMANDS_COMMAND`] and
    /// [`GET_LISTENERS_COMMAND`] are pre-registered so either side can
    /// enumerate what the other exposes.
    pub fn new(
        router: &Router,
        transport: Arc<dyn Transport>,
        peer: PeerHandle,
        config: LinkConfig,
    ) -> Self {
        let state = Arc::new(LinkState {
            peer,
            config,
            transport,
            registry: Mutex::new(HandlerRegistry::new()),
            pending: Mutex::new(PendingCalls::new()),
        });

        register_discovery_commands(&state);
        router.register(state.clone());

        Self { state }
    }

    /// Identity and relations of the peer this link talks to
    pub fn peer(&self) -> PeerHandle {
        self.state.peer
    }

    /// The link's trust and framing settings
    pub fn config(&self) -> LinkConfig {
        self.state.config.clone()
    }

    // ---- Commands ----

    /// Invoke a named command on the peer and suspend until it settles.
    ///
    /// There is no built-in deadline; callers that need one wrap the
    /// returned future in `tokio::time::timeout`.
    pub async fn invoke_command(&self, name: impl Into<String>, args: Vec<Value>) -> Result<Value> {
        self.invoke_command_to(self.state.peer.id, name, args).await
    }

    /// Invoke a named command, addressing the request to an explicit
    /// destination such as the peer's opener or parent.
    pub async fn invoke_command_to(
        &self,
        destination: HandleId,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Value> {
        let name = name.into();
        let (id, receiver) = self.state.locked_pending().create();

        let envelope = Envelope::new(
            &self.state.config.shared_tag,
            EnvelopeBody::CommandRequest {
                name: name.clone(),
                id: id.clone(),
                args,
            },
        );

        // A call that never left the process must not linger in the table.
        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(err) => {
                self.state.locked_pending().discard(&id);
                return Err(err.into());
            }
        };
        if let Err(err) = self.state.transport.post(payload, destination).await {
            self.state.locked_pending().discard(&id);
            return Err(err);
        }

        match receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(remote)) => Err(remote.into()),
            Err(_) => Err(CrosstalkError::LinkClosed { name }),
        }
    }

    // ---- Events ----

    /// Fire a named event at the peer. Completes once the transport has
    /// accepted the payload; no reply is expected.
    pub async fn trigger_event(&self, name: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.trigger_event_to(self.state.peer.id, name, args).await
    }

    /// Fire a named event toward an explicit destination.
    pub async fn trigger_event_to(
        &self,
        destination: HandleId,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<()> {
        let envelope = Envelope::new(
            &self.state.config.shared_tag,
            EnvelopeBody::Event {
                name: name.into(),
                args,
            },
        );
        let payload = envelope.encode()?;
        self.state.transport.post(payload, destination).await
    }

    // ---- Registration ----

    /// Register a command handler. Fails if the name is already taken.
    pub fn add_command_handler(
        &self,
        name: impl Into<String>,
        handler: CommandHandler,
    ) -> Result<()> {
        self.state.locked_registry().add_command_handler(name, handler)
    }

    /// Remove a command handler; removing an unregistered name is a no-op
    pub fn remove_command_handler(&self, name: &str) {
        self.state.locked_registry().remove_command_handler(name);
    }

    /// Append an event listener for `name`
    pub fn add_event_listener(&self, name: impl Into<String>, listener: EventListener) {
        self.state.locked_registry().add_event_listener(name, listener);
    }

    /// Remove a previously added listener by identity; unknown listeners
    /// and names are a safe no-op
    pub fn remove_event_listener(&self, name: &str, listener: &EventListener) {
        self.state.locked_registry().remove_event_listener(name, listener);
    }

    /// Names of all registered commands, discovery commands included
    pub fn command_names(&self) -> Vec<String> {
        let mut names = self.state.locked_registry().command_names();
        names.sort();
        names
    }

    /// Names of all event names with at least one listener
    pub fn listener_names(&self) -> Vec<String> {
        let mut names = self.state.locked_registry().listener_names();
        names.sort();
        names
    }
}

/// Install the discovery commands on a freshly built link.
///
/// Handlers hold a `Weak` back-reference so the registry never keeps its
/// own link alive.
fn register_discovery_commands(state: &Arc<LinkState>) {
    let weak: Weak<LinkState> = Arc::downgrade(state);
    let mut registry = state.locked_registry();

    let commands_ref = weak.clone();
    let _ = registry.add_command_handler(
        GET_COMMANDS_COMMAND,
        command_handler(move |_args| {
            let state = commands_ref.clone();
            async move {
                let mut names = state
                    .upgrade()
                    .map(|state| state.locked_registry().command_names())
                    .unwrap_or_default();
                names.sort();
                Ok(Value::from(names))
            }
        }),
    );

    let listeners_ref = weak;
    let _ = registry.add_command_handler(
        GET_LISTENERS_COMMAND,
        command_handler(move |_args| {
            let state = listeners_ref.clone();
            async move {
                let mut names = state
                    .upgrade()
                    .map(|state| state.locked_registry().listener_names())
                    .unwrap_or_default();
                names.sort();
                Ok(Value::from(names))
            }
        }),
    );
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
