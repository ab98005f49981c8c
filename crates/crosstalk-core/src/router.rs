//! Inbound dispatch
//!
//! The [`Router`] owns the set of registered links and routes every message
//! arriving on the shared channel to the links that accept it. Acceptance is
//! gated per link in a fixed order: sender identity first, then origin, then
//! envelope tag and version. A message failing every link's gates is logged
//! and dropped; the channel keeps running.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::link::LinkState;
use crate::protocol::{Envelope, EnvelopeBody, RemoteError};
use crate::transport::{InboundMessage, InboundReceiver};
use crate::types::HandleId;

// ----------------------------------------------------------------------------
// Router
// ----------------------------------------------------------------------------

/// Routes inbound channel traffic to registered links.
///
/// Clones share the same link set, so one router can be handed to several
/// transports feeding the same inbound subscription.
#[derive(Clone, Default)]
pub struct Router {
    links: Arc<RwLock<Vec<Arc<LinkState>>>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered links
    pub fn link_count(&self) -> usize {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub(crate) fn register(&self, link: Arc<LinkState>) {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(link);
    }

    /// Spawn the dispatch loop over an inbound subscription.
    ///
    /// The task runs until the subscription closes. Command handling and
    /// event fan-out are spawned per message, so a slow handler never
    /// blocks dispatch of later traffic.
    pub fn spawn(&self, mut inbound: InboundReceiver) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                router.dispatch(message);
            }
            debug!("inbound subscription closed, router task exiting");
        })
    }

    /// Offer one inbound message to every registered link.
    pub(crate) fn dispatch(&self, message: InboundMessage) {
        let links: Vec<Arc<LinkState>> = self
            .links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut accepted = 0usize;
        for link in links {
            if !link.accepts_sender(message.sender) {
                continue;
            }
            if !link.accepts_origin(&message.origin) {
                debug!(
                    peer = %link.peer.id,
                    origin = %message.origin,
                    "discarding message from untrusted origin"
                );
                continue;
            }
            let Some(envelope) = Envelope::decode(&message.payload, &link.config.shared_tag)
            else {
                continue;
            };
            accepted += 1;
            self.route(link, message.sender, envelope.body);
        }

        if accepted == 0 {
            debug!(sender = %message.sender, "no link accepted inbound message");
        }
    }

    fn route(&self, link: Arc<LinkState>, sender: HandleId, body: EnvelopeBody) {
        match body {
            EnvelopeBody::CommandRequest { name, id, args } => {
                // Replies go back to whoever actually sent the request,
                // which may be an opener or parent rather than the peer.
                tokio::spawn(handle_command_request(link, sender, name, id, args));
            }
            EnvelopeBody::CommandResponse {
                name,
                id,
                success,
                response,
            } => {
                let outcome = if success {
                    Ok(response)
                } else {
                    Err(RemoteError::from_value(response))
                };
                if let Err(err) = link.locked_pending().settle(&id, outcome) {
                    warn!(command = %name, "dropping response with no pending call: {err}");
                }
            }
            EnvelopeBody::Event { name, args } => {
                tokio::spawn(fan_out_event(link, name, args));
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Command Handling
// ----------------------------------------------------------------------------

/// Run the handler for one command request and post exactly one response,
/// successful or not.
async fn handle_command_request(
    link: Arc<LinkState>,
    reply_to: HandleId,
    name: String,
    id: String,
    args: Vec<Value>,
) {
    let handler = link.locked_registry().command_handler(&name);

    let (success, response) = match handler {
        // The handler runs in its own task so a panic is caught at the
        // join and still produces exactly one response.
        Some(handler) => match tokio::spawn(handler(args)).await {
            Ok(Ok(value)) => (true, value),
            Ok(Err(remote)) => {
                error!(command = %name, "command handler failed: {remote}");
                (false, remote.to_value())
            }
            Err(join_err) => {
                error!(command = %name, "command handler panicked: {join_err}");
                let remote = RemoteError::new(
                    "InternalError",
                    format!("Command handler panicked: {name}"),
                );
                (false, remote.to_value())
            }
        },
        None => {
            error!(command = %name, "no handler registered for command");
            let remote = RemoteError::new("ReferenceError", format!("Invalid command: {name}"));
            (false, remote.to_value())
        }
    };

    let envelope = Envelope::new(
        &link.config.shared_tag,
        EnvelopeBody::CommandResponse {
            name: name.clone(),
            id,
            success,
            response,
        },
    );
    let payload = match envelope.encode() {
        Ok(payload) => payload,
        Err(err) => {
            error!(command = %name, "failed to encode command response: {err}");
            return;
        }
    };
    if let Err(err) = link.transport.post(payload, reply_to).await {
        error!(command = %name, "failed to post command response: {err}");
    }
}

// ----------------------------------------------------------------------------
// Event Fan-out
// ----------------------------------------------------------------------------

/// Notify every listener for `name`, in registration order. A failing
/// listener is logged and the remaining listeners still run.
async fn fan_out_event(link: Arc<LinkState>, name: String, args: Vec<Value>) {
    let listeners = link.locked_registry().event_listeners(&name);
    if listeners.is_empty() {
        debug!(event = %name, "no listeners for event");
        return;
    }
    for listener in listeners {
        if let Err(err) = listener(args.clone()).await {
            error!(event = %name, "event listener failed: {err}");
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::link::{LinkConfig, PeerLink};
    use crate::registry::{command_handler, event_listener};
    use crate::transport::Transport;
    use crate::types::{Origin, PeerHandle, DEFAULT_SHARED_TAG, PROTOCOL_VERSION};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct CaptureTransport {
        posts: Mutex<Vec<(Value, HandleId)>>,
    }

    impl CaptureTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                posts: Mutex::new(Vec::new()),
            })
        }

        fn posts(&self) -> Vec<(Value, HandleId)> {
            self.posts.lock().unwrap().clone()
        }

        async fn wait_for_post(&self) -> (Value, HandleId) {
            for _ in 0..200 {
                if let Some(entry) = self.posts().into_iter().next() {
                    return entry;
                }
                tokio::task::yield_now().await;
            }
            panic!("no payload was posted");
        }
    }

    #[async_trait]
    impl Transport for CaptureTransport {
        async fn post(&self, payload: Value, destination: HandleId) -> Result<()> {
            self.posts.lock().unwrap().push((payload, destination));
            Ok(())
        }
    }

    fn request(name: &str, id: &str, args: Value) -> Value {
        json!({
            "tag": DEFAULT_SHARED_TAG,
            "version": PROTOCOL_VERSION,
            "op": "command",
            "dir": "request",
            "name": name,
            "id": id,
            "args": args,
        })
    }

    fn inbound(payload: Value, sender: HandleId) -> InboundMessage {
        InboundMessage {
            payload,
            sender,
            origin: Origin::from("https://app.example"),
        }
    }

    #[tokio::test]
    async fn test_command_request_produces_success_response() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        link.add_command_handler(
            "math.add",
            command_handler(|args| async move {
                let sum = args.iter().filter_map(|v| v.as_i64()).sum::<i64>();
                Ok(json!(sum))
            }),
        )
        .unwrap();

        router.dispatch(inbound(request("math.add", "1-0", json!([1, 2, 3])), peer.id));

        let (payload, destination) = transport.wait_for_post().await;
        assert_eq!(destination, peer.id);
        assert_eq!(payload["dir"], "response");
        assert_eq!(payload["id"], "1-0");
        assert_eq!(payload["success"], true);
        assert_eq!(payload["response"], json!(6));
    }

    #[tokio::test]
    async fn test_missing_handler_produces_error_response() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let _link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        router.dispatch(inbound(request("no.such.command", "1-1", json!([])), peer.id));

        let (payload, _) = transport.wait_for_post().await;
        assert_eq!(payload["success"], false);
        assert_eq!(payload["response"]["name"], "ReferenceError");
        assert_eq!(
            payload["response"]["message"],
            "Invalid command: no.such.command"
        );
    }

    #[tokio::test]
    async fn test_panicking_handler_still_produces_error_response() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        link.add_command_handler(
            "explodes",
            command_handler(|_args| async { panic!("handler bug") }),
        )
        .unwrap();

        router.dispatch(inbound(request("explodes", "1-9", json!([])), peer.id));

        let (payload, _) = transport.wait_for_post().await;
        assert_eq!(payload["id"], "1-9");
        assert_eq!(payload["success"], false);
        assert_eq!(payload["response"]["name"], "InternalError");
        assert_eq!(
            payload["response"]["message"],
            "Command handler panicked: explodes"
        );
    }

    #[tokio::test]
    async fn test_unknown_sender_is_ignored() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let _link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        let stranger = HandleId::new();
        router.dispatch(inbound(request("math.add", "1-2", json!([])), stranger));

        tokio::task::yield_now().await;
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn test_pinned_origin_rejects_other_origins() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let config = LinkConfig::default().with_trusted_origin("https://app.example");
        let _link = PeerLink::new(&router, transport.clone(), peer, config);

        router.dispatch(InboundMessage {
            payload: request("math.add", "1-3", json!([])),
            sender: peer.id,
            origin: Origin::from("https://evil.example"),
        });

        tokio::task::yield_now().await;
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn test_version_mismatch_is_discarded() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let _link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        let mut payload = request("math.add", "1-4", json!([]));
        payload["version"] = json!(PROTOCOL_VERSION + 1);
        router.dispatch(inbound(payload, peer.id));

        tokio::task::yield_now().await;
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn test_forged_response_with_unknown_id_is_dropped() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let _link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        let payload = json!({
            "tag": DEFAULT_SHARED_TAG,
            "version": PROTOCOL_VERSION,
            "op": "command",
            "dir": "response",
            "name": "math.add",
            "id": "999-999",
            "success": true,
            "response": json!(6),
        });
        // Dropped with a warning; nothing else happens.
        router.dispatch(inbound(payload, peer.id));

        tokio::task::yield_now().await;
        assert!(transport.posts().is_empty());
    }

    #[tokio::test]
    async fn test_event_fans_out_in_registration_order() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = order.clone();
            link.add_event_listener(
                "tick",
                event_listener(move |_args| {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(label);
                        Ok(())
                    }
                }),
            );
        }

        let payload = json!({
            "tag": DEFAULT_SHARED_TAG,
            "version": PROTOCOL_VERSION,
            "op": "event",
            "name": "tick",
            "args": json!([]),
        });
        router.dispatch(inbound(payload, peer.id));

        for _ in 0..200 {
            if order.lock().unwrap().len() == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_fanout() {
        let router = Router::new();
        let transport = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());
        let link = PeerLink::new(&router, transport.clone(), peer, LinkConfig::default());

        let reached = Arc::new(Mutex::new(false));
        link.add_event_listener(
            "tick",
            event_listener(|_args| async { Err(RemoteError::new("Error", "listener exploded")) }),
        );
        let flag = reached.clone();
        link.add_event_listener(
            "tick",
            event_listener(move |_args| {
                let flag = flag.clone();
                async move {
                    *flag.lock().unwrap() = true;
                    Ok(())
                }
            }),
        );

        let payload = json!({
            "tag": DEFAULT_SHARED_TAG,
            "version": PROTOCOL_VERSION,
            "op": "event",
            "name": "tick",
            "args": json!([]),
        });
        router.dispatch(inbound(payload, peer.id));

        for _ in 0..200 {
            if *reached.lock().unwrap() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn test_multiple_links_with_distinct_tags_do_not_cross() {
        let router = Router::new();
        let transport_a = CaptureTransport::new();
        let transport_b = CaptureTransport::new();
        let peer = PeerHandle::new(HandleId::new());

        let link_a = PeerLink::new(
            &router,
            transport_a.clone(),
            peer,
            LinkConfig::default().with_shared_tag("channel-a"),
        );
        let _link_b = PeerLink::new(
            &router,
            transport_b.clone(),
            peer,
            LinkConfig::default().with_shared_tag("channel-b"),
        );
        link_a
            .add_command_handler("ping", command_handler(|_args| async { Ok(json!("pong")) }))
            .unwrap();

        let mut payload = request("ping", "1-5", json!([]));
        payload["tag"] = json!("channel-a");
        router.dispatch(inbound(payload, peer.id));

        let (response, _) = transport_a.wait_for_post().await;
        assert_eq!(response["response"], json!("pong"));
        assert!(transport_b.posts().is_empty());
    }
}
