//! Two peers on an in-memory bus: register a command and a listener on one
//! side, invoke and trigger from the other.
//!
//! Run with: cargo run --example basic_usage

use std::time::Duration;

use serde_json::json;

use crosstalk_core::{
    command_handler, event_listener, HandleId, LinkConfig, PeerHandle, PeerLink, Router,
};
use crosstalk_harness::MemoryBus;

#[tokio::main]
async fn main() -> crosstalk_core::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let bus = MemoryBus::new();
    let alice = HandleId::new();
    let bob = HandleId::new();

    // Each side attaches to the bus, spawns a router over its inbound
    // subscription, and opens a link toward the other.
    let (alice_endpoint, alice_inbound) = bus.attach(alice, "https://alice.example");
    let alice_router = Router::new();
    let _alice_dispatch = alice_router.spawn(alice_inbound);
    let alice_link = PeerLink::new(
        &alice_router,
        alice_endpoint,
        PeerHandle::new(bob),
        LinkConfig::default(),
    );

    let (bob_endpoint, bob_inbound) = bus.attach(bob, "https://bob.example");
    let bob_router = Router::new();
    let _bob_dispatch = bob_router.spawn(bob_inbound);
    let bob_link = PeerLink::new(
        &bob_router,
        bob_endpoint,
        PeerHandle::new(alice),
        LinkConfig::default(),
    );

    // Bob serves a command and listens for an event.
    bob_link.add_command_handler(
        "greet",
        command_handler(|args| async move {
            let who = args
                .first()
                .and_then(|v| v.as_str())
                .unwrap_or("stranger")
                .to_string();
            Ok(json!(format!("hello, {who}")))
        }),
    )?;
    bob_link.add_event_listener(
        "status.changed",
        event_listener(|args| async move {
            println!("bob saw status change: {args:?}");
            Ok(())
        }),
    );

    // Alice calls across the channel and fires an event.
    let greeting = alice_link
        .invoke_command("greet", vec![json!("alice")])
        .await?;
    println!("alice received: {greeting}");

    alice_link
        .trigger_event("status.changed", vec![json!({"online": true})])
        .await?;

    // Discovery: ask bob what he exposes.
    let commands = alice_link
        .invoke_command(crosstalk_core::GET_COMMANDS_COMMAND, vec![])
        .await?;
    println!("bob's commands: {commands}");

    // Let the event fan-out land before exiting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Ok(())
}
