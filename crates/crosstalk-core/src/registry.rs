//! Per-link tables of named command handlers and event listeners
//!
//! Handlers and listeners are type-erased async callables over JSON argument
//! sequences; the `Arc` they live in doubles as their identity for listener
//! removal.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::{CrosstalkError, Result};
use crate::protocol::RemoteError;

// ----------------------------------------------------------------------------
// Handler Types
// ----------------------------------------------------------------------------

/// Type-erased async command handler
pub type CommandHandler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, std::result::Result<Value, RemoteError>> + Send + Sync>;

/// Type-erased async event listener
pub type EventListener =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, std::result::Result<(), RemoteError>> + Send + Sync>;

/// Wrap an async closure as a [`CommandHandler`]
pub fn command_handler<F, Fut>(handler: F) -> CommandHandler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Value, RemoteError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(handler(args)))
}

/// Wrap an async closure as an [`EventListener`]
pub fn event_listener<F, Fut>(listener: F) -> EventListener
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), RemoteError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(listener(args)))
}

// ----------------------------------------------------------------------------
// Handler Registry
// ----------------------------------------------------------------------------

/// Named command handlers plus named event-listener lists for one link
#[derive(Default)]
pub struct HandlerRegistry {
    commands: HashMap<String, CommandHandler>,
    listeners: HashMap<String, Vec<EventListener>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command handler; each name may be registered once.
    pub fn add_command_handler(
        &mut self,
        name: impl Into<String>,
        handler: CommandHandler,
    ) -> Result<()> {
        let name = name.into();
        if self.commands.contains_key(&name) {
            return Err(CrosstalkError::DuplicateHandler { name });
        }
        self.commands.insert(name, handler);
        Ok(())
    }

    /// Remove a command handler; absent names are a no-op.
    pub fn remove_command_handler(&mut self, name: &str) {
        self.commands.remove(name);
    }

    /// Look up the handler registered under `name`
    pub fn command_handler(&self, name: &str) -> Option<CommandHandler> {
        self.commands.get(name).cloned()
    }

    /// Append an event listener. Duplicates are allowed; fan-out preserves
    /// insertion order.
    pub fn add_event_listener(&mut self, name: impl Into<String>, listener: EventListener) {
        self.listeners.entry(name.into()).or_default().push(listener);
    }

    /// Remove every listener identity-equal to `listener`. Removal for a
    /// name that was never registered is a safe no-op.
    pub fn remove_event_listener(&mut self, name: &str, listener: &EventListener) {
        if let Some(list) = self.listeners.get_mut(name) {
            list.retain(|registered| !Arc::ptr_eq(registered, listener));
            if list.is_empty() {
                self.listeners.remove(name);
            }
        }
    }

    /// Listeners for `name`, in insertion order
    pub fn event_listeners(&self, name: &str) -> Vec<EventListener> {
        self.listeners.get(name).cloned().unwrap_or_default()
    }

    /// Names of all registered commands
    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    /// Names of all event-listener lists
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners.keys().cloned().collect()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
