//! Outstanding-call table keyed by correlation id
//!
//! Interleaved handling makes order-based correlation unsafe, so every call
//! carries an id unique for the lifetime of the issuing link. Settlement
//! removes the entry in the same step that completes it, guaranteeing
//! at-most-once resolution per id.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::{CrosstalkError, Result};
use crate::protocol::RemoteError;

/// Settlement delivered to a waiting caller
pub type CallOutcome = std::result::Result<Value, RemoteError>;

/// Map from correlation id to the completion handle of an outstanding call
#[derive(Default)]
pub struct PendingCalls {
    entries: HashMap<String, oneshot::Sender<CallOutcome>>,
    next_seq: u64,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a correlation id and a receiver that resolves on settlement.
    ///
    /// Ids combine a millisecond timestamp with a monotonic counter; the
    /// counter alone guarantees uniqueness within this table.
    pub fn create(&mut self) -> (String, oneshot::Receiver<CallOutcome>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        let id = format!("{millis}-{seq}");

        let (sender, receiver) = oneshot::channel();
        self.entries.insert(id.clone(), sender);
        (id, receiver)
    }

    /// Settle the call registered under `id`, removing the entry atomically
    /// with completion. A second settlement for the same id reports
    /// [`CrosstalkError::UnknownCorrelation`] and has no other effect.
    pub fn settle(&mut self, id: &str, outcome: CallOutcome) -> Result<()> {
        let sender = self
            .entries
            .remove(id)
            .ok_or_else(|| CrosstalkError::UnknownCorrelation { id: id.to_string() })?;
        // The caller may have stopped waiting; that only discards the outcome.
        let _ = sender.send(outcome);
        Ok(())
    }

    /// Drop the entry for `id` without settling, e.g. when the request
    /// envelope never left this side.
    pub fn discard(&mut self, id: &str) {
        self.entries.remove(id);
    }

    /// Number of calls still awaiting a response
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_settle_resolves_the_receiver() {
        let mut pending = PendingCalls::new();
        let (id, receiver) = pending.create();

        pending.settle(&id, Ok(json!("done"))).unwrap();
        assert!(pending.is_empty());

        let outcome = receiver.await.unwrap();
        assert_eq!(outcome.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_settlement_is_at_most_once() {
        let mut pending = PendingCalls::new();
        let (id, _receiver) = pending.create();

        pending.settle(&id, Ok(json!(1))).unwrap();
        let second = pending.settle(&id, Ok(json!(2)));
        assert!(matches!(
            second,
            Err(CrosstalkError::UnknownCorrelation { id: ref unknown }) if *unknown == id
        ));
    }

    #[test]
    fn test_unknown_id_is_reported() {
        let mut pending = PendingCalls::new();
        let result = pending.settle("never-issued", Ok(json!(null)));
        assert!(matches!(
            result,
            Err(CrosstalkError::UnknownCorrelation { .. })
        ));
    }

    #[test]
    fn test_ids_are_unique_per_table() {
        let mut pending = PendingCalls::new();
        let (a, _ra) = pending.create();
        let (b, _rb) = pending.create();
        assert_ne!(a, b);
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_carries_the_remote_failure() {
        let mut pending = PendingCalls::new();
        let (id, receiver) = pending.create();

        pending
            .settle(&id, Err(RemoteError::new("TypeError", "boom")))
            .unwrap();
        let outcome = receiver.await.unwrap();
        let err = outcome.unwrap_err();
        assert_eq!(err.name(), "TypeError");
        assert_eq!(err.message(), "boom");
    }

    #[tokio::test]
    async fn test_discard_leaves_receiver_unresolved() {
        let mut pending = PendingCalls::new();
        let (id, receiver) = pending.create();

        pending.discard(&id);
        assert!(pending.is_empty());
        // The sender side is gone, so the receiver errors instead of hanging.
        assert!(receiver.await.is_err());
    }
}
