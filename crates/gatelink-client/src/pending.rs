//! Correlation-id table for in-flight requests.
//!
//! Each outstanding request owns one entry. Exactly one of `resolve` (a
//! matching response arrived), `expire` (the deadline elapsed, or the caller
//! cancelled), or `fail_all` (connection teardown) completes an entry;
//! whichever fires first removes it and the others become silent no-ops.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::GatewayError;

/// Terminal result of one request.
pub type Outcome = Result<Value, GatewayError>;

/// Table of in-flight requests keyed by correlation id.
#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, oneshot::Sender<Outcome>>>,
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight request and return the receiver its caller
    /// awaits. The id must not already be present; ids come from a monotonic
    /// counter so a collision means the counter was misused.
    pub fn register(&self, id: &str) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let previous = self.entries.lock().insert(id.to_string(), tx);
        if previous.is_some() {
            tracing::warn!(id, "pending entry overwritten, duplicate correlation id");
        }
        rx
    }

    /// Complete an entry with the given outcome.
    ///
    /// Returns true if an entry existed and was completed; false means the
    /// entry was already resolved, expired, or never registered.
    pub fn resolve(&self, id: &str, outcome: Outcome) -> bool {
        let Some(tx) = self.entries.lock().remove(id) else {
            return false;
        };
        // The caller may have dropped its receiver; completion is still
        // "delivered" for the at-most-once contract.
        let _ = tx.send(outcome);
        true
    }

    /// Remove an entry without completing it, after its waiter gave up
    /// (deadline elapsed or cancellation).
    ///
    /// Returns true if the entry was still present; false means a response
    /// won the race and the waiter should consult its receiver instead.
    pub fn expire(&self, id: &str) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    /// Fail every outstanding entry, used on connection teardown so no
    /// caller awaits indefinitely.
    pub fn fail_all(&self, mut make_error: impl FnMut() -> GatewayError) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            entries.drain().collect()
        };
        for (_, tx) in drained {
            let _ = tx.send(Err(make_error()));
        }
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no entries are outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_completes_the_waiter() {
        let table = PendingTable::new();
        let rx = table.register("1");
        assert!(table.resolve("1", Ok(json!({"n": 1}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"n": 1}));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn resolve_after_expire_is_a_noop() {
        let table = PendingTable::new();
        let _rx = table.register("1");
        assert!(table.expire("1"));
        assert!(!table.resolve("1", Ok(json!(null))));
    }

    #[tokio::test]
    async fn expire_after_resolve_is_a_noop() {
        let table = PendingTable::new();
        let rx = table.register("1");
        assert!(table.resolve("1", Ok(json!(null))));
        assert!(!table.expire("1"));
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn resolve_unknown_id_returns_false() {
        let table = PendingTable::new();
        assert!(!table.resolve("no_such", Ok(json!(null))));
    }

    #[tokio::test]
    async fn fail_all_completes_every_waiter_with_an_error() {
        let table = PendingTable::new();
        let rx1 = table.register("1");
        let rx2 = table.register("2");
        table.fail_all(|| GatewayError::Closed);

        assert_matches!(rx1.await.unwrap(), Err(GatewayError::Closed));
        assert_matches!(rx2.await.unwrap(), Err(GatewayError::Closed));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn resolve_with_dropped_receiver_still_removes_entry() {
        let table = PendingTable::new();
        let rx = table.register("1");
        drop(rx);
        assert!(table.resolve("1", Ok(json!(null))));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn len_tracks_outstanding_entries() {
        let table = PendingTable::new();
        assert_eq!(table.len(), 0);
        let _rx1 = table.register("1");
        let _rx2 = table.register("2");
        assert_eq!(table.len(), 2);
        let _ = table.expire("1");
        assert_eq!(table.len(), 1);
    }
}
