//! Session registry (spec.md §4.3, §9 "Global mutable state")
//!
//! Grounded on the teacher's `SessionRegistry`
//! (`application/charging/session/registry.rs`): a single `DashMap` keyed by
//! station id, swapped atomically on reconnect. Dropped relative to the
//! teacher: the 5-second reconnect debounce and its `RegisterResult::Debounced`
//! outcome — spec.md §4.3 calls for an unconditional evict-and-replace, so
//! only `New`/`Evicted` remain.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::gauge;
use serde_json::Value;

use crate::pipeline::OutboundDispatch;
use crate::session::outbound::OutboundQueue;
use crate::session::watchdog::WatchdogHandle;
use crate::session::Connection;
use crate::support::errors::{DomainError, DomainResult};

/// Everything the registry needs to hold about one live station.
pub struct SessionHandle {
    pub charge_point_id: String,
    pub connection: Connection,
    pub outbound: OutboundQueue,
    pub watchdog: WatchdogHandle,
}

/// A session that was just displaced by a reconnect, so the caller can
/// close its transport (spec.md §4.3 "the old connection is closed, never
/// the new one").
pub struct EvictedSession {
    pub handle: Arc<SessionHandle>,
}

impl EvictedSession {
    pub fn charge_point_id(&self) -> &str {
        &self.handle.charge_point_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.handle.connection.connected_at
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.handle.connection.remote_addr.as_deref()
    }
}

pub enum RegisterResult {
    New,
    Evicted(EvictedSession),
}

/// Single-writer map from station id to its live session. `register` always
/// wins over whatever was there before; the previous entry, if any, comes
/// back out so the caller can close it.
pub struct Registry {
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    pub fn register(&self, handle: Arc<SessionHandle>) -> RegisterResult {
        let id = handle.charge_point_id.clone();
        let previous = self.sessions.insert(id, handle);
        gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);
        match previous {
            Some(old) => RegisterResult::Evicted(EvictedSession { handle: old }),
            None => RegisterResult::New,
        }
    }

    /// Removes the entry for `charge_point_id` only if it is still the exact
    /// session the caller holds — a session that lost a reconnect race must
    /// not delete the session that replaced it. Returns whether this handle
    /// was in fact the current entry (and so was removed): callers use this
    /// to guard any bookkeeping (ChargePoint `is_connected`, disconnect
    /// metrics) that must likewise never be clobbered by the loser of a
    /// reconnect race (spec.md §4.3).
    pub fn unregister(&self, charge_point_id: &str, handle: &Arc<SessionHandle>) -> bool {
        if let Some(entry) = self.sessions.get(charge_point_id) {
            if !Arc::ptr_eq(entry.value(), handle) {
                return false;
            }
        } else {
            return false;
        }
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, current| Arc::ptr_eq(current, handle))
            .is_some();
        gauge!("ocpp_connected_stations").set(self.sessions.len() as f64);
        removed
    }

    pub fn get(&self, charge_point_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(charge_point_id).map(|entry| entry.value().clone())
    }

    pub fn is_connected(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }

    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry is the implementor of `OutboundDispatch`: it resolves a
/// station id to its live session's outbound queue, so a central-initiated
/// call (e.g. AutoRemoteStart) goes through the same delay/single-flight/
/// reply-await path as any other outbound command.
#[async_trait]
impl OutboundDispatch for Registry {
    async fn dispatch(&self, charge_point_id: &str, action: &str, payload: Value) -> DomainResult<Value> {
        let handle = self
            .get(charge_point_id)
            .ok_or_else(|| DomainError::ChargePointOffline(charge_point_id.to_string()))?;
        handle.outbound.enqueue_and_await(action, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::outbound::OutboundQueue;
    use crate::observer::ObserverBus;
    use crate::store::InMemoryStore;
    use crate::support::shutdown::ShutdownSignal;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn handle(charge_point_id: &str) -> Arc<SessionHandle> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection = Connection::new(charge_point_id, None, tx, Utc::now());
        let store: Arc<dyn crate::store::Store> = Arc::new(InMemoryStore::new());
        let outbound = OutboundQueue::spawn(
            charge_point_id.to_string(),
            connection.clone(),
            store,
            ObserverBus::new(),
            Duration::from_millis(0),
            Duration::from_secs(5),
            ShutdownSignal::new(),
        );
        let watchdog = crate::session::watchdog::spawn(
            charge_point_id.to_string(),
            connection.clone(),
            Duration::from_secs(300),
            ShutdownSignal::new(),
        );
        Arc::new(SessionHandle {
            charge_point_id: charge_point_id.to_string(),
            connection,
            outbound,
            watchdog,
        })
    }

    #[tokio::test]
    async fn first_registration_is_new() {
        let registry = Registry::new();
        assert!(matches!(registry.register(handle("CP1")), RegisterResult::New));
    }

    #[tokio::test]
    async fn reconnect_evicts_the_previous_session() {
        let registry = Registry::new();
        let first = handle("CP1");
        registry.register(first.clone());

        let second = handle("CP1");
        match registry.register(second.clone()) {
            RegisterResult::Evicted(evicted) => assert!(Arc::ptr_eq(&evicted.handle, &first)),
            RegisterResult::New => panic!("expected the first session to be evicted"),
        }
        assert!(Arc::ptr_eq(&registry.get("CP1").unwrap(), &second));
    }

    #[tokio::test]
    async fn losing_session_unregister_does_not_clobber_the_winner() {
        let registry = Registry::new();
        let first = handle("CP1");
        registry.register(first.clone());
        let second = handle("CP1");
        registry.register(second.clone());

        // The evicted session's cleanup runs after it has already lost the
        // race; it must not remove the entry that replaced it.
        registry.unregister("CP1", &first);
        assert!(Arc::ptr_eq(&registry.get("CP1").unwrap(), &second));

        registry.unregister("CP1", &second);
        assert!(registry.get("CP1").is_none());
    }
}
