//! Per-station outbound command queue (spec.md §4.3, §5)
//!
//! Grounded on the waiter-map correlation pattern of `CommandSender`
//! (`application/commands/mod.rs` in the teacher): a `DashMap` of pending
//! replies keyed by `unique_id`, resolved either by an inbound CallResult/
//! CallError or by a timeout. Extended beyond that pattern with the two
//! properties spec.md §5 requires that `CommandSender` does not have:
//! a minimum delay before each send, and single-flight (the next queued
//! call isn't sent until the previous one's reply — or timeout — lands).
//! That ordering falls directly out of running the queue as one
//! sequential consumer loop rather than spawning a task per command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::domain::Message;
use crate::observer::{DomainEvent, ObserverBus};
use crate::session::connection::Connection;
use crate::store::Store;
use crate::support::errors::{Actor, DomainError, DomainResult};
use crate::support::ocpp_frame::OcppFrame;
use crate::support::shutdown::ShutdownSignal;

struct QueuedCall {
    action: String,
    payload: Value,
    completion: oneshot::Sender<DomainResult<Value>>,
}

/// Handle to a running station's outbound queue. Cheap to clone; the actual
/// consumer loop lives in the spawned task owned by `spawn`.
#[derive(Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<QueuedCall>,
    waiters: Arc<DashMap<String, oneshot::Sender<DomainResult<Value>>>>,
    counter: Arc<AtomicU64>,
}

impl OutboundQueue {
    /// Spawns the consumer loop and returns a handle to it. `delay` is the
    /// minimum gap observed before each send; `reply_timeout` bounds how
    /// long the loop waits for a correlated reply before giving up.
    pub fn spawn(
        charge_point_id: String,
        connection: Connection,
        store: Arc<dyn Store>,
        observer: ObserverBus,
        delay: Duration,
        reply_timeout: Duration,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedCall>();
        let waiters: Arc<DashMap<String, oneshot::Sender<DomainResult<Value>>>> = Arc::new(DashMap::new());
        let counter = Arc::new(AtomicU64::new(0));

        let loop_waiters = waiters.clone();
        let loop_counter = counter.clone();
        tokio::spawn(async move {
            loop {
                let call = tokio::select! {
                    biased;
                    _ = shutdown.notified().wait() => break,
                    maybe_call = rx.recv() => match maybe_call {
                        Some(call) => call,
                        None => break,
                    },
                };

                tokio::time::sleep(delay).await;

                let unique_id = format!("CS-{}", loop_counter.fetch_add(1, Ordering::SeqCst));
                let (waiter_tx, waiter_rx) = oneshot::channel();
                loop_waiters.insert(unique_id.clone(), waiter_tx);

                let now = Utc::now();
                let frame = OcppFrame::Call {
                    unique_id: unique_id.clone(),
                    action: call.action.clone(),
                    payload: call.payload.clone(),
                };
                let record = Message::call(
                    charge_point_id.clone(),
                    Actor::CentralSystem,
                    unique_id.clone(),
                    call.action.clone(),
                    call.payload.clone(),
                    now,
                );
                if let Err(err) = store.insert_message(record).await {
                    warn!(charge_point_id = %charge_point_id, error = %err, "failed to record outbound call");
                }
                observer.publish(DomainEvent::Frame {
                    charge_point_id: charge_point_id.clone(),
                    dir: crate::observer::Direction::Send,
                    msg: serde_json::json!([2, unique_id, call.action, call.payload]),
                    remote_addr: connection.remote_addr.clone(),
                    at: now,
                });

                if connection.send(frame.serialize()).is_err() {
                    loop_waiters.remove(&unique_id);
                    let _ = call.completion.send(Err(DomainError::ChargePointOffline(charge_point_id.clone())));
                    continue;
                }

                match tokio::time::timeout(reply_timeout, waiter_rx).await {
                    Ok(Ok(result)) => {
                        let _ = call.completion.send(result);
                    }
                    Ok(Err(_)) => {
                        let _ = call.completion.send(Err(DomainError::Other("outbound waiter dropped".into())));
                    }
                    Err(_) => {
                        loop_waiters.remove(&unique_id);
                        observer.publish(DomainEvent::OutboundCallTimeout {
                            charge_point_id: charge_point_id.clone(),
                            action: call.action.clone(),
                        });
                        let _ = call.completion.send(Err(DomainError::CommandTimeout(call.action.clone())));
                    }
                }
            }
        });

        Self { tx, waiters, counter }
    }

    /// Enqueues a call and awaits its reply (or timeout). Single-flight is
    /// enforced by the consumer loop, not here: many callers may enqueue
    /// concurrently, but only one call is ever on the wire at a time.
    pub async fn enqueue_and_await(&self, action: impl Into<String>, payload: Value) -> DomainResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(QueuedCall {
                action: action.into(),
                payload,
                completion: tx,
            })
            .map_err(|_| DomainError::Other("outbound queue closed".into()))?;
        rx.await.map_err(|_| DomainError::Other("outbound queue dropped the call".into()))?
    }

    /// Resolves a pending waiter with the result of an inbound CallResult or
    /// CallError. Returns `false` if no waiter was found (unknown or already
    /// timed-out unique_id), in which case the caller should log and drop
    /// (spec.md §7).
    pub fn resolve(&self, unique_id: &str, result: DomainResult<Value>) -> bool {
        match self.waiters.remove(unique_id) {
            Some((_, waiter)) => {
                let _ = waiter.send(result);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ObserverBus;
    use crate::session::connection::OutboundFrame;
    use crate::store::InMemoryStore;
    use std::time::Duration as StdDuration;

    fn test_connection() -> (Connection, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new("CP-1", None, tx, Utc::now()), rx)
    }

    #[tokio::test]
    async fn resolves_waiter_on_matching_reply() {
        let (connection, mut rx) = test_connection();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let queue = OutboundQueue::spawn(
            "CP-1".into(),
            connection,
            store,
            ObserverBus::new(),
            StdDuration::from_millis(0),
            StdDuration::from_secs(5),
            ShutdownSignal::new(),
        );

        let queue_clone = queue.clone();
        let call = tokio::spawn(async move {
            queue_clone.enqueue_and_await("RemoteStartTransaction", serde_json::json!({})).await
        });

        let frame_text = match rx.recv().await.unwrap() {
            OutboundFrame::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        };
        let sent = OcppFrame::parse(&frame_text).unwrap();
        assert!(queue.resolve(sent.unique_id(), Ok(serde_json::json!({"status": "Accepted"}))));

        let result = call.await.unwrap().unwrap();
        assert_eq!(result["status"], "Accepted");
    }

    #[tokio::test]
    async fn unresolved_waiter_times_out() {
        let (connection, _rx) = test_connection();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let queue = OutboundQueue::spawn(
            "CP-1".into(),
            connection,
            store,
            ObserverBus::new(),
            StdDuration::from_millis(0),
            StdDuration::from_millis(20),
            ShutdownSignal::new(),
        );

        let result = queue.enqueue_and_await("Reset", serde_json::json!({})).await;
        assert!(matches!(result, Err(DomainError::CommandTimeout(_))));
        assert_eq!(queue.pending_count(), 0);
    }

    /// spec.md §8 S5: two calls enqueued back-to-back with a station that
    /// never replies are still transmitted one at a time, each separated by
    /// at least the configured delay, each timing out independently.
    #[tokio::test]
    async fn two_queued_calls_are_sent_in_order_one_at_a_time() {
        let (connection, mut rx) = test_connection();
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let queue = OutboundQueue::spawn(
            "CP-1".into(),
            connection,
            store,
            ObserverBus::new(),
            StdDuration::from_millis(100),
            StdDuration::from_millis(300),
            ShutdownSignal::new(),
        );

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.enqueue_and_await("RemoteStartTransaction", serde_json::json!({"idTag": "a"})).await }
        });
        let second = tokio::spawn({
            let queue = queue.clone();
            async move { queue.enqueue_and_await("RemoteStartTransaction", serde_json::json!({"idTag": "b"})).await }
        });

        let started = tokio::time::Instant::now();
        let first_frame = match rx.recv().await.unwrap() {
            OutboundFrame::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        };
        let first_sent_at = tokio::time::Instant::now();

        // the second call must not appear until the first has timed out
        // (single-flight): confirm nothing else is pending yet.
        assert_eq!(queue.pending_count(), 1);

        let second_frame = match rx.recv().await.unwrap() {
            OutboundFrame::Text(t) => t,
            other => panic!("expected text frame, got {other:?}"),
        };
        let second_sent_at = tokio::time::Instant::now();

        assert!(first_sent_at.duration_since(started) >= StdDuration::from_millis(90));
        assert!(second_sent_at.duration_since(first_sent_at) >= StdDuration::from_millis(300));

        let first_payload = match OcppFrame::parse(&first_frame).unwrap() {
            OcppFrame::Call { payload, .. } => payload,
            other => panic!("expected a Call frame, got {other:?}"),
        };
        let second_payload = match OcppFrame::parse(&second_frame).unwrap() {
            OcppFrame::Call { payload, .. } => payload,
            other => panic!("expected a Call frame, got {other:?}"),
        };
        assert_eq!(first_payload["idTag"], "a");
        assert_eq!(second_payload["idTag"], "b");

        let (first_result, second_result) = tokio::join!(first, second);
        assert!(matches!(first_result.unwrap(), Err(DomainError::CommandTimeout(_))));
        assert!(matches!(second_result.unwrap(), Err(DomainError::CommandTimeout(_))));
    }
}
