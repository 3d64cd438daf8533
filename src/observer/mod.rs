//! ObserverBus (spec.md §2, §6): fan-out of domain events to optional sinks.
//! Pure read-side — publish never blocks on a sink and sink failures never
//! propagate to the reply path (spec.md §7 "Observer sink failure").

pub mod audit;
pub mod metrics_sink;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use audit::{AuditSink, JsonlAuditSink};

const DEFAULT_CAPACITY: usize = 1024;

/// A frame direction, for audit records (spec.md §6 `dir∈{recv,send}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Recv,
    Send,
}

/// Connection lifecycle event kind (spec.md §6 `event∈{connect,disconnect}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect,
    Disconnect,
}

/// Domain events fanned out on the bus. `Frame`/`Connection` map directly onto
/// the audit sink's two record shapes (spec.md §6); the rest feed the metrics
/// sink (spec.md §6 metric catalog, grounded on the original Prometheus plugin).
#[derive(Debug, Clone)]
pub enum DomainEvent {
    Frame {
        charge_point_id: String,
        dir: Direction,
        msg: Value,
        remote_addr: Option<String>,
        at: DateTime<Utc>,
    },
    Connection {
        charge_point_id: String,
        event: ConnectionEvent,
        remote_addr: Option<String>,
        at: DateTime<Utc>,
    },
    TransactionStarted {
        charge_point_id: String,
        connector_id: u32,
        transaction_id: i64,
    },
    TransactionStopped {
        charge_point_id: String,
        connector_id: u32,
        transaction_id: i64,
        energy_delivered_wh: i64,
    },
    EnergyJump {
        charge_point_id: String,
        transaction_id: i64,
        previous_wh: i64,
        current_wh: i64,
        delta_wh: i64,
    },
    DisconnectDuringActiveTransaction {
        charge_point_id: String,
    },
    OutboundCallTimeout {
        charge_point_id: String,
        action: String,
    },
    OutboundCallRejected {
        charge_point_id: String,
        action: String,
    },
    HandlerLatency {
        charge_point_id: String,
        action: String,
        millis: f64,
    },
}

/// Fan-out bus: publish never awaits a sink. `metrics_sink::record` is called
/// synchronously (the `metrics` facade is itself non-blocking); the audit sink
/// is driven by a background task reading off `subscribe()`.
#[derive(Clone)]
pub struct ObserverBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl ObserverBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        metrics_sink::record(&event);
        match self.sender.send(event) {
            Ok(_) => {}
            Err(_) => debug!("observer event published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> ObserverSubscription {
        ObserverSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ObserverBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ObserverSubscription {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl ObserverSubscription {
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(missed = count, "observer subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Spawns a background task feeding every bus event to `sink`. Errors are
/// logged and swallowed (spec.md §7).
pub fn spawn_audit_forwarder(bus: &ObserverBus, sink: Arc<dyn AuditSink>) {
    let mut subscription = bus.subscribe();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            if matches!(event, DomainEvent::Frame { .. } | DomainEvent::Connection { .. }) {
                if let Err(err) = sink.record(&event).await {
                    warn!(error = %err, "audit sink write failed");
                }
            }
        }
    });
}
