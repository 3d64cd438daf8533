//! Per-station transport handle (spec.md §4.3, §4.7)
//!
//! `Connection` is transport-agnostic: it owns only a channel to whatever
//! task is actually driving the WebSocket (the Acceptor). Writing never
//! blocks the caller and never touches a socket directly, so Session and
//! Registry code stays free of `tokio-tungstenite` types.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

/// What the Acceptor's writer task does with a queued outbound unit.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Cheap to clone: every clone shares the same writer channel and the same
/// last-activity clock, so the outbound queue, the watchdog, and the
/// session's reader loop can each hold their own handle to one connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub charge_point_id: String,
    pub remote_addr: Option<String>,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::UnboundedSender<OutboundFrame>,
    last_activity_millis: Arc<AtomicI64>,
}

impl Connection {
    pub fn new(
        charge_point_id: impl Into<String>,
        remote_addr: Option<String>,
        sender: mpsc::UnboundedSender<OutboundFrame>,
        connected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            remote_addr,
            connected_at,
            sender,
            last_activity_millis: Arc::new(AtomicI64::new(connected_at.timestamp_millis())),
        }
    }

    /// Queues a text frame for the writer task. Fails once the writer has
    /// gone away (station disconnected).
    pub fn send(&self, text: String) -> Result<(), String> {
        self.sender
            .send(OutboundFrame::Text(text))
            .map_err(|_| format!("{} is not connected", self.charge_point_id))
    }

    /// Asks the writer task to send a Close frame and stop. Best-effort: a
    /// station that has already disconnected has nothing left to close.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.sender.send(OutboundFrame::Close {
            code,
            reason: reason.into(),
        });
    }

    pub fn touch(&self) {
        self.last_activity_millis.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_activity_millis.load(Ordering::Relaxed))
            .single()
            .unwrap_or_else(Utc::now)
    }
}
