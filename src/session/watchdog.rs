//! Heartbeat watchdog (spec.md §4.3, §5, §9 "Heartbeat monitoring")
//!
//! Unlike the teacher's polling-based `HeartbeatMonitor` (a periodic sweep
//! over every session comparing `last_heartbeat` against now), this is one
//! deadline timer per session, reset on every inbound frame. A `watch`
//! channel carries the current deadline so resets never wake a sleeping
//! task early for no reason — the task only wakes at the deadline it most
//! recently observed, or when a new one is published.
//!
//! The deadline is `3 * heartbeat_interval` (spec.md §4.3 "at 3x the
//! negotiated interval the station is presumed dead"). The first deadline
//! published at `spawn` doubles as the one grace period before the
//! watchdog is truly armed: a station has a full `3x` window after connect
//! to send its first Heartbeat (or any frame — see `reset`) before it is
//! disconnected for silence.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::info;

use crate::session::connection::Connection;
use crate::support::shutdown::ShutdownSignal;

#[derive(Clone)]
pub struct WatchdogHandle {
    deadline_tx: watch::Sender<Instant>,
    interval: Duration,
}

impl WatchdogHandle {
    /// Pushes out the deadline by `3 * interval` from now. Called on every
    /// inbound frame, not just Heartbeat — any traffic proves the station
    /// is alive.
    pub fn reset(&self) {
        let _ = self.deadline_tx.send(Instant::now() + self.interval * 3);
    }
}

/// Spawns the watchdog task and returns a handle for resetting it. Firing
/// closes the transport with code 1000 and a "heartbeat timeout" reason
/// (spec.md §4.3).
pub fn spawn(charge_point_id: String, connection: Connection, interval: Duration, shutdown: ShutdownSignal) -> WatchdogHandle {
    let initial_deadline = Instant::now() + interval * 3;
    let (deadline_tx, mut deadline_rx) = watch::channel(initial_deadline);

    tokio::spawn(async move {
        loop {
            let deadline = *deadline_rx.borrow();
            tokio::select! {
                biased;
                _ = shutdown.notified().wait() => break,
                changed = deadline_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    if Instant::now() >= *deadline_rx.borrow() {
                        info!(charge_point_id = %charge_point_id, "heartbeat watchdog expired, closing connection");
                        connection.close(1000, "heartbeat timeout");
                        break;
                    }
                }
            }
        }
    });

    WatchdogHandle { deadline_tx, interval }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::connection::OutboundFrame;
    use chrono::Utc;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_close_after_three_intervals_of_silence() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::new("CP-1", None, tx, Utc::now());
        let interval = Duration::from_secs(1);
        let _handle = spawn("CP-1".into(), connection, interval, ShutdownSignal::new());

        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;

        match rx.recv().await.unwrap() {
            OutboundFrame::Close { code, .. } => assert_eq!(code, 1000),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reset_postpones_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = Connection::new("CP-1", None, tx, Utc::now());
        let interval = Duration::from_secs(1);
        let handle = spawn("CP-1".into(), connection, interval, ShutdownSignal::new());

        tokio::time::advance(Duration::from_millis(2500)).await;
        handle.reset();
        tokio::time::advance(Duration::from_millis(2500)).await;
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_err());
    }
}
