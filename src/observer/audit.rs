//! Audit sink (spec.md §6): one JSON record per inbound/outbound frame and
//! per connection lifecycle event. Shape mirrors the original system's
//! Fluentd audit plugin (`{type, cp, dir, msg, remote_addr?}` /
//! `{type, cp, event, remote_addr?}`), adapted to a newline-delimited-JSON
//! file instead of a Fluentd forwarder socket.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{ConnectionEvent, DomainEvent, Direction};
use crate::support::errors::DomainError;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &DomainEvent) -> Result<(), DomainError>;
}

/// Appends one JSON object per line to a file, flushing after every write.
pub struct JsonlAuditSink {
    path: PathBuf,
    writer: Mutex<Option<tokio::fs::File>>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            writer: Mutex::new(None),
        })
    }

    async fn ensure_open(&self) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
            *guard = Some(file);
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: &DomainEvent) -> Result<(), DomainError> {
        let line = match event {
            DomainEvent::Frame {
                charge_point_id,
                dir,
                msg,
                remote_addr,
                ..
            } => {
                let dir = match dir {
                    Direction::Recv => "recv",
                    Direction::Send => "send",
                };
                json!({
                    "type": "ocpp",
                    "cp": charge_point_id,
                    "dir": dir,
                    "msg": msg,
                    "remote_addr": remote_addr,
                })
            }
            DomainEvent::Connection {
                charge_point_id,
                event,
                remote_addr,
                ..
            } => {
                let event = match event {
                    ConnectionEvent::Connect => "connect",
                    ConnectionEvent::Disconnect => "disconnect",
                };
                json!({
                    "type": "ws",
                    "cp": charge_point_id,
                    "event": event,
                    "remote_addr": remote_addr,
                })
            }
            _ => return Ok(()),
        };

        self.ensure_open()
            .await
            .map_err(|e| DomainError::Other(format!("audit sink open failed: {e}")))?;

        let mut guard = self.writer.lock().await;
        let file = guard.as_mut().expect("ensure_open populates writer");
        let mut bytes = serde_json::to_vec(&line).map_err(|e| DomainError::Other(e.to_string()))?;
        bytes.push(b'\n');
        file.write_all(&bytes)
            .await
            .map_err(|e| DomainError::Other(format!("audit sink write failed: {e}")))?;
        file.flush()
            .await
            .map_err(|e| DomainError::Other(format!("audit sink flush failed: {e}")))?;
        Ok(())
    }
}
