//! AutoRemoteStart after-hook (spec.md §4.5, §9 Open Question 1)
//!
//! Grounded directly on `original_source/src/levity/plugins/auto_remote_start.py`'s
//! `AFTER_STATUS_NOTIFICATION` hook: when a connector transitions to
//! `Preparing`, wait `delay` and send `RemoteStartTransaction` with a
//! configured `idTag`. Runs after-phase so it never blocks the
//! StatusNotification reply; failures (timeout or rejection) are recorded as
//! call-error metrics and never surface back to the station.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use crate::observer::DomainEvent;
use crate::pipeline::{AfterHook, PipelineContext, Request, Response};

pub struct AutoRemoteStartHook;

#[async_trait]
impl AfterHook for AutoRemoteStartHook {
    async fn run(&self, request: &Request, _response: &Response, ctx: &PipelineContext) {
        let Some(config) = ctx.auto_remote_start.clone() else {
            return;
        };

        let connector_id = request.payload.get("connectorId").and_then(|v| v.as_u64()).unwrap_or(0);
        let status = request.payload.get("status").and_then(|v| v.as_str()).unwrap_or("");
        if connector_id == 0 || status != "Preparing" {
            return;
        }

        let charge_point_id = request.charge_point_id.clone();
        let dispatch = ctx.dispatch.clone();
        let observer = ctx.observer.clone();

        tokio::spawn(async move {
            tokio::time::sleep(config.delay).await;
            let payload = json!({
                "connectorId": connector_id,
                "idTag": config.id_tag,
            });
            match dispatch.dispatch(&charge_point_id, "RemoteStartTransaction", payload).await {
                Ok(reply) => {
                    let status = reply.get("status").and_then(|v| v.as_str()).unwrap_or("");
                    if status != "Accepted" {
                        observer.publish(DomainEvent::OutboundCallRejected {
                            charge_point_id,
                            action: "RemoteStartTransaction".into(),
                        });
                    }
                }
                Err(err) => {
                    warn!(%charge_point_id, error = %err, "auto remote start failed");
                    observer.publish(DomainEvent::OutboundCallTimeout {
                        charge_point_id,
                        action: "RemoteStartTransaction".into(),
                    });
                }
            }
        });
    }
}
