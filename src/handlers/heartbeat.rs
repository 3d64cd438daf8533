//! Heartbeat handler (spec.md §4.5)
//!
//! Resetting the Session's watchdog deadline happens in the Session itself
//! (spec.md §4.3), not here — the handler only owns the Store-facing effect.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::DomainResult;

pub struct HeartbeatHandler;

#[async_trait]
impl Handler for HeartbeatHandler {
    async fn handle(&self, request: &Request, ctx: &PipelineContext) -> DomainResult<Response> {
        let now = Utc::now();
        ctx.store.update_heartbeat(&request.charge_point_id, now).await?;
        Ok(Response::with_payload(json!({ "currentTime": now.to_rfc3339_opts(SecondsFormat::Secs, true) })))
    }
}
