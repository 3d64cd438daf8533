//! DiagnosticsStatusNotification / FirmwareStatusNotification (spec.md §4.5)
//!
//! Both are thin accept-and-log handlers: persist nothing beyond the inbound
//! Message row (already done by the Session before dispatch) and reply empty.

use async_trait::async_trait;
use serde_json::json;

use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::DomainResult;

pub struct DiagnosticsStatusHandler;

#[async_trait]
impl Handler for DiagnosticsStatusHandler {
    async fn handle(&self, _request: &Request, _ctx: &PipelineContext) -> DomainResult<Response> {
        Ok(Response::with_payload(json!({})))
    }
}
