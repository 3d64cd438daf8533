//! DataTransfer handler (spec.md §4.5). Default: reject everything.

use async_trait::async_trait;
use serde_json::json;

use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::DomainResult;

pub struct DataTransferHandler;

#[async_trait]
impl Handler for DataTransferHandler {
    async fn handle(&self, _request: &Request, _ctx: &PipelineContext) -> DomainResult<Response> {
        Ok(Response::with_payload(json!({ "status": "Rejected" })))
    }
}
