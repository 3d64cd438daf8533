//! Authorize handler (spec.md §4.5)
//!
//! Default policy accepts every id_tag; deployments that need a real
//! authorization list can register a replacement in the pipeline catalog
//! (spec.md §9 "closed registry").

use async_trait::async_trait;
use serde_json::json;

use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::DomainResult;

pub struct AuthorizeHandler;

#[async_trait]
impl Handler for AuthorizeHandler {
    async fn handle(&self, _request: &Request, _ctx: &PipelineContext) -> DomainResult<Response> {
        Ok(Response::with_payload(json!({ "idTagInfo": { "status": "Accepted" } })))
    }
}
