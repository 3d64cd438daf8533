//! Middleware pipeline (spec.md §4.4, §9 "Dynamic dispatch" / "Onion composition")
//!
//! Each `(action, message_type)` pair maps to an ordered sequence of
//! middleware plus a terminal handler, assembled once at boot into a closed
//! registry (`PipelineCatalog`) rather than wired reflectively by name, per
//! the Design Notes' replacement for the original's class-name dictionary.
//!
//! Hook phases:
//! - **before**: runs before handler logic; may mutate the request.
//! - **on**: the handler itself — runs after state is persisted, before the
//!   reply is written; may append side-effect calls.
//! - **after**: runs after the reply has been written to the transport. Used
//!   for observers and central-initiated follow-ups. Errors here never affect
//!   the reply (spec.md §4.4, §7).

pub mod catalog;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::observer::ObserverBus;
use crate::store::Store;
use crate::support::errors::DomainResult;

pub use catalog::PipelineCatalog;

/// A single decoded inbound Call, as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    pub charge_point_id: String,
    pub unique_id: String,
    pub action: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

/// A queued outbound command, to be placed on the station's outbound channel
/// by the Session (spec.md §4.4 "side-effect calls").
#[derive(Debug, Clone)]
pub struct SideEffectCall {
    pub action: String,
    pub payload: Value,
}

/// What a pipeline run produces: the reply payload (still in need of the
/// JSON-normalize pass, spec.md §4.4) plus any side-effect calls.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub payload: Value,
    pub side_effects: Vec<SideEffectCall>,
    pub transaction_id: Option<i64>,
}

impl Response {
    pub fn empty() -> Self {
        Self {
            payload: Value::Object(Default::default()),
            side_effects: Vec::new(),
            transaction_id: None,
        }
    }

    pub fn with_payload(payload: Value) -> Self {
        Self {
            payload,
            side_effects: Vec::new(),
            transaction_id: None,
        }
    }

    pub fn push_side_effect(&mut self, action: impl Into<String>, payload: Value) {
        self.side_effects.push(SideEffectCall {
            action: action.into(),
            payload,
        });
    }
}

/// Lets an after-hook enqueue a central-initiated call back to a station,
/// outside the current request's own reply (spec.md §4.4 AutoRemoteStart).
/// Implemented by the Session registry; goes through the same outbound
/// delay/single-flight/reply-await queue as any other central call.
#[async_trait]
pub trait OutboundDispatch: Send + Sync {
    async fn dispatch(&self, charge_point_id: &str, action: &str, payload: Value) -> DomainResult<Value>;
}

/// Shared dependencies every hook and handler may reach for.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn Store>,
    pub observer: ObserverBus,
    pub heartbeat_interval_secs: u64,
    pub dispatch: Arc<dyn OutboundDispatch>,
    pub auto_remote_start: Option<AutoRemoteStartConfig>,
}

/// Configuration for the AutoRemoteStart after-hook (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct AutoRemoteStartConfig {
    pub id_tag: String,
    pub delay: std::time::Duration,
}

/// A before-phase hook: may inspect/mutate the request ahead of the handler.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn run(&self, request: &mut Request, ctx: &PipelineContext) -> DomainResult<()>;
}

/// The terminal handler for one action: the "on" phase (spec.md §4.4).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &Request, ctx: &PipelineContext) -> DomainResult<Response>;
}

/// An after-phase hook. Failures are logged by the caller and never
/// propagated to the reply (spec.md §4.4, §7 "Observer sink failure").
#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn run(&self, request: &Request, response: &Response, ctx: &PipelineContext);
}

/// One action's assembled onion: `before* -> handler -> after*`.
pub struct Pipeline {
    before: Vec<Arc<dyn BeforeHook>>,
    handler: Arc<dyn Handler>,
    after: Vec<Arc<dyn AfterHook>>,
}

impl Pipeline {
    pub fn new(before: Vec<Arc<dyn BeforeHook>>, handler: Arc<dyn Handler>, after: Vec<Arc<dyn AfterHook>>) -> Self {
        Self { before, handler, after }
    }

    /// Runs before-hooks and the handler, returning the reply. Side effects
    /// accumulate in `Response::side_effects`. After-hooks are run separately
    /// by the caller once the reply has actually been written to the
    /// transport (spec.md §4.4) — see `run_after`.
    pub async fn run(&self, mut request: Request, ctx: &PipelineContext) -> DomainResult<Response> {
        for hook in &self.before {
            hook.run(&mut request, ctx).await?;
        }
        let mut response = self.handler.handle(&request, ctx).await?;
        response.payload = crate::support::ocpp_frame::normalize_payload(response.payload);
        Ok(response)
    }

    pub async fn run_after(&self, request: &Request, response: &Response, ctx: &PipelineContext) {
        for hook in &self.after {
            hook.run(request, response, ctx).await;
        }
    }
}
