//! The Session actor (spec.md §4.3)
//!
//! One `Session` per live WebSocket connection: owns the decode/dispatch
//! loop, the outbound command queue, and the heartbeat watchdog. The
//! Acceptor constructs one per accepted connection and drives its reader
//! loop; `Session` itself is transport-agnostic (see `connection.rs`).

pub mod connection;
pub mod outbound;
pub mod registry;
pub mod watchdog;

pub use connection::{Connection, OutboundFrame};
pub use outbound::OutboundQueue;
pub use registry::{EvictedSession, RegisterResult, Registry, SessionHandle};
pub use watchdog::WatchdogHandle;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::warn;

use crate::domain::Message;
use crate::observer::{DomainEvent, Direction, ObserverBus};
use crate::pipeline::{PipelineCatalog, PipelineContext, Request};
use crate::store::Store;
use crate::support::errors::{Actor, DomainError};
use crate::support::ocpp_frame::OcppFrame;

/// What the Acceptor's reader loop should do after feeding one inbound
/// text frame to the session.
pub enum InboundOutcome {
    /// Write this text back to the transport.
    Reply(String),
    /// Nothing to write (a correlated reply, or an idempotent duplicate).
    None,
    /// The frame could not be correlated to anything recoverable; close the
    /// transport with this code/reason (spec.md §7).
    CloseConnection { code: u16, reason: String },
}

/// Owns one station's dispatch logic. Cheap to hold by reference; the
/// actual per-connection state (transport, outbound queue, watchdog) lives
/// in the `SessionHandle` registered alongside it.
pub struct Session {
    pub charge_point_id: String,
    pub store: Arc<dyn Store>,
    pub observer: ObserverBus,
    pub catalog: Arc<PipelineCatalog>,
    pub ctx: PipelineContext,
    pub outbound: OutboundQueue,
    pub remote_addr: Option<String>,
}

impl Session {
    /// Decodes and dispatches one inbound text frame. This is the single
    /// entry point the Acceptor's reader loop calls per message.
    pub async fn handle_inbound(&self, text: &str) -> InboundOutcome {
        let frame = match OcppFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                return match crate::support::ocpp_frame::recover_unique_id(text) {
                    Some(unique_id) => {
                        warn!(charge_point_id = %self.charge_point_id, error = %err, "formation violation");
                        InboundOutcome::Reply(
                            OcppFrame::error_response(unique_id, "FormationViolation", err.to_string()).serialize(),
                        )
                    }
                    None => InboundOutcome::CloseConnection {
                        code: 1002,
                        reason: "protocol error".into(),
                    },
                };
            }
        };

        match frame {
            OcppFrame::Call { unique_id, action, payload } => self.handle_call(unique_id, action, payload).await,
            OcppFrame::CallResult { unique_id, payload } => {
                self.handle_reply(unique_id, Ok(payload)).await;
                InboundOutcome::None
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                self.handle_reply(unique_id, Err(DomainError::Other(format!("{error_code}: {error_description}"))))
                    .await;
                InboundOutcome::None
            }
        }
    }

    async fn handle_call(&self, unique_id: String, action: String, payload: serde_json::Value) -> InboundOutcome {
        let now = Utc::now();
        let record = Message::call(self.charge_point_id.clone(), Actor::ChargePoint, unique_id.clone(), action.clone(), payload.clone(), now);
        if let Err(DomainError::DuplicateMessage { .. }) = self.store.insert_message(record).await {
            // Already processed (or in flight): spec.md §7/§8 invariant 4 —
            // a retransmitted Call is a no-op, not a second reply.
            return InboundOutcome::None;
        }
        self.observer.publish(DomainEvent::Frame {
            charge_point_id: self.charge_point_id.clone(),
            dir: Direction::Recv,
            msg: json!([2, unique_id.clone(), action.clone(), payload.clone()]),
            remote_addr: self.remote_addr.clone(),
            at: now,
        });

        let reply_frame = match self.catalog.get(&action) {
            None => {
                let reply = OcppFrame::error_response(unique_id.clone(), "NotImplemented", format!("unsupported action {action}"));
                self.finish_call(&unique_id, &reply).await;
                reply
            }
            Some(pipeline) => {
                let request = Request {
                    charge_point_id: self.charge_point_id.clone(),
                    unique_id: unique_id.clone(),
                    action: action.clone(),
                    payload,
                    received_at: now,
                };
                match pipeline.run(request.clone(), &self.ctx).await {
                    Ok(response) => {
                        let reply = OcppFrame::CallResult {
                            unique_id: unique_id.clone(),
                            payload: response.payload.clone(),
                        };
                        self.finish_call(&unique_id, &reply).await;
                        if let Some(transaction_id) = response.transaction_id {
                            if let Err(err) = self.store.link_transaction(Actor::ChargePoint, &unique_id, transaction_id).await {
                                warn!(charge_point_id = %self.charge_point_id, error = %err, "failed to link transaction to message");
                            }
                        }
                        for effect in response.side_effects.clone() {
                            self.spawn_side_effect(effect.action, effect.payload);
                        }
                        // After-hooks run once the reply has been written, on their
                        // own task so a slow hook (e.g. AutoRemoteStart's delay)
                        // never holds up the next inbound frame (spec.md §4.4).
                        let ctx = self.ctx.clone();
                        let catalog = self.catalog.clone();
                        let action_name = action.clone();
                        tokio::spawn(async move {
                            if let Some(pipeline) = catalog.get(&action_name) {
                                pipeline.run_after(&request, &response, &ctx).await;
                            }
                        });
                        reply
                    }
                    Err(err) => {
                        warn!(charge_point_id = %self.charge_point_id, action = %action, error = %err, "handler error");
                        let reply = OcppFrame::error_response(unique_id.clone(), "InternalError", err.to_string());
                        self.finish_call(&unique_id, &reply).await;
                        reply
                    }
                }
            }
        };

        InboundOutcome::Reply(reply_frame.serialize())
    }

    /// Persists the reply Message, links it back to the originating Call,
    /// and publishes the outbound Frame event. Shared by the success,
    /// handler-error, and unknown-action paths.
    async fn finish_call(&self, unique_id: &str, reply: &OcppFrame) {
        let now = Utc::now();
        let mut record = match reply {
            OcppFrame::CallResult { payload, .. } => {
                Message::call_result(self.charge_point_id.clone(), Actor::CentralSystem, unique_id.to_string(), payload.clone(), now)
            }
            OcppFrame::CallError {
                error_code,
                error_description,
                error_details,
                ..
            } => Message::call_error(
                self.charge_point_id.clone(),
                Actor::CentralSystem,
                unique_id.to_string(),
                error_code.clone(),
                error_description.clone(),
                error_details.clone(),
                now,
            ),
            OcppFrame::Call { .. } => return,
        };
        // action is omitted on Call/CallError rows and populated by
        // correlation from the originating Call (spec.md §3, §4.3 step 3).
        if let Ok(Some(call)) = self.store.find_call(Actor::ChargePoint, unique_id).await {
            record.action = call.action;
        }
        if let Err(err) = self.store.insert_message(record).await {
            warn!(charge_point_id = %self.charge_point_id, error = %err, "failed to record reply message");
        }
        if let Err(err) = self.store.link_reply(Actor::ChargePoint, unique_id, unique_id).await {
            warn!(charge_point_id = %self.charge_point_id, error = %err, "failed to link reply");
        }
        let msg = match reply {
            OcppFrame::CallResult { payload, .. } => json!([3, unique_id, payload]),
            OcppFrame::CallError {
                error_code,
                error_description,
                error_details,
                ..
            } => json!([4, unique_id, error_code, error_description, error_details]),
            OcppFrame::Call { .. } => json!(null),
        };
        self.observer.publish(DomainEvent::Frame {
            charge_point_id: self.charge_point_id.clone(),
            dir: Direction::Send,
            msg,
            remote_addr: self.remote_addr.clone(),
            at: now,
        });
    }

    /// An inbound CallResult/CallError correlating to something *we* sent.
    /// Resolved against the outbound queue's waiter map; an unmatched reply
    /// is logged and dropped (spec.md §7).
    async fn handle_reply(&self, unique_id: String, result: Result<serde_json::Value, DomainError>) {
        let now = Utc::now();
        let mut record = match &result {
            Ok(payload) => Message::call_result(self.charge_point_id.clone(), Actor::ChargePoint, unique_id.clone(), payload.clone(), now),
            Err(err) => Message::call_error(
                self.charge_point_id.clone(),
                Actor::ChargePoint,
                unique_id.clone(),
                "Error",
                err.to_string(),
                json!({}),
                now,
            ),
        };
        // action is omitted on CallResult/CallError rows and populated by
        // correlation from the originating (central-initiated) Call
        // (spec.md §3, §4.3 step 3).
        record.action = match self.store.find_call(Actor::CentralSystem, &unique_id).await {
            Ok(Some(call)) => call.action,
            _ => None,
        };

        let wire_msg = match &record.message_type {
            crate::domain::MessageType::CallResult => json!([3, unique_id, record.body]),
            crate::domain::MessageType::CallError => json!([
                4,
                unique_id,
                record.error_code.clone().unwrap_or_default(),
                record.error_description.clone().unwrap_or_default(),
                record.body,
            ]),
            crate::domain::MessageType::Call => json!(null),
        };
        if let Err(DomainError::DuplicateMessage { .. }) = self.store.insert_message(record).await {
            return;
        }
        self.observer.publish(DomainEvent::Frame {
            charge_point_id: self.charge_point_id.clone(),
            dir: Direction::Recv,
            msg: wire_msg,
            remote_addr: self.remote_addr.clone(),
            at: now,
        });
        let _ = self.store.link_reply(Actor::CentralSystem, &unique_id, &unique_id).await;
        if !self.outbound.resolve(&unique_id, result) {
            warn!(charge_point_id = %self.charge_point_id, unique_id = %unique_id, "reply for unknown outbound call, dropped");
        }
    }

    /// Queues a handler-produced side-effect call, fire-and-forget: nothing
    /// in the request path waits on its outcome (spec.md §4.4).
    fn spawn_side_effect(&self, action: String, payload: serde_json::Value) {
        let outbound = self.outbound.clone();
        let charge_point_id = self.charge_point_id.clone();
        let observer = self.observer.clone();
        tokio::spawn(async move {
            if let Err(err) = outbound.enqueue_and_await(action.clone(), payload).await {
                warn!(charge_point_id = %charge_point_id, action = %action, error = %err, "side-effect call failed");
                observer.publish(DomainEvent::OutboundCallRejected { charge_point_id, action });
            }
        });
    }
}
