//! Message domain entity (spec.md §3)
//!
//! Every inbound and outbound OCPP frame is recorded here. Uniqueness:
//! `(actor, unique_id)` is unique — this is what makes duplicate-call
//! handling idempotent (spec.md §7, §8 invariant 4).

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::support::errors::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 2,
    CallResult = 3,
    CallError = 4,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub charge_point_id: String,
    pub transaction_id: Option<i64>,
    pub actor: Actor,
    pub message_type: MessageType,
    pub unique_id: String,
    /// The OCPP action name. Populated directly for Call; for CallResult/CallError
    /// it is copied from the originating Call by correlation (spec.md §3).
    pub action: Option<String>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
    pub body: Value,
    /// unique_id of the reply this message resolved, once matched (spec.md §3
    /// `reply` back-reference). Set on the *Call* row once its result/error arrives.
    pub reply_unique_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Message {
    pub fn call(
        charge_point_id: impl Into<String>,
        actor: Actor,
        unique_id: impl Into<String>,
        action: impl Into<String>,
        body: Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            transaction_id: None,
            actor,
            message_type: MessageType::Call,
            unique_id: unique_id.into(),
            action: Some(action.into()),
            error_code: None,
            error_description: None,
            body,
            reply_unique_id: None,
            recorded_at,
        }
    }

    pub fn call_result(
        charge_point_id: impl Into<String>,
        actor: Actor,
        unique_id: impl Into<String>,
        body: Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            transaction_id: None,
            actor,
            message_type: MessageType::CallResult,
            unique_id: unique_id.into(),
            action: None,
            error_code: None,
            error_description: None,
            body,
            reply_unique_id: None,
            recorded_at,
        }
    }

    pub fn call_error(
        charge_point_id: impl Into<String>,
        actor: Actor,
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
        details: Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            transaction_id: None,
            actor,
            message_type: MessageType::CallError,
            unique_id: unique_id.into(),
            action: None,
            error_code: Some(error_code.into()),
            error_description: Some(error_description.into()),
            body: details,
            reply_unique_id: None,
            recorded_at,
        }
    }
}
