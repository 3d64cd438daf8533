//! StatusNotification handler (spec.md §4.5)
//!
//! `connector_id == 0` updates the ChargePoint row, never a Connector row
//! (spec.md §8 boundary behaviour). The AutoRemoteStart follow-up lives in
//! `auto_remote_start.rs` as a separate after-hook, not in this handler.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::json;

use crate::domain::{ChargePointStatus, ChargePointUpdate, ConnectorStatus};
use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::{DomainError, DomainResult};

pub struct StatusNotificationHandler;

#[async_trait]
impl Handler for StatusNotificationHandler {
    async fn handle(&self, request: &Request, ctx: &PipelineContext) -> DomainResult<Response> {
        let payload = &request.payload;
        let connector_id = payload
            .get("connectorId")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| DomainError::Other("StatusNotification missing connectorId".into()))? as u32;

        let status_str = payload.get("status").and_then(|v| v.as_str()).unwrap_or("Available");
        let status = ConnectorStatus::from_str(status_str).unwrap_or_default();
        let error_code = payload.get("errorCode").and_then(|v| v.as_str()).map(String::from);
        let vendor_error_code = payload.get("vendorErrorCode").and_then(|v| v.as_str()).map(String::from);

        if connector_id == 0 {
            ctx.store
                .upsert_charge_point(
                    &request.charge_point_id,
                    ChargePointUpdate {
                        status: Some(ChargePointStatus::from_str(status_str).unwrap_or_default()),
                        error_code: error_code.clone(),
                        vendor_error_code: vendor_error_code.clone(),
                        vendor_status_info: payload.get("info").and_then(|v| v.as_str()).map(String::from),
                        ..Default::default()
                    },
                )
                .await?;
        } else {
            ctx.store
                .upsert_connector(&request.charge_point_id, connector_id, status, error_code, vendor_error_code)
                .await?;
        }

        Ok(Response::with_payload(json!({})))
    }
}
