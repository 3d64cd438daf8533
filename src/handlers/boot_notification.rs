//! BootNotification handler (spec.md §4.5)

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::domain::{ChargePointUpdate, StopReason};
use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::DomainResult;

use super::orphan::close_orphans;

pub struct BootNotificationHandler;

#[async_trait]
impl Handler for BootNotificationHandler {
    async fn handle(&self, request: &Request, ctx: &PipelineContext) -> DomainResult<Response> {
        let now = Utc::now();
        let payload = &request.payload;

        ctx.store
            .upsert_charge_point(
                &request.charge_point_id,
                ChargePointUpdate {
                    vendor: payload.get("chargePointVendor").and_then(|v| v.as_str()).map(String::from),
                    model: payload.get("chargePointModel").and_then(|v| v.as_str()).map(String::from),
                    serial_number: payload.get("chargePointSerialNumber").and_then(|v| v.as_str()).map(String::from),
                    firmware_version: payload.get("firmwareVersion").and_then(|v| v.as_str()).map(String::from),
                    iccid: payload.get("iccid").and_then(|v| v.as_str()).map(String::from),
                    imsi: payload.get("imsi").and_then(|v| v.as_str()).map(String::from),
                    last_boot_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        // A boot is an implicit terminator for any Active transactions on
        // this station (spec.md §4.5 "implicit terminator").
        close_orphans(&*ctx.store, &ctx.observer, &request.charge_point_id, StopReason::Reboot, now).await?;

        Ok(Response::with_payload(json!({
            "currentTime": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            "interval": ctx.heartbeat_interval_secs,
            "status": "Accepted",
        })))
    }
}
