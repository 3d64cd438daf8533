//! StartTransaction handler (spec.md §4.5)

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::domain::{ConnectorStatus, StopReason};
use crate::observer::DomainEvent;
use crate::pipeline::{BeforeHook, Handler, PipelineContext, Request, Response};
use crate::support::errors::{DomainError, DomainResult};

use super::orphan::close_orphans;

/// Before-phase: close any orphaned Active transaction before processing the
/// new Start (spec.md §4.5 step 1, §8 invariant 1).
pub struct OrphanClosureBeforeHook;

#[async_trait]
impl BeforeHook for OrphanClosureBeforeHook {
    async fn run(&self, request: &mut Request, ctx: &PipelineContext) -> DomainResult<()> {
        close_orphans(&*ctx.store, &ctx.observer, &request.charge_point_id, StopReason::Other, Utc::now()).await
    }
}

pub struct StartTransactionHandler;

#[async_trait]
impl Handler for StartTransactionHandler {
    async fn handle(&self, request: &Request, ctx: &PipelineContext) -> DomainResult<Response> {
        let payload = &request.payload;
        let connector_id = payload
            .get("connectorId")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| DomainError::Other("StartTransaction missing connectorId".into()))? as u32;
        let id_tag = payload
            .get("idTag")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DomainError::Other("StartTransaction missing idTag".into()))?;
        let meter_start = payload.get("meterStart").and_then(|v| v.as_i64()).unwrap_or(0);
        let started_at = payload
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        ctx.store
            .upsert_connector(&request.charge_point_id, connector_id, ConnectorStatus::Charging, None, None)
            .await?;

        let tx = ctx
            .store
            .create_transaction(&request.charge_point_id, connector_id, id_tag, started_at, meter_start)
            .await?;

        ctx.store
            .upsert_charge_point(
                &request.charge_point_id,
                crate::domain::ChargePointUpdate {
                    last_tx_start_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        ctx.observer.publish(DomainEvent::TransactionStarted {
            charge_point_id: request.charge_point_id.clone(),
            connector_id,
            transaction_id: tx.id,
        });

        let mut response = Response::with_payload(json!({
            "transactionId": tx.id,
            "idTagInfo": { "status": "Accepted" },
        }));
        response.transaction_id = Some(tx.id);
        Ok(response)
    }
}
