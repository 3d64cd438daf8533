//! StopTransaction handler (spec.md §4.5)

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::domain::meter_value::{DEFAULT_CONTEXT, DEFAULT_FORMAT, DEFAULT_LOCATION, DEFAULT_MEASURAND, DEFAULT_UNIT};
use crate::domain::{ChargePointUpdate, MeterValue, StopReason};
use crate::observer::DomainEvent;
use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::{DomainError, DomainResult};

pub struct StopTransactionHandler;

#[async_trait]
impl Handler for StopTransactionHandler {
    async fn handle(&self, request: &Request, ctx: &PipelineContext) -> DomainResult<Response> {
        let payload = &request.payload;
        let transaction_id = payload
            .get("transactionId")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| DomainError::Other("StopTransaction missing transactionId".into()))?;
        let meter_stop = payload.get("meterStop").and_then(|v| v.as_i64()).unwrap_or(0);
        let stopped_at = payload
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let reason = payload
            .get("reason")
            .and_then(|v| v.as_str())
            .and_then(|s| StopReason::from_str(s).ok())
            .unwrap_or(StopReason::Local);

        let tx = ctx.store.stop_transaction(transaction_id, stopped_at, meter_stop, reason).await?;

        // Ingest transactionData: one MeterValue row per sampledValue, is_final=true.
        if let Some(entries) = payload.get("transactionData").and_then(|v| v.as_array()) {
            let mut values = Vec::new();
            for entry in entries {
                let timestamp = entry
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(stopped_at);
                if let Some(samples) = entry.get("sampledValue").and_then(|v| v.as_array()) {
                    for sample in samples {
                        values.push(
                            MeterValue::builder(&request.charge_point_id, tx.connector_id, timestamp)
                                .transaction_id(Some(tx.id))
                                .measurand(sample.get("measurand").and_then(|v| v.as_str()).unwrap_or(DEFAULT_MEASURAND))
                                .unit(sample.get("unit").and_then(|v| v.as_str()).unwrap_or(DEFAULT_UNIT))
                                .context(sample.get("context").and_then(|v| v.as_str()).unwrap_or(DEFAULT_CONTEXT))
                                .location(sample.get("location").and_then(|v| v.as_str()).unwrap_or(DEFAULT_LOCATION))
                                .format(sample.get("format").and_then(|v| v.as_str()).unwrap_or(DEFAULT_FORMAT))
                                .value(sample.get("value").and_then(|v| v.as_str()).unwrap_or("").to_string())
                                .is_final(true)
                                .build(),
                        );
                    }
                }
            }
            if !values.is_empty() {
                ctx.store.create_meter_values(values).await?;
            }
        }

        ctx.store
            .upsert_charge_point(
                &request.charge_point_id,
                ChargePointUpdate {
                    last_tx_stop_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        ctx.observer.publish(DomainEvent::TransactionStopped {
            charge_point_id: request.charge_point_id.clone(),
            connector_id: tx.connector_id,
            transaction_id: tx.id,
            energy_delivered_wh: tx.energy_delivered().unwrap_or(0),
        });

        let mut response = Response::with_payload(json!({ "idTagInfo": { "status": "Accepted" } }));
        response.transaction_id = Some(tx.id);
        Ok(response)
    }
}
