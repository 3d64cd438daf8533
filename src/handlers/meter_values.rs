//! MeterValues handler (spec.md §4.5) + meter-reading jump detection
//!
//! Jump detection (spec.md §4.5 "Meter-reading jump detection", §9 Open
//! Question 2): consecutive `Energy.Active.Import.Register` readings within
//! one Active transaction are compared; `|current − previous| > 10,000 Wh`
//! emits an `energy_jump` observer event without altering the stored
//! reading. Comparisons are scoped per transaction (spec.md §8 boundary
//! behaviour) — never across a transaction boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::meter_value::{DEFAULT_CONTEXT, DEFAULT_FORMAT, DEFAULT_LOCATION, DEFAULT_MEASURAND, DEFAULT_UNIT};
use crate::domain::MeterValue;
use crate::observer::DomainEvent;
use crate::pipeline::{Handler, PipelineContext, Request, Response};
use crate::support::errors::DomainResult;

const JUMP_THRESHOLD_WH: i64 = 10_000;

pub struct MeterValuesHandler;

#[async_trait]
impl Handler for MeterValuesHandler {
    async fn handle(&self, request: &Request, ctx: &PipelineContext) -> DomainResult<Response> {
        let payload = &request.payload;
        let connector_id = payload.get("connectorId").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        let transaction_id = payload.get("transactionId").and_then(|v| v.as_i64());

        let mut previous = match transaction_id {
            Some(tx_id) => ctx
                .store
                .last_for_transaction(tx_id, DEFAULT_MEASURAND)
                .await?
                .and_then(|mv| mv.numeric_value()),
            None => None,
        };

        let mut values = Vec::new();
        if let Some(entries) = payload.get("meterValue").and_then(|v| v.as_array()) {
            for entry in entries {
                let timestamp: DateTime<Utc> = entry
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now);

                let Some(samples) = entry.get("sampledValue").and_then(|v| v.as_array()) else {
                    continue;
                };
                for sample in samples {
                    let measurand = sample.get("measurand").and_then(|v| v.as_str()).unwrap_or(DEFAULT_MEASURAND);
                    let value = sample.get("value").and_then(|v| v.as_str()).unwrap_or("").to_string();

                    let mv = MeterValue::builder(&request.charge_point_id, connector_id, timestamp)
                        .transaction_id(transaction_id)
                        .measurand(measurand)
                        .unit(sample.get("unit").and_then(|v| v.as_str()).unwrap_or(DEFAULT_UNIT))
                        .context(sample.get("context").and_then(|v| v.as_str()).unwrap_or(DEFAULT_CONTEXT))
                        .location(sample.get("location").and_then(|v| v.as_str()).unwrap_or(DEFAULT_LOCATION))
                        .phase(sample.get("phase").and_then(|v| v.as_str()).map(String::from))
                        .format(sample.get("format").and_then(|v| v.as_str()).unwrap_or(DEFAULT_FORMAT))
                        .value(value)
                        .build();

                    if measurand == DEFAULT_MEASURAND {
                        if let (Some(prev), Some(current), Some(tx_id)) = (previous, mv.numeric_value(), transaction_id) {
                            let delta = (current - prev).abs();
                            if delta > JUMP_THRESHOLD_WH {
                                ctx.observer.publish(DomainEvent::EnergyJump {
                                    charge_point_id: request.charge_point_id.clone(),
                                    transaction_id: tx_id,
                                    previous_wh: prev,
                                    current_wh: current,
                                    delta_wh: delta,
                                });
                            }
                        }
                        if let Some(current) = mv.numeric_value() {
                            previous = Some(current);
                        }
                    }

                    values.push(mv);
                }
            }
        }

        if !values.is_empty() {
            ctx.store.create_meter_values(values).await?;
        }

        Ok(Response::with_payload(json!({})))
    }
}
