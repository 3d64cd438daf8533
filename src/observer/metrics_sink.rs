//! Metrics sink (spec.md §6): named counters/gauges/histograms fed by
//! `ObserverBus::publish`. Metric names follow the intent of the original
//! system's Prometheus plugin catalog, adapted to this crate's naming.

use super::{ConnectionEvent, DomainEvent, Direction};

pub fn record(event: &DomainEvent) {
    match event {
        DomainEvent::Frame { dir, .. } => {
            let dir = match dir {
                Direction::Recv => "recv",
                Direction::Send => "send",
            };
            metrics::counter!("ocpp_frames_total", "dir" => dir).increment(1);
        }
        DomainEvent::Connection {
            charge_point_id,
            event,
            ..
        } => match event {
            ConnectionEvent::Connect => {
                metrics::gauge!("ocpp_charge_point_connected", "cp" => charge_point_id.clone()).set(1.0);
                metrics::counter!("ocpp_connections_total", "event" => "connect").increment(1);
            }
            ConnectionEvent::Disconnect => {
                metrics::gauge!("ocpp_charge_point_connected", "cp" => charge_point_id.clone()).set(0.0);
                metrics::counter!("ocpp_connections_total", "event" => "disconnect").increment(1);
            }
        },
        DomainEvent::TransactionStarted {
            charge_point_id,
            connector_id,
            ..
        } => {
            metrics::gauge!(
                "ocpp_transaction_active",
                "cp" => charge_point_id.clone(),
                "connector" => connector_id.to_string()
            )
            .set(1.0);
            metrics::counter!("ocpp_transactions_total", "status" => "started").increment(1);
        }
        DomainEvent::TransactionStopped {
            charge_point_id,
            connector_id,
            energy_delivered_wh,
            ..
        } => {
            metrics::gauge!(
                "ocpp_transaction_active",
                "cp" => charge_point_id.clone(),
                "connector" => connector_id.to_string()
            )
            .set(0.0);
            metrics::counter!("ocpp_transactions_total", "status" => "stopped").increment(1);
            metrics::counter!("ocpp_energy_delivered_wh_total", "cp" => charge_point_id.clone())
                .increment((*energy_delivered_wh).max(0) as u64);
        }
        DomainEvent::EnergyJump { charge_point_id, .. } => {
            metrics::counter!("ocpp_energy_jump_total", "cp" => charge_point_id.clone()).increment(1);
        }
        DomainEvent::DisconnectDuringActiveTransaction { charge_point_id } => {
            metrics::counter!("ocpp_disconnect_during_active_tx_total", "cp" => charge_point_id.clone())
                .increment(1);
        }
        DomainEvent::OutboundCallTimeout { charge_point_id, action } => {
            metrics::counter!(
                "ocpp_central_call_timeout_total",
                "cp" => charge_point_id.clone(),
                "action" => action.clone()
            )
            .increment(1);
        }
        DomainEvent::OutboundCallRejected { charge_point_id, action } => {
            metrics::counter!(
                "ocpp_central_call_rejected_total",
                "cp" => charge_point_id.clone(),
                "action" => action.clone()
            )
            .increment(1);
        }
        DomainEvent::HandlerLatency {
            charge_point_id,
            action,
            millis,
        } => {
            metrics::histogram!(
                "ocpp_handler_latency_ms",
                "cp" => charge_point_id.clone(),
                "action" => action.clone()
            )
            .record(*millis);
        }
    }
}
