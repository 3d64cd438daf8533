//! Orphan transaction closure (spec.md §4.5, §8 S2/S3)
//!
//! Grounded directly on `original_source/src/levity/plugins/orphaned_transaction.py`'s
//! `_close_orphaned_transactions`: find every Active transaction for a
//! station, close each using its last known meter reading (or `meter_start`
//! if none was ever recorded), with `reason=Other` on a new StartTransaction
//! and `reason=Reboot` on BootNotification.

use chrono::{DateTime, Utc};

use crate::domain::StopReason;
use crate::observer::{DomainEvent, ObserverBus};
use crate::domain::meter_value::DEFAULT_MEASURAND;
use crate::store::Store;
use crate::support::errors::DomainResult;

/// Closes every Active transaction for `charge_point_id`, guaranteeing at
/// most one Active transaction per station at handler entry (spec.md §3
/// invariant, §4.5 step 1).
pub async fn close_orphans(
    store: &dyn Store,
    observer: &ObserverBus,
    charge_point_id: &str,
    reason: StopReason,
    at: DateTime<Utc>,
) -> DomainResult<()> {
    let orphans = store.active_for_charge_point(charge_point_id).await?;
    for tx in orphans {
        let meter_stop = match store.last_for_transaction(tx.id, DEFAULT_MEASURAND).await? {
            Some(mv) => mv.numeric_value().unwrap_or(tx.meter_start),
            None => tx.meter_start,
        };
        let closed = store.stop_transaction(tx.id, at, meter_stop, reason.clone()).await?;
        observer.publish(DomainEvent::TransactionStopped {
            charge_point_id: charge_point_id.to_string(),
            connector_id: closed.connector_id,
            transaction_id: closed.id,
            energy_delivered_wh: closed.energy_delivered().unwrap_or(0),
        });
    }
    Ok(())
}
