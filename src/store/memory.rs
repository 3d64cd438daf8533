//! In-memory reference implementation of `Store`.
//!
//! Built on `dashmap::DashMap` keyed exactly as the uniqueness constraints in
//! spec.md §3 require: `(charge_point_id, connector_id)` for connectors,
//! `(actor, unique_id)` for messages. Swapping this out for a durable backend
//! behind the same `Store` trait is a deployment concern (spec.md §1).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::Store;
use crate::domain::{
    ChargePoint, ChargePointStatus, ChargePointUpdate, Connector, ConnectorStatus, Message,
    MeterValue, StopReason, Transaction,
};
use crate::support::errors::{Actor, DomainError, DomainResult};

pub struct InMemoryStore {
    charge_points: DashMap<String, ChargePoint>,
    connectors: DashMap<(String, u32), Connector>,
    transactions: DashMap<i64, Transaction>,
    /// Samples linked to a transaction, keyed by transaction id.
    meter_values_by_tx: DashMap<i64, Vec<MeterValue>>,
    /// Connector-level samples with no transaction (still recorded, spec.md §4.5).
    orphan_meter_values: Mutex<Vec<MeterValue>>,
    messages: DashMap<(Actor, String), Message>,
    transaction_counter: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            charge_points: DashMap::new(),
            connectors: DashMap::new(),
            transactions: DashMap::new(),
            meter_values_by_tx: DashMap::new(),
            orphan_meter_values: Mutex::new(Vec::new()),
            messages: DashMap::new(),
            transaction_counter: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_charge_point(&self, id: &str, update: ChargePointUpdate) -> DomainResult<ChargePoint> {
        let mut entry = self
            .charge_points
            .entry(id.to_string())
            .or_insert_with(|| ChargePoint::new(id));
        update.apply(&mut entry);
        Ok(entry.clone())
    }

    async fn get_charge_point(&self, id: &str) -> DomainResult<Option<ChargePoint>> {
        Ok(self.charge_points.get(id).map(|cp| cp.clone()))
    }

    async fn update_connection(&self, id: &str, connected: bool, at: DateTime<Utc>) -> DomainResult<()> {
        let mut cp = self
            .charge_points
            .entry(id.to_string())
            .or_insert_with(|| ChargePoint::new(id));
        cp.is_connected = connected;
        if connected {
            cp.last_connect_at = Some(at);
        }
        Ok(())
    }

    async fn update_heartbeat(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let mut cp = self
            .charge_points
            .get_mut(id)
            .ok_or_else(|| DomainError::ChargePointNotFound(id.to_string()))?;
        cp.last_heartbeat_at = Some(at);
        Ok(())
    }

    async fn update_status(&self, id: &str, status: ChargePointStatus) -> DomainResult<()> {
        let mut cp = self
            .charge_points
            .entry(id.to_string())
            .or_insert_with(|| ChargePoint::new(id));
        cp.status = status;
        Ok(())
    }

    async fn upsert_connector(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        status: ConnectorStatus,
        error_code: Option<String>,
        vendor_error_code: Option<String>,
    ) -> DomainResult<Connector> {
        let key = (charge_point_id.to_string(), connector_id);
        let mut entry = self
            .connectors
            .entry(key)
            .or_insert_with(|| Connector::new(charge_point_id, connector_id));
        entry.status = status;
        entry.error_code = error_code;
        entry.vendor_error_code = vendor_error_code;
        Ok(entry.clone())
    }

    async fn create_transaction(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        id_tag: &str,
        started_at: DateTime<Utc>,
        meter_start: i64,
    ) -> DomainResult<Transaction> {
        let id = self.transaction_counter.fetch_add(1, Ordering::SeqCst);
        let tx = Transaction::new(id, charge_point_id, connector_id, id_tag, meter_start, started_at);
        self.transactions.insert(id, tx.clone());
        Ok(tx)
    }

    async fn stop_transaction(
        &self,
        id: i64,
        stopped_at: DateTime<Utc>,
        meter_stop: i64,
        reason: StopReason,
    ) -> DomainResult<Transaction> {
        let mut tx = self
            .transactions
            .get_mut(&id)
            .ok_or(DomainError::TransactionNotFound(id))?;
        tx.stop(stopped_at, meter_stop, reason);
        Ok(tx.clone())
    }

    async fn active_for_charge_point(&self, charge_point_id: &str) -> DomainResult<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| t.charge_point_id == charge_point_id && t.is_active())
            .map(|t| t.clone())
            .collect())
    }

    async fn get_transaction(&self, id: i64) -> DomainResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn create_meter_values(&self, values: Vec<MeterValue>) -> DomainResult<()> {
        for mv in values {
            match mv.transaction_id {
                Some(tx_id) => self.meter_values_by_tx.entry(tx_id).or_default().push(mv),
                None => self.orphan_meter_values.lock().unwrap().push(mv),
            }
        }
        Ok(())
    }

    async fn last_for_transaction(&self, transaction_id: i64, measurand: &str) -> DomainResult<Option<MeterValue>> {
        Ok(self.meter_values_by_tx.get(&transaction_id).and_then(|values| {
            values
                .iter()
                .rev()
                .find(|mv| mv.measurand == measurand)
                .cloned()
        }))
    }

    async fn insert_message(&self, message: Message) -> DomainResult<()> {
        let key = (message.actor, message.unique_id.clone());
        match self.messages.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(DomainError::DuplicateMessage {
                actor: key.0,
                unique_id: key.1,
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(message);
                Ok(())
            }
        }
    }

    async fn link_reply(&self, actor: Actor, call_unique_id: &str, reply_unique_id: &str) -> DomainResult<()> {
        let mut call = self
            .messages
            .get_mut(&(actor, call_unique_id.to_string()))
            .ok_or_else(|| DomainError::Other(format!("no call message for unique_id {call_unique_id}")))?;
        call.reply_unique_id = Some(reply_unique_id.to_string());
        Ok(())
    }

    async fn link_transaction(&self, actor: Actor, unique_id: &str, transaction_id: i64) -> DomainResult<()> {
        let mut message = self
            .messages
            .get_mut(&(actor, unique_id.to_string()))
            .ok_or_else(|| DomainError::Other(format!("no call message for unique_id {unique_id}")))?;
        message.transaction_id = Some(transaction_id);
        Ok(())
    }

    async fn find_call(&self, actor: Actor, unique_id: &str) -> DomainResult<Option<Message>> {
        Ok(self.messages.get(&(actor, unique_id.to_string())).map(|m| m.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageType;

    fn store() -> InMemoryStore {
        InMemoryStore::new()
    }

    #[tokio::test]
    async fn upsert_charge_point_preserves_unset_fields() {
        let s = store();
        s.upsert_charge_point(
            "CP1",
            ChargePointUpdate {
                vendor: Some("Acme".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        s.upsert_charge_point(
            "CP1",
            ChargePointUpdate {
                model: Some("Turbo".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let cp = s.get_charge_point("CP1").await.unwrap().unwrap();
        assert_eq!(cp.vendor.as_deref(), Some("Acme"));
        assert_eq!(cp.model.as_deref(), Some("Turbo"));
    }

    #[tokio::test]
    async fn connector_zero_is_not_auto_created_by_store() {
        // Store never special-cases connector_id==0; that routing is the
        // handler's job (spec.md §8 boundary behaviour).
        let s = store();
        let conn = s
            .upsert_connector("CP1", 1, ConnectorStatus::Available, None, None)
            .await
            .unwrap();
        assert_eq!(conn.connector_id, 1);
    }

    #[tokio::test]
    async fn create_and_stop_transaction_matches_energy_law() {
        let s = store();
        let tx = s
            .create_transaction("CP1", 1, "tag", Utc::now(), 0)
            .await
            .unwrap();
        let stopped = s
            .stop_transaction(tx.id, Utc::now(), 5000, StopReason::Local)
            .await
            .unwrap();
        assert_eq!(stopped.energy_delivered(), Some(5000));
    }

    #[tokio::test]
    async fn active_for_charge_point_excludes_completed() {
        let s = store();
        let tx = s.create_transaction("CP1", 1, "tag", Utc::now(), 0).await.unwrap();
        s.stop_transaction(tx.id, Utc::now(), 100, StopReason::Local).await.unwrap();
        s.create_transaction("CP1", 1, "tag2", Utc::now(), 0).await.unwrap();

        let active = s.active_for_charge_point("CP1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id_tag, "tag2");
    }

    #[tokio::test]
    async fn last_for_transaction_scoped_per_transaction() {
        let s = store();
        let t1 = s.create_transaction("CP1", 1, "tag", Utc::now(), 0).await.unwrap();
        let t2 = s.create_transaction("CP1", 1, "tag2", Utc::now(), 0).await.unwrap();

        s.create_meter_values(vec![MeterValue::builder("CP1", 1, Utc::now())
            .transaction_id(Some(t1.id))
            .value("1800")
            .build()])
        .await
        .unwrap();

        // no values recorded for t2 — must not see t1's reading
        let last_t2 = s.last_for_transaction(t2.id, "Energy.Active.Import.Register").await.unwrap();
        assert!(last_t2.is_none());

        let last_t1 = s.last_for_transaction(t1.id, "Energy.Active.Import.Register").await.unwrap();
        assert_eq!(last_t1.unwrap().numeric_value(), Some(1800));
    }

    #[tokio::test]
    async fn duplicate_message_unique_id_rejected() {
        let s = store();
        let msg = Message::call("CP1", Actor::ChargePoint, "b1", "BootNotification", serde_json::json!({}), Utc::now());
        s.insert_message(msg.clone()).await.unwrap();
        let err = s.insert_message(msg).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateMessage { .. }));
    }

    #[tokio::test]
    async fn same_unique_id_distinct_actors_is_not_a_duplicate() {
        let s = store();
        s.insert_message(Message::call(
            "CP1",
            Actor::ChargePoint,
            "id1",
            "Heartbeat",
            serde_json::json!({}),
            Utc::now(),
        ))
        .await
        .unwrap();
        let result = s
            .insert_message(Message::call_result(
                "CP1",
                Actor::CentralSystem,
                "id1",
                serde_json::json!({}),
                Utc::now(),
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn link_reply_sets_back_reference() {
        let s = store();
        s.insert_message(Message::call(
            "CP1",
            Actor::ChargePoint,
            "b1",
            "BootNotification",
            serde_json::json!({}),
            Utc::now(),
        ))
        .await
        .unwrap();
        s.link_reply(Actor::ChargePoint, "b1", "b1").await.unwrap();

        let call = s.find_call(Actor::ChargePoint, "b1").await.unwrap().unwrap();
        assert_eq!(call.reply_unique_id.as_deref(), Some("b1"));
        assert_eq!(call.message_type, MessageType::Call);
    }
}
