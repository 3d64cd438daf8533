//! Store trait (spec.md §4.2)
//!
//! Repository operations grouped by entity. All operations are transactional
//! at the single-row granularity. The only implementation shipped is
//! `InMemoryStore`; a durable backend behind this same trait is a deployment
//! concern (spec.md §1).

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ChargePoint, ChargePointUpdate, Connector, ConnectorStatus, Message, MeterValue, StopReason, Transaction};
use crate::support::errors::{Actor, DomainResult};

pub use memory::InMemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    // ── ChargePoint ──────────────────────────────────────────────
    /// Partial-update upsert: null fields in `update` do not overwrite
    /// existing values (spec.md §4.2). Creates the row if absent.
    async fn upsert_charge_point(&self, id: &str, update: ChargePointUpdate) -> DomainResult<ChargePoint>;
    async fn get_charge_point(&self, id: &str) -> DomainResult<Option<ChargePoint>>;
    async fn update_connection(&self, id: &str, connected: bool, at: DateTime<Utc>) -> DomainResult<()>;
    async fn update_heartbeat(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()>;
    async fn update_status(&self, id: &str, status: crate::domain::ChargePointStatus) -> DomainResult<()>;

    // ── Connector ────────────────────────────────────────────────
    /// Replaces status fields unconditionally (spec.md §4.2), returning the row.
    async fn upsert_connector(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        status: ConnectorStatus,
        error_code: Option<String>,
        vendor_error_code: Option<String>,
    ) -> DomainResult<Connector>;

    // ── Transaction ──────────────────────────────────────────────
    async fn create_transaction(
        &self,
        charge_point_id: &str,
        connector_id: u32,
        id_tag: &str,
        started_at: DateTime<Utc>,
        meter_start: i64,
    ) -> DomainResult<Transaction>;
    async fn stop_transaction(
        &self,
        id: i64,
        stopped_at: DateTime<Utc>,
        meter_stop: i64,
        reason: StopReason,
    ) -> DomainResult<Transaction>;
    async fn active_for_charge_point(&self, charge_point_id: &str) -> DomainResult<Vec<Transaction>>;
    async fn get_transaction(&self, id: i64) -> DomainResult<Option<Transaction>>;

    // ── MeterValue ───────────────────────────────────────────────
    async fn create_meter_values(&self, values: Vec<MeterValue>) -> DomainResult<()>;
    /// Most recent sample matching `measurand`, scoped to one transaction
    /// (spec.md §4.5 meter-jump detection is scoped per transaction).
    async fn last_for_transaction(&self, transaction_id: i64, measurand: &str) -> DomainResult<Option<MeterValue>>;

    // ── Message ──────────────────────────────────────────────────
    /// Rejects duplicates on `(actor, unique_id)` with `DomainError::DuplicateMessage`
    /// (spec.md §4.2, §8 invariant 4).
    async fn insert_message(&self, message: Message) -> DomainResult<()>;
    async fn link_reply(&self, actor: Actor, call_unique_id: &str, reply_unique_id: &str) -> DomainResult<()>;
    /// Links a Call Message to the Transaction it produced or refers to
    /// (spec.md §4.5 StartTransaction step 4: "Link the inbound Message to
    /// the new transaction").
    async fn link_transaction(&self, actor: Actor, unique_id: &str, transaction_id: i64) -> DomainResult<()>;
    async fn find_call(&self, actor: Actor, unique_id: &str) -> DomainResult<Option<Message>>;
}
