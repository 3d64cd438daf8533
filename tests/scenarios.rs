//! End-to-end scenario tests (spec.md §8 S1-S6), driving the Pipeline and
//! the in-memory Store directly through `Session::handle_inbound` rather
//! than over a real network socket (SPEC_FULL.md "Test tooling").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use ocpp_central::domain::{ChargePointStatus, ChargePointUpdate, StopReason};
use ocpp_central::observer::ObserverBus;
use ocpp_central::pipeline::{OutboundDispatch, PipelineCatalog, PipelineContext};
use ocpp_central::session::{Connection, InboundOutcome, OutboundFrame, OutboundQueue};
use ocpp_central::store::{InMemoryStore, Store};
use ocpp_central::support::errors::DomainResult;
use ocpp_central::support::shutdown::ShutdownSignal;

/// A dispatcher that always reports the station offline. None of S1-S4/S6
/// exercise a central-initiated call, so this stub is never actually hit.
struct OfflineDispatch;

#[async_trait]
impl OutboundDispatch for OfflineDispatch {
    async fn dispatch(&self, charge_point_id: &str, _action: &str, _payload: Value) -> DomainResult<Value> {
        Err(ocpp_central::support::errors::DomainError::ChargePointOffline(charge_point_id.to_string()))
    }
}

struct Harness {
    session: ocpp_central::session::Session,
    store: Arc<dyn Store>,
    // kept alive so the outbound queue's consumer task doesn't see a closed channel
    _outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
}

fn build_session(charge_point_id: &str) -> Harness {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let observer = ObserverBus::new();
    let catalog = Arc::new(PipelineCatalog::build());

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let connection = Connection::new(charge_point_id, None, outbound_tx, Utc::now());
    let outbound = OutboundQueue::spawn(
        charge_point_id.to_string(),
        connection,
        store.clone(),
        observer.clone(),
        Duration::from_millis(0),
        Duration::from_secs(5),
        ShutdownSignal::new(),
    );

    let ctx = PipelineContext {
        store: store.clone(),
        observer: observer.clone(),
        heartbeat_interval_secs: 300,
        dispatch: Arc::new(OfflineDispatch),
        auto_remote_start: None,
    };

    let session = ocpp_central::session::Session {
        charge_point_id: charge_point_id.to_string(),
        store: store.clone(),
        observer,
        catalog,
        ctx,
        outbound,
        remote_addr: None,
    };

    Harness {
        session,
        store,
        _outbound_rx: outbound_rx,
    }
}

async fn send(harness: &Harness, text: &str) -> String {
    match harness.session.handle_inbound(text).await {
        InboundOutcome::Reply(reply) => reply,
        other => panic!("expected a reply, got a non-reply outcome for {text}: {other:?}"),
    }
}

impl std::fmt::Debug for InboundOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InboundOutcome::Reply(r) => write!(f, "Reply({r})"),
            InboundOutcome::None => write!(f, "None"),
            InboundOutcome::CloseConnection { code, reason } => write!(f, "CloseConnection({code}, {reason})"),
        }
    }
}

fn as_array(reply: &str) -> Value {
    serde_json::from_str(reply).unwrap()
}

/// S1 — Happy-path session: Boot, Status, Start, MeterValues, Stop, with the
/// expected reply shapes and final Transaction/MeterValue state.
#[tokio::test]
async fn s1_happy_path_session() {
    let h = build_session("CP1");

    let boot_reply = send(&h, r#"[2,"b1","BootNotification",{"chargePointVendor":"V","chargePointModel":"M"}]"#).await;
    let boot = as_array(&boot_reply);
    assert_eq!(boot[0], 3);
    assert_eq!(boot[1], "b1");
    assert_eq!(boot[2]["status"], "Accepted");
    assert!(boot[2]["currentTime"].is_string());
    assert_eq!(boot[2]["interval"], 300);

    let status_reply = send(&h, r#"[2,"s1","StatusNotification",{"connectorId":1,"errorCode":"NoError","status":"Available"}]"#).await;
    assert_eq!(as_array(&status_reply)[2], json!({}));

    let start_reply = send(
        &h,
        r#"[2,"t1","StartTransaction",{"connectorId":1,"idTag":"tag","meterStart":0,"timestamp":"2024-01-01T00:00:00Z"}]"#,
    )
    .await;
    let start = as_array(&start_reply);
    let tx_id = start[2]["transactionId"].as_i64().unwrap();
    assert_eq!(start[2]["idTagInfo"]["status"], "Accepted");

    let meter_reply = send(
        &h,
        &format!(
            r#"[2,"m1","MeterValues",{{"connectorId":1,"transactionId":{tx_id},"meterValue":[{{"timestamp":"2024-01-01T00:05:00Z","sampledValue":[{{"measurand":"Energy.Active.Import.Register","unit":"Wh","value":"1500"}}]}}]}}]"#
        ),
    )
    .await;
    assert_eq!(as_array(&meter_reply)[2], json!({}));

    let stop_reply = send(
        &h,
        &format!(r#"[2,"x1","StopTransaction",{{"transactionId":{tx_id},"meterStop":5000,"timestamp":"2024-01-01T00:30:00Z","reason":"Local"}}]"#),
    )
    .await;
    assert_eq!(as_array(&stop_reply)[2]["idTagInfo"]["status"], "Accepted");

    let tx = h.store.get_transaction(tx_id).await.unwrap().unwrap();
    assert!(!tx.is_active());
    assert_eq!(tx.energy_delivered(), Some(5000));

    let last = h.store.last_for_transaction(tx_id, "Energy.Active.Import.Register").await.unwrap().unwrap();
    assert_eq!(last.numeric_value(), Some(1500));
}

/// S2 — A new StartTransaction closes any orphaned Active transaction with
/// reason `Other`, using its last meter reading as `meter_stop`.
#[tokio::test]
async fn s2_orphan_closure_on_new_start_transaction() {
    let h = build_session("CP1");

    let old_tx = h.store.create_transaction("CP1", 1, "old-tag", Utc::now(), 100).await.unwrap();
    h.store
        .create_meter_values(vec![ocpp_central::domain::MeterValue::builder("CP1", 1, Utc::now())
            .transaction_id(Some(old_tx.id))
            .value("1800")
            .build()])
        .await
        .unwrap();

    let reply = send(
        &h,
        r#"[2,"t2","StartTransaction",{"connectorId":1,"idTag":"new-tag","meterStart":0,"timestamp":"2024-01-01T00:00:00Z"}]"#,
    )
    .await;
    let new_tx_id = as_array(&reply)[2]["transactionId"].as_i64().unwrap();

    let closed = h.store.get_transaction(old_tx.id).await.unwrap().unwrap();
    assert!(!closed.is_active());
    assert_eq!(closed.meter_stop, Some(1800));
    assert_eq!(closed.stop_reason, Some(StopReason::Other));

    let fresh = h.store.get_transaction(new_tx_id).await.unwrap().unwrap();
    assert!(fresh.is_active());
}

/// S3 — BootNotification closes any orphaned Active transaction with reason
/// `Reboot`, falling back to `meter_start` when no meter value was recorded.
#[tokio::test]
async fn s3_orphan_closure_on_boot() {
    let h = build_session("CP1");

    let old_tx = h.store.create_transaction("CP1", 1, "tag", Utc::now(), 200).await.unwrap();

    send(&h, r#"[2,"b2","BootNotification",{"chargePointVendor":"V","chargePointModel":"M"}]"#).await;

    let closed = h.store.get_transaction(old_tx.id).await.unwrap().unwrap();
    assert!(!closed.is_active());
    assert_eq!(closed.meter_stop, Some(200));
    assert_eq!(closed.stop_reason, Some(StopReason::Reboot));
}

/// S4 — Duplicate call id: only the first is processed, and the second is
/// dropped without producing a second reply (spec.md §8 invariant 4).
#[tokio::test]
async fn s4_duplicate_call_id_is_a_no_op() {
    let h = build_session("CP1");
    let frame = r#"[2,"b1","BootNotification",{"chargePointVendor":"V","chargePointModel":"M"}]"#;

    let first = h.session.handle_inbound(frame).await;
    assert!(matches!(first, InboundOutcome::Reply(_)));

    let second = h.session.handle_inbound(frame).await;
    assert!(matches!(second, InboundOutcome::None));

    let cp = h.store.get_charge_point("CP1").await.unwrap().unwrap();
    assert_eq!(cp.vendor.as_deref(), Some("V"));
}

/// A StatusNotification for connector_id=0 updates the ChargePoint row and
/// never creates a Connector row (spec.md §8 boundary behaviour).
#[tokio::test]
async fn connector_zero_updates_charge_point_not_connector() {
    let h = build_session("CP1");
    h.store.upsert_charge_point("CP1", ChargePointUpdate::default()).await.unwrap();

    send(&h, r#"[2,"s0","StatusNotification",{"connectorId":0,"errorCode":"NoError","status":"Faulted"}]"#).await;

    let cp = h.store.get_charge_point("CP1").await.unwrap().unwrap();
    assert_eq!(cp.error_code.as_deref(), Some("NoError"));
    assert_eq!(cp.status, ChargePointStatus::Faulted);
}

/// An unknown action produces a `NotImplemented` CallError, not a crash.
#[tokio::test]
async fn unknown_action_yields_not_implemented_call_error() {
    let h = build_session("CP1");
    let reply = send(&h, r#"[2,"u1","SomeFutureAction",{}]"#).await;
    let parsed = as_array(&reply);
    assert_eq!(parsed[0], 4);
    assert_eq!(parsed[2], "NotImplemented");
}

/// A malformed frame with a recoverable unique_id yields a FormationViolation
/// CallError rather than closing the connection (spec.md §7).
#[tokio::test]
async fn malformed_frame_yields_formation_violation_when_recoverable() {
    let h = build_session("CP1");
    let reply = send(&h, r#"[2,"m9"]"#).await;
    let parsed = as_array(&reply);
    assert_eq!(parsed[0], 4);
    assert_eq!(parsed[1], "m9");
    assert_eq!(parsed[2], "FormationViolation");
}

/// A malformed frame with no recoverable unique_id closes the connection
/// with a protocol-error code (spec.md §7).
#[tokio::test]
async fn malformed_frame_with_no_unique_id_closes_connection() {
    let h = build_session("CP1");
    let outcome = h.session.handle_inbound("not json at all").await;
    assert!(matches!(outcome, InboundOutcome::CloseConnection { code: 1002, .. }));
}
