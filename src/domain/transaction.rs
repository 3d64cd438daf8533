//! Transaction domain entity (spec.md §3)

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Completed,
}



/// Why a transaction stopped. `Other` and `Reboot` are synthesized by orphan
/// closure (spec.md §4.5); the rest come from the station's StopTransaction
/// payload verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Local,
    Remote,
    EmergencyStop,
    EVDisconnected,
    HardReset,
    SoftReset,
    PowerLoss,
    Reboot,
    Other,
    UnlockCommand,
    DeAuthorized,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Local => "Local",
            Self::Remote => "Remote",
            Self::EmergencyStop => "EmergencyStop",
            Self::EVDisconnected => "EVDisconnected",
            Self::HardReset => "HardReset",
            Self::SoftReset => "SoftReset",
            Self::PowerLoss => "PowerLoss",
            Self::Reboot => "Reboot",
            Self::Other => "Other",
            Self::UnlockCommand => "UnlockCommand",
            Self::DeAuthorized => "DeAuthorized",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StopReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Local" => Self::Local,
            "Remote" => Self::Remote,
            "EmergencyStop" => Self::EmergencyStop,
            "EVDisconnected" => Self::EVDisconnected,
            "HardReset" => Self::HardReset,
            "SoftReset" => Self::SoftReset,
            "PowerLoss" => Self::PowerLoss,
            "Reboot" => Self::Reboot,
            "Other" => Self::Other,
            "UnlockCommand" => Self::UnlockCommand,
            "DeAuthorized" => Self::DeAuthorized,
            _ => return Err(()),
        })
    }
}

/// A contiguous charging session on one connector (spec.md §3 Transaction,
/// GLOSSARY). `id` is always server-generated (spec.md §9, Open Question 3).
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: i64,
    pub charge_point_id: String,
    pub connector_id: u32,
    pub id_tag: String,
    pub meter_start: i64,
    pub meter_stop: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn new(
        id: i64,
        charge_point_id: impl Into<String>,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            charge_point_id: charge_point_id.into(),
            connector_id,
            id_tag: id_tag.into(),
            meter_start,
            meter_stop: None,
            started_at,
            stopped_at: None,
            stop_reason: None,
            status: TransactionStatus::Active,
        }
    }

    /// Invariant (b): Completed ⇒ all three stop fields set (spec.md §3).
    pub fn stop(&mut self, stopped_at: DateTime<Utc>, meter_stop: i64, reason: StopReason) {
        self.meter_stop = Some(meter_stop);
        self.stopped_at = Some(stopped_at);
        self.stop_reason = Some(reason);
        self.status = TransactionStatus::Completed;
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Invariant (b): `energy_delivered = meter_stop − meter_start` once Completed.
    pub fn energy_delivered(&self) -> Option<i64> {
        self.meter_stop.map(|stop| stop - self.meter_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction::new(1, "CP1", 1, "tag", 1000, Utc::now())
    }

    #[test]
    fn new_transaction_is_active() {
        let tx = sample_tx();
        assert!(tx.is_active());
        assert!(tx.meter_stop.is_none());
        assert!(tx.stopped_at.is_none());
    }

    #[test]
    fn stop_sets_completed_with_all_fields() {
        let mut tx = sample_tx();
        let now = Utc::now();
        tx.stop(now, 6000, StopReason::Local);
        assert!(!tx.is_active());
        assert_eq!(tx.meter_stop, Some(6000));
        assert_eq!(tx.stopped_at, Some(now));
        assert_eq!(tx.stop_reason, Some(StopReason::Local));
    }

    #[test]
    fn energy_delivered_matches_spec_law() {
        let mut tx = sample_tx();
        tx.stop(Utc::now(), 6000, StopReason::Local);
        assert_eq!(tx.energy_delivered(), Some(5000));
    }

    #[test]
    fn energy_delivered_none_while_active() {
        assert_eq!(sample_tx().energy_delivered(), None);
    }

    #[test]
    fn stop_reason_roundtrips_through_display_and_from_str() {
        use std::str::FromStr;
        for reason in [
            StopReason::Local,
            StopReason::Remote,
            StopReason::EmergencyStop,
            StopReason::EVDisconnected,
            StopReason::HardReset,
            StopReason::SoftReset,
            StopReason::PowerLoss,
            StopReason::Reboot,
            StopReason::Other,
            StopReason::UnlockCommand,
            StopReason::DeAuthorized,
        ] {
            let rendered = reason.to_string();
            assert_eq!(StopReason::from_str(&rendered).unwrap(), reason);
        }
    }
}
