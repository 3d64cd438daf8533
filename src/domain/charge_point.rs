//! ChargePoint domain entity (spec.md §3)

use chrono::{DateTime, Utc};

/// Operational status of a charge point as a whole (connector 0). Carries
/// the same OCPP StatusNotification vocabulary as `ConnectorStatus` — a
/// `connectorId == 0` report is still one of these values, just scoped to
/// the station rather than a socket (spec.md §4.5) — plus `Unknown`, the
/// value a lazily-created ChargePoint starts with before any
/// StatusNotification has arrived (spec.md §4.3 "Lazy creation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePointStatus {
    Unknown,
    Available,
    Preparing,
    Charging,
    SuspendedEV,
    SuspendedEVSE,
    Finishing,
    Reserved,
    Unavailable,
    Faulted,
}

impl Default for ChargePointStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for ChargePointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "Unknown",
            Self::Available => "Available",
            Self::Preparing => "Preparing",
            Self::Charging => "Charging",
            Self::SuspendedEV => "SuspendedEV",
            Self::SuspendedEVSE => "SuspendedEVSE",
            Self::Finishing => "Finishing",
            Self::Reserved => "Reserved",
            Self::Unavailable => "Unavailable",
            Self::Faulted => "Faulted",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ChargePointStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Unknown" => Self::Unknown,
            "Available" => Self::Available,
            "Preparing" => Self::Preparing,
            "Charging" => Self::Charging,
            "SuspendedEV" => Self::SuspendedEV,
            "SuspendedEVSE" => Self::SuspendedEVSE,
            "Finishing" => Self::Finishing,
            "Reserved" => Self::Reserved,
            "Unavailable" => Self::Unavailable,
            "Faulted" => Self::Faulted,
            _ => return Err(()),
        })
    }
}

/// A registered charging station. Created lazily on first inbound message of
/// any kind, not only BootNotification (spec.md §3, §4.3 "Lazy creation").
#[derive(Debug, Clone)]
pub struct ChargePoint {
    pub id: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub status: ChargePointStatus,
    pub error_code: Option<String>,
    pub vendor_error_code: Option<String>,
    pub vendor_status_info: Option<String>,
    pub is_connected: bool,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_boot_at: Option<DateTime<Utc>>,
    pub last_connect_at: Option<DateTime<Utc>>,
    pub last_tx_start_at: Option<DateTime<Utc>>,
    pub last_tx_stop_at: Option<DateTime<Utc>>,
}

impl ChargePoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vendor: None,
            model: None,
            serial_number: None,
            firmware_version: None,
            iccid: None,
            imsi: None,
            status: ChargePointStatus::Unknown,
            error_code: None,
            vendor_error_code: None,
            vendor_status_info: None,
            is_connected: false,
            last_heartbeat_at: None,
            last_boot_at: None,
            last_connect_at: None,
            last_tx_start_at: None,
            last_tx_stop_at: None,
        }
    }
}

/// Partial-update fields for `Store::upsert_charge_point`. `None` fields must
/// not overwrite existing values (spec.md §4.2 "null fields do not overwrite").
#[derive(Debug, Clone, Default)]
pub struct ChargePointUpdate {
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub status: Option<ChargePointStatus>,
    pub error_code: Option<String>,
    pub vendor_error_code: Option<String>,
    pub vendor_status_info: Option<String>,
    pub is_connected: Option<bool>,
    pub last_boot_at: Option<DateTime<Utc>>,
    pub last_tx_start_at: Option<DateTime<Utc>>,
    pub last_tx_stop_at: Option<DateTime<Utc>>,
}

impl ChargePointUpdate {
    pub fn apply(self, cp: &mut ChargePoint) {
        if self.vendor.is_some() {
            cp.vendor = self.vendor;
        }
        if self.model.is_some() {
            cp.model = self.model;
        }
        if self.serial_number.is_some() {
            cp.serial_number = self.serial_number;
        }
        if self.firmware_version.is_some() {
            cp.firmware_version = self.firmware_version;
        }
        if self.iccid.is_some() {
            cp.iccid = self.iccid;
        }
        if self.imsi.is_some() {
            cp.imsi = self.imsi;
        }
        if let Some(status) = self.status {
            cp.status = status;
        }
        if self.error_code.is_some() {
            cp.error_code = self.error_code;
        }
        if self.vendor_error_code.is_some() {
            cp.vendor_error_code = self.vendor_error_code;
        }
        if self.vendor_status_info.is_some() {
            cp.vendor_status_info = self.vendor_status_info;
        }
        if let Some(connected) = self.is_connected {
            cp.is_connected = connected;
        }
        if self.last_boot_at.is_some() {
            cp.last_boot_at = self.last_boot_at;
        }
        if self.last_tx_start_at.is_some() {
            cp.last_tx_start_at = self.last_tx_start_at;
        }
        if self.last_tx_stop_at.is_some() {
            cp.last_tx_stop_at = self.last_tx_stop_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_update_preserves_unset_fields() {
        let mut cp = ChargePoint::new("CP1");
        cp.vendor = Some("Acme".into());

        let update = ChargePointUpdate {
            model: Some("Turbo".into()),
            ..Default::default()
        };
        update.apply(&mut cp);

        assert_eq!(cp.vendor.as_deref(), Some("Acme"));
        assert_eq!(cp.model.as_deref(), Some("Turbo"));
    }

    #[test]
    fn new_charge_point_defaults_to_unknown_and_disconnected() {
        let cp = ChargePoint::new("CP1");
        assert_eq!(cp.status, ChargePointStatus::Unknown);
        assert!(!cp.is_connected);
    }
}
