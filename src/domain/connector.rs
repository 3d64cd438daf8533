//! Connector domain entity (spec.md §3)
//!
//! Identified by `(charge_point_id, connector_id)`. `connector_id == 0` refers
//! to the charge point as a whole and never produces a Connector row — the
//! StatusNotification handler routes that case onto `ChargePoint` instead
//! (spec.md §4.5, §8 boundary behaviour).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorStatus {
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

impl Default for ConnectorStatus {
    fn default() -> Self {
        Self::Available
    }
}

impl std::fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
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

impl std::str::FromStr for ConnectorStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
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

#[derive(Debug, Clone)]
pub struct Connector {
    pub charge_point_id: String,
    pub connector_id: u32,
    pub status: ConnectorStatus,
    pub error_code: Option<String>,
    pub vendor_error_code: Option<String>,
}

impl Connector {
    pub fn new(charge_point_id: impl Into<String>, connector_id: u32) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            connector_id,
            status: ConnectorStatus::default(),
            error_code: None,
            vendor_error_code: None,
        }
    }
}
