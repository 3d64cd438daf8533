//! MeterValue domain entity (spec.md §3)
//!
//! A timestamped sample owned by a Transaction. Ordered append-only within a
//! transaction. Default field values mirror the MeterValues handler
//! (spec.md §4.5): `measurand=Energy.Active.Import.Register`, `unit=Wh`,
//! `context=Sample.Periodic`, `format=Raw`, `location=Outlet`.

use chrono::{DateTime, Utc};

pub const DEFAULT_MEASURAND: &str = "Energy.Active.Import.Register";
pub const DEFAULT_UNIT: &str = "Wh";
pub const DEFAULT_CONTEXT: &str = "Sample.Periodic";
pub const DEFAULT_FORMAT: &str = "Raw";
pub const DEFAULT_LOCATION: &str = "Outlet";

#[derive(Debug, Clone)]
pub struct MeterValue {
    pub transaction_id: Option<i64>,
    pub charge_point_id: String,
    pub connector_id: u32,
    pub timestamp: DateTime<Utc>,
    pub measurand: String,
    pub unit: String,
    pub value: String,
    pub context: String,
    pub location: String,
    pub phase: Option<String>,
    pub format: String,
    /// Set for samples ingested from a StopTransaction's `transactionData` block.
    pub is_final: bool,
}

impl MeterValue {
    pub fn builder(charge_point_id: impl Into<String>, connector_id: u32, timestamp: DateTime<Utc>) -> MeterValueBuilder {
        MeterValueBuilder {
            transaction_id: None,
            charge_point_id: charge_point_id.into(),
            connector_id,
            timestamp,
            measurand: DEFAULT_MEASURAND.to_string(),
            unit: DEFAULT_UNIT.to_string(),
            value: String::new(),
            context: DEFAULT_CONTEXT.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            phase: None,
            format: DEFAULT_FORMAT.to_string(),
            is_final: false,
        }
    }

    /// Parses `value` as a signed integer reading in the sample's unit,
    /// used by meter-reading jump detection (spec.md §4.5).
    pub fn numeric_value(&self) -> Option<i64> {
        self.value.parse::<f64>().ok().map(|v| v.round() as i64)
    }
}

pub struct MeterValueBuilder {
    transaction_id: Option<i64>,
    charge_point_id: String,
    connector_id: u32,
    timestamp: DateTime<Utc>,
    measurand: String,
    unit: String,
    value: String,
    context: String,
    location: String,
    phase: Option<String>,
    format: String,
    is_final: bool,
}

impl MeterValueBuilder {
    pub fn transaction_id(mut self, id: Option<i64>) -> Self {
        self.transaction_id = id;
        self
    }

    pub fn measurand(mut self, measurand: impl Into<String>) -> Self {
        self.measurand = measurand.into();
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn phase(mut self, phase: Option<String>) -> Self {
        self.phase = phase;
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn is_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    pub fn build(self) -> MeterValue {
        MeterValue {
            transaction_id: self.transaction_id,
            charge_point_id: self.charge_point_id,
            connector_id: self.connector_id,
            timestamp: self.timestamp,
            measurand: self.measurand,
            unit: self.unit,
            value: self.value,
            context: self.context,
            location: self.location,
            phase: self.phase,
            format: self.format,
            is_final: self.is_final,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let mv = MeterValue::builder("CP1", 1, Utc::now()).value("1500").build();
        assert_eq!(mv.measurand, DEFAULT_MEASURAND);
        assert_eq!(mv.unit, DEFAULT_UNIT);
        assert_eq!(mv.context, DEFAULT_CONTEXT);
        assert_eq!(mv.format, DEFAULT_FORMAT);
        assert_eq!(mv.location, DEFAULT_LOCATION);
        assert!(!mv.is_final);
    }

    #[test]
    fn numeric_value_parses_integral_reading() {
        let mv = MeterValue::builder("CP1", 1, Utc::now()).value("1500").build();
        assert_eq!(mv.numeric_value(), Some(1500));
    }

    #[test]
    fn numeric_value_none_for_non_numeric_reading() {
        let mv = MeterValue::builder("CP1", 1, Utc::now()).value("n/a").build();
        assert_eq!(mv.numeric_value(), None);
    }
}
