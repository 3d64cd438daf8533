//! Domain entities (spec.md §3): ChargePoint, Connector, Transaction, MeterValue, Message.

pub mod charge_point;
pub mod connector;
pub mod message;
pub mod meter_value;
pub mod transaction;

pub use charge_point::{ChargePoint, ChargePointStatus, ChargePointUpdate};
pub use connector::{Connector, ConnectorStatus};
pub use message::{Message, MessageType};
pub use meter_value::MeterValue;
pub use transaction::{StopReason, Transaction, TransactionStatus};
