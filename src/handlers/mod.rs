//! OCPP action handlers (spec.md §4.5): the concrete middlewares implementing
//! each action's domain effect. One file per action family, grounded on
//! `original_source/src/levity/handlers/charge_point.py`'s per-action methods
//! and defaults.

pub mod authorize;
pub mod auto_remote_start;
pub mod boot_notification;
pub mod data_transfer;
pub mod diagnostics_status;
pub mod heartbeat;
pub mod meter_values;
pub mod orphan;
pub mod start_transaction;
pub mod status_notification;
pub mod stop_transaction;

pub use authorize::AuthorizeHandler;
pub use boot_notification::BootNotificationHandler;
pub use data_transfer::DataTransferHandler;
pub use diagnostics_status::DiagnosticsStatusHandler;
pub use heartbeat::HeartbeatHandler;
pub use meter_values::MeterValuesHandler;
pub use start_transaction::StartTransactionHandler;
pub use status_notification::StatusNotificationHandler;
pub use stop_transaction::StopTransactionHandler;
