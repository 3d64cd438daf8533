//! # ocpp-central
//!
//! An OCPP 1.6-J Central System: terminates persistent WebSocket connections
//! from charging stations, decodes the OCPP wire framing, maintains
//! authoritative state for each station and transaction, and runs a
//! composable request-processing pipeline that produces replies and may
//! emit unsolicited follow-up commands.
//!
//! ## Module map
//!
//! - **support**: cross-cutting utilities (wire framing, errors, shutdown)
//! - **domain**: core entities (ChargePoint, Connector, Transaction, MeterValue, Message)
//! - **store**: the `Store` repository trait and its in-memory reference implementation
//! - **observer**: fan-out of domain events to the audit and metrics sinks
//! - **pipeline**: the onion-shaped middleware chain and its closed catalog
//! - **handlers**: the concrete middleware implementing each OCPP action
//! - **session**: the per-station connection actor, outbound queue, registry, watchdog
//! - **acceptor**: the WebSocket listener that wires a new connection into a `Session`
//! - **config**: TOML-based application configuration

pub mod acceptor;
pub mod config;
pub mod domain;
pub mod handlers;
pub mod observer;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod support;

pub use config::{default_config_path, AppConfig};
pub use store::{InMemoryStore, Store};
