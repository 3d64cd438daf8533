//! Closed registry mapping `(action, message_type)` to an assembled Pipeline
//! (spec.md §9 "Dynamic dispatch across middlewares"). Built once at boot
//! from explicit constructor registration; read-only thereafter.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handlers::{
    auto_remote_start::AutoRemoteStartHook, start_transaction::OrphanClosureBeforeHook, AuthorizeHandler,
    BootNotificationHandler, DataTransferHandler, DiagnosticsStatusHandler, HeartbeatHandler, MeterValuesHandler,
    StartTransactionHandler, StatusNotificationHandler, StopTransactionHandler,
};

use super::Pipeline;

pub struct PipelineCatalog {
    pipelines: HashMap<&'static str, Pipeline>,
}

impl PipelineCatalog {
    /// Assembles every supported inbound Call action (spec.md §6). Unknown
    /// actions are a lookup miss, translated by the Session into a
    /// `NotImplemented` CallError (spec.md §7).
    pub fn build() -> Self {
        let mut pipelines = HashMap::new();

        pipelines.insert("BootNotification", Pipeline::new(vec![], Arc::new(BootNotificationHandler), vec![]));
        pipelines.insert("Heartbeat", Pipeline::new(vec![], Arc::new(HeartbeatHandler), vec![]));
        pipelines.insert(
            "StatusNotification",
            Pipeline::new(vec![], Arc::new(StatusNotificationHandler), vec![Arc::new(AutoRemoteStartHook)]),
        );
        pipelines.insert(
            "StartTransaction",
            Pipeline::new(vec![Arc::new(OrphanClosureBeforeHook)], Arc::new(StartTransactionHandler), vec![]),
        );
        pipelines.insert("StopTransaction", Pipeline::new(vec![], Arc::new(StopTransactionHandler), vec![]));
        pipelines.insert("MeterValues", Pipeline::new(vec![], Arc::new(MeterValuesHandler), vec![]));
        pipelines.insert("Authorize", Pipeline::new(vec![], Arc::new(AuthorizeHandler), vec![]));
        pipelines.insert("DataTransfer", Pipeline::new(vec![], Arc::new(DataTransferHandler), vec![]));
        pipelines.insert(
            "DiagnosticsStatusNotification",
            Pipeline::new(vec![], Arc::new(DiagnosticsStatusHandler), vec![]),
        );
        pipelines.insert(
            "FirmwareStatusNotification",
            Pipeline::new(vec![], Arc::new(DiagnosticsStatusHandler), vec![]),
        );

        Self { pipelines }
    }

    pub fn get(&self, action: &str) -> Option<&Pipeline> {
        self.pipelines.get(action)
    }
}

impl Default for PipelineCatalog {
    fn default() -> Self {
        Self::build()
    }
}
