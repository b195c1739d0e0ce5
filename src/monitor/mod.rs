//! Run monitoring and human confirmation.
//!
//! A [`Monitor`] polls the workflow engine for every run it watches, turns
//! status changes into [`MonitorEvent`]s, raises confirmation requests for
//! failed or interactive steps, and applies human decisions back against the
//! engine.

pub mod applier;
pub mod confirmation;
pub mod confirmation_registry;
pub mod diff;
pub mod error;
pub mod events;
mod scheduler;
pub mod snapshot_store;

pub use crate::config::MonitorConfig;
pub use applier::{DecisionOutcome, DecisionResult};
pub use confirmation::{
    confirmation_key, ConfirmationAction, ConfirmationReason, ConfirmationRequest,
    ConfirmationResponse,
};
pub use confirmation_registry::ConfirmationRegistry;
pub use diff::{diff, DiffOutcome, NodeTransition, RunTransition, Transition};
pub use error::MonitorError;
pub use events::{
    ChannelSink, EventSink, JsonLinesSink, MonitorErrorReason, MonitorEvent, NullSink,
};
pub use snapshot_store::SnapshotStore;

use crate::engine::{EngineGateway, Run, RunDetail};
use crate::runtime::RuntimeLog;
use scheduler::PollArena;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};

struct Shared {
    gateway: Arc<dyn EngineGateway>,
    sink: Arc<dyn EventSink>,
    config: MonitorConfig,
    log: RuntimeLog,
    polls: Mutex<PollArena>,
    snapshots: Mutex<SnapshotStore>,
    confirmations: Mutex<ConfirmationRegistry>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let polls = self.polls.get_mut().unwrap_or_else(|err| err.into_inner());
        polls.drain();
    }
}

/// Owns the poll loops, snapshots and pending confirmations of one monitor
/// instance. Clones share the same state.
#[derive(Clone)]
pub struct Monitor {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.shared.config)
            .field("active", &self.list_active_monitors())
            .finish()
    }
}

impl Monitor {
    pub fn new(
        gateway: Arc<dyn EngineGateway>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        Self::with_runtime_log(gateway, sink, config, RuntimeLog::disabled())
    }

    pub fn with_runtime_log(
        gateway: Arc<dyn EngineGateway>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
        log: RuntimeLog,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                sink,
                config,
                log,
                polls: Mutex::new(PollArena::default()),
                snapshots: Mutex::new(SnapshotStore::default()),
                confirmations: Mutex::new(ConfirmationRegistry::default()),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    pub fn list_active_monitors(&self) -> Vec<String> {
        self.polls().run_ids()
    }

    pub fn is_monitoring(&self, run_id: &str) -> bool {
        self.polls().contains(run_id)
    }

    pub fn get_run_state(&self, run_id: &str) -> Option<RunDetail> {
        self.snapshots().get(run_id).cloned()
    }

    pub fn list_pending_confirmations(&self) -> Vec<ConfirmationRequest> {
        self.confirmations().list()
    }

    pub fn get_confirmation(&self, confirmation_id: &str) -> Option<ConfirmationRequest> {
        self.confirmations().get(confirmation_id).cloned()
    }

    /// Starts a run on the engine and attaches monitoring to it.
    pub fn start_run(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        user: Option<&str>,
    ) -> Result<Run, MonitorError> {
        let run = self
            .shared
            .gateway
            .start_run(workflow_id, inputs, user)
            .map_err(|source| MonitorError::EngineUnavailable {
                operation: format!("starting workflow `{workflow_id}`"),
                source,
            })?;
        self.shared.log.info(
            "monitor.run.started",
            &format!("workflow_id={workflow_id} run_id={}", run.id),
        );
        self.start_monitoring(&run.id);
        Ok(run)
    }

    fn emit(&self, event: MonitorEvent) {
        self.shared.sink.emit(event);
    }

    fn polls(&self) -> MutexGuard<'_, PollArena> {
        self.shared
            .polls
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn snapshots(&self) -> MutexGuard<'_, SnapshotStore> {
        self.shared
            .snapshots
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn confirmations(&self) -> MutexGuard<'_, ConfirmationRegistry> {
        self.shared
            .confirmations
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }
}
