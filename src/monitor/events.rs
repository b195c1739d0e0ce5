use super::applier::DecisionResult;
use super::confirmation::{ConfirmationRequest, ConfirmationResponse};
use crate::engine::{RunDetail, RunStatus, Step};
use serde::Serialize;
use std::io::Write;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusChanged {
    pub run_id: String,
    pub previous_status: Option<RunStatus>,
    pub current_status: RunStatus,
    pub run_detail: RunDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusChanged {
    pub run_id: String,
    pub node_id: String,
    pub previous_status: Option<RunStatus>,
    pub current_status: RunStatus,
    pub node: Step,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequired {
    pub confirmation_id: String,
    #[serde(flatten)]
    pub request: ConfirmationRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationProcessed {
    pub confirmation_id: String,
    pub response: ConfirmationResponse,
    pub result: DecisionResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorErrorReason {
    EngineUnavailable,
    RetriesExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorErrorEvent {
    pub run_id: String,
    pub error: String,
    pub reason: MonitorErrorReason,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    WorkflowStatusChanged(WorkflowStatusChanged),
    NodeStatusChanged(NodeStatusChanged),
    UserConfirmationRequired(ConfirmationRequired),
    ConfirmationProcessed(ConfirmationProcessed),
    Error(MonitorErrorEvent),
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorkflowStatusChanged(_) => "workflow_status_changed",
            Self::NodeStatusChanged(_) => "node_status_changed",
            Self::UserConfirmationRequired(_) => "user_confirmation_required",
            Self::ConfirmationProcessed(_) => "confirmation_processed",
            Self::Error(_) => "error",
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::WorkflowStatusChanged(event) => Some(&event.run_id),
            Self::NodeStatusChanged(event) => Some(&event.run_id),
            Self::UserConfirmationRequired(event) => Some(&event.request.run_id),
            Self::ConfirmationProcessed(event) => Some(&event.response.run_id),
            Self::Error(event) => Some(&event.run_id),
        }
    }
}

/// Receives monitor events for delivery to observers.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<MonitorEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<MonitorEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }
}

pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|err| err.into_inner())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: MonitorEvent) {
        let Ok(line) = serde_json::to_string(&event) else {
            return;
        };
        let mut writer = self.writer.lock().unwrap_or_else(|err| err.into_inner());
        let _ = writeln!(writer, "{line}");
        let _ = writer.flush();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: MonitorEvent) {}
}
