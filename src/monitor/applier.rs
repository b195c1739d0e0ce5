use super::confirmation::{ConfirmationAction, ConfirmationRequest, ConfirmationResponse};
use super::error::MonitorError;
use super::events::{ConfirmationProcessed, MonitorEvent};
use super::Monitor;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub action: ConfirmationAction,
    pub message: String,
    /// Id of the run started by a retry or modify decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DecisionResult {
    Applied(DecisionOutcome),
    Failed { error: String },
}

impl From<&Result<DecisionOutcome, MonitorError>> for DecisionResult {
    fn from(value: &Result<DecisionOutcome, MonitorError>) -> Self {
        match value {
            Ok(outcome) => Self::Applied(outcome.clone()),
            Err(err) => Self::Failed {
                error: err.to_string(),
            },
        }
    }
}

impl Monitor {
    /// Applies a human decision to the pending confirmation `confirmation_id`.
    ///
    /// The request is consumed before any engine call, so each confirmation
    /// is processed at most once. A `confirmation_processed` event is emitted
    /// for every consumed request, whether the engine call succeeded or not.
    pub fn apply_confirmation(
        &self,
        confirmation_id: &str,
        response: ConfirmationResponse,
    ) -> Result<DecisionOutcome, MonitorError> {
        let request = self.confirmations().remove(confirmation_id).ok_or_else(|| {
            MonitorError::ConfirmationNotFound {
                confirmation_id: confirmation_id.to_string(),
            }
        })?;
        let response = self.align_response(&request, response);

        let outcome = self.execute_decision(&request, &response);
        match &outcome {
            Ok(applied) => self.shared.log.info(
                "confirmation.processed",
                &format!(
                    "confirmation_id={confirmation_id} action={} message={}",
                    applied.action, applied.message
                ),
            ),
            Err(err) => self.shared.log.error(
                "confirmation.processed",
                &format!(
                    "confirmation_id={confirmation_id} action={} error={err}",
                    response.action
                ),
            ),
        }

        self.emit(MonitorEvent::ConfirmationProcessed(ConfirmationProcessed {
            confirmation_id: confirmation_id.to_string(),
            result: DecisionResult::from(&outcome),
            response,
        }));
        outcome
    }

    /// Same as [`Monitor::apply_confirmation`] for an untyped response body.
    /// An unparseable body leaves the confirmation pending.
    pub fn apply_confirmation_json(
        &self,
        confirmation_id: &str,
        body: &Value,
    ) -> Result<DecisionOutcome, MonitorError> {
        let response = ConfirmationResponse::from_json(body)?;
        self.apply_confirmation(confirmation_id, response)
    }

    fn align_response(
        &self,
        request: &ConfirmationRequest,
        mut response: ConfirmationResponse,
    ) -> ConfirmationResponse {
        let run_mismatch = !response.run_id.is_empty() && response.run_id != request.run_id;
        let node_mismatch = !response.node_id.is_empty() && response.node_id != request.node_id;
        if run_mismatch || node_mismatch {
            self.shared.log.warn(
                "confirmation.response.mismatch",
                &format!(
                    "confirmation_id={} response_run_id={} response_node_id={}",
                    request.key, response.run_id, response.node_id
                ),
            );
        }
        response.run_id = request.run_id.clone();
        response.node_id = request.node_id.clone();
        response
    }

    fn execute_decision(
        &self,
        request: &ConfirmationRequest,
        response: &ConfirmationResponse,
    ) -> Result<DecisionOutcome, MonitorError> {
        match response.action {
            ConfirmationAction::Approve => Ok(DecisionOutcome {
                action: ConfirmationAction::Approve,
                message: format!(
                    "step `{}` approved; the engine continues the run on its own",
                    request.node_id
                ),
                run_id: None,
            }),
            ConfirmationAction::Retry => {
                self.rerun_from_node(request, &request.inputs, ConfirmationAction::Retry)
            }
            ConfirmationAction::Modify => {
                let inputs = merge_inputs(&request.inputs, response.modified_inputs.as_ref());
                self.rerun_from_node(request, &inputs, ConfirmationAction::Modify)
            }
            ConfirmationAction::Reject => {
                self.shared
                    .gateway
                    .stop_run(&request.run_id)
                    .map_err(|source| MonitorError::ActionFailed {
                        action: ConfirmationAction::Reject,
                        source,
                    })?;
                self.stop_monitoring(&request.run_id);
                Ok(DecisionOutcome {
                    action: ConfirmationAction::Reject,
                    message: format!("run `{}` stopped", request.run_id),
                    run_id: None,
                })
            }
        }
    }

    fn rerun_from_node(
        &self,
        request: &ConfirmationRequest,
        inputs: &Map<String, Value>,
        action: ConfirmationAction,
    ) -> Result<DecisionOutcome, MonitorError> {
        let run = self
            .shared
            .gateway
            .retry_from_node(&request.workflow_id, inputs, Some(&request.node_id))
            .map_err(|source| MonitorError::ActionFailed { action, source })?;
        self.start_monitoring(&run.id);
        Ok(DecisionOutcome {
            action,
            message: format!(
                "re-running workflow `{}` from step `{}` as run `{}`",
                request.workflow_id, request.node_id, run.id
            ),
            run_id: Some(run.id),
        })
    }
}

/// Overlays `modified` on `original`; keys in `modified` win.
pub fn merge_inputs(
    original: &Map<String, Value>,
    modified: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut merged = original.clone();
    if let Some(modified) = modified {
        for (key, value) in modified {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
