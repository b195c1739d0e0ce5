use super::error::MonitorError;
use crate::engine::{RunStatus, Step};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const INTERACTIVE_NODE_TYPES: &[&str] = &["human-input", "approval", "confirmation"];
pub const CONFIRMATION_TITLE_KEYWORDS: &[&str] = &["confirm", "approve"];

pub fn confirmation_key(run_id: &str, node_id: &str) -> String {
    format!("{run_id}_{node_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationReason {
    StepFailed,
    Interactive,
}

pub fn is_interactive_step(step: &Step) -> bool {
    if INTERACTIVE_NODE_TYPES.contains(&step.node_type.as_str()) {
        return true;
    }
    let title = step.title.to_lowercase();
    CONFIRMATION_TITLE_KEYWORDS
        .iter()
        .any(|keyword| title.contains(keyword))
}

pub fn confirmation_reason(step: &Step) -> Option<ConfirmationReason> {
    if step.status == RunStatus::Failed {
        Some(ConfirmationReason::StepFailed)
    } else if is_interactive_step(step) {
        Some(ConfirmationReason::Interactive)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationAction {
    Approve,
    Reject,
    Retry,
    Modify,
}

impl ConfirmationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Retry => "retry",
            Self::Modify => "modify",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, MonitorError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            "retry" => Ok(Self::Retry),
            "modify" => Ok(Self::Modify),
            _ => Err(MonitorError::UnknownAction(raw.to_string())),
        }
    }

    pub fn offered_for(reason: ConfirmationReason) -> Vec<Self> {
        match reason {
            ConfirmationReason::StepFailed => {
                vec![Self::Retry, Self::Modify, Self::Approve, Self::Reject]
            }
            ConfirmationReason::Interactive => vec![Self::Approve, Self::Modify, Self::Reject],
        }
    }
}

impl std::fmt::Display for ConfirmationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub key: String,
    pub run_id: String,
    pub workflow_id: String,
    pub node_id: String,
    pub node_title: String,
    pub reason: ConfirmationReason,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    pub message: String,
    #[serde(default)]
    pub options: Vec<ConfirmationAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ConfirmationRequest {
    pub fn for_step(
        run_id: &str,
        workflow_id: &str,
        step: &Step,
        reason: ConfirmationReason,
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            key: confirmation_key(run_id, &step.id),
            run_id: run_id.to_string(),
            workflow_id: workflow_id.to_string(),
            node_id: step.id.clone(),
            node_title: step.title.clone(),
            reason,
            inputs: step.inputs.clone(),
            outputs: step.outputs.clone(),
            message: confirmation_message(step, reason),
            options: ConfirmationAction::offered_for(reason),
            timeout_ms,
        }
    }
}

fn confirmation_message(step: &Step, reason: ConfirmationReason) -> String {
    match reason {
        ConfirmationReason::StepFailed => match step.error.as_deref() {
            Some(error) if !error.trim().is_empty() => {
                format!("step \"{}\" failed: {error}. Retry it?", step.title)
            }
            _ => format!("step \"{}\" failed. Retry it?", step.title),
        },
        ConfirmationReason::Interactive => format!(
            "step \"{}\" needs your confirmation; review its inputs and outputs and choose an action.",
            step.title
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    pub run_id: String,
    pub node_id: String,
    pub action: ConfirmationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_inputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ConfirmationResponse {
    pub fn new(
        run_id: impl Into<String>,
        node_id: impl Into<String>,
        action: ConfirmationAction,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            node_id: node_id.into(),
            action,
            modified_inputs: None,
            comment: None,
        }
    }

    pub fn for_request(request: &ConfirmationRequest, action: ConfirmationAction) -> Self {
        Self::new(request.run_id.clone(), request.node_id.clone(), action)
    }

    pub fn with_modified_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.modified_inputs = Some(inputs);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Parses an untyped response body, accepting camelCase or snake_case keys.
    pub fn from_json(value: &Value) -> Result<Self, MonitorError> {
        let body = value
            .as_object()
            .ok_or_else(|| MonitorError::InvalidResponse("body must be an object".to_string()))?;

        let action = field(body, "action", "action")
            .and_then(Value::as_str)
            .ok_or_else(|| MonitorError::InvalidResponse("`action` is required".to_string()))?;
        let action = ConfirmationAction::parse(action)?;

        let modified_inputs = match field(body, "modifiedInputs", "modified_inputs") {
            None | Some(Value::Null) => None,
            Some(Value::Object(inputs)) => Some(inputs.clone()),
            Some(_) => {
                return Err(MonitorError::InvalidResponse(
                    "`modifiedInputs` must be an object".to_string(),
                ))
            }
        };

        Ok(Self {
            run_id: string_field(body, "runId", "workflow_run_id"),
            node_id: string_field(body, "nodeId", "node_id"),
            action,
            modified_inputs,
            comment: field(body, "comment", "comment")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

fn field<'a>(body: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    body.get(camel).or_else(|| body.get(snake))
}

fn string_field(body: &Map<String, Value>, camel: &str, snake: &str) -> String {
    field(body, camel, snake)
        .or_else(|| body.get(&camel_to_snake(camel)))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn camel_to_snake(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for ch in raw.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
