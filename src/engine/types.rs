use crate::shared::serde_ext::{null_as_default, parse_via_string};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            _ => Err("status must be one of: running, succeeded, failed, stopped".to_string()),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        parse_via_string(deserializer, "run status", Self::parse)
    }
}

/// Engines disagree on timestamp encoding: unix seconds or formatted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineTimestamp {
    Unix(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    #[serde(default)]
    pub workflow_id: String,
    pub status: RunStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elapsed_time: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<EngineTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<EngineTimestamp>,
}

impl Run {
    pub fn new(id: impl Into<String>, workflow_id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            status,
            inputs: Map::new(),
            outputs: None,
            error: None,
            elapsed_time: 0.0,
            total_tokens: 0,
            created_at: None,
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type", alias = "node_type", default)]
    pub node_type: String,
    #[serde(default)]
    pub title: String,
    pub status: RunStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub elapsed_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_metadata: Option<ExecutionMetadata>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        title: impl Into<String>,
        status: RunStatus,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            title: title.into(),
            status,
            inputs: Map::new(),
            outputs: None,
            error: None,
            elapsed_time: 0.0,
            execution_metadata: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_inputs(mut self, inputs: Map<String, Value>) -> Self {
        self.inputs = inputs;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: Run,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: Vec<Step>,
}

impl RunDetail {
    pub fn new(run: Run, steps: Vec<Step>) -> Self {
        Self { run, steps }
    }

    pub fn id(&self) -> &str {
        &self.run.id
    }

    pub fn workflow_id(&self) -> &str {
        &self.run.workflow_id
    }

    pub fn status(&self) -> RunStatus {
        self.run.status
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().rev().find(|step| step.id == step_id)
    }
}
