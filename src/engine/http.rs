use super::{EngineError, EngineGateway, Run, RunDetail};
use crate::config::EngineSettings;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone)]
pub struct HttpEngineGateway {
    api_base: String,
    api_key: String,
    user: String,
    agent: ureq::Agent,
}

impl HttpEngineGateway {
    pub fn new(settings: &EngineSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.request_timeout())
            .build();
        Self {
            api_base: settings.base_url.trim().to_string(),
            api_key: settings.api_key.clone(),
            user: settings.user.clone(),
            agent,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, EngineError> {
        let url = self.endpoint(path);
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .call()
            .map_err(|err| request_error(&url, err))?;
        response.into_json::<T>().map_err(|err| EngineError::Decode {
            url,
            reason: err.to_string(),
        })
    }

    fn post_json(&self, path: &str, body: Value) -> Result<Value, EngineError> {
        let url = self.endpoint(path);
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(|err| request_error(&url, err))?;
        let raw = response.into_string().map_err(|err| EngineError::Decode {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        if raw.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&raw).map_err(|err| EngineError::Decode {
            url,
            reason: err.to_string(),
        })
    }

    fn post_run(&self, mut body: Map<String, Value>) -> Result<Run, EngineError> {
        body.insert("response_mode".to_string(), json!("blocking"));
        let url = self.endpoint("workflows/run");
        let response = self.post_json("workflows/run", Value::Object(body))?;
        decode_run(&url, response)
    }

    fn run_body(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        user: Option<&str>,
    ) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("inputs".to_string(), Value::Object(inputs.clone()));
        body.insert(
            "user".to_string(),
            json!(user.unwrap_or(self.user.as_str())),
        );
        if !workflow_id.is_empty() {
            body.insert("workflow_id".to_string(), json!(workflow_id));
        }
        body
    }
}

impl EngineGateway for HttpEngineGateway {
    fn start_run(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        user: Option<&str>,
    ) -> Result<Run, EngineError> {
        self.post_run(self.run_body(workflow_id, inputs, user))
    }

    fn get_run_detail(&self, run_id: &str) -> Result<RunDetail, EngineError> {
        self.get_json(&format!(
            "workflows/runs/{}/logs",
            urlencoding::encode(run_id)
        ))
    }

    fn stop_run(&self, run_id: &str) -> Result<(), EngineError> {
        self.post_json(
            &format!("workflows/runs/{}/stop", urlencoding::encode(run_id)),
            json!({ "user": self.user }),
        )?;
        Ok(())
    }

    fn retry_from_node(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        node_id: Option<&str>,
    ) -> Result<Run, EngineError> {
        let mut body = self.run_body(workflow_id, inputs, None);
        if let Some(node_id) = node_id {
            body.insert("from_node_id".to_string(), json!(node_id));
        }
        self.post_run(body)
    }
}

fn request_error(url: &str, err: ureq::Error) -> EngineError {
    match err {
        ureq::Error::Status(status, response) => EngineError::Status {
            url: url.to_string(),
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => EngineError::Request {
            url: url.to_string(),
            reason: transport.to_string(),
        },
    }
}

fn decode_run(url: &str, response: Value) -> Result<Run, EngineError> {
    let payload = match response {
        Value::Object(mut body) => match body.remove("data") {
            Some(data @ Value::Object(_)) => data,
            Some(other) => {
                body.insert("data".to_string(), other);
                Value::Object(body)
            }
            None => Value::Object(body),
        },
        other => other,
    };
    serde_json::from_value(payload).map_err(|err| EngineError::Decode {
        url: url.to_string(),
        reason: err.to_string(),
    })
}
