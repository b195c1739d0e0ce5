#![allow(dead_code)]

use runwatch::engine::{EngineError, EngineGateway, Run, RunDetail, RunStatus, Step};
use runwatch::monitor::{EventSink, MonitorEvent};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryCall {
    pub workflow_id: String,
    pub inputs: Map<String, Value>,
    pub node_id: Option<String>,
}

/// Scripted engine: each run id replays its queued details in order and then
/// keeps answering with the last one.
#[derive(Default)]
pub struct FakeEngine {
    scripts: Mutex<HashMap<String, VecDeque<Result<RunDetail, EngineError>>>>,
    detail_calls: Mutex<HashMap<String, usize>>,
    started: Mutex<Vec<(String, Map<String, Value>)>>,
    retries: Mutex<Vec<RetryCall>>,
    stops: Mutex<Vec<String>>,
    next_run_ids: Mutex<VecDeque<String>>,
    stop_error: Mutex<Option<EngineError>>,
    retry_error: Mutex<Option<EngineError>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, run_id: &str, responses: Vec<Result<RunDetail, EngineError>>) {
        self.scripts
            .lock()
            .expect("lock scripts")
            .insert(run_id.to_string(), responses.into());
    }

    pub fn next_run_id(&self, run_id: &str) {
        self.next_run_ids
            .lock()
            .expect("lock ids")
            .push_back(run_id.to_string());
    }

    pub fn fail_stop(&self, err: EngineError) {
        *self.stop_error.lock().expect("lock stop error") = Some(err);
    }

    pub fn fail_retry(&self, err: EngineError) {
        *self.retry_error.lock().expect("lock retry error") = Some(err);
    }

    pub fn detail_calls(&self, run_id: &str) -> usize {
        self.detail_calls
            .lock()
            .expect("lock calls")
            .get(run_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn started(&self) -> Vec<(String, Map<String, Value>)> {
        self.started.lock().expect("lock started").clone()
    }

    pub fn retries(&self) -> Vec<RetryCall> {
        self.retries.lock().expect("lock retries").clone()
    }

    pub fn stops(&self) -> Vec<String> {
        self.stops.lock().expect("lock stops").clone()
    }

    fn allocate_run_id(&self) -> String {
        let mut ids = self.next_run_ids.lock().expect("lock ids");
        ids.pop_front().unwrap_or_else(|| "run-generated".to_string())
    }
}

impl EngineGateway for FakeEngine {
    fn start_run(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        _user: Option<&str>,
    ) -> Result<Run, EngineError> {
        self.started
            .lock()
            .expect("lock started")
            .push((workflow_id.to_string(), inputs.clone()));
        Ok(Run::new(self.allocate_run_id(), workflow_id, RunStatus::Running))
    }

    fn get_run_detail(&self, run_id: &str) -> Result<RunDetail, EngineError> {
        *self
            .detail_calls
            .lock()
            .expect("lock calls")
            .entry(run_id.to_string())
            .or_default() += 1;
        let mut scripts = self.scripts.lock().expect("lock scripts");
        let Some(script) = scripts.get_mut(run_id) else {
            return Err(not_found(run_id));
        };
        if script.len() > 1 {
            return script.pop_front().unwrap_or_else(|| Err(not_found(run_id)));
        }
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Err(not_found(run_id)))
    }

    fn stop_run(&self, run_id: &str) -> Result<(), EngineError> {
        self.stops
            .lock()
            .expect("lock stops")
            .push(run_id.to_string());
        match self.stop_error.lock().expect("lock stop error").clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn retry_from_node(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        node_id: Option<&str>,
    ) -> Result<Run, EngineError> {
        self.retries.lock().expect("lock retries").push(RetryCall {
            workflow_id: workflow_id.to_string(),
            inputs: inputs.clone(),
            node_id: node_id.map(str::to_string),
        });
        if let Some(err) = self.retry_error.lock().expect("lock retry error").clone() {
            return Err(err);
        }
        Ok(Run::new(self.allocate_run_id(), workflow_id, RunStatus::Running))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().expect("lock events").clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(MonitorEvent::kind).collect()
    }

    pub fn take(&self) -> Vec<MonitorEvent> {
        std::mem::take(&mut *self.events.lock().expect("lock events"))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: MonitorEvent) {
        self.events.lock().expect("lock events").push(event);
    }
}

pub fn not_found(run_id: &str) -> EngineError {
    EngineError::Status {
        url: format!("http://engine.test/workflows/runs/{run_id}/logs"),
        status: 404,
        body: "{\"code\":\"not_found\"}".to_string(),
    }
}

pub fn network_error(run_id: &str) -> EngineError {
    EngineError::Request {
        url: format!("http://engine.test/workflows/runs/{run_id}/logs"),
        reason: "connection refused".to_string(),
    }
}

pub fn detail(run_id: &str, status: RunStatus, steps: Vec<Step>) -> RunDetail {
    RunDetail::new(Run::new(run_id, "wf-1", status), steps)
}

pub fn step(id: &str, status: RunStatus) -> Step {
    Step::new(id, "llm", format!("Step {id}"), status)
}

pub fn inputs(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
