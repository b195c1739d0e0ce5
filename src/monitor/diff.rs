use super::confirmation::{confirmation_reason, ConfirmationRequest};
use crate::engine::{RunDetail, RunStatus, Step};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct RunTransition {
    pub previous: Option<RunStatus>,
    pub current: RunStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeTransition {
    pub node_id: String,
    pub previous: Option<RunStatus>,
    pub current: RunStatus,
    pub step: Step,
    pub confirmation: Option<ConfirmationRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Run(RunTransition),
    Node(NodeTransition),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffOutcome {
    pub transitions: Vec<Transition>,
    pub is_terminal: bool,
    pub missing_steps: Vec<String>,
}

impl DiffOutcome {
    pub fn confirmations(&self) -> impl Iterator<Item = &ConfirmationRequest> {
        self.transitions.iter().filter_map(|transition| match transition {
            Transition::Node(node) => node.confirmation.as_ref(),
            Transition::Run(_) => None,
        })
    }
}

/// Compares `current` against the previous snapshot of the same run.
///
/// A step id that repeats within one detail is represented by its last
/// occurrence, at the position of its first occurrence.
pub fn diff(
    run_id: &str,
    previous: Option<&RunDetail>,
    current: &RunDetail,
    confirmation_timeout_ms: Option<u64>,
) -> DiffOutcome {
    let mut transitions = Vec::new();

    let previous_status = previous.map(RunDetail::status);
    if previous_status != Some(current.status()) {
        transitions.push(Transition::Run(RunTransition {
            previous: previous_status,
            current: current.status(),
        }));
    }

    let previous_steps = previous.map(latest_steps_by_id).unwrap_or_default();

    for step in unique_steps(current) {
        let previous_step_status = previous_steps.get(step.id.as_str()).map(|s| s.status);
        if previous_step_status == Some(step.status) {
            continue;
        }
        let confirmation = confirmation_reason(step).map(|reason| {
            ConfirmationRequest::for_step(
                run_id,
                current.workflow_id(),
                step,
                reason,
                confirmation_timeout_ms,
            )
        });
        transitions.push(Transition::Node(NodeTransition {
            node_id: step.id.clone(),
            previous: previous_step_status,
            current: step.status,
            step: step.clone(),
            confirmation,
        }));
    }

    let current_ids = current
        .steps
        .iter()
        .map(|step| step.id.as_str())
        .collect::<HashSet<_>>();
    let mut missing_steps = previous_steps
        .keys()
        .filter(|id| !current_ids.contains(*id))
        .map(|id| id.to_string())
        .collect::<Vec<_>>();
    missing_steps.sort();

    DiffOutcome {
        transitions,
        is_terminal: current.status().is_terminal(),
        missing_steps,
    }
}

fn latest_steps_by_id(detail: &RunDetail) -> HashMap<&str, &Step> {
    detail
        .steps
        .iter()
        .map(|step| (step.id.as_str(), step))
        .collect()
}

fn unique_steps(detail: &RunDetail) -> Vec<&Step> {
    let latest = latest_steps_by_id(detail);
    let mut seen = HashSet::new();
    detail
        .steps
        .iter()
        .filter(|step| seen.insert(step.id.as_str()))
        .filter_map(|step| latest.get(step.id.as_str()).copied())
        .collect()
}
