mod support;

use runwatch::config::MonitorConfig;
use runwatch::engine::{RunStatus, Step};
use runwatch::monitor::{
    ConfirmationAction, ConfirmationReason, ConfirmationResponse, DecisionResult, Monitor,
    MonitorError, MonitorEvent,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use support::{detail, inputs, network_error, step, wait_until, FakeEngine, RecordingSink, RetryCall};

fn failed_step() -> Step {
    step("n2", RunStatus::Failed)
        .with_error("timeout")
        .with_inputs(inputs(&[("prompt", json!("cat")), ("size", json!(512))]))
}

fn monitor_with_failed_step() -> (Arc<FakeEngine>, Arc<RecordingSink>, Monitor) {
    let engine = Arc::new(FakeEngine::new());
    engine.script(
        "r1",
        vec![Ok(detail(
            "r1",
            RunStatus::Running,
            vec![step("n1", RunStatus::Succeeded), failed_step()],
        ))],
    );
    engine.script("r2", vec![Ok(detail("r2", RunStatus::Running, Vec::new()))]);
    let sink = Arc::new(RecordingSink::default());
    let monitor = Monitor::new(
        engine.clone(),
        sink.clone(),
        MonitorConfig::default().with_polling_interval_ms(60_000),
    );
    monitor.start_monitoring("r1");
    (engine, sink, monitor)
}

fn processed_results(sink: &RecordingSink) -> Vec<DecisionResult> {
    sink.events()
        .into_iter()
        .filter_map(|event| match event {
            MonitorEvent::ConfirmationProcessed(processed) => Some(processed.result),
            _ => None,
        })
        .collect()
}

#[test]
fn failed_step_raises_a_confirmation_request() {
    let (_engine, sink, monitor) = monitor_with_failed_step();

    let required = sink
        .events()
        .into_iter()
        .find_map(|event| match event {
            MonitorEvent::UserConfirmationRequired(required) => Some(required),
            _ => None,
        })
        .expect("confirmation event");
    assert_eq!(required.confirmation_id, "r1_n2");
    assert!(required.request.message.contains("timeout"));
    assert_eq!(required.request.reason, ConfirmationReason::StepFailed);

    let pending = monitor.list_pending_confirmations();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].node_id, "n2");
    assert_eq!(pending[0].timeout_ms, Some(300_000));
    assert!(monitor.get_confirmation("r1_n2").is_some());

    let value = serde_json::to_value(MonitorEvent::UserConfirmationRequired(required))
        .expect("encode event");
    assert_eq!(value["type"], "user_confirmation_required");
    assert_eq!(value["confirmationId"], "r1_n2");
    assert_eq!(value["runId"], "r1");
    monitor.cleanup();
}

#[test]
fn retry_reruns_from_the_failed_step_and_monitors_the_new_run() {
    let (engine, sink, monitor) = monitor_with_failed_step();
    engine.next_run_id("r2");

    let request = monitor.get_confirmation("r1_n2").expect("pending request");
    let outcome = monitor
        .apply_confirmation(
            "r1_n2",
            ConfirmationResponse::for_request(&request, ConfirmationAction::Retry),
        )
        .expect("retry applied");

    assert_eq!(outcome.action, ConfirmationAction::Retry);
    assert_eq!(outcome.run_id.as_deref(), Some("r2"));
    assert_eq!(
        engine.retries(),
        vec![RetryCall {
            workflow_id: "wf-1".to_string(),
            inputs: inputs(&[("prompt", json!("cat")), ("size", json!(512))]),
            node_id: Some("n2".to_string()),
        }]
    );
    assert!(monitor.list_active_monitors().contains(&"r2".to_string()));
    assert!(monitor.list_pending_confirmations().is_empty());
    assert!(matches!(
        processed_results(&sink).as_slice(),
        [DecisionResult::Applied(applied)] if applied.run_id.as_deref() == Some("r2")
    ));
    monitor.cleanup();
}

#[test]
fn modify_overlays_modified_inputs_on_the_originals() {
    let (engine, _sink, monitor) = monitor_with_failed_step();
    engine.next_run_id("r2");

    let response = ConfirmationResponse::new("r1", "n2", ConfirmationAction::Modify)
        .with_modified_inputs(inputs(&[("prompt", json!("dog")), ("seed", json!(7))]))
        .with_comment("use a dog");
    monitor
        .apply_confirmation("r1_n2", response)
        .expect("modify applied");

    let retries = engine.retries();
    assert_eq!(retries.len(), 1);
    assert_eq!(
        retries[0].inputs,
        inputs(&[
            ("prompt", json!("dog")),
            ("size", json!(512)),
            ("seed", json!(7)),
        ])
    );
    assert_eq!(retries[0].node_id.as_deref(), Some("n2"));
    monitor.cleanup();
}

#[test]
fn reject_stops_the_run_and_forgets_it() {
    let (engine, sink, monitor) = monitor_with_failed_step();

    let outcome = monitor
        .apply_confirmation(
            "r1_n2",
            ConfirmationResponse::new("r1", "n2", ConfirmationAction::Reject),
        )
        .expect("reject applied");

    assert_eq!(outcome.action, ConfirmationAction::Reject);
    assert_eq!(engine.stops(), vec!["r1".to_string()]);
    assert!(!monitor.is_monitoring("r1"));
    assert!(monitor.get_run_state("r1").is_none());
    assert!(monitor.list_pending_confirmations().is_empty());
    assert_eq!(processed_results(&sink).len(), 1);
}

#[test]
fn approve_acknowledges_without_engine_calls() {
    let (engine, _sink, monitor) = monitor_with_failed_step();

    let outcome = monitor
        .apply_confirmation(
            "r1_n2",
            ConfirmationResponse::new("r1", "n2", ConfirmationAction::Approve),
        )
        .expect("approve applied");

    assert_eq!(outcome.action, ConfirmationAction::Approve);
    assert!(outcome.run_id.is_none());
    assert!(engine.retries().is_empty());
    assert!(engine.stops().is_empty());
    assert!(monitor.is_monitoring("r1"));
    assert!(monitor.list_pending_confirmations().is_empty());
    monitor.cleanup();
}

#[test]
fn failed_engine_call_still_consumes_the_confirmation() {
    let (engine, sink, monitor) = monitor_with_failed_step();
    engine.fail_retry(network_error("r1"));

    let err = monitor
        .apply_confirmation(
            "r1_n2",
            ConfirmationResponse::new("r1", "n2", ConfirmationAction::Retry),
        )
        .expect_err("retry should fail");
    assert!(matches!(
        err,
        MonitorError::ActionFailed {
            action: ConfirmationAction::Retry,
            ..
        }
    ));
    assert!(monitor.list_pending_confirmations().is_empty());
    assert!(matches!(
        processed_results(&sink).as_slice(),
        [DecisionResult::Failed { error }] if error.contains("connection refused")
    ));

    let err = monitor
        .apply_confirmation(
            "r1_n2",
            ConfirmationResponse::new("r1", "n2", ConfirmationAction::Retry),
        )
        .expect_err("already processed");
    assert_eq!(
        err,
        MonitorError::ConfirmationNotFound {
            confirmation_id: "r1_n2".to_string()
        }
    );
    monitor.cleanup();
}

#[test]
fn failed_reject_keeps_the_run_monitored() {
    let (engine, _sink, monitor) = monitor_with_failed_step();
    engine.fail_stop(network_error("r1"));

    let err = monitor
        .apply_confirmation(
            "r1_n2",
            ConfirmationResponse::new("r1", "n2", ConfirmationAction::Reject),
        )
        .expect_err("stop should fail");
    assert!(matches!(err, MonitorError::ActionFailed { .. }));
    assert!(monitor.is_monitoring("r1"));
    assert!(monitor.list_pending_confirmations().is_empty());
    monitor.cleanup();
}

#[test]
fn unknown_action_is_rejected_before_any_engine_call() {
    let (engine, sink, monitor) = monitor_with_failed_step();

    let err = monitor
        .apply_confirmation_json(
            "r1_n2",
            &json!({"runId": "r1", "nodeId": "n2", "action": "skip"}),
        )
        .expect_err("unknown action");
    assert_eq!(err, MonitorError::UnknownAction("skip".to_string()));
    assert!(engine.retries().is_empty());
    assert!(engine.stops().is_empty());
    assert_eq!(monitor.list_pending_confirmations().len(), 1);
    assert!(processed_results(&sink).is_empty());
    monitor.cleanup();
}

#[test]
fn processed_event_carries_the_request_ids() {
    let (_engine, sink, monitor) = monitor_with_failed_step();

    monitor
        .apply_confirmation_json("r1_n2", &json!({"action": "approve"}))
        .expect("approve applied");

    let processed = sink
        .events()
        .into_iter()
        .find_map(|event| match event {
            MonitorEvent::ConfirmationProcessed(processed) => Some(processed),
            _ => None,
        })
        .expect("processed event");
    assert_eq!(processed.confirmation_id, "r1_n2");
    assert_eq!(processed.response.run_id, "r1");
    assert_eq!(processed.response.node_id, "n2");
    monitor.cleanup();
}

#[test]
fn confirmation_survives_a_failed_run_so_it_can_be_retried() {
    let engine = Arc::new(FakeEngine::new());
    engine.script(
        "r1",
        vec![Ok(detail("r1", RunStatus::Failed, vec![failed_step()]))],
    );
    engine.script("r2", vec![Ok(detail("r2", RunStatus::Running, Vec::new()))]);
    engine.next_run_id("r2");
    let sink = Arc::new(RecordingSink::default());
    let monitor = Monitor::new(
        engine.clone(),
        sink.clone(),
        MonitorConfig::default().with_polling_interval_ms(60_000),
    );

    monitor.start_monitoring("r1");
    assert!(monitor.list_active_monitors().is_empty());
    assert_eq!(monitor.list_pending_confirmations().len(), 1);

    monitor
        .apply_confirmation(
            "r1_n2",
            ConfirmationResponse::new("r1", "n2", ConfirmationAction::Retry),
        )
        .expect("retry applied");
    assert_eq!(monitor.list_active_monitors(), vec!["r2".to_string()]);
    monitor.cleanup();
}

#[test]
fn repeated_failure_of_the_same_step_keeps_one_request() {
    let engine = Arc::new(FakeEngine::new());
    engine.script(
        "r1",
        vec![
            Ok(detail(
                "r1",
                RunStatus::Running,
                vec![step("n2", RunStatus::Failed).with_error("first")],
            )),
            Ok(detail("r1", RunStatus::Running, vec![step("n2", RunStatus::Running)])),
            Ok(detail(
                "r1",
                RunStatus::Running,
                vec![step("n2", RunStatus::Failed).with_error("second")],
            )),
        ],
    );
    let sink = Arc::new(RecordingSink::default());
    let monitor = Monitor::new(
        engine.clone(),
        sink.clone(),
        MonitorConfig::default().with_polling_interval_ms(20),
    );

    monitor.start_monitoring("r1");
    assert!(wait_until(Duration::from_secs(5), || monitor
        .get_confirmation("r1_n2")
        .is_some_and(|request| request.message.contains("second"))));
    assert_eq!(monitor.list_pending_confirmations().len(), 1);
    monitor.cleanup();
}

#[test]
fn interactive_step_offers_approval_options() {
    let engine = Arc::new(FakeEngine::new());
    engine.script(
        "r1",
        vec![Ok(detail(
            "r1",
            RunStatus::Running,
            vec![Step::new("n3", "human-input", "Review draft", RunStatus::Running)],
        ))],
    );
    let sink = Arc::new(RecordingSink::default());
    let monitor = Monitor::new(
        engine.clone(),
        sink.clone(),
        MonitorConfig::default().with_polling_interval_ms(60_000),
    );

    monitor.start_monitoring("r1");
    let request = monitor.get_confirmation("r1_n3").expect("interactive request");
    assert_eq!(request.reason, ConfirmationReason::Interactive);
    assert_eq!(
        request.options,
        vec![
            ConfirmationAction::Approve,
            ConfirmationAction::Modify,
            ConfirmationAction::Reject,
        ]
    );
    monitor.cleanup();
}
