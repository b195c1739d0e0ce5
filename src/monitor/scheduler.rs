use super::diff::{diff, Transition};
use super::error::MonitorError;
use super::events::{
    ConfirmationRequired, MonitorErrorEvent, MonitorErrorReason, MonitorEvent, NodeStatusChanged,
    WorkflowStatusChanged,
};
use super::{Monitor, Shared};
use crate::engine::{EngineError, RunStatus};
use crate::runtime::worker_primitives::sleep_with_stop;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct PollHandle {
    stop: AtomicBool,
    busy: AtomicBool,
    consecutive_failures: AtomicU32,
}

impl PollHandle {
    pub(crate) fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    pub(crate) fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Claims the tick slot; `false` means a tick is still in flight.
    pub(crate) fn try_begin_tick(&self) -> bool {
        !self.busy.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn end_tick(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub(crate) fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }
}

#[derive(Debug)]
pub(crate) struct PollEntry {
    pub(crate) handle: Arc<PollHandle>,
    pub(crate) thread: Option<JoinHandle<()>>,
}

/// Active poll loops keyed by run id.
#[derive(Debug, Default)]
pub(crate) struct PollArena {
    entries: HashMap<String, PollEntry>,
}

impl PollArena {
    pub(crate) fn contains(&self, run_id: &str) -> bool {
        self.entries.contains_key(run_id)
    }

    pub(crate) fn is_current(&self, run_id: &str, handle: &Arc<PollHandle>) -> bool {
        self.entries
            .get(run_id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.handle, handle))
    }

    pub(crate) fn insert(&mut self, run_id: &str) -> Option<Arc<PollHandle>> {
        if self.entries.contains_key(run_id) {
            return None;
        }
        let handle = Arc::new(PollHandle::default());
        self.entries.insert(
            run_id.to_string(),
            PollEntry {
                handle: Arc::clone(&handle),
                thread: None,
            },
        );
        Some(handle)
    }

    pub(crate) fn attach_thread(
        &mut self,
        run_id: &str,
        handle: &Arc<PollHandle>,
        thread: JoinHandle<()>,
    ) -> Result<(), JoinHandle<()>> {
        match self.entries.get_mut(run_id) {
            Some(entry) if Arc::ptr_eq(&entry.handle, handle) => {
                entry.thread = Some(thread);
                Ok(())
            }
            _ => Err(thread),
        }
    }

    pub(crate) fn remove(&mut self, run_id: &str) -> Option<PollEntry> {
        let entry = self.entries.remove(run_id)?;
        entry.handle.cancel();
        Some(entry)
    }

    pub(crate) fn drain(&mut self) -> Vec<(String, PollEntry)> {
        let drained = self.entries.drain().collect::<Vec<_>>();
        for (_, entry) in &drained {
            entry.handle.cancel();
        }
        drained
    }

    pub(crate) fn run_ids(&self) -> Vec<String> {
        let mut ids = self.entries.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }
}

pub(crate) fn join_unless_current(entry: PollEntry) {
    let Some(thread) = entry.thread else {
        return;
    };
    if thread.thread().id() != thread::current().id() {
        let _ = thread.join();
    }
}

fn run_poll_loop(
    weak: Weak<Shared>,
    run_id: String,
    handle: Arc<PollHandle>,
    interval: Duration,
) {
    while sleep_with_stop(handle.stop_flag(), interval) {
        let Some(shared) = weak.upgrade() else {
            break;
        };
        if !handle.try_begin_tick() {
            continue;
        }
        Monitor { shared }.tick(&run_id, &handle);
        handle.end_tick();
    }
}

impl Monitor {
    /// Polls `run_id` once right away, then every polling interval until the
    /// run reaches a terminal status or monitoring is stopped. Calling it for
    /// a run that is already monitored does nothing.
    pub fn start_monitoring(&self, run_id: &str) {
        let Some(handle) = self.polls().insert(run_id) else {
            return;
        };
        let interval = self.shared.config.polling_interval();
        self.shared.log.info(
            "monitor.started",
            &format!("run_id={run_id} interval_ms={}", interval.as_millis()),
        );

        if handle.try_begin_tick() {
            self.tick(run_id, &handle);
            handle.end_tick();
        }
        if handle.is_cancelled() {
            return;
        }

        let weak = Arc::downgrade(&self.shared);
        let loop_run_id = run_id.to_string();
        let loop_handle = Arc::clone(&handle);
        let spawned = thread::Builder::new()
            .name(format!("poll-{run_id}"))
            .spawn(move || run_poll_loop(weak, loop_run_id, loop_handle, interval));
        match spawned {
            Ok(thread) => {
                // A stop that raced the spawn leaves the loop to exit on its own.
                let _ = self.polls().attach_thread(run_id, &handle, thread);
            }
            Err(err) => {
                self.shared.log.error(
                    "monitor.poll.spawn_failed",
                    &format!("run_id={run_id} error={err}"),
                );
                let mut polls = self.polls();
                if polls.is_current(run_id, &handle) {
                    polls.remove(run_id);
                }
            }
        }
    }

    /// Stops polling `run_id` and forgets its snapshot and pending
    /// confirmations. Unknown runs are a no-op.
    pub fn stop_monitoring(&self, run_id: &str) {
        let entry = self.polls().remove(run_id);
        let snapshot = self.snapshots().remove(run_id);
        let cleared = self.confirmations().remove_for_run(run_id);
        if entry.is_some() || snapshot.is_some() || cleared > 0 {
            self.shared.log.info(
                "monitor.stopped",
                &format!("run_id={run_id} cleared_confirmations={cleared}"),
            );
        }
    }

    /// Stops every loop and clears all monitor state, waiting for loop
    /// threads to exit.
    pub fn cleanup(&self) {
        let entries = self.polls().drain();
        self.snapshots().clear();
        self.confirmations().clear();
        let stopped = entries.len();
        for (_, entry) in entries {
            join_unless_current(entry);
        }
        self.shared
            .log
            .info("monitor.cleanup", &format!("stopped_loops={stopped}"));
    }

    fn tick(&self, run_id: &str, handle: &Arc<PollHandle>) {
        let detail = match self.shared.gateway.get_run_detail(run_id) {
            Ok(detail) => detail,
            Err(err) => {
                self.record_poll_failure(run_id, handle, err);
                return;
            }
        };

        let outcome = {
            let polls = self.polls();
            if !polls.is_current(run_id, handle) {
                drop(polls);
                self.shared
                    .log
                    .info("monitor.poll.discarded", &format!("run_id={run_id}"));
                return;
            }
            let mut snapshots = self.snapshots();
            let outcome = diff(
                run_id,
                snapshots.get(run_id),
                &detail,
                self.shared.config.timeout_ms,
            );
            let mut confirmations = self.confirmations();
            for request in outcome.confirmations() {
                confirmations.register(request.clone());
            }
            drop(confirmations);
            snapshots.replace(run_id, detail.clone());
            outcome
        };
        handle.record_success();

        for node_id in &outcome.missing_steps {
            self.shared.log.warn(
                "monitor.step.missing",
                &format!("run_id={run_id} node_id={node_id}"),
            );
        }

        let is_terminal = outcome.is_terminal;
        for transition in outcome.transitions {
            match transition {
                Transition::Run(run) => {
                    self.emit(MonitorEvent::WorkflowStatusChanged(WorkflowStatusChanged {
                        run_id: run_id.to_string(),
                        previous_status: run.previous,
                        current_status: run.current,
                        run_detail: detail.clone(),
                    }));
                }
                Transition::Node(node) => {
                    self.emit(MonitorEvent::NodeStatusChanged(NodeStatusChanged {
                        run_id: run_id.to_string(),
                        node_id: node.node_id,
                        previous_status: node.previous,
                        current_status: node.current,
                        node: node.step,
                    }));
                    if let Some(request) = node.confirmation {
                        // A stop or decision may have consumed the request
                        // since it was registered.
                        let still_pending = self
                            .confirmations()
                            .get(&request.key)
                            .is_some_and(|pending| *pending == request);
                        if !still_pending {
                            self.shared.log.info(
                                "monitor.poll.discarded",
                                &format!("run_id={run_id} confirmation_id={}", request.key),
                            );
                            continue;
                        }
                        self.shared.log.info(
                            "confirmation.registered",
                            &format!(
                                "confirmation_id={} reason={:?}",
                                request.key, request.reason
                            ),
                        );
                        self.emit(MonitorEvent::UserConfirmationRequired(
                            ConfirmationRequired {
                                confirmation_id: request.key.clone(),
                                request,
                            },
                        ));
                    }
                }
            }
        }

        if is_terminal {
            self.retire(run_id, handle, detail.status());
        }
    }

    /// Ends polling for a run that reached a terminal status. Pending
    /// confirmations stay so a failed step can still be retried.
    fn retire(&self, run_id: &str, handle: &Arc<PollHandle>, status: RunStatus) {
        {
            let mut polls = self.polls();
            if !polls.is_current(run_id, handle) {
                return;
            }
            polls.remove(run_id);
        }
        self.snapshots().remove(run_id);
        self.shared.log.info(
            "monitor.retired",
            &format!("run_id={run_id} status={status}"),
        );
    }

    fn record_poll_failure(&self, run_id: &str, handle: &Arc<PollHandle>, source: EngineError) {
        if !self.polls().is_current(run_id, handle) {
            self.shared
                .log
                .info("monitor.poll.discarded", &format!("run_id={run_id}"));
            return;
        }
        let failures = handle.record_failure();
        let error = MonitorError::EngineUnavailable {
            operation: format!("polling run `{run_id}`"),
            source,
        };
        let exhausted = self
            .shared
            .config
            .retry_ceiling()
            .is_some_and(|ceiling| failures >= ceiling);
        self.shared.log.warn(
            "monitor.poll.failed",
            &format!("run_id={run_id} consecutive_failures={failures} error={error}"),
        );
        self.emit(MonitorEvent::Error(MonitorErrorEvent {
            run_id: run_id.to_string(),
            error: error.to_string(),
            reason: if exhausted {
                MonitorErrorReason::RetriesExhausted
            } else {
                MonitorErrorReason::EngineUnavailable
            },
            consecutive_failures: failures,
        }));
        if exhausted {
            self.shared.log.error(
                "monitor.retries_exhausted",
                &format!("run_id={run_id} consecutive_failures={failures}"),
            );
            self.stop_monitoring(run_id);
        }
    }
}
