use crate::app::cli::watch_help_lines;
use crate::app::command_handlers::runs::single_run_id;
use crate::app::command_support::{
    build_gateway, load_settings, open_runtime_log, parse_watch_line, WatchCommand,
};
use crate::config::{MonitorConfig, Settings};
use crate::engine::EngineGateway;
use crate::monitor::{ChannelSink, Monitor, MonitorEvent};
use crate::runtime::RuntimeLog;
use serde::Serialize;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WATCH_TICK: Duration = Duration::from_millis(100);

/// A monitor wired to a channel so a watch session can stream its events.
pub struct WatchSetup {
    monitor: Monitor,
    events: Receiver<MonitorEvent>,
}

impl WatchSetup {
    pub fn new(settings: &Settings, gateway: Arc<dyn EngineGateway>) -> Result<Self, String> {
        let log = open_runtime_log(settings)?;
        Ok(Self::with_log(gateway, settings.monitoring, log))
    }

    pub fn with_log(gateway: Arc<dyn EngineGateway>, config: MonitorConfig, log: RuntimeLog) -> Self {
        let (sender, events) = mpsc::channel();
        let monitor =
            Monitor::with_runtime_log(gateway, Arc::new(ChannelSink::new(sender)), config, log);
        Self { monitor, events }
    }

    pub fn into_parts(self) -> (Monitor, Receiver<MonitorEvent>) {
        (self.monitor, self.events)
    }
}

/// Forwards input lines over a channel; the channel closes at end of input.
pub fn spawn_line_reader<R: BufRead + Send + 'static>(input: R) -> Receiver<String> {
    let (sender, lines) = mpsc::channel();
    thread::spawn(move || {
        for line in input.lines() {
            let Ok(line) = line else {
                break;
            };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    lines
}

/// Streams monitor events to `out` as JSON lines and applies decisions read
/// from `lines`.
///
/// Returns once nothing is monitored and no confirmation is pending, or once
/// input has closed and nothing is monitored.
pub fn watch_session<W: Write>(
    monitor: &Monitor,
    events: &Receiver<MonitorEvent>,
    lines: &Receiver<String>,
    out: &mut W,
) -> Result<(), String> {
    let mut input_open = true;
    loop {
        match events.recv_timeout(WATCH_TICK) {
            Ok(event) => write_json_line(out, &event)?,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
        while let Ok(event) = events.try_recv() {
            write_json_line(out, &event)?;
        }

        while input_open {
            match lines.try_recv() {
                Ok(line) => handle_line(monitor, &line, out)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => input_open = false,
            }
        }

        let active = !monitor.list_active_monitors().is_empty();
        let pending = !monitor.list_pending_confirmations().is_empty();
        if !active && (!pending || !input_open) {
            while let Ok(event) = events.try_recv() {
                write_json_line(out, &event)?;
            }
            return Ok(());
        }
    }
}

pub fn cmd_watch(args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "watch")?;
    let settings = load_settings()?;
    let gateway: Arc<dyn EngineGateway> = Arc::new(build_gateway(&settings));
    let (monitor, events) = WatchSetup::new(&settings, gateway)?.into_parts();

    print_watch_hint();
    monitor.start_monitoring(run_id);
    let lines = spawn_line_reader(io::BufReader::new(io::stdin()));
    let mut out = io::stdout().lock();
    watch_session(&monitor, &events, &lines, &mut out)?;
    monitor.cleanup();
    Ok(format!("finished watching run `{run_id}`"))
}

pub(crate) fn print_watch_hint() {
    for line in watch_help_lines() {
        eprintln!("{line}");
    }
}

fn handle_line<W: Write>(monitor: &Monitor, line: &str, out: &mut W) -> Result<(), String> {
    match parse_watch_line(line) {
        Ok(None) => Ok(()),
        Ok(Some(WatchCommand::Pending)) => {
            for request in monitor.list_pending_confirmations() {
                write_json_line(out, &request)?;
            }
            Ok(())
        }
        Ok(Some(WatchCommand::Decide {
            confirmation_id,
            response,
        })) => match monitor.apply_confirmation(&confirmation_id, response) {
            Ok(_) => Ok(()),
            Err(err) => write_command_error(out, line, &err.to_string()),
        },
        Err(err) => write_command_error(out, line, &err),
    }
}

fn write_command_error<W: Write>(out: &mut W, input: &str, error: &str) -> Result<(), String> {
    write_json_line(
        out,
        &json!({ "type": "command_error", "input": input, "error": error }),
    )
}

fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<(), String> {
    let line = serde_json::to_string(value).map_err(|e| format!("failed to encode output: {e}"))?;
    writeln!(out, "{line}").map_err(|e| format!("failed to write output: {e}"))?;
    out.flush()
        .map_err(|e| format!("failed to write output: {e}"))
}
