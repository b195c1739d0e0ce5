use crate::app::command_handlers::watch::{
    print_watch_hint, spawn_line_reader, watch_session, WatchSetup,
};
use crate::app::command_support::{build_gateway, load_settings, parse_input_pairs};
use crate::engine::EngineGateway;
use serde_json::{Map, Value};
use std::io;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct RunArgs {
    pub workflow_id: String,
    pub inputs: Map<String, Value>,
    pub user: Option<String>,
    pub detach: bool,
}

pub fn parse_run_args(args: &[String]) -> Result<RunArgs, String> {
    let usage = "usage: run <workflow_id> [key=value ...] [--user <name>] [--detach]";
    let mut workflow_id = None;
    let mut pairs = Vec::new();
    let mut user = None;
    let mut detach = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--detach" => detach = true,
            "--user" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("`--user` needs a value; {usage}"))?;
                user = Some(value.clone());
            }
            flag if flag.starts_with("--") => {
                return Err(format!("unknown flag `{flag}`; {usage}"));
            }
            _ if workflow_id.is_none() && !arg.contains('=') => workflow_id = Some(arg.clone()),
            _ => pairs.push(arg.clone()),
        }
    }

    Ok(RunArgs {
        workflow_id: workflow_id.ok_or_else(|| usage.to_string())?,
        inputs: parse_input_pairs(&pairs)?,
        user,
        detach,
    })
}

pub fn cmd_run(args: &[String]) -> Result<String, String> {
    let run_args = parse_run_args(args)?;
    let settings = load_settings()?;
    let gateway: Arc<dyn EngineGateway> = Arc::new(build_gateway(&settings));

    if run_args.detach {
        let run = gateway
            .start_run(
                &run_args.workflow_id,
                &run_args.inputs,
                run_args.user.as_deref(),
            )
            .map_err(|e| e.to_string())?;
        return serde_json::to_string_pretty(&run).map_err(|e| e.to_string());
    }

    let (monitor, events) = WatchSetup::new(&settings, gateway)?.into_parts();
    print_watch_hint();
    let run = monitor
        .start_run(
            &run_args.workflow_id,
            &run_args.inputs,
            run_args.user.as_deref(),
        )
        .map_err(|e| e.to_string())?;
    let lines = spawn_line_reader(io::BufReader::new(io::stdin()));
    let mut out = io::stdout().lock();
    watch_session(&monitor, &events, &lines, &mut out)?;
    monitor.cleanup();
    Ok(format!("finished watching run `{}`", run.id))
}

pub fn status_with(gateway: &dyn EngineGateway, run_id: &str) -> Result<String, String> {
    let detail = gateway.get_run_detail(run_id).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&detail).map_err(|e| e.to_string())
}

pub fn stop_with(gateway: &dyn EngineGateway, run_id: &str) -> Result<String, String> {
    gateway.stop_run(run_id).map_err(|e| e.to_string())?;
    Ok(format!("stop requested for run `{run_id}`"))
}

pub fn cmd_status(args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "status")?;
    let settings = load_settings()?;
    status_with(&build_gateway(&settings), run_id)
}

pub fn cmd_stop(args: &[String]) -> Result<String, String> {
    let run_id = single_run_id(args, "stop")?;
    let settings = load_settings()?;
    stop_with(&build_gateway(&settings), run_id)
}

pub(crate) fn single_run_id<'a>(args: &'a [String], verb: &str) -> Result<&'a str, String> {
    match args {
        [run_id] if !run_id.trim().is_empty() => Ok(run_id.as_str()),
        _ => Err(format!("usage: {verb} <run_id>")),
    }
}
