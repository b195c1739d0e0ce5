use crate::config::{load_global_settings, ConfigError, Settings};
use crate::engine::HttpEngineGateway;
use crate::monitor::{ConfirmationAction, ConfirmationResponse};
use crate::runtime::{bootstrap_state_root, RuntimeLog};
use serde_json::{Map, Value};

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn load_settings() -> Result<Settings, String> {
    load_global_settings().map_err(map_config_err)
}

pub fn build_gateway(settings: &Settings) -> HttpEngineGateway {
    HttpEngineGateway::new(&settings.engine)
}

/// Opens the runtime log under the configured state root, creating the log
/// directory when needed.
pub fn open_runtime_log(settings: &Settings) -> Result<RuntimeLog, String> {
    let paths = settings.state_paths().map_err(map_config_err)?;
    bootstrap_state_root(&paths).map_err(|e| e.to_string())?;
    Ok(RuntimeLog::to_state_root(paths))
}

/// Parses a value given on the command line: valid JSON is kept as JSON,
/// anything else becomes a string.
pub fn parse_input_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn parse_input_pairs(args: &[String]) -> Result<Map<String, Value>, String> {
    let mut inputs = Map::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            return Err(format!("expected key=value, got `{arg}`"));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("missing input name in `{arg}`"));
        }
        inputs.insert(key.to_string(), parse_input_value(value));
    }
    Ok(inputs)
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchCommand {
    Pending,
    Decide {
        confirmation_id: String,
        response: ConfirmationResponse,
    },
}

/// Parses one line typed during `watch`. Blank lines yield `None`.
pub fn parse_watch_line(line: &str) -> Result<Option<WatchCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(first) = parts.next() else {
        return Ok(None);
    };
    if first == "pending" {
        return Ok(Some(WatchCommand::Pending));
    }
    let action = parts
        .next()
        .ok_or_else(|| format!("missing action for confirmation `{first}`"))?;
    let action = ConfirmationAction::parse(action).map_err(|e| e.to_string())?;
    let pairs = parts.map(str::to_string).collect::<Vec<_>>();
    let modified = parse_input_pairs(&pairs)?;

    let mut response = ConfirmationResponse::new("", "", action);
    if !modified.is_empty() {
        response = response.with_modified_inputs(modified);
    }
    Ok(Some(WatchCommand::Decide {
        confirmation_id: first.to_string(),
        response,
    }))
}
