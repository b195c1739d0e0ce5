use super::{RuntimeError, StatePaths};
use crate::shared::time::now_millis;
use std::fs;
use std::io::Write;

pub fn append_runtime_log(paths: &StatePaths, level: &str, event: &str, message: &str) {
    let _ = try_append_runtime_log(paths, level, event, message);
}

pub fn try_append_runtime_log(
    paths: &StatePaths,
    level: &str,
    event: &str,
    message: &str,
) -> Result<(), RuntimeError> {
    let payload = serde_json::json!({
        "timestamp": now_millis(),
        "level": level,
        "event": event,
        "message": message,
    });
    let line = payload.to_string();

    let path = paths.runtime_log_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RuntimeError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| RuntimeError::AppendLog {
            path: path.display().to_string(),
            source,
        })?;
    writeln!(file, "{line}").map_err(|source| RuntimeError::AppendLog {
        path: path.display().to_string(),
        source,
    })
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeLog {
    paths: Option<StatePaths>,
}

impl RuntimeLog {
    pub fn disabled() -> Self {
        Self { paths: None }
    }

    pub fn to_state_root(paths: StatePaths) -> Self {
        Self { paths: Some(paths) }
    }

    pub fn paths(&self) -> Option<&StatePaths> {
        self.paths.as_ref()
    }

    pub fn info(&self, event: &str, message: &str) {
        self.write("info", event, message);
    }

    pub fn warn(&self, event: &str, message: &str) {
        self.write("warn", event, message);
    }

    pub fn error(&self, event: &str, message: &str) {
        self.write("error", event, message);
    }

    fn write(&self, level: &str, event: &str, message: &str) {
        if let Some(paths) = &self.paths {
            append_runtime_log(paths, level, event, message);
        }
    }
}
