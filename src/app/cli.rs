#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Run,
    Watch,
    Status,
    Stop,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "run" => CliVerb::Run,
        "watch" => CliVerb::Watch,
        "status" => CliVerb::Status,
        "stop" => CliVerb::Stop,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  run <workflow_id> [key=value ...] [--user <name>] [--detach]".to_string(),
        "                                       Start a workflow run and watch it".to_string(),
        "  watch <run_id>                       Stream run events and answer confirmations"
            .to_string(),
        "  status <run_id>                      Print the current run detail as JSON".to_string(),
        "  stop <run_id>                        Stop a running workflow".to_string(),
        "  help                                 Show this help".to_string(),
    ]
}

pub fn watch_help_lines() -> Vec<String> {
    vec![
        "While watching, type one of:".to_string(),
        "  <confirmation_id> approve|reject|retry|modify [key=value ...]".to_string(),
        "  pending                              List pending confirmations".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    let mut lines = cli_help_lines();
    lines.push(String::new());
    lines.extend(watch_help_lines());
    lines.join("\n")
}
