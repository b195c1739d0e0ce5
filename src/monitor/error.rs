use super::confirmation::ConfirmationAction;
use crate::engine::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    #[error("workflow engine unavailable while {operation}: {source}")]
    EngineUnavailable {
        operation: String,
        #[source]
        source: EngineError,
    },
    #[error("confirmation `{confirmation_id}` not found or already processed")]
    ConfirmationNotFound { confirmation_id: String },
    #[error("confirmation action `{action}` failed: {source}")]
    ActionFailed {
        action: ConfirmationAction,
        #[source]
        source: EngineError,
    },
    #[error("unknown confirmation action `{0}`; expected approve, reject, retry or modify")]
    UnknownAction(String),
    #[error("invalid confirmation response: {0}")]
    InvalidResponse(String),
}
