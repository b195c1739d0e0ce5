#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("engine returned status {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("engine response from {url} could not be decoded: {reason}")]
    Decode { url: String, reason: String },
}
