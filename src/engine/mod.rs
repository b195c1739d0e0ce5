pub mod error;
pub mod http;
pub mod types;

pub use error::EngineError;
pub use http::HttpEngineGateway;
pub use types::{EngineTimestamp, ExecutionMetadata, Run, RunDetail, RunStatus, Step};

use serde_json::{Map, Value};

/// Remote workflow engine operations the monitor depends on.
///
/// Implementations block the calling thread for the duration of the request.
pub trait EngineGateway: Send + Sync {
    fn start_run(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        user: Option<&str>,
    ) -> Result<Run, EngineError>;

    fn get_run_detail(&self, run_id: &str) -> Result<RunDetail, EngineError>;

    fn stop_run(&self, run_id: &str) -> Result<(), EngineError>;

    fn retry_from_node(
        &self,
        workflow_id: &str,
        inputs: &Map<String, Value>,
        node_id: Option<&str>,
    ) -> Result<Run, EngineError>;
}
