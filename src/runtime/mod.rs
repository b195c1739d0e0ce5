pub mod logging;
pub mod state_paths;
pub(crate) mod worker_primitives;

pub use crate::shared::errors::RuntimeError;
pub use logging::{append_runtime_log, try_append_runtime_log, RuntimeLog};
pub use state_paths::{
    bootstrap_state_root, default_state_root_path, StatePaths, DEFAULT_STATE_ROOT_DIR,
};
