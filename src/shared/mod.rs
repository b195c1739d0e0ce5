pub mod errors;
pub mod serde_ext;
pub mod time;
