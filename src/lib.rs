pub mod app;
pub mod config;
pub mod engine;
pub mod monitor;
pub mod runtime;
pub mod shared;
