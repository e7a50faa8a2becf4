pub mod config;
pub mod dap;
pub mod engine;
pub mod log;
