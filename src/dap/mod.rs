//! Debug Adapter Protocol side of the bridge.

pub mod error;
pub mod logger;
pub mod payload;
pub mod protocol;
pub mod request;
pub mod session;
pub mod sourcemap;
pub mod tracer;
pub mod transport;
pub mod types;
