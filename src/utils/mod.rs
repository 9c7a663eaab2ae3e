pub mod graceful_shutdown;
pub mod headers;

pub use graceful_shutdown::{GracefulShutdown, ShutdownReason};
