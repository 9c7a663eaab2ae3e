//! Waypoint - an API gateway with first-match frontend routing.
//!
//! Waypoint accepts requests on configured entry points, finds the first
//! frontend whose match conditions accept the request, runs the frontend's
//! middleware chain and forwards the request to a backend through a streaming
//! reverse proxy. Backends locate their upstream through pluggable service
//! discovery (static address/URL or cached DNS). A new configuration can be
//! loaded at any time: it is validated and wired completely before it is
//! committed, and entry points are started, kept, replaced or stopped to
//! match it.
//!
//! # Features
//! - Ordered frontends matching on host, headers, method and query parameters
//! - Middleware chains (`auth`, `request_id`, `security_headers`)
//! - Streaming HTTP/1.1 reverse proxy with trailer forwarding and optional
//!   flush intervals
//! - Static and DNS service discovery with random or round-robin selection
//! - All-or-nothing reloads with listener identity preserved across no-op
//!   reloads
//! - Structured tracing and `metrics` facade counters
//!
//! # Quick Example
//! ```no_run
//! use waypoint::{config::loader::load_config, utils::GracefulShutdown};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = load_config("gateway.yaml").await?;
//! let engine = waypoint::default_engine();
//! engine.load_config(config).await?;
//!
//! let shutdown = GracefulShutdown::new();
//! engine.run(&shutdown).await;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping routing, chains and reload planning inside `core`, which
//! never depends on an adapter.
//!
//! # Error Handling
//! Library APIs return domain error types built with `thiserror`; the binary
//! wraps them in `eyre::Result` with context.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

use std::sync::Arc;

pub use crate::{
    adapters::{FileConfigProvider, HttpEntryPointFactory, HttpUpstreamFactory, builtin_registry},
    core::{Engine, EngineError, Gateway, GatewayRequest, GatewayResponse},
    utils::GracefulShutdown,
};

/// An engine wired with the HTTP reverse proxy, the built-in middlewares and
/// the HTTP entry point.
pub fn default_engine() -> Engine {
    Engine::new(
        builtin_registry(),
        Arc::new(HttpUpstreamFactory::default()),
        Arc::new(HttpEntryPointFactory::default()),
    )
}
