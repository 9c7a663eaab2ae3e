use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::BackendConfig,
    core::backend::BackendError,
    ports::{handler::Handler, service_discovery::DiscoveryError},
};

/// Error type for building a backend's transport stack
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum UpstreamError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Unsupported backend protocol '{0}'")]
    UnsupportedProtocol(String),
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// Builds the terminal handler (discovery + reverse proxy) of a backend.
pub trait UpstreamFactory: Send + Sync + 'static {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Handler>, UpstreamError>;
}
