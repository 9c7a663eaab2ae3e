use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;

use crate::core::{
    chain::Next,
    model::{GatewayRequest, GatewayResponse, diagnostics},
};

/// Error type for request handling inside a frontend chain
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum HandlerError {
    #[error("Internal server error: {0}")]
    InternalError(String),
    #[error("Bad gateway: {0}")]
    BadGateway(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl HandlerError {
    /// Status code of the diagnostic response rendered for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HandlerError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Fixed body of the diagnostic response rendered for this error.
    pub fn diagnostic(&self) -> &'static str {
        match self {
            HandlerError::InternalError(_) => diagnostics::INTERNAL_ERROR,
            HandlerError::BadGateway(_) => diagnostics::BAD_GATEWAY,
            HandlerError::BadRequest(_) => diagnostics::BAD_REQUEST,
        }
    }
}

/// Terminal request handler of a chain, i.e. a backend's reverse proxy.
///
/// One instance serves every concurrent request for its backend.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: GatewayRequest) -> Result<GatewayResponse, HandlerError>;
}

/// A named processing step placed in front of a backend.
///
/// Implementations either answer the request themselves (short-circuit) or
/// call `next.run(request)` to hand it to the remainder of the chain.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        request: GatewayRequest,
        next: Next<'_>,
    ) -> Result<GatewayResponse, HandlerError>;
}
