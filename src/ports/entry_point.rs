use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    config::{EntryPointConfig, Protocol},
    core::model::{GatewayRequest, GatewayResponse, diagnostics},
};

/// Error type for entry point construction and lifecycle
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EntryPointError {
    #[error("Protocol '{0}' is not supported by any entry point")]
    UnsupportedProtocol(String),

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Entry point {0} has already been started")]
    AlreadyStarted(Uuid),
}

/// Reported on the shared exit channel when a listener's serve loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerExit {
    pub protocol: Protocol,
    pub id: Uuid,
    /// Present when the serve loop failed rather than closed cleanly.
    pub error: Option<String>,
}

/// The dispatch function an entry point invokes for every request.
///
/// Never fails: routing and upstream errors are already rendered as
/// diagnostic responses.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, request: GatewayRequest) -> GatewayResponse;
}

/// Dispatcher used to dry-run entry point construction during a reload.
pub struct NoopDispatcher;

#[async_trait]
impl Dispatcher for NoopDispatcher {
    async fn dispatch(&self, request: GatewayRequest) -> GatewayResponse {
        GatewayResponse::diagnostic(
            &request,
            StatusCode::INTERNAL_SERVER_ERROR,
            diagnostics::INTERNAL_ERROR,
        )
    }
}

/// A listener for one protocol at one address.
///
/// Construction never touches the network; [`EntryPoint::start`] binds
/// synchronously and serves in the background until [`EntryPoint::close`].
#[async_trait]
pub trait EntryPoint: Send + Sync {
    /// Identity of this instance, stable for as long as it keeps serving.
    fn id(&self) -> Uuid;

    fn config(&self) -> &EntryPointConfig;

    /// Bound address once started.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Bind and spawn the serve loop; its end is reported on `exits`.
    async fn start(
        &self,
        exits: mpsc::UnboundedSender<ListenerExit>,
    ) -> Result<SocketAddr, EntryPointError>;

    /// Stop accepting, let in-flight requests finish (bounded) and release
    /// the socket.
    async fn close(&self);
}

/// Constructs entry points for the protocols it knows.
pub trait EntryPointFactory: Send + Sync + 'static {
    fn create(
        &self,
        config: &EntryPointConfig,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Box<dyn EntryPoint>, EntryPointError>;
}
