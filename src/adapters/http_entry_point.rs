//! HTTP/1.1 entry point.
//!
//! Translates inbound HTTP requests into [`GatewayRequest`]s, hands them to
//! the engine's dispatcher and writes the [`GatewayResponse`] back. Every
//! request gets a 30 second context that is also cancelled when the client
//! goes away: the cancel guard travels with the response body, so dropping
//! the connection at any point cancels the request.
use std::{
    net::SocketAddr,
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    response::Response,
};
use bytes::Bytes;
use http::{StatusCode, header};
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tokio::{
    net::TcpListener,
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{
    config::{ConfigValidator, EntryPointConfig, Protocol, validation::normalize_listen_address},
    core::{
        context::RequestContext,
        model::{DEFAULT_REQUEST_TIMEOUT, GatewayRequest, GatewayResponse, diagnostics},
    },
    ports::entry_point::{
        Dispatcher, EntryPoint, EntryPointError, EntryPointFactory, ListenerExit,
    },
};

/// How long `close` waits for in-flight requests before aborting the server.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct EntryState {
    protocol: Protocol,
    dispatcher: Arc<dyn Dispatcher>,
}

struct Running {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct HttpEntryPoint {
    id: Uuid,
    config: EntryPointConfig,
    address: String,
    dispatcher: Arc<dyn Dispatcher>,
    drain_timeout: Duration,
    local_addr: OnceLock<SocketAddr>,
    running: Mutex<Option<Running>>,
}

impl HttpEntryPoint {
    fn new(
        config: EntryPointConfig,
        address: String,
        dispatcher: Arc<dyn Dispatcher>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            address,
            dispatcher,
            drain_timeout,
            local_addr: OnceLock::new(),
            running: Mutex::new(None),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .layer(TraceLayer::new_for_http())
            .with_state(EntryState {
                protocol: self.config.protocol.clone(),
                dispatcher: self.dispatcher.clone(),
            })
    }
}

#[async_trait]
impl EntryPoint for HttpEntryPoint {
    fn id(&self) -> Uuid {
        self.id
    }

    fn config(&self) -> &EntryPointConfig {
        &self.config
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    async fn start(
        &self,
        exits: mpsc::UnboundedSender<ListenerExit>,
    ) -> Result<SocketAddr, EntryPointError> {
        let mut running = self.running.lock().await;
        if running.is_some() || self.local_addr.get().is_some() {
            return Err(EntryPointError::AlreadyStarted(self.id));
        }

        let bind_error = |source: std::io::Error| EntryPointError::Bind {
            address: self.address.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        let _ = self.local_addr.set(local_addr);

        let token = CancellationToken::new();
        let shutdown = token.clone().cancelled_owned();
        let app = self.router();
        let protocol = self.config.protocol.clone();
        let id = self.id;

        let task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown)
            .await;

            let error = result.err().map(|e| e.to_string());
            if exits.send(ListenerExit { protocol, id, error }).is_err() {
                tracing::debug!(id = %id, "Nobody is waiting for listener exits");
            }
        });

        tracing::info!(id = %self.id, address = %local_addr, "HTTP entry point started");
        *running = Some(Running { token, task });
        Ok(local_addr)
    }

    async fn close(&self) {
        let Some(Running { token, mut task }) = self.running.lock().await.take() else {
            return;
        };

        token.cancel();
        match tokio::time::timeout(self.drain_timeout, &mut task).await {
            Ok(_) => tracing::info!(id = %self.id, "HTTP entry point closed"),
            Err(_) => {
                tracing::warn!(id = %self.id, "In-flight requests did not drain in time, aborting");
                task.abort();
                let _ = task.await;
            }
        }
    }
}

async fn handle_request(
    State(state): State<EntryState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let context = RequestContext::with_timeout(DEFAULT_REQUEST_TIMEOUT);
    let guard = context.drop_guard();
    let (parts, body) = request.into_parts();

    let host = parts
        .headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|authority| authority.to_string()))
        .filter(|host| !host.is_empty());
    let Some(host) = host else {
        tracing::debug!(peer = %peer, "Request without host");
        let response = GatewayResponse::text(
            state.protocol,
            context,
            StatusCode::BAD_REQUEST,
            diagnostics::BAD_REQUEST,
        );
        return into_response(response, guard);
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|path_and_query| path_and_query.as_str())
        .unwrap_or("/");

    let request = GatewayRequest {
        protocol: state.protocol,
        context,
        client_ip: peer.ip(),
        method: parts.method,
        url: format!("http://{host}{path_and_query}"),
        headers: parts.headers,
        body,
    };
    let response = state.dispatcher.dispatch(request).await;
    into_response(response, guard)
}

fn into_response(response: GatewayResponse, guard: DropGuard) -> Response {
    let mut http_response = Response::new(Body::new(GuardedBody {
        inner: response.body,
        _guard: guard,
    }));
    *http_response.status_mut() = response.status;
    *http_response.headers_mut() = response.headers;
    http_response
}

/// Response body carrying the request's cancel guard.
struct GuardedBody {
    inner: Body,
    _guard: DropGuard,
}

impl HttpBody for GuardedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Creates [`HttpEntryPoint`]s; any other protocol is rejected.
#[derive(Debug, Clone)]
pub struct HttpEntryPointFactory {
    drain_timeout: Duration,
}

impl HttpEntryPointFactory {
    pub fn new(drain_timeout: Duration) -> Self {
        Self { drain_timeout }
    }
}

impl Default for HttpEntryPointFactory {
    fn default() -> Self {
        Self::new(DEFAULT_DRAIN_TIMEOUT)
    }
}

impl EntryPointFactory for HttpEntryPointFactory {
    fn create(
        &self,
        config: &EntryPointConfig,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Box<dyn EntryPoint>, EntryPointError> {
        if config.protocol != Protocol::Http {
            return Err(EntryPointError::UnsupportedProtocol(config.protocol.to_string()));
        }
        ConfigValidator::validate_listen_address(&config.addr).map_err(|e| {
            EntryPointError::InvalidAddress {
                address: config.addr.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(Box::new(HttpEntryPoint::new(
            config.clone(),
            normalize_listen_address(&config.addr),
            dispatcher,
            self.drain_timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers with the URL and client address it was handed.
    struct Echo;

    #[async_trait]
    impl Dispatcher for Echo {
        async fn dispatch(&self, request: GatewayRequest) -> GatewayResponse {
            let mut response = GatewayResponse::text(
                request.protocol,
                request.context,
                StatusCode::OK,
                "",
            );
            response.body = Body::from(format!("{} {}", request.url, request.client_ip));
            response
        }
    }

    fn create(addr: &str) -> Box<dyn EntryPoint> {
        HttpEntryPointFactory::default()
            .create(&EntryPointConfig::new("http", addr), Arc::new(Echo))
            .unwrap()
    }

    #[test]
    fn factory_rejects_other_protocols_and_bad_addresses() {
        let factory = HttpEntryPointFactory::default();
        assert!(matches!(
            factory.create(&EntryPointConfig::new("grpc", "127.0.0.1:0"), Arc::new(Echo)),
            Err(EntryPointError::UnsupportedProtocol(_))
        ));
        assert!(matches!(
            factory.create(&EntryPointConfig::new("http", "nowhere"), Arc::new(Echo)),
            Err(EntryPointError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn serves_until_closed() {
        let (exits_tx, mut exits_rx) = mpsc::unbounded_channel();
        let entry_point = create("127.0.0.1:0");
        assert!(entry_point.local_addr().is_none());

        let addr = entry_point.start(exits_tx.clone()).await.unwrap();
        assert_eq!(entry_point.local_addr(), Some(addr));

        let body = reqwest::get(format!("http://{addr}/users?page=2"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, format!("http://{addr}/users?page=2 127.0.0.1"));

        assert!(matches!(
            entry_point.start(exits_tx).await,
            Err(EntryPointError::AlreadyStarted(_))
        ));

        entry_point.close().await;
        let exit = exits_rx.recv().await.unwrap();
        assert_eq!(exit.id, entry_point.id());
        assert!(exit.error.is_none());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let (exits_tx, _exits_rx) = mpsc::unbounded_channel();
        let first = create("127.0.0.1:0");
        let addr = first.start(exits_tx.clone()).await.unwrap();

        let second = create(&addr.to_string());
        assert!(matches!(
            second.start(exits_tx).await,
            Err(EntryPointError::Bind { .. })
        ));
        first.close().await;
    }
}
