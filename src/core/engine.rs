//! The engine owns the committed routing snapshot and the live listeners.
//!
//! A load validates and wires a complete [`Gateway`], dry-runs every entry
//! point, commits the snapshot and only then reconciles live listeners with
//! the new entry point list. Any failure before the commit leaves both the
//! previous snapshot and every listener untouched.
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Instant};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use http::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::{
    config::{EntryPointConfig, GatewayConfig, Protocol},
    core::{
        chain::MiddlewareRegistry,
        gateway::{BuildError, Gateway},
        model::{GatewayRequest, GatewayResponse, diagnostics},
        reload::{self, Transition},
    },
    metrics,
    ports::{
        entry_point::{
            Dispatcher, EntryPoint, EntryPointError, EntryPointFactory, ListenerExit,
            NoopDispatcher,
        },
        upstream::UpstreamFactory,
    },
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration rejected: {0}")]
    Build(#[from] BuildError),

    #[error("Entry point '{protocol}' rejected: {source}")]
    EntryPoint {
        protocol: Protocol,
        #[source]
        source: EntryPointError,
    },

    #[error("Configuration committed but {} listener(s) failed to start: {}", .0.len(), format_failures(.0))]
    Start(Vec<(Protocol, EntryPointError)>),
}

fn format_failures(failures: &[(Protocol, EntryPointError)]) -> String {
    failures
        .iter()
        .map(|(protocol, error)| format!("{protocol}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Snapshot of one serving listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerInfo {
    pub protocol: Protocol,
    pub id: Uuid,
    pub local_addr: Option<SocketAddr>,
}

/// Dispatches requests against whatever snapshot is committed.
///
/// Entry points hold this rather than the engine so that listeners never
/// keep the engine alive.
#[derive(Default)]
pub struct GatewayDispatcher {
    current: ArcSwapOption<Gateway>,
}

impl GatewayDispatcher {
    pub fn current(&self) -> Option<Arc<Gateway>> {
        self.current.load_full()
    }

    fn commit(&self, gateway: Arc<Gateway>) {
        self.current.store(Some(gateway));
    }

    /// Route `request` through its frontend's chain and render every failure
    /// as a diagnostic response.
    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        let Some(gateway) = self.current() else {
            tracing::warn!(url = %request.url, "No configuration loaded yet");
            return GatewayResponse::diagnostic(
                &request,
                StatusCode::INTERNAL_SERVER_ERROR,
                diagnostics::NO_FRONTEND,
            );
        };

        let frontend = match gateway.find_frontend(&request) {
            Ok(frontend) => frontend,
            Err(e) => {
                tracing::info!(error = %e, "error in finding frontend");
                metrics::increment_request_total(
                    "none",
                    request.method.as_str(),
                    StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                );
                return GatewayResponse::diagnostic(
                    &request,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    diagnostics::NO_FRONTEND,
                );
            }
        };

        let protocol = request.protocol.clone();
        let context = request.context.clone();
        let method = request.method.clone();
        let _timer = metrics::RequestTimer::new(&frontend.id, method.as_str());
        let started = Instant::now();

        let result = frontend.chain.dispatch(request).await;

        let response = if context.is_done() {
            tracing::debug!(
                frontend = %frontend.id,
                cancelled = context.is_cancelled(),
                "Request context finished before the chain returned"
            );
            GatewayResponse::text(
                protocol,
                context,
                StatusCode::GATEWAY_TIMEOUT,
                diagnostics::TIMEOUT_EXCEEDED,
            )
        } else {
            match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(frontend = %frontend.id, error = %e, "Error in middleware chain");
                    GatewayResponse::text(protocol, context, e.status(), e.diagnostic())
                }
            }
        };

        tracing::debug!(
            frontend = %frontend.id,
            status = response.status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Request dispatched"
        );
        metrics::increment_request_total(&frontend.id, method.as_str(), response.status.as_u16());
        response
    }
}

#[async_trait]
impl Dispatcher for GatewayDispatcher {
    async fn dispatch(&self, request: GatewayRequest) -> GatewayResponse {
        self.handle(request).await
    }
}

pub struct Engine {
    dispatcher: Arc<GatewayDispatcher>,
    middlewares: MiddlewareRegistry,
    upstreams: Arc<dyn UpstreamFactory>,
    entry_points: Arc<dyn EntryPointFactory>,
    /// Held for the whole of a reload, which serializes reloads.
    live: Mutex<HashMap<Protocol, Box<dyn EntryPoint>>>,
    exits_tx: mpsc::UnboundedSender<ListenerExit>,
    exits_rx: Mutex<mpsc::UnboundedReceiver<ListenerExit>>,
}

impl Engine {
    pub fn new(
        middlewares: MiddlewareRegistry,
        upstreams: Arc<dyn UpstreamFactory>,
        entry_points: Arc<dyn EntryPointFactory>,
    ) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            dispatcher: Arc::new(GatewayDispatcher::default()),
            middlewares,
            upstreams,
            entry_points,
            live: Mutex::new(HashMap::new()),
            exits_tx,
            exits_rx: Mutex::new(exits_rx),
        }
    }

    /// The committed snapshot, if any load succeeded.
    pub fn current(&self) -> Option<Arc<Gateway>> {
        self.dispatcher.current()
    }

    pub fn dispatcher(&self) -> Arc<GatewayDispatcher> {
        self.dispatcher.clone()
    }

    /// Dispatch a request against the committed snapshot.
    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        self.dispatcher.handle(request).await
    }

    /// Build everything a load would commit without committing it: structural
    /// validation, backends, chains and a dry-run of every entry point.
    pub fn prepare(&self, config: GatewayConfig) -> Result<Gateway, EngineError> {
        let previous = self.current();
        let gateway = Gateway::build(
            Arc::new(config),
            previous.as_deref(),
            &self.middlewares,
            self.upstreams.as_ref(),
        )?;

        let noop: Arc<dyn Dispatcher> = Arc::new(NoopDispatcher);
        for entry_point in &gateway.config().entry_points {
            self.entry_points
                .create(entry_point, noop.clone())
                .map_err(|source| EngineError::EntryPoint {
                    protocol: entry_point.protocol.clone(),
                    source,
                })?;
        }

        Ok(gateway)
    }

    /// Validate, commit and apply `config`. On error before the commit
    /// nothing observable changes.
    pub async fn load_config(&self, config: GatewayConfig) -> Result<(), EngineError> {
        let mut live = self.live.lock().await;

        let gateway = match self.prepare(config) {
            Ok(gateway) => gateway,
            Err(e) => {
                metrics::increment_config_reload(false);
                return Err(e);
            }
        };
        let desired = gateway.config().entry_points.clone();
        self.dispatcher.commit(Arc::new(gateway));
        metrics::increment_config_reload(true);
        tracing::info!(entry_points = desired.len(), "Configuration committed");

        let running: HashMap<Protocol, EntryPointConfig> = live
            .iter()
            .map(|(protocol, entry_point)| (protocol.clone(), entry_point.config().clone()))
            .collect();

        let mut failures = Vec::new();
        for step in reload::plan(&running, &desired) {
            let protocol = step.protocol.clone();
            let outcome = match (step.transition, step.desired) {
                (Transition::Skip, _) => {
                    tracing::warn!(protocol = %protocol, "entry point is not enabled");
                    Ok(())
                }
                (Transition::Keep, _) => {
                    tracing::debug!(protocol = %protocol, "Entry point unchanged, keeping listener");
                    Ok(())
                }
                (Transition::Stop, _) => {
                    if let Some(old) = live.remove(&protocol) {
                        tracing::info!(protocol = %protocol, id = %old.id(), "Stopping entry point");
                        old.close().await;
                    }
                    Ok(())
                }
                (Transition::Start, Some(desired)) => self.start_entry_point(&mut live, &desired).await,
                (Transition::Replace, Some(desired)) => {
                    match self.entry_points.create(&desired, self.dispatcher.clone()) {
                        Ok(replacement) => {
                            if let Some(old) = live.remove(&protocol) {
                                tracing::info!(protocol = %protocol, id = %old.id(), "Replacing entry point");
                                old.close().await;
                            }
                            self.spawn_entry_point(&mut live, replacement).await
                        }
                        Err(e) => Err(e),
                    }
                }
                (Transition::Start | Transition::Replace, None) => Ok(()),
            };

            if let Err(e) = outcome {
                tracing::error!(protocol = %protocol, error = %e, "Unable to start entry point");
                failures.push((protocol, e));
            }
        }

        metrics::set_active_listeners(live.len());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Start(failures))
        }
    }

    async fn start_entry_point(
        &self,
        live: &mut HashMap<Protocol, Box<dyn EntryPoint>>,
        config: &EntryPointConfig,
    ) -> Result<(), EntryPointError> {
        let entry_point = self.entry_points.create(config, self.dispatcher.clone())?;
        self.spawn_entry_point(live, entry_point).await
    }

    async fn spawn_entry_point(
        &self,
        live: &mut HashMap<Protocol, Box<dyn EntryPoint>>,
        entry_point: Box<dyn EntryPoint>,
    ) -> Result<(), EntryPointError> {
        let address = entry_point.start(self.exits_tx.clone()).await?;
        tracing::info!(
            protocol = %entry_point.config().protocol,
            id = %entry_point.id(),
            address = %address,
            "Entry point listening"
        );
        live.insert(entry_point.config().protocol.clone(), entry_point);
        Ok(())
    }

    /// Reload hook for configuration watchers; failures are logged and the
    /// previous configuration keeps serving.
    pub async fn on_config_change(&self, config: GatewayConfig) {
        match self.load_config(config).await {
            Ok(()) => tracing::info!("Configuration reloaded"),
            Err(e) => tracing::error!("Failed to reload configuration: {}. Keeping old configuration.", e),
        }
    }

    /// Protocol, identity and bound address of every serving listener.
    pub async fn listeners(&self) -> Vec<ListenerInfo> {
        let live = self.live.lock().await;
        let mut listeners: Vec<_> = live
            .iter()
            .map(|(protocol, entry_point)| ListenerInfo {
                protocol: protocol.clone(),
                id: entry_point.id(),
                local_addr: entry_point.local_addr(),
            })
            .collect();
        listeners.sort_by(|a, b| a.protocol.as_str().cmp(b.protocol.as_str()));
        listeners
    }

    /// Close every live listener, each bounded by `shutdown`'s timeout.
    pub async fn close_all(&self, shutdown: &GracefulShutdown) {
        let mut live = self.live.lock().await;
        for (protocol, entry_point) in live.drain() {
            tracing::info!(protocol = %protocol, id = %entry_point.id(), "Closing entry point");
            if tokio::time::timeout(shutdown.shutdown_timeout(), entry_point.close())
                .await
                .is_err()
            {
                tracing::warn!(protocol = %protocol, "Entry point did not close in time");
            }
        }
        metrics::set_active_listeners(0);
    }

    /// Serve until a shutdown signal arrives or the last listener exits.
    pub async fn run(&self, shutdown: &GracefulShutdown) {
        let mut exits = self.exits_rx.lock().await;
        if self.live.lock().await.is_empty() {
            tracing::warn!("No entry point is running");
            return;
        }

        loop {
            tokio::select! {
                reason = shutdown.wait_for_shutdown_signal() => {
                    tracing::info!("got signal: {:?}", reason);
                    self.close_all(shutdown).await;
                    return;
                }
                Some(exit) = exits.recv() => {
                    if self.on_listener_exit(exit).await {
                        tracing::info!("server stops working");
                        return;
                    }
                }
            }
        }
    }

    /// Forget a listener whose serve loop ended on its own. Returns true once
    /// no listener is left.
    async fn on_listener_exit(&self, exit: ListenerExit) -> bool {
        let mut live = self.live.lock().await;
        let current = live.get(&exit.protocol).map(|entry_point| entry_point.id());

        if current == Some(exit.id) {
            match &exit.error {
                Some(error) => {
                    tracing::error!(protocol = %exit.protocol, id = %exit.id, "server is shutting down: {}", error)
                }
                None => tracing::info!(protocol = %exit.protocol, id = %exit.id, "server is shutting down"),
            }
            live.remove(&exit.protocol);
            metrics::set_active_listeners(live.len());
        } else {
            tracing::debug!(protocol = %exit.protocol, id = %exit.id, "Retired listener exited");
        }

        live.is_empty()
    }
}
