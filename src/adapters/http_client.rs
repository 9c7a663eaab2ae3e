use std::{
    future::Future,
    net::IpAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{BoxError, body::Body};
use http::Uri;
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::{TokioExecutor, TokioIo},
};
use once_cell::sync::Lazy;
use rustls_native_certs::load_native_certs;
use tokio::net::TcpStream;
use tower::{Service, ServiceExt};

use crate::ports::service_discovery::{Destination, ServiceDiscovery};

/// Client used by a backend's reverse proxy.
pub type ProxyClient = Client<HttpsConnector<DiscoveryConnector>, Body>;

/// Root store and TLS settings shared by every backend client.
static TLS_CONFIG: Lazy<rustls::ClientConfig> = Lazy::new(|| {
    // Install default crypto provider for rustls if not already set
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let mut root_cert_store = rustls::RootCertStore::empty();
    let native_certs = load_native_certs();

    for cert in native_certs.certs {
        if root_cert_store.add(cert).is_err() {
            tracing::warn!("Failed to add native certificate to rustls RootCertStore");
        }
    }
    tracing::info!("Loaded {} native root certificates.", root_cert_store.len());

    if !native_certs.errors.is_empty() {
        tracing::warn!(
            "Some native certificates failed to load: {:?}",
            native_certs.errors
        );
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth()
});

/// Address to dial for `destination` when the request targets `uri`.
///
/// The host always comes from discovery; the port is the one of the outbound
/// URI, or the default of its scheme.
pub fn dial_authority(destination: &Destination, uri: &Uri) -> String {
    let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    });
    match destination {
        Destination::Ip(IpAddr::V4(ip)) => format!("{ip}:{port}"),
        Destination::Ip(IpAddr::V6(ip)) => format!("[{ip}]:{port}"),
        Destination::Url(url) => format!("{}:{port}", url.host_str().unwrap_or_default()),
    }
}

/// Connector asking a backend's discovery where to dial on every new
/// connection, whatever host the outbound URI names.
///
/// TLS is layered on top by `HttpsConnector`, which still sees the original
/// URI and uses its host for SNI.
#[derive(Clone)]
pub struct DiscoveryConnector {
    discovery: Arc<dyn ServiceDiscovery>,
    http: HttpConnector,
}

impl DiscoveryConnector {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false); // Allow HTTPS URLs
        Self { discovery, http }
    }
}

impl Service<Uri> for DiscoveryConnector {
    type Response = TokioIo<TcpStream>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let discovery = self.discovery.clone();
        let http = self.http.clone();
        Box::pin(async move {
            let destination = discovery.resolve().await?;
            let dial: Uri = format!("http://{}", dial_authority(&destination, &uri)).parse()?;
            tracing::trace!(uri = %uri, dial = %dial, "Dialing through discovery");
            let stream = http.oneshot(dial).await?;
            Ok::<_, BoxError>(stream)
        })
    }
}

/// Build a pooled HTTP/1.1 client, with HTTPS support, connecting wherever
/// `discovery` points.
pub fn build_client(discovery: Arc<dyn ServiceDiscovery>) -> ProxyClient {
    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(TLS_CONFIG.clone())
        .https_or_http()
        .enable_http1()
        .wrap_connector(DiscoveryConnector::new(discovery));

    Client::builder(TokioExecutor::new()).build::<_, Body>(https_connector)
}
