// Shared fixtures for the integration tests: echo backends and config builders.
#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    response::Response,
};
use http::{HeaderMap, HeaderValue, header};
use waypoint::{
    Engine,
    config::{BackendConfig, EntryPointConfig, FrontendConfig, GatewayConfig, MatchCondition, Protocol},
};

pub const BIG_BODY_LEN: usize = 256 * 1024;

/// Start an echo backend on an ephemeral port. Every response reports what
/// the backend saw in `x-echo-*` headers and echoes the request body.
///
/// `/slow` answers after two seconds, `/big` streams [`BIG_BODY_LEN`] bytes
/// and `/hop` adds a connection-scoped `x-drop` next to a plain `x-keep`.
pub async fn spawn_backend(name: &'static str) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(echo).with_state(name);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn echo(State(name): State<&'static str>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();

    let mut headers = HeaderMap::new();
    headers.insert("x-echo-backend", HeaderValue::from_static(name));
    headers.insert(
        "x-echo-uri",
        HeaderValue::from_str(&parts.uri.to_string()).unwrap(),
    );
    for (from, to) in [
        (header::HOST.as_str(), "x-echo-host"),
        ("x-forwarded-for", "x-echo-forwarded-for"),
        ("x-request-id", "x-echo-request-id"),
        ("connection", "x-echo-connection"),
        ("x-secret", "x-echo-secret"),
    ] {
        if let Some(value) = parts.headers.get(from) {
            headers.insert(to, value.clone());
        }
    }

    let body = match parts.uri.path() {
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Body::from(body)
        }
        "/big" => Body::from(Bytes::from(vec![b'x'; BIG_BODY_LEN])),
        "/hop" => {
            headers.insert(header::CONNECTION, HeaderValue::from_static("x-drop"));
            headers.insert("x-drop", HeaderValue::from_static("1"));
            headers.insert("x-keep", HeaderValue::from_static("1"));
            Body::from(body)
        }
        _ => Body::from(body),
    };

    let mut response = Response::new(body);
    *response.headers_mut() = headers;
    response
}

pub fn backend(name: &str, addr: SocketAddr) -> BackendConfig {
    BackendConfig::static_http(name, format!("http://{addr}"))
}

/// A frontend routing to `destination` when any of `conditions` holds.
pub fn frontend(id: &str, conditions: Vec<MatchCondition>, destination: &str) -> FrontendConfig {
    FrontendConfig {
        id: Some(id.to_string()),
        protocol: Protocol::Http,
        host: None,
        conditions,
        destination: destination.to_string(),
        middlewares: vec![],
    }
}

pub fn catch_all(destination: &str) -> FrontendConfig {
    frontend("default", vec![MatchCondition::default()], destination)
}

pub fn host(value: &str) -> MatchCondition {
    MatchCondition {
        host: Some(value.to_string()),
        ..MatchCondition::default()
    }
}

/// One HTTP entry point on an ephemeral port plus the given routing.
pub fn gateway_config(frontend: Vec<FrontendConfig>, backend: Vec<BackendConfig>) -> GatewayConfig {
    GatewayConfig {
        entry_points: vec![EntryPointConfig::new("http", "127.0.0.1:0")],
        frontend,
        backend,
        ..GatewayConfig::default()
    }
}

/// Base URL of the engine's HTTP listener.
pub async fn gateway_url(engine: &Engine) -> String {
    let listeners = engine.listeners().await;
    let addr = listeners
        .iter()
        .find(|listener| listener.protocol == Protocol::Http)
        .and_then(|listener| listener.local_addr)
        .expect("http listener is serving");
    format!("http://{addr}")
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// A port nothing is listening on.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
