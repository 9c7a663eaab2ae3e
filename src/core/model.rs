//! Transport-neutral request and response model.
//!
//! Entry point adapters are the only place that translates between the wire
//! and these types; routing, middlewares and the reverse proxy only ever see a
//! [`GatewayRequest`] and produce a [`GatewayResponse`].
use std::{net::IpAddr, time::Duration};

use axum::body::Body;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header};

use crate::{config::Protocol, core::context::RequestContext};

/// Deadline applied to every request accepted by the HTTP entry point.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed bodies of the responses the gateway produces on its own.
pub mod diagnostics {
    pub const NO_FRONTEND: &str = "error in finding frontend";
    pub const INTERNAL_ERROR: &str = "apigateway internal error";
    pub const TIMEOUT_EXCEEDED: &str = "timeout exceeded";
    pub const BAD_GATEWAY: &str = "bad gateway";
    pub const BAD_REQUEST: &str = "bad request";
    pub const FORBIDDEN: &str = "403 forbidden";
}

#[derive(Debug)]
pub struct GatewayRequest {
    pub protocol: Protocol,
    pub context: RequestContext,
    pub client_ip: IpAddr,
    pub method: Method,
    /// Absolute target URL, e.g. `http://api.example.com/users?page=2`.
    pub url: String,
    pub headers: HeaderMap,
    pub body: Body,
}

impl GatewayRequest {
    /// A bodiless request with no headers.
    pub fn new(
        protocol: Protocol,
        context: RequestContext,
        client_ip: IpAddr,
        method: Method,
        url: impl Into<String>,
    ) -> Self {
        Self {
            protocol,
            context,
            client_ip,
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Body::empty(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.append(name, HeaderValue::from_static(value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug)]
pub struct GatewayResponse {
    pub protocol: Protocol,
    pub context: RequestContext,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl GatewayResponse {
    /// A plain text response generated by the gateway itself.
    pub fn text(
        protocol: Protocol,
        context: RequestContext,
        status: StatusCode,
        message: &'static str,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            protocol,
            context,
            status,
            headers,
            body: Body::from(message),
        }
    }

    /// Diagnostic response answering `request`.
    pub fn diagnostic(request: &GatewayRequest, status: StatusCode, message: &'static str) -> Self {
        Self::text(
            request.protocol.clone(),
            request.context.clone(),
            status,
            message,
        )
    }
}
