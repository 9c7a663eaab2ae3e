//! Built-in chain middlewares.
//!
//! The set is closed: [`MiddlewareKind`] lists every middleware a frontend
//! may name, and [`builtin_registry`] registers one shared instance of each.
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue, StatusCode, header};
use tracing::Instrument;

use crate::{
    core::{
        chain::{MiddlewareRegistry, Next},
        model::{GatewayRequest, GatewayResponse, diagnostics},
    },
    ports::handler::{HandlerError, Middleware},
};

/// Authorization value that is always refused.
pub const REJECTED_TOKEN: &str = "123123";

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareKind {
    Auth,
    RequestId,
    SecurityHeaders,
}

impl MiddlewareKind {
    pub const ALL: [MiddlewareKind; 3] = [
        MiddlewareKind::Auth,
        MiddlewareKind::RequestId,
        MiddlewareKind::SecurityHeaders,
    ];

    /// Name used in frontend configuration.
    pub fn name(self) -> &'static str {
        match self {
            MiddlewareKind::Auth => "auth",
            MiddlewareKind::RequestId => "request_id",
            MiddlewareKind::SecurityHeaders => "security_headers",
        }
    }

    pub fn instantiate(self) -> Arc<dyn Middleware> {
        match self {
            MiddlewareKind::Auth => Arc::new(AuthMiddleware),
            MiddlewareKind::RequestId => Arc::new(RequestIdMiddleware),
            MiddlewareKind::SecurityHeaders => Arc::new(SecurityHeadersMiddleware),
        }
    }
}

/// Registry holding every built-in middleware.
pub fn builtin_registry() -> MiddlewareRegistry {
    let mut registry = MiddlewareRegistry::new();
    for kind in MiddlewareKind::ALL {
        registry.register(kind.instantiate());
    }
    registry
}

/// Refuses requests without an `Authorization` header or carrying the
/// rejected token.
pub struct AuthMiddleware;

#[async_trait]
impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        MiddlewareKind::Auth.name()
    }

    async fn handle(
        &self,
        request: GatewayRequest,
        next: Next<'_>,
    ) -> Result<GatewayResponse, HandlerError> {
        let authorized = request
            .headers
            .get(header::AUTHORIZATION)
            .is_some_and(|value| value.as_bytes() != REJECTED_TOKEN.as_bytes());

        if !authorized {
            tracing::info!(url = %request.url, client = %request.client_ip, "Request refused by auth");
            return Ok(GatewayResponse::diagnostic(
                &request,
                StatusCode::FORBIDDEN,
                diagnostics::FORBIDDEN,
            ));
        }
        next.run(request).await
    }
}

/// Generate a per-request UUID when the client sent none, forward it
/// upstream and echo it on the response.
pub struct RequestIdMiddleware;

#[async_trait]
impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        MiddlewareKind::RequestId.name()
    }

    async fn handle(
        &self,
        mut request: GatewayRequest,
        next: Next<'_>,
    ) -> Result<GatewayResponse, HandlerError> {
        let request_id = match request.headers.get(&X_REQUEST_ID) {
            Some(value) => value.clone(),
            None => {
                let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
                    .map_err(|e| HandlerError::InternalError(e.to_string()))?;
                request.headers.insert(X_REQUEST_ID, generated.clone());
                generated
            }
        };

        let span = tracing::info_span!("request", request_id = ?request_id);
        let mut response = next.run(request).instrument(span).await?;
        response.headers.insert(X_REQUEST_ID, request_id);
        Ok(response)
    }
}

/// Add common security hardening headers without overwriting values the
/// backend already set.
pub struct SecurityHeadersMiddleware;

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

#[async_trait]
impl Middleware for SecurityHeadersMiddleware {
    fn name(&self) -> &'static str {
        MiddlewareKind::SecurityHeaders.name()
    }

    async fn handle(
        &self,
        request: GatewayRequest,
        next: Next<'_>,
    ) -> Result<GatewayResponse, HandlerError> {
        let mut response = next.run(request).await?;
        for (name, value) in SECURITY_HEADERS {
            response
                .headers
                .entry(name)
                .or_insert_with(|| HeaderValue::from_static(value));
        }
        Ok(response)
    }
}
