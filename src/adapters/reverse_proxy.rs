//! HTTP reverse proxy, the terminal handler of every chain.
//!
//! One proxy exists per backend and is shared by all requests routed to it.
//! It owns the backend's pooled client, whose connector asks the backend's
//! service discovery where to dial on every new connection.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use http::{HeaderValue, Request, Uri, Version, header};

use crate::{
    adapters::{
        body_copy::{BodyCopy, BufferPool, SharedBufferPool},
        discovery::build_discovery,
        http_client::{ProxyClient, build_client},
    },
    config::{BackendConfig, Protocol},
    core::{
        backend::ForwardingTarget,
        model::{GatewayRequest, GatewayResponse},
    },
    metrics,
    ports::{
        handler::{Handler, HandlerError},
        service_discovery::ServiceDiscovery,
        upstream::{UpstreamError, UpstreamFactory},
    },
    utils::headers::{
        accepts_trailers, announced_trailers, append_forwarded_for, remove_hop_by_hop_headers,
    },
};

pub struct HttpReverseProxy {
    name: String,
    target: ForwardingTarget,
    timeout: Duration,
    discovery: Arc<dyn ServiceDiscovery>,
    client: ProxyClient,
    body_copy: BodyCopy,
}

impl HttpReverseProxy {
    pub fn new(config: &BackendConfig, pool: Option<Arc<dyn BufferPool>>) -> Result<Self, UpstreamError> {
        if config.protocol != Protocol::Http {
            return Err(UpstreamError::UnsupportedProtocol(config.protocol.to_string()));
        }

        let discovery = build_discovery(&config.discovery)?;
        let target = ForwardingTarget::derive(config)?;
        tracing::debug!(
            backend = %config.name,
            scheme = %target.scheme,
            authority = %target.authority,
            path_prefix = %target.path_prefix,
            "Reverse proxy created"
        );

        Ok(Self {
            name: config.name.clone(),
            target,
            timeout: config.effective_timeout(),
            client: build_client(discovery.clone()),
            discovery,
            body_copy: BodyCopy {
                flush_interval: config.flush_interval,
                pool,
            },
        })
    }

    fn bad_gateway(&self, method: &http::Method, cause: String) -> HandlerError {
        tracing::warn!(
            backend = %self.name,
            discovery = self.discovery.target(),
            error = %cause,
            "Backend request failed"
        );
        metrics::increment_backend_request_total(&self.name, method.as_str(), 502);
        HandlerError::BadGateway(cause)
    }
}

#[async_trait]
impl Handler for HttpReverseProxy {
    async fn handle(&self, request: GatewayRequest) -> Result<GatewayResponse, HandlerError> {
        let GatewayRequest {
            protocol,
            context,
            client_ip,
            method,
            url,
            mut headers,
            body,
        } = request;
        let child = context.child(self.timeout);

        let inbound: Uri = url
            .parse()
            .map_err(|e| HandlerError::BadRequest(format!("{url}: {e}")))?;
        let (uri, host) = self
            .target
            .direct(&inbound)
            .map_err(|e| HandlerError::InternalError(e.to_string()))?;

        let wants_trailers = accepts_trailers(&headers);
        remove_hop_by_hop_headers(&mut headers);
        if wants_trailers {
            headers.insert(header::TE, HeaderValue::from_static("trailers"));
        }
        append_forwarded_for(&mut headers, client_ip);
        let host = HeaderValue::from_str(&host)
            .map_err(|e| HandlerError::InternalError(format!("invalid host '{host}': {e}")))?;
        headers.insert(header::HOST, host);

        let mut outbound = Request::new(body);
        *outbound.method_mut() = method.clone();
        *outbound.uri_mut() = uri;
        *outbound.version_mut() = Version::HTTP_11;
        *outbound.headers_mut() = headers;

        tracing::debug!(backend = %self.name, method = %method, uri = %outbound.uri(), "Forwarding request");
        let _timer = metrics::BackendRequestTimer::new(&self.name, method.as_str());

        let response = tokio::select! {
            _ = child.done() => {
                let cause = if child.is_cancelled() {
                    "request cancelled".to_string()
                } else {
                    format!("no response within {:?}", self.timeout)
                };
                return Err(self.bad_gateway(&method, cause));
            }
            response = self.client.request(outbound) => match response {
                Ok(response) => response,
                Err(e) => return Err(self.bad_gateway(&method, format!("{e:?}"))),
            },
        };

        let (parts, upstream) = response.into_parts();
        let mut headers = parts.headers;
        let trailers = announced_trailers(&headers);
        remove_hop_by_hop_headers(&mut headers);
        for name in trailers {
            headers.append(header::TRAILER, name);
        }

        metrics::increment_backend_request_total(&self.name, method.as_str(), parts.status.as_u16());
        tracing::debug!(backend = %self.name, status = parts.status.as_u16(), "Backend answered");

        Ok(GatewayResponse {
            protocol,
            context,
            status: parts.status,
            headers,
            body: self.body_copy.spawn(upstream, child),
        })
    }
}

/// Builds an [`HttpReverseProxy`] per backend; the copy buffer pool is
/// shared across all of them.
#[derive(Clone)]
pub struct HttpUpstreamFactory {
    pool: Option<Arc<dyn BufferPool>>,
}

impl HttpUpstreamFactory {
    pub fn new(pool: Option<Arc<dyn BufferPool>>) -> Self {
        Self { pool }
    }
}

impl Default for HttpUpstreamFactory {
    fn default() -> Self {
        Self::new(Some(Arc::new(SharedBufferPool::new())))
    }
}

impl UpstreamFactory for HttpUpstreamFactory {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Handler>, UpstreamError> {
        Ok(Arc::new(HttpReverseProxy::new(config, self.pool.clone())?))
    }
}
