use std::{fmt, net::IpAddr, sync::Arc};

use http::{Uri, uri::PathAndQuery};
use thiserror::Error;

use crate::{
    config::{BackendConfig, DiscoveryKind},
    ports::{handler::Handler, service_discovery::Destination},
    utils::headers::single_joining_slash,
};

/// Errors related to backend operations
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BackendError {
    /// Error when the discovery URL cannot yield forwarding attributes
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Error when the outbound URI cannot be assembled
    #[error("Invalid outbound URI: {0}")]
    InvalidUri(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Where and how a backend's requests are directed.
///
/// Unset attributes in the backend definition are derived from its discovery
/// descriptor: a static URL contributes its scheme, host and path; a static IP
/// or a DNS name contributes itself as host over plain `http`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingTarget {
    pub scheme: String,
    pub authority: String,
    pub path_prefix: String,
    pub forward_host: bool,
}

impl ForwardingTarget {
    pub fn derive(config: &BackendConfig) -> BackendResult<Self> {
        let target = config.discovery.url.as_str();
        let (scheme, authority, path) = match config.discovery.kind {
            DiscoveryKind::Static => match target.parse::<IpAddr>() {
                Ok(ip) => Destination::Ip(ip).forwarding_parts(),
                Err(_) => {
                    let url = url::Url::parse(target)
                        .map_err(|e| BackendError::InvalidUrl(format!("{target}: {e}")))?;
                    Destination::Url(url).forwarding_parts()
                }
            },
            DiscoveryKind::Dns => ("http".to_string(), target.to_string(), String::new()),
        };

        Ok(Self {
            scheme: config.scheme.clone().unwrap_or(scheme),
            authority: config.host.clone().unwrap_or(authority),
            path_prefix: config.path.clone().unwrap_or(path),
            forward_host: config.forward_host,
        })
    }

    /// Direct an inbound request URI at this backend. Returns the outbound URI
    /// and the value to send as `Host`.
    pub fn direct(&self, inbound: &Uri) -> BackendResult<(Uri, String)> {
        let authority = match (self.forward_host, inbound.authority()) {
            (true, Some(inbound_authority)) => inbound_authority.as_str().to_string(),
            _ => self.authority.clone(),
        };

        let mut path_and_query = single_joining_slash(&self.path_prefix, inbound.path());
        if let Some(query) = inbound.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        let path_and_query = path_and_query
            .parse::<PathAndQuery>()
            .map_err(|e| BackendError::InvalidUri(e.to_string()))?;
        let uri = Uri::builder()
            .scheme(self.scheme.as_str())
            .authority(authority.as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| BackendError::InvalidUri(e.to_string()))?;

        Ok((uri, authority))
    }
}

/// A named upstream with its shared reverse proxy.
pub struct Backend {
    config: BackendConfig,
    proxy: Arc<dyn Handler>,
}

impl Backend {
    pub fn new(config: BackendConfig, proxy: Arc<dyn Handler>) -> Self {
        Self { config, proxy }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn proxy(&self) -> Arc<dyn Handler> {
        self.proxy.clone()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.config.name)
            .field("discovery", &self.config.discovery)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, LoadBalanceStrategy};

    fn dns_backend(url: &str) -> BackendConfig {
        let mut config = BackendConfig::static_http("dns", url);
        config.discovery = DiscoveryConfig {
            kind: DiscoveryKind::Dns,
            url: url.to_string(),
            strategy: LoadBalanceStrategy::Random,
        };
        config
    }

    #[test]
    fn static_url_contributes_scheme_host_and_path() {
        let config = BackendConfig::static_http("api", "https://api.example.com:8443/v1");
        let target = ForwardingTarget::derive(&config).unwrap();
        assert_eq!(target.scheme, "https");
        assert_eq!(target.authority, "api.example.com:8443");
        assert_eq!(target.path_prefix, "/v1");
    }

    #[test]
    fn static_ip_and_dns_default_to_plain_http() {
        let ip = ForwardingTarget::derive(&BackendConfig::static_http("ip", "10.1.2.3")).unwrap();
        assert_eq!((ip.scheme.as_str(), ip.authority.as_str()), ("http", "10.1.2.3"));

        let v6 = ForwardingTarget::derive(&BackendConfig::static_http("v6", "::1")).unwrap();
        assert_eq!(v6.authority, "[::1]");

        let dns = ForwardingTarget::derive(&dns_backend("api.internal:8080")).unwrap();
        assert_eq!(dns.authority, "api.internal:8080");
        assert_eq!(dns.path_prefix, "");
    }

    #[test]
    fn explicit_attributes_override_derived_ones() {
        let mut config = BackendConfig::static_http("api", "10.1.2.3");
        config.host = Some("api.example.com".to_string());
        config.path = Some("/base/".to_string());
        let target = ForwardingTarget::derive(&config).unwrap();

        let (uri, host) = target
            .direct(&"http://gateway.local/users?page=2".parse().unwrap())
            .unwrap();
        assert_eq!(uri.to_string(), "http://api.example.com/base/users?page=2");
        assert_eq!(host, "api.example.com");
    }

    #[test]
    fn forward_host_keeps_inbound_authority() {
        let mut config = BackendConfig::static_http("api", "http://backend:3000");
        config.forward_host = true;
        let target = ForwardingTarget::derive(&config).unwrap();

        let (uri, host) = target
            .direct(&"http://public.example.com/x".parse().unwrap())
            .unwrap();
        assert_eq!(host, "public.example.com");
        assert_eq!(uri.to_string(), "http://public.example.com/x");
    }
}
