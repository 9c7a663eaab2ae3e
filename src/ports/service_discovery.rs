use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Concrete destination produced by a discovery lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A literal address; the connection port comes from the request URI.
    Ip(IpAddr),
    /// A scheme/host/path triple whose host is resolved by the system resolver.
    Url(Url),
}

impl Destination {
    /// Scheme, authority and path prefix implied by this destination.
    pub fn forwarding_parts(&self) -> (String, String, String) {
        match self {
            Destination::Ip(IpAddr::V4(ip)) => ("http".to_string(), ip.to_string(), String::new()),
            Destination::Ip(IpAddr::V6(ip)) => {
                ("http".to_string(), format!("[{ip}]"), String::new())
            }
            Destination::Url(url) => {
                let mut authority = url.host_str().unwrap_or_default().to_string();
                if let Some(port) = url.port() {
                    authority = format!("{authority}:{port}");
                }
                let path = match url.path() {
                    "/" => String::new(),
                    path => path.to_string(),
                };
                (url.scheme().to_string(), authority, path)
            }
        }
    }
}

/// Error type for service discovery operations
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DiscoveryError {
    #[error("Invalid discovery target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("No address available for '{0}'")]
    NoAddress(String),
}

/// Resolves a backend's logical target to a destination at dispatch time.
///
/// The target is fixed when the instance is built from a backend definition.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync + 'static {
    /// The configured logical target (URL, IP or DNS name).
    fn target(&self) -> &str;

    async fn resolve(&self) -> Result<Destination, DiscoveryError>;
}
