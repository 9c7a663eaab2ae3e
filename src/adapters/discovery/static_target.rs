use std::net::IpAddr;

use async_trait::async_trait;
use url::Url;

use crate::ports::service_discovery::{Destination, DiscoveryError, ServiceDiscovery};

/// Discovery returning one fixed destination.
///
/// The target is either a literal IP or an absolute `http`/`https` URL with a
/// host, and is validated when the instance is built.
#[derive(Debug, Clone)]
pub struct StaticDiscovery {
    target: String,
    destination: Destination,
}

impl StaticDiscovery {
    pub fn new(target: impl Into<String>) -> Result<Self, DiscoveryError> {
        let target = target.into();
        let destination = Self::parse(&target)?;
        Ok(Self {
            target,
            destination,
        })
    }

    fn parse(target: &str) -> Result<Destination, DiscoveryError> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Ok(Destination::Ip(ip));
        }

        let invalid = |reason: String| DiscoveryError::InvalidTarget {
            target: target.to_string(),
            reason,
        };
        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("URL has no host".to_string()));
        }
        Ok(Destination::Url(url))
    }
}

#[async_trait]
impl ServiceDiscovery for StaticDiscovery {
    fn target(&self) -> &str {
        &self.target
    }

    async fn resolve(&self) -> Result<Destination, DiscoveryError> {
        Ok(self.destination.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_ip_resolves_to_itself() {
        let discovery = StaticDiscovery::new("10.0.0.7").unwrap();
        assert_eq!(
            discovery.resolve().await.unwrap(),
            Destination::Ip("10.0.0.7".parse().unwrap())
        );
    }

    #[tokio::test]
    async fn url_keeps_scheme_host_and_path() {
        let discovery = StaticDiscovery::new("https://example.com/base").unwrap();
        let Destination::Url(url) = discovery.resolve().await.unwrap() else {
            panic!("expected a URL destination");
        };
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/base");
    }

    #[test]
    fn rejects_relative_and_foreign_targets() {
        assert!(matches!(
            StaticDiscovery::new("example.com"),
            Err(DiscoveryError::InvalidTarget { .. })
        ));
        assert!(StaticDiscovery::new("ftp://example.com").is_err());
        assert!(StaticDiscovery::new("").is_err());
    }
}
