pub mod dns;
pub mod static_target;

use std::sync::Arc;

pub use dns::{DnsDiscovery, HostLookup, SystemLookup};
pub use static_target::StaticDiscovery;

use crate::{
    config::{DiscoveryConfig, DiscoveryKind},
    ports::service_discovery::{DiscoveryError, ServiceDiscovery},
};

/// Build the discovery described by a backend's `discovery` block.
pub fn build_discovery(config: &DiscoveryConfig) -> Result<Arc<dyn ServiceDiscovery>, DiscoveryError> {
    let discovery: Arc<dyn ServiceDiscovery> = match config.kind {
        DiscoveryKind::Static => Arc::new(StaticDiscovery::new(config.url.clone())?),
        DiscoveryKind::Dns => Arc::new(DnsDiscovery::new(config.url.clone(), &config.strategy)?),
    };
    tracing::debug!(kind = ?config.kind, url = %config.url, "Service discovery built");
    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadBalanceStrategy;

    #[test]
    fn builds_each_kind() {
        let static_config = DiscoveryConfig {
            kind: DiscoveryKind::Static,
            url: "http://example.com".to_string(),
            strategy: LoadBalanceStrategy::Random,
        };
        assert_eq!(build_discovery(&static_config).unwrap().target(), "http://example.com");

        let dns_config = DiscoveryConfig {
            kind: DiscoveryKind::Dns,
            url: "api.internal:8080".to_string(),
            strategy: LoadBalanceStrategy::RoundRobin,
        };
        assert_eq!(build_discovery(&dns_config).unwrap().target(), "api.internal:8080");

        let bad = DiscoveryConfig {
            url: "not a name".to_string(),
            ..dns_config
        };
        assert!(build_discovery(&bad).is_err());
    }
}
