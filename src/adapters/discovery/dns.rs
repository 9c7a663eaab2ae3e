//! DNS-backed service discovery.
//!
//! Addresses are looked up lazily on the first resolve and then cached for
//! [`DNS_REFRESH_INTERVAL`]. Fresh reads only take the shared lock; a refresh
//! takes the exclusive lock and re-checks freshness so that concurrent
//! callers trigger a single lookup. A failed lookup keeps the previous
//! addresses: stale answers are preferred over none.
use std::{io, net::IpAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::RwLock, time::Instant};

use crate::{
    config::{LoadBalanceStrategy, validation::DNS_NAME_PATTERN},
    core::load_balancer::{LoadBalancerFactory, LoadBalancingStrategy},
    metrics,
    ports::service_discovery::{Destination, DiscoveryError, ServiceDiscovery},
};

pub const DNS_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Name to address resolution used by [`DnsDiscovery`].
#[async_trait]
pub trait HostLookup: Send + Sync + 'static {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// The operating system resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLookup;

#[async_trait]
impl HostLookup for SystemLookup {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addresses = tokio::net::lookup_host((host, 0)).await?;
        Ok(addresses.map(|address| address.ip()).collect())
    }
}

#[derive(Debug, Default)]
struct DnsCache {
    addresses: Vec<IpAddr>,
    last_refresh: Option<Instant>,
}

impl DnsCache {
    fn is_fresh(&self) -> bool {
        self.last_refresh
            .is_some_and(|at| at.elapsed() < DNS_REFRESH_INTERVAL)
    }
}

pub struct DnsDiscovery {
    target: String,
    host: String,
    cache: RwLock<DnsCache>,
    strategy: Box<dyn LoadBalancingStrategy>,
    lookup: Arc<dyn HostLookup>,
}

impl DnsDiscovery {
    pub fn new(target: impl Into<String>, strategy: &LoadBalanceStrategy) -> Result<Self, DiscoveryError> {
        Self::with_lookup(target, strategy, Arc::new(SystemLookup))
    }

    pub fn with_lookup(
        target: impl Into<String>,
        strategy: &LoadBalanceStrategy,
        lookup: Arc<dyn HostLookup>,
    ) -> Result<Self, DiscoveryError> {
        let target = target.into();
        if !DNS_NAME_PATTERN.is_match(&target) {
            return Err(DiscoveryError::InvalidTarget {
                target,
                reason: "not a valid DNS name".to_string(),
            });
        }

        // The port only matters to the connection, not to the lookup.
        let host = match target.rsplit_once(':') {
            Some((host, _port)) => host.to_string(),
            None => target.clone(),
        };

        Ok(Self {
            target,
            host,
            cache: RwLock::new(DnsCache::default()),
            strategy: LoadBalancerFactory::create_strategy(strategy),
            lookup,
        })
    }

    fn select(&self, addresses: &[IpAddr]) -> Result<Destination, DiscoveryError> {
        self.strategy
            .select_target(addresses)
            .map(Destination::Ip)
            .ok_or_else(|| DiscoveryError::NoAddress(self.target.clone()))
    }

    async fn refresh(&self) -> Result<Destination, DiscoveryError> {
        let mut cache = self.cache.write().await;
        if cache.is_fresh() {
            return self.select(&cache.addresses);
        }

        match self.lookup.lookup(&self.host).await {
            Ok(addresses) if !addresses.is_empty() => {
                tracing::debug!(name = %self.target, count = addresses.len(), "DNS cache refreshed");
                cache.addresses = addresses;
                cache.last_refresh = Some(Instant::now());
                metrics::increment_dns_refresh(&self.target, true);
            }
            Ok(_) => {
                tracing::warn!(name = %self.target, "DNS lookup returned no address, keeping cache");
                metrics::increment_dns_refresh(&self.target, false);
            }
            Err(e) => {
                tracing::warn!(name = %self.target, error = %e, "DNS lookup failed, keeping cache");
                metrics::increment_dns_refresh(&self.target, false);
            }
        }

        self.select(&cache.addresses)
    }
}

#[async_trait]
impl ServiceDiscovery for DnsDiscovery {
    fn target(&self) -> &str {
        &self.target
    }

    async fn resolve(&self) -> Result<Destination, DiscoveryError> {
        {
            let cache = self.cache.read().await;
            if cache.is_fresh() {
                return self.select(&cache.addresses);
            }
        }
        self.refresh().await
    }
}

impl std::fmt::Debug for DnsDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsDiscovery")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
