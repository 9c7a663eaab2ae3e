use std::{
    net::IpAddr,
    sync::atomic::{AtomicUsize, Ordering},
};

use rand::Rng;

use crate::config::LoadBalanceStrategy;

/// Trait defining the interface for picking one of several resolved addresses
pub trait LoadBalancingStrategy: Send + Sync + 'static {
    /// Select a target from a list of targets
    fn select_target(&self, targets: &[IpAddr]) -> Option<IpAddr>;
    /// Create a new instance of this strategy as a boxed trait object
    fn boxed(self) -> Box<dyn LoadBalancingStrategy>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// Round-robin load balancing strategy
#[derive(Default)]
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn select_target(&self, targets: &[IpAddr]) -> Option<IpAddr> {
        if targets.is_empty() {
            return None;
        }
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(targets[count % targets.len()])
    }
}

/// Uniform random choice on every call
#[derive(Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    /// Create a new random selection strategy
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancingStrategy for RandomStrategy {
    fn select_target(&self, targets: &[IpAddr]) -> Option<IpAddr> {
        if targets.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..targets.len());
        Some(targets[index])
    }
}

/// Factory for creating load balancing strategies from configuration
pub struct LoadBalancerFactory;

impl LoadBalancerFactory {
    /// Create a new load balancing strategy based on configuration
    pub fn create_strategy(strategy: &LoadBalanceStrategy) -> Box<dyn LoadBalancingStrategy> {
        match strategy {
            LoadBalanceStrategy::RoundRobin => RoundRobinStrategy::new().boxed(),
            LoadBalanceStrategy::Random => RandomStrategy::new().boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn targets() -> Vec<IpAddr> {
        vec![
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            "10.0.0.3".parse().unwrap(),
        ]
    }

    #[test]
    fn test_round_robin_strategy() {
        let strategy = RoundRobinStrategy::new();
        let targets = targets();

        assert_eq!(strategy.select_target(&targets), Some(targets[0]));
        assert_eq!(strategy.select_target(&targets), Some(targets[1]));
        assert_eq!(strategy.select_target(&targets), Some(targets[2]));
        assert_eq!(strategy.select_target(&targets), Some(targets[0])); // Wraps around
    }

    #[test]
    fn test_empty_targets() {
        assert_eq!(RoundRobinStrategy::new().select_target(&[]), None);
        assert_eq!(RandomStrategy::new().select_target(&[]), None);
    }

    #[test]
    fn test_random_strategy_covers_all_targets() {
        let strategy = RandomStrategy::new();
        let targets = targets();

        let seen: HashSet<_> = (0..500)
            .filter_map(|_| strategy.select_target(&targets))
            .collect();
        assert_eq!(seen.len(), targets.len());
    }

    #[test]
    fn test_load_balancer_factory() {
        let targets = targets();
        let rr_strategy = LoadBalancerFactory::create_strategy(&LoadBalanceStrategy::RoundRobin);
        assert_eq!(rr_strategy.select_target(&targets), Some(targets[0]));

        let random_strategy = LoadBalancerFactory::create_strategy(&LoadBalanceStrategy::Random);
        assert!(random_strategy.select_target(&targets).is_some());
    }
}
