pub mod least_connections;
pub mod random;
pub mod round_robin;

use crate::balancer::backend::Backend;
use crate::balancer::pool::ServerPool;
use crate::error::BalancerError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::sync::Mutex;

/// Enum-based strategy — static dispatch, exhaustive match.
///
/// Every variant implements one operation: pick a backend from the pool's
/// alive snapshot. An empty snapshot always yields `None`; a single alive
/// backend is always selected.
pub enum Strategy {
    RoundRobin,
    LeastConnections,
    /// PRNG seeded once at construction.
    Random(Mutex<StdRng>),
}

impl Strategy {
    /// Strategy factory. Unknown names are a configuration error — the
    /// caller treats them as fatal at startup.
    pub fn from_name(name: &str) -> Result<Self, BalancerError> {
        match name {
            "round_robin" => Ok(Self::RoundRobin),
            "least_connections" => Ok(Self::LeastConnections),
            "random" => Ok(Self::Random(Mutex::new(StdRng::from_entropy()))),
            other => Err(BalancerError::UnknownStrategy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastConnections => "least_connections",
            Self::Random(_) => "random",
        }
    }

    pub fn next(&self, pool: &ServerPool) -> Option<Arc<Backend>> {
        match self {
            Self::RoundRobin => round_robin::select(pool),
            Self::LeastConnections => least_connections::select(pool),
            Self::Random(rng) => random::select(pool, rng),
        }
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(urls: &[&str]) -> ServerPool {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        ServerPool::new(&urls).unwrap()
    }

    #[test]
    fn factory_known_names() {
        assert_eq!(Strategy::from_name("round_robin").unwrap().name(), "round_robin");
        assert_eq!(
            Strategy::from_name("least_connections").unwrap().name(),
            "least_connections"
        );
        assert_eq!(Strategy::from_name("random").unwrap().name(), "random");
    }

    #[test]
    fn factory_rejects_unknown_name() {
        let err = Strategy::from_name("fastest").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown load balancing strategy: fastest"
        );
    }

    #[test]
    fn all_strategies_return_none_on_empty_alive_set() {
        let p = pool(&["http://a:80"]);
        p.mark_backend_alive("http://a:80", false);

        for name in ["round_robin", "least_connections", "random"] {
            let s = Strategy::from_name(name).unwrap();
            assert!(s.next(&p).is_none(), "{name} should yield none");
        }
    }

    #[test]
    fn all_strategies_pick_the_single_alive_backend() {
        let p = pool(&["http://a:80", "http://b:80"]);
        p.mark_backend_alive("http://a:80", false);

        for name in ["round_robin", "least_connections", "random"] {
            let s = Strategy::from_name(name).unwrap();
            for _ in 0..10 {
                assert_eq!(s.next(&p).unwrap().url(), "http://b:80");
            }
        }
    }
}
