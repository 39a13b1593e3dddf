use crate::balancer::backend::Backend;
use crate::balancer::strategy::Strategy;
use crate::error::BalancerError;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Owns the backends and the current selection strategy.
///
/// Insertion order is significant: it defines the round-robin cycle and
/// the least-connections tie-break. The strategy lives behind an
/// `ArcSwapOption` so `set_strategy` and `next_backend` interleave without
/// a caller ever observing a torn value.
pub struct ServerPool {
    backends: RwLock<Vec<Arc<Backend>>>,
    cursor: AtomicU64,
    strategy: ArcSwapOption<Strategy>,
}

impl ServerPool {
    pub fn new(urls: &[String]) -> Result<Self, BalancerError> {
        let mut backends = Vec::with_capacity(urls.len());
        for url in urls {
            backends.push(Arc::new(Backend::new(url)?));
        }
        Ok(Self {
            backends: RwLock::new(backends),
            cursor: AtomicU64::new(0),
            strategy: ArcSwapOption::empty(),
        })
    }

    /// Next backend per the current strategy, `None` when no strategy is
    /// set or no backend is alive.
    pub fn next_backend(&self) -> Option<Arc<Backend>> {
        let strategy = self.strategy.load_full()?;
        strategy.next(self)
    }

    /// Snapshot of the currently alive backends, in pool order.
    pub fn alive_backends(&self) -> Vec<Arc<Backend>> {
        self.backends
            .read()
            .expect("pool lock poisoned")
            .iter()
            .filter(|b| b.is_alive())
            .cloned()
            .collect()
    }

    pub fn all_backends(&self) -> Vec<Arc<Backend>> {
        self.backends.read().expect("pool lock poisoned").clone()
    }

    pub fn add_backend(&self, url: &str) -> Result<(), BalancerError> {
        let backend = Arc::new(Backend::new(url)?);
        self.backends
            .write()
            .expect("pool lock poisoned")
            .push(backend);
        Ok(())
    }

    pub fn mark_backend_alive(&self, url: &str, alive: bool) {
        let backends = self.backends.read().expect("pool lock poisoned");
        if let Some(backend) = backends.iter().find(|b| b.url() == url) {
            backend.set_alive(alive);
        }
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        self.strategy.store(Some(Arc::new(strategy)));
    }

    pub fn strategy(&self) -> Option<Arc<Strategy>> {
        self.strategy.load_full()
    }

    pub fn reset_connections(&self) {
        for backend in self.backends.read().expect("pool lock poisoned").iter() {
            backend.reset_connections();
        }
    }

    /// Post-incremented round-robin cursor. The value carries no meaning
    /// beyond its modulo over the current alive count.
    pub(crate) fn next_cursor(&self) -> u64 {
        self.cursor.fetch_add(1, Ordering::Relaxed)
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
    fn new_rejects_bad_url() {
        assert!(ServerPool::new(&["not a url ".to_string()]).is_err());
    }

    #[test]
    fn next_backend_requires_a_strategy() {
        let p = pool(&["http://a:80"]);
        assert!(p.next_backend().is_none());
        p.set_strategy(Strategy::from_name("round_robin").unwrap());
        assert!(p.next_backend().is_some());
    }

    #[test]
    fn alive_snapshot_preserves_pool_order() {
        let p = pool(&["http://a:80", "http://b:80", "http://c:80"]);
        p.mark_backend_alive("http://b:80", false);

        let alive = p.alive_backends();
        assert_eq!(alive.len(), 2);
        assert_eq!(alive[0].url(), "http://a:80");
        assert_eq!(alive[1].url(), "http://c:80");
    }

    #[test]
    fn mark_unknown_url_is_a_noop() {
        let p = pool(&["http://a:80"]);
        p.mark_backend_alive("http://nope:80", false);
        assert!(p.all_backends()[0].is_alive());
    }

    #[test]
    fn add_backend_appends_in_order() {
        let p = pool(&["http://a:80"]);
        p.add_backend("http://b:80").unwrap();
        let all = p.all_backends();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].url(), "http://b:80");
    }

    #[test]
    fn reset_connections_clears_every_backend() {
        let p = pool(&["http://a:80", "http://b:80"]);
        for b in p.all_backends() {
            b.inc_connections();
        }
        p.reset_connections();
        assert!(p.all_backends().iter().all(|b| b.connections() == 0));
    }

    #[test]
    fn strategy_swap_is_visible() {
        let p = pool(&["http://a:80"]);
        assert!(p.strategy().is_none());
        p.set_strategy(Strategy::from_name("random").unwrap());
        assert_eq!(p.strategy().unwrap().name(), "random");
        p.set_strategy(Strategy::from_name("least_connections").unwrap());
        assert_eq!(p.strategy().unwrap().name(), "least_connections");
    }
}
