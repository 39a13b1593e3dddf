use crate::balancer::backend::Backend;
use crate::balancer::pool::ServerPool;
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use std::sync::Mutex;

/// Uniform pick from the alive snapshot.
pub(super) fn select(pool: &ServerPool, rng: &Mutex<StdRng>) -> Option<Arc<Backend>> {
    let alive = pool.alive_backends();
    if alive.is_empty() {
        return None;
    }
    let idx = rng.lock().expect("rng mutex poisoned").gen_range(0..alive.len());
    Some(alive[idx].clone())
}

#[cfg(test)]
mod tests {
    use crate::balancer::{ServerPool, Strategy};
    use std::collections::HashSet;

    fn pool(urls: &[&str]) -> ServerPool {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        let p = ServerPool::new(&urls).unwrap();
        p.set_strategy(Strategy::from_name("random").unwrap());
        p
    }

    #[test]
    fn only_returns_alive_backends() {
        let p = pool(&["http://a", "http://b", "http://c"]);
        p.mark_backend_alive("http://c", false);

        for _ in 0..50 {
            let picked = p.next_backend().unwrap();
            assert!(picked.is_alive());
            assert_ne!(picked.url(), "http://c");
        }
    }

    #[test]
    fn eventually_covers_the_alive_set() {
        let p = pool(&["http://a", "http://b", "http://c"]);

        let mut seen = HashSet::new();
        for _ in 0..300 {
            seen.insert(p.next_backend().unwrap().url().to_string());
        }
        assert_eq!(seen.len(), 3);
    }
}
