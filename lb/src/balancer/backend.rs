use crate::error::BalancerError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A single upstream server: its URL, liveness flag and active-connection
/// counter. Cheap to share — all mutable state is atomic.
#[derive(Debug)]
pub struct Backend {
    /// Normalized absolute URL, no trailing slash.
    url: String,
    /// Pre-computed `host[:port]` for the outbound Host header.
    authority: String,
    alive: AtomicBool,
    active_connections: AtomicUsize,
}

impl Backend {
    /// Backends start alive; the health checker corrects that on its
    /// first round.
    pub fn new(url: &str) -> Result<Self, BalancerError> {
        let uri: http::Uri = url
            .parse()
            .map_err(|_| BalancerError::InvalidBackendUrl(url.to_string()))?;
        let authority = match (uri.scheme(), uri.authority()) {
            (Some(_), Some(authority)) => authority.to_string(),
            _ => return Err(BalancerError::InvalidBackendUrl(url.to_string())),
        };

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            authority,
            alive: AtomicBool::new(true),
            active_connections: AtomicUsize::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Saturating at zero: an unpaired decrement is a no-op.
    pub fn dec_connections(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn reset_connections(&self) {
        self.active_connections.store(0, Ordering::Relaxed);
    }

    /// Increment the connection count and return a guard that decrements
    /// it on drop. The guard outlives the whole forward, including body
    /// relay, so the counter returns to its prior value on every exit path.
    pub fn track(self: &Arc<Self>) -> ConnectionGuard {
        self.inc_connections();
        ConnectionGuard {
            backend: self.clone(),
        }
    }
}

/// RAII pair for `inc_connections` — decrements exactly once on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    backend: Arc<Backend>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
    }
}
