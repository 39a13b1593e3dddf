use crate::storage::ClientRepository;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// Bucket parameters for one client, as held by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub capacity: u64,
    /// Tokens per second added by the refill tick.
    pub refill_rate: u64,
}

/// Per-client token bucket. Tokens only increase through `refill`;
/// `consume` never tops up.
#[derive(Debug)]
struct TokenBucket {
    capacity: u64,
    refill_rate: u64,
    tokens: u64,
    last_refilled: Instant,
}

impl TokenBucket {
    fn new(limit: Limit) -> Self {
        Self {
            capacity: limit.capacity,
            refill_rate: limit.refill_rate,
            tokens: limit.capacity,
            last_refilled: Instant::now(),
        }
    }

    fn consume(&mut self) -> bool {
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Whole-second accounting: sub-second elapses are a no-op and the
    /// clamp to `capacity` also absorbs a capacity lowered by a live
    /// reconfiguration.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refilled).as_secs();
        if elapsed == 0 {
            return;
        }
        self.tokens = self
            .tokens
            .saturating_add(elapsed.saturating_mul(self.refill_rate))
            .min(self.capacity);
        self.last_refilled = now;
    }
}

/// Client-keyed token buckets with a durable-limit fallback.
///
/// One mutex serializes the map and every bucket field; the repository
/// read on first sight of a client happens under it, so a client's
/// admission decisions are totally ordered. The 1 Hz `run_refill` task is
/// the only place tokens increase.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    repo: Arc<dyn ClientRepository>,
    default_limit: Limit,
}

impl RateLimiter {
    pub fn new(capacity: u64, refill_rate: u64, repo: Arc<dyn ClientRepository>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            repo,
            default_limit: Limit {
                capacity,
                refill_rate,
            },
        }
    }

    /// Admit or reject one request for `client_id`, lazily creating the
    /// bucket from the repository (or the process default on miss/error).
    pub async fn allow_request(&self, client_id: &str) -> bool {
        let mut buckets = self.buckets.lock().await;

        if let Some(bucket) = buckets.get_mut(client_id) {
            return bucket.consume();
        }

        let limit = match self.repo.get(client_id).await {
            Ok(stored) => Limit {
                capacity: stored.capacity.max(0) as u64,
                refill_rate: stored.refill_rate.max(0) as u64,
            },
            Err(err) => {
                warn!(
                    "ratelimit: no repository limit, using defaults, client_id={}, reason={}",
                    client_id, err
                );
                self.default_limit
            }
        };

        let bucket = buckets
            .entry(client_id.to_string())
            .or_insert_with(|| TokenBucket::new(limit));
        bucket.consume()
    }

    /// Rewrite an existing bucket's parameters in place (current tokens
    /// kept; the next refill clamps them), or create a fresh full bucket.
    pub async fn set_client_limit(&self, client_id: &str, limit: Limit) {
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(client_id) {
            Some(bucket) => {
                bucket.capacity = limit.capacity;
                bucket.refill_rate = limit.refill_rate;
            }
            None => {
                buckets.insert(client_id.to_string(), TokenBucket::new(limit));
            }
        }
        debug!(
            "ratelimit: limit applied, client_id={}, capacity={}, refill_rate={}",
            client_id, limit.capacity, limit.refill_rate
        );
    }

    /// Drop the bucket. The next `allow_request` re-reads the repository.
    pub async fn remove_client(&self, client_id: &str) {
        let mut buckets = self.buckets.lock().await;
        buckets.remove(client_id);
    }

    /// 1 Hz refill loop; runs until `shutdown` is notified. Work per tick
    /// is proportional to the number of active clients.
    pub async fn run_refill(self: Arc<Self>, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.notified() => {
                    info!("ratelimit: refill task stopped");
                    return;
                }
            }

            let now = Instant::now();
            let mut buckets = self.buckets.lock().await;
            for bucket in buckets.values_mut() {
                bucket.refill(now);
            }
        }
    }
}
