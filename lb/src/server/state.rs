use crate::balancer::{ServerPool, Strategy};
use crate::config::Config;
use crate::metrics::Metrics;
use crate::ratelimit::RateLimiter;
use crate::storage::{ClientRepository, SqliteClientRepo};
use anyhow::Result;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;

/// Outbound client used for every forward; inbound bodies stream through
/// unbuffered.
pub type HttpClient = Client<HttpConnector, Incoming>;

/// Shared application state, cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Arc<ServerPool>,
    pub limiter: Arc<RateLimiter>,
    pub repo: Arc<dyn ClientRepository>,
    pub client: HttpClient,
    pub metrics: Metrics,
}

impl AppState {
    /// Build the full state from configuration. Repository open and
    /// strategy construction failures are fatal here — the process must
    /// not start half-wired.
    pub async fn new(config: Config) -> Result<Self> {
        let repo: Arc<dyn ClientRepository> =
            Arc::new(SqliteClientRepo::open(&config.database_path).await?);

        let pool = Arc::new(ServerPool::new(&config.backends)?);
        pool.set_strategy(Strategy::from_name(&config.strategy)?);

        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.capacity,
            config.rate_limit.refill_rate,
            repo.clone(),
        ));

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let metrics = Metrics::install();

        Ok(Self {
            config: Arc::new(config),
            pool,
            limiter,
            repo,
            client,
            metrics,
        })
    }
}
