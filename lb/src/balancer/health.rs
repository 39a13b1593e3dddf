use crate::balancer::backend::Backend;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Periodic out-of-band liveness prober.
///
/// Each round fires one probe task per backend and does not wait for them
/// before the next tick — a slow probe is bounded by the client timeout,
/// not by the ticker. A backend is alive iff `GET /healthz` returns 200
/// with no transport error.
pub struct HealthChecker {
    backends: Vec<Arc<Backend>>,
    interval: Duration,
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new(backends: Vec<Arc<Backend>>, interval: Duration, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .expect("failed to build health check client");
        Self {
            backends,
            interval,
            client,
        }
    }

    /// Loop until `shutdown` is notified. Already-dispatched probes are
    /// not cancelled; they finish within the client timeout.
    pub async fn run(self, shutdown: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.notified() => {
                    info!("health: checker stopped");
                    return;
                }
            }

            for backend in &self.backends {
                let client = self.client.clone();
                let backend = backend.clone();
                tokio::spawn(async move {
                    probe(&client, &backend).await;
                });
            }
        }
    }
}

async fn probe(client: &reqwest::Client, backend: &Arc<Backend>) {
    let url = format!("{}/healthz", backend.url());

    let healthy = match client.get(&url).send().await {
        Ok(resp) => resp.status() == reqwest::StatusCode::OK,
        Err(_) => false,
    };

    let was_alive = backend.is_alive();
    backend.set_alive(healthy);

    metrics::gauge!(
        "lb_backend_up",
        "backend" => backend.url().to_string(),
    )
    .set(if healthy { 1.0 } else { 0.0 });
    metrics::counter!(
        "lb_health_check_total",
        "backend" => backend.url().to_string(),
        "result" => if healthy { "up" } else { "down" },
    )
    .increment(1);

    if healthy != was_alive {
        if healthy {
            info!("health: backend recovered, backend={}", backend.url());
        } else {
            warn!("health: backend marked dead, backend={}", backend.url());
        }
    } else {
        debug!(
            "health: probe finished, backend={}, healthy={}",
            backend.url(),
            healthy
        );
    }
}
