use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`,
/// `gauge!`, `histogram!`) can be used anywhere in the codebase. The
/// `PrometheusHandle` is retained solely for rendering the `/metrics`
/// endpoint. Installation is idempotent — repeated calls return the same
/// recorder.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    pub fn install() -> Self {
        let handle = HANDLE
            .get_or_init(|| {
                let handle = PrometheusBuilder::new()
                    .set_buckets_for_metric(
                        metrics_exporter_prometheus::Matcher::Suffix(
                            "_duration_seconds".to_string(),
                        ),
                        LATENCY_BUCKETS,
                    )
                    .expect("valid matcher")
                    .install_recorder()
                    .expect("failed to install metrics recorder");

                describe_metrics();
                handle
            })
            .clone();

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn describe_metrics() {
    // request path
    describe_counter!(
        "lb_http_requests_total",
        Unit::Count,
        "Total HTTP requests processed by the proxy"
    );
    describe_histogram!(
        "lb_http_request_duration_seconds",
        Unit::Seconds,
        "Request duration from the client perspective"
    );
    describe_gauge!(
        "lb_http_requests_in_flight",
        Unit::Count,
        "Requests currently being proxied"
    );
    describe_counter!(
        "lb_proxy_errors_total",
        Unit::Count,
        "Upstream transport failures, labeled by classification"
    );

    // rate limiting
    describe_counter!(
        "lb_rate_limit_allowed_total",
        Unit::Count,
        "Requests admitted by the rate limiter"
    );
    describe_counter!(
        "lb_rate_limit_rejected_total",
        Unit::Count,
        "Requests rejected by the rate limiter"
    );

    // backend health
    describe_gauge!(
        "lb_backend_up",
        Unit::Count,
        "Backend liveness: 1=alive 0=dead"
    );
    describe_counter!(
        "lb_health_check_total",
        Unit::Count,
        "Health probe attempts, labeled by result"
    );

    // connections
    describe_gauge!(
        "lb_connections_active",
        Unit::Count,
        "Active downstream connections"
    );
    describe_counter!(
        "lb_connections_total",
        Unit::Count,
        "Total downstream connections accepted"
    );
}
