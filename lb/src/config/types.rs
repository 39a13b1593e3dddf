use serde::{Deserialize, Serialize};

/// Top-level load balancer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the proxy listener binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upstream servers, in pool order. Pool order determines the
    /// round-robin cycle.
    #[serde(default)]
    pub backends: Vec<String>,

    /// Selection strategy: `round_robin`, `least_connections` or `random`.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Default per-client token bucket, used when a client has no
    /// persisted limit.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Path to the SQLite database holding per-client limits.
    #[serde(rename = "databasePath", default = "default_database_path")]
    pub database_path: String,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Grace window for draining in-flight requests on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_capacity")]
    pub capacity: u64,

    /// Tokens added per second by the background refill.
    #[serde(default = "default_refill_rate")]
    pub refill_rate: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Seconds between probe rounds.
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    /// Per-probe HTTP timeout.
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            timeout_secs: default_health_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Inbound header read timeout.
    #[serde(default = "default_read_timeout")]
    pub read_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: default_read_timeout(),
            write_secs: default_write_timeout(),
            idle_secs: default_idle_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            backends: Vec::new(),
            strategy: default_strategy(),
            rate_limit: RateLimitConfig::default(),
            database_path: default_database_path(),
            health_check: HealthCheckConfig::default(),
            timeouts: TimeoutConfig::default(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_strategy() -> String {
    "round_robin".to_string()
}

fn default_database_path() -> String {
    "clients.db".to_string()
}

fn default_capacity() -> u64 {
    100
}

fn default_refill_rate() -> u64 {
    10
}

fn default_health_interval() -> u64 {
    10
}

fn default_health_timeout() -> u64 {
    2
}

fn default_read_timeout() -> u64 {
    5
}

fn default_write_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    15
}

fn default_shutdown_grace() -> u64 {
    5
}
