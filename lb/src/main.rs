#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Result;
use clap::Parser;
use portier_lb::server;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "portier-lb", about = "HTTP reverse-proxy load balancer")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address (overrides the configured port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Admin API listen address (health/metrics)
    #[arg(long, default_value = "0.0.0.0:9091")]
    admin_listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        listen: cli.listen,
        admin_listen: cli.admin_listen,
    })
    .await
}
