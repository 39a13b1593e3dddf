mod admin;
pub mod bootstrap;
mod state;

pub use state::{AppState, HttpClient};

use crate::proxy;
use crate::proxy::context::{full_body, BoxBody};
use anyhow::Result;
use http::StatusCode;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info};

/// Run the proxy server on an already-bound listener, with graceful
/// shutdown support.
///
/// When `shutdown` is notified the server stops accepting new connections
/// and waits up to the configured grace window for in-flight connections
/// to finish before returning anyway.
pub async fn run_proxy_server(
    listener: TcpListener,
    state: AppState,
    shutdown: Arc<Notify>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let drain_timeout = Duration::from_secs(state.config.shutdown_grace_secs);
    let header_read_timeout = Duration::from_secs(state.config.timeouts.read_secs);
    let request_timeout = Duration::from_secs(state.config.timeouts.write_secs);
    let keep_alive_interval = Duration::from_secs(state.config.timeouts.idle_secs);
    info!("server: proxy listening, addr={}", addr);

    let active_conns = Arc::new(AtomicI64::new(0));

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.notified() => {
                info!("server: proxy: stop accepting new connections, draining...");
                break;
            }
        };

        let (stream, peer_addr) = match accepted {
            Ok(v) => {
                metrics::counter!(
                    "lb_connections_total",
                    "status" => "accepted",
                )
                .increment(1);
                v
            }
            Err(e) => {
                error!("server: proxy: accept failed, error={}", e);
                metrics::counter!(
                    "lb_connections_total",
                    "status" => "error",
                )
                .increment(1);
                continue;
            }
        };

        metrics::gauge!("lb_connections_active").increment(1.0);
        active_conns.fetch_add(1, Ordering::Relaxed);

        let state = state.clone();
        let active_conns = active_conns.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let state_inner = state.clone();
            let svc = service_fn(move |req: Request<Incoming>| {
                let state = state_inner.clone();
                async move {
                    // Bound time-to-response-head; relayed bodies stream
                    // beyond this deadline.
                    match tokio::time::timeout(
                        request_timeout,
                        proxy::handle_request(req, state, peer_addr),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            error!("server: proxy: request deadline exceeded, peer={}", peer_addr);
                            Ok(request_timeout_response())
                        }
                    }
                }
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .http1()
                .timer(TokioTimer::new())
                .header_read_timeout(header_read_timeout)
                .keep_alive(true)
                .http2()
                .timer(TokioTimer::new())
                .keep_alive_interval(Some(keep_alive_interval))
                .serve_connection_with_upgrades(io, svc)
                .await
            {
                if !e.to_string().contains("connection closed") {
                    error!(
                        "server: proxy: connection error, peer={}, error={}",
                        peer_addr, e
                    );
                }
            }

            metrics::gauge!("lb_connections_active").decrement(1.0);
            active_conns.fetch_sub(1, Ordering::Relaxed);
        });
    }

    // Drain phase: wait for in-flight connections to finish, or give up
    // after the grace window and exit anyway.
    let active = active_conns.load(Ordering::Relaxed);
    if active > 0 {
        info!(
            "server: proxy: waiting for {} active connections to drain",
            active
        );
        let drain = async {
            while active_conns.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        match tokio::time::timeout(drain_timeout, drain).await {
            Ok(_) => info!("server: proxy: all connections drained"),
            Err(_) => {
                let remaining = active_conns.load(Ordering::Relaxed);
                info!(
                    "server: proxy: drain timeout ({}s), {} connections still active",
                    drain_timeout.as_secs(),
                    remaining
                );
            }
        }
    }

    Ok(())
}

fn request_timeout_response() -> hyper::Response<BoxBody> {
    hyper::Response::builder()
        .status(StatusCode::GATEWAY_TIMEOUT)
        .header("content-type", "text/plain; charset=utf-8")
        .body(full_body("request timed out"))
        .unwrap()
}

/// Run the admin server: liveness, readiness, metrics and a pool snapshot.
pub async fn run_admin_server(listen: &str, state: AppState) -> Result<()> {
    let addr: SocketAddr = listen.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("server: admin listening, addr={}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let state = state.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |req: Request<Incoming>| {
                let state = state.clone();
                async move { admin::handle_admin(req, state) }
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .http1()
                .timer(TokioTimer::new())
                .keep_alive(true)
                .serve_connection_with_upgrades(io, svc)
                .await
            {
                if !e.to_string().contains("connection closed") {
                    error!("server: admin: connection error, error={}", e);
                }
            }
        });
    }
}
