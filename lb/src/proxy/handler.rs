use crate::api;
use crate::balancer::ConnectionGuard;
use crate::proxy::context::{empty_body, full_body, BoxBody, RequestContext};
use crate::server::AppState;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONNECTION, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, Incoming};
use hyper::{Request, Response};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;

static X_CLIENT_ID: HeaderName = HeaderName::from_static("x-client-id");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Entry point for every inbound request on the proxy listener.
///
/// `/clients` is the control plane; everything else — the favicon
/// shortcut included — sits behind rate-limit admission.
pub async fn handle_request(
    req: Request<Incoming>,
    state: AppState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let path = req.uri().path();

    if path == "/clients" || path.starts_with("/clients/") {
        return api::handle_clients(req, &state).await;
    }

    proxy_request(req, state, peer_addr).await
}

async fn proxy_request(
    req: Request<Incoming>,
    state: AppState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let client_ip = derive_client_ip(req.headers(), peer_addr);

    // Rate-limit key: explicit client id header, falling back to the IP.
    let client_id = req
        .headers()
        .get(&X_CLIENT_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .unwrap_or_else(|| client_ip.clone());

    if !state.limiter.allow_request(&client_id).await {
        warn!("ratelimit: rate limit exceeded, client_id={}", client_id);
        metrics::counter!("lb_rate_limit_rejected_total").increment(1);
        return Ok(rate_limited_response());
    }
    metrics::counter!("lb_rate_limit_allowed_total").increment(1);

    // Admitted favicon requests are answered directly: no selection, no
    // connection accounting.
    if req.uri().path() == "/favicon.ico" {
        return Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(empty_body())
            .unwrap());
    }

    let mut ctx = RequestContext::new(
        req.method().as_str().to_string(),
        req.uri().path().to_string(),
        client_ip,
    );
    metrics::gauge!("lb_http_requests_in_flight").increment(1.0);

    let backend = match state.pool.next_backend() {
        Some(backend) => backend,
        None => {
            warn!("proxy: no available backends, client_ip={}", ctx.client_ip);
            return Ok(ctx.error_response(StatusCode::SERVICE_UNAVAILABLE, "no available backends"));
        }
    };
    ctx.backend = backend.url().to_string();

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| "/".to_owned());
    let upstream_uri = format!("{}{}", backend.url(), path_and_query);

    let (parts, body) = req.into_parts();
    let mut headers = parts.headers;
    rewrite_headers(&mut headers, backend.authority(), &ctx.client_ip);
    remove_hop_headers(&mut headers);

    let mut builder = Request::builder().method(parts.method).uri(&upstream_uri);
    for (name, value) in &headers {
        builder = builder.header(name, value);
    }
    let upstream_req = match builder.body(body) {
        Ok(r) => r,
        Err(e) => {
            warn!("proxy: failed to build upstream request, error={}", e);
            return Ok(ctx.error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            ));
        }
    };

    // The guard holds the increment for the whole forward, including the
    // body relay, so the counter returns to its prior value on every exit.
    let guard = backend.track();

    match state.client.request(upstream_req).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            ctx.finalize_metrics(status);

            let total_ms = ctx.start.elapsed().as_millis();
            tracing::info!(
                client_ip = %ctx.client_ip,
                method = %ctx.method,
                path = %ctx.path,
                status = status,
                backend = %ctx.backend,
                latency_ms = %total_ms,
                "access"
            );

            let (parts, body) = resp.into_parts();
            let body = TrackedBody {
                inner: body,
                _guard: guard,
            }
            .boxed();
            Ok(Response::from_parts(parts, body))
        }
        Err(err) => {
            warn!(
                "proxy: upstream request failed, backend={}, error={}",
                backend.url(),
                err
            );
            state.pool.mark_backend_alive(backend.url(), false);

            // Connect-layer failures (refused, DNS, timeout) mean the
            // backend itself is unreachable; anything else is a broken
            // exchange with a reachable server.
            let resp = if is_connect_error(&err) {
                metrics::counter!("lb_proxy_errors_total", "kind" => "connect").increment(1);
                ctx.error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable due to backend error",
                )
            } else {
                metrics::counter!("lb_proxy_errors_total", "kind" => "exchange").increment(1);
                ctx.error_response(StatusCode::BAD_GATEWAY, "Backend error")
            };
            Ok(resp)
        }
    }
}

fn rate_limited_response() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header("content-type", "application/json")
        .body(full_body(r#"{"code":429,"message":"Rate limit exceeded"}"#))
        .unwrap()
}

/// Client IP: `X-Real-IP`, else the first `X-Forwarded-For` entry, else
/// the TCP peer address.
fn derive_client_ip(headers: &HeaderMap, peer_addr: SocketAddr) -> String {
    if let Some(ip) = headers.get(&X_REAL_IP).and_then(|v| v.to_str().ok()) {
        let ip = ip.trim();
        if !ip.is_empty() {
            return ip.to_string();
        }
    }

    if let Some(forwarded) = headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer_addr.ip().to_string()
}

/// Outbound rewrites: Host to the target authority, `X-Real-IP` to the
/// derived client IP, and the client IP appended to `X-Forwarded-For`.
fn rewrite_headers(headers: &mut HeaderMap, authority: &str, client_ip: &str) {
    if let Ok(v) = HeaderValue::from_str(authority) {
        headers.insert(HOST, v);
    }

    if let Ok(v) = HeaderValue::from_str(client_ip) {
        headers.insert(X_REAL_IP.clone(), v);
    }

    let forwarded = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {client_ip}"),
        _ => client_ip.to_string(),
    };
    if let Ok(v) = HeaderValue::from_str(&forwarded) {
        headers.insert(X_FORWARDED_FOR.clone(), v);
    }
}

fn remove_hop_headers(headers: &mut HeaderMap) {
    let hop_headers: &[HeaderName] = &[
        CONNECTION,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-authenticate"),
        HeaderName::from_static("proxy-authorization"),
        HeaderName::from_static("te"),
        HeaderName::from_static("trailers"),
        TRANSFER_ENCODING,
        HeaderName::from_static("upgrade"),
    ];

    for h in hop_headers {
        headers.remove(h);
    }
}

fn is_connect_error(err: &hyper_util::client::legacy::Error) -> bool {
    if err.is_connect() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::NotConnected
            );
        }
        source = cause.source();
    }
    false
}

/// Response body wrapper that keeps the backend's connection-count guard
/// alive until the body is fully relayed (or dropped).
struct TrackedBody {
    inner: Incoming,
    _guard: ConnectionGuard,
}

impl Body for TrackedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> hyper::body::SizeHint {
        self.inner.size_hint()
    }
}
