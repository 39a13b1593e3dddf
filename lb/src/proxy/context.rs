use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::time::Instant;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Per-request state for the proxied path: request metadata plus the
/// single exit point for error responses and metrics finalization.
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub client_ip: String,
    pub backend: String,
    pub start: Instant,
}

impl RequestContext {
    pub fn new(method: String, path: String, client_ip: String) -> Self {
        Self {
            method,
            path,
            client_ip,
            backend: String::new(),
            start: Instant::now(),
        }
    }

    /// Plain-text error response; records the same metrics as a
    /// successful exit so counters stay balanced.
    pub fn error_response(&self, status: StatusCode, msg: &str) -> hyper::Response<BoxBody> {
        self.finalize_metrics(status.as_u16());

        hyper::Response::builder()
            .status(status)
            .header("content-type", "text/plain; charset=utf-8")
            .body(full_body(msg.to_string()))
            .unwrap()
    }

    pub fn finalize_metrics(&self, status: u16) {
        let mut buf = itoa::Buffer::new();
        let status_str = buf.format(status);

        metrics::counter!(
            "lb_http_requests_total",
            "method" => self.method.clone(),
            "status_code" => status_str.to_owned(),
            "backend" => self.backend.clone(),
        )
        .increment(1);

        metrics::histogram!(
            "lb_http_request_duration_seconds",
            "backend" => self.backend.clone(),
        )
        .record(self.start.elapsed().as_secs_f64());

        metrics::gauge!("lb_http_requests_in_flight").decrement(1.0);
    }
}
