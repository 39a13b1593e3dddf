use super::AppState;
use crate::proxy::context::{full_body, BoxBody};
use hyper::body::Incoming;
use hyper::{Request, Response};

pub fn handle_admin(
    req: Request<Incoming>,
    state: AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    match req.uri().path() {
        "/health" | "/healthz" => Ok(Response::builder()
            .status(200)
            .body(full_body(r#"{"status":"ok"}"#))
            .unwrap()),

        "/ready" | "/readyz" => {
            let all = state.pool.all_backends();
            let alive = all.iter().filter(|b| b.is_alive()).count();
            Ok(Response::builder()
                .status(if alive > 0 { 200 } else { 503 })
                .body(full_body(format!(
                    r#"{{"status":"{}","backends":{},"alive":{}}}"#,
                    if alive > 0 { "ready" } else { "no alive backends" },
                    all.len(),
                    alive,
                )))
                .unwrap())
        }

        "/metrics" => {
            let body = state.metrics.render();
            Ok(Response::builder()
                .status(200)
                .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
                .body(full_body(body))
                .unwrap())
        }

        "/backends" => {
            let backends: Vec<serde_json::Value> = state
                .pool
                .all_backends()
                .iter()
                .map(|b| {
                    serde_json::json!({
                        "url": b.url(),
                        "alive": b.is_alive(),
                        "active_connections": b.connections(),
                    })
                })
                .collect();

            let body = serde_json::to_string_pretty(&backends).unwrap_or_default();
            Ok(Response::builder()
                .status(200)
                .header("content-type", "application/json")
                .body(full_body(body))
                .unwrap())
        }

        _ => Ok(Response::builder()
            .status(404)
            .body(full_body(r#"{"error":"not found"}"#))
            .unwrap()),
    }
}
