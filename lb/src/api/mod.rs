//! `/clients` control plane: CRUD over persisted client limits.
//!
//! Every mutation writes through the repository first, then syncs the
//! rate limiter's bucket cache, so the durable store stays the source of
//! truth. This surface is not rate limited.

use crate::proxy::context::{full_body, BoxBody};
use crate::ratelimit::Limit;
use crate::server::AppState;
use crate::storage::{ClientLimit, StorageError};
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use serde::Serialize;
use tracing::{info, warn};

pub async fn handle_clients(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    // "/clients" → collection; "/clients/{id}" → item. Deeper paths and a
    // bare trailing slash are unknown routes.
    let id = match path.strip_prefix("/clients") {
        Some("") => None,
        Some(rest) => {
            let rest = rest.trim_start_matches('/');
            if rest.is_empty() || rest.contains('/') {
                return Ok(json_error(StatusCode::NOT_FOUND, "not found"));
            }
            Some(rest.to_string())
        }
        None => return Ok(json_error(StatusCode::NOT_FOUND, "not found")),
    };

    match (method, id) {
        (Method::GET, None) => list_clients(state).await,
        (Method::POST, None) => create_client(req, state).await,
        (Method::GET, Some(id)) => get_client(state, &id).await,
        (Method::PUT, Some(id)) => update_client(req, state, &id).await,
        (Method::DELETE, Some(id)) => delete_client(state, &id).await,
        _ => Ok(json_error(
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed",
        )),
    }
}

async fn list_clients(state: &AppState) -> Result<Response<BoxBody>, hyper::Error> {
    match state.repo.list().await {
        Ok(clients) => Ok(json_response(StatusCode::OK, &clients)),
        Err(err) => {
            warn!("api: failed to list clients, error={}", err);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

async fn create_client(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    let limit = match parse_body(req).await? {
        Ok(limit) => limit,
        Err(resp) => return Ok(resp),
    };
    if let Err(resp) = validate(&limit) {
        return Ok(resp);
    }

    match state.repo.create(&limit).await {
        Ok(()) => {
            sync_limiter(state, &limit).await;
            info!("api: client created, client_id={}", limit.client_id);
            Ok(json_response(StatusCode::CREATED, &limit))
        }
        Err(StorageError::Conflict) => {
            warn!(
                "api: create rejected, client already exists, client_id={}",
                limit.client_id
            );
            Ok(json_error(StatusCode::CONFLICT, "client already exists"))
        }
        Err(err) => {
            warn!(
                "api: failed to create client, client_id={}, error={}",
                limit.client_id, err
            );
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

async fn get_client(state: &AppState, id: &str) -> Result<Response<BoxBody>, hyper::Error> {
    match state.repo.get(id).await {
        Ok(limit) => Ok(json_response(StatusCode::OK, &limit)),
        Err(StorageError::NotFound) => Ok(json_error(StatusCode::NOT_FOUND, "client not found")),
        Err(err) => {
            warn!("api: failed to get client, client_id={}, error={}", id, err);
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

async fn update_client(
    req: Request<Incoming>,
    state: &AppState,
    id: &str,
) -> Result<Response<BoxBody>, hyper::Error> {
    let limit = match parse_body(req).await? {
        Ok(limit) => limit,
        Err(resp) => return Ok(resp),
    };
    if limit.client_id != id {
        return Ok(json_error(StatusCode::BAD_REQUEST, "client id mismatch"));
    }
    if let Err(resp) = validate(&limit) {
        return Ok(resp);
    }

    match state.repo.update(&limit).await {
        Ok(()) => {
            sync_limiter(state, &limit).await;
            info!("api: client updated, client_id={}", id);
            Ok(json_response(StatusCode::OK, &limit))
        }
        Err(StorageError::NotFound) => Ok(json_error(StatusCode::NOT_FOUND, "client not found")),
        Err(err) => {
            warn!(
                "api: failed to update client, client_id={}, error={}",
                id, err
            );
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

async fn delete_client(state: &AppState, id: &str) -> Result<Response<BoxBody>, hyper::Error> {
    match state.repo.delete(id).await {
        Ok(()) => {
            state.limiter.remove_client(id).await;
            info!("api: client deleted, client_id={}", id);
            Ok(json_response(
                StatusCode::OK,
                &serde_json::json!({
                    "status": "success",
                    "message": "client deleted",
                    "client_id": id,
                }),
            ))
        }
        Err(StorageError::NotFound) => Ok(json_error(StatusCode::NOT_FOUND, "client not found")),
        Err(err) => {
            warn!(
                "api: failed to delete client, client_id={}, error={}",
                id, err
            );
            Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

/// Collect and decode the request body. The outer error is a transport
/// failure; the inner one is a 400 already built for the caller.
async fn parse_body(
    req: Request<Incoming>,
) -> Result<Result<ClientLimit, Response<BoxBody>>, hyper::Error> {
    let bytes = req.into_body().collect().await?.to_bytes();
    match serde_json::from_slice::<ClientLimit>(&bytes) {
        Ok(limit) => Ok(Ok(limit)),
        Err(err) => {
            warn!("api: invalid JSON body, error={}", err);
            Ok(Err(json_error(StatusCode::BAD_REQUEST, "invalid JSON")))
        }
    }
}

fn validate(limit: &ClientLimit) -> Result<(), Response<BoxBody>> {
    if limit.client_id.is_empty() || limit.capacity <= 0 || limit.refill_rate <= 0 {
        warn!(
            "api: invalid client data, client_id={}, capacity={}, rate_per_sec={}",
            limit.client_id, limit.capacity, limit.refill_rate
        );
        return Err(json_error(StatusCode::BAD_REQUEST, "invalid client data"));
    }
    Ok(())
}

async fn sync_limiter(state: &AppState, limit: &ClientLimit) {
    state
        .limiter
        .set_client_limit(
            &limit.client_id,
            Limit {
                capacity: limit.capacity as u64,
                refill_rate: limit.refill_rate as u64,
            },
        )
        .await;
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let body = serde_json::to_string(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(body))
        .unwrap()
}

fn json_error(status: StatusCode, msg: &str) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(format!(r#"{{"error":"{}"}}"#, msg)))
        .unwrap()
}
