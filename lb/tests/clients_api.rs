//! End-to-end tests for the `/clients` control plane: CRUD over the
//! repository plus rate-limiter cache sync, driven over real TCP.

use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use portier_lb::balancer::{ServerPool, Strategy};
use portier_lb::config::Config;
use portier_lb::metrics::Metrics;
use portier_lb::ratelimit::RateLimiter;
use portier_lb::server::{run_proxy_server, AppState};
use portier_lb::storage::{ClientRepository, SqliteClientRepo};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

async fn spawn_app() -> (SocketAddr, AppState) {
    let repo: Arc<dyn ClientRepository> = Arc::new(SqliteClientRepo::in_memory().await.unwrap());
    let pool = Arc::new(ServerPool::new(&[]).unwrap());
    pool.set_strategy(Strategy::from_name("round_robin").unwrap());
    let limiter = Arc::new(RateLimiter::new(10, 1, repo.clone()));

    let state = AppState {
        config: Arc::new(Config::default()),
        pool,
        limiter,
        repo,
        client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
        metrics: Metrics::install(),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_proxy_server(
        listener,
        state.clone(),
        Arc::new(Notify::new()),
    ));
    (addr, state)
}

fn http() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn crud_lifecycle() {
    let (addr, _state) = spawn_app().await;
    let base = format!("http://{addr}/clients");
    let client = http();
    let body = r#"{"client_id":"x","capacity":5,"rate_per_sec":1}"#;

    // Create.
    let resp = client
        .post(&base)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(created["client_id"], "x");
    assert_eq!(created["capacity"], 5);
    assert_eq!(created["rate_per_sec"], 1);

    // Duplicate create conflicts.
    let resp = client.post(&base).body(body).send().await.unwrap();
    assert_eq!(resp.status(), 409);

    // Read back what was created.
    let resp = client.get(format!("{base}/x")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let got: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(got["capacity"], 5);
    assert_eq!(got["rate_per_sec"], 1);

    // Update, then read the new values.
    let resp = client
        .put(format!("{base}/x"))
        .body(r#"{"client_id":"x","capacity":10,"rate_per_sec":2}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let got: serde_json::Value = client
        .get(format!("{base}/x"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(got["capacity"], 10);
    assert_eq!(got["rate_per_sec"], 2);

    // Delete returns the documented body; a second delete is 404.
    let resp = client.delete(format!("{base}/x")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let deleted: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(deleted["status"], "success");
    assert_eq!(deleted["message"], "client deleted");
    assert_eq!(deleted["client_id"], "x");

    let resp = client.delete(format!("{base}/x")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client.get(format!("{base}/x")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn list_returns_created_clients() {
    let (addr, _state) = spawn_app().await;
    let base = format!("http://{addr}/clients");
    let client = http();

    let resp = client.get(&base).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let empty: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(empty.is_empty());

    for (id, cap) in [("a", 1), ("b", 2)] {
        let body = format!(r#"{{"client_id":"{id}","capacity":{cap},"rate_per_sec":1}}"#);
        assert_eq!(client.post(&base).body(body).send().await.unwrap().status(), 201);
    }

    let mut all: Vec<serde_json::Value> = client.get(&base).send().await.unwrap().json().await.unwrap();
    all.sort_by_key(|v| v["client_id"].as_str().unwrap().to_string());
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["client_id"], "a");
    assert_eq!(all[1]["capacity"], 2);
}

#[tokio::test]
async fn validation_rejects_bad_input() {
    let (addr, _state) = spawn_app().await;
    let base = format!("http://{addr}/clients");
    let client = http();

    // Malformed JSON.
    let resp = client.post(&base).body("not json").send().await.unwrap();
    assert_eq!(resp.status(), 400);

    // Empty body.
    let resp = client.post(&base).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    // Non-positive capacity / rate, empty id.
    for body in [
        r#"{"client_id":"x","capacity":-1,"rate_per_sec":1}"#,
        r#"{"client_id":"x","capacity":0,"rate_per_sec":1}"#,
        r#"{"client_id":"x","capacity":5,"rate_per_sec":0}"#,
        r#"{"client_id":"","capacity":5,"rate_per_sec":1}"#,
    ] {
        let resp = client.post(&base).body(body).send().await.unwrap();
        assert_eq!(resp.status(), 400, "body {body} should be rejected");
    }

    // Nothing was persisted.
    let all: Vec<serde_json::Value> = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn put_requires_matching_id_and_existing_client() {
    let (addr, _state) = spawn_app().await;
    let base = format!("http://{addr}/clients");
    let client = http();

    // Id mismatch between path and body.
    let resp = client
        .put(format!("{base}/x"))
        .body(r#"{"client_id":"y","capacity":5,"rate_per_sec":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown client.
    let resp = client
        .put(format!("{base}/ghost"))
        .body(r#"{"client_id":"ghost","capacity":5,"rate_per_sec":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Idempotent PUT: same body twice, 200 both times.
    client
        .post(&base)
        .body(r#"{"client_id":"x","capacity":5,"rate_per_sec":1}"#)
        .send()
        .await
        .unwrap();
    for _ in 0..2 {
        let resp = client
            .put(format!("{base}/x"))
            .body(r#"{"client_id":"x","capacity":5,"rate_per_sec":1}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}

#[tokio::test]
async fn mutations_sync_the_limiter_cache() {
    let (addr, state) = spawn_app().await;
    let base = format!("http://{addr}/clients");
    let client = http();

    // Create a 2-token client: the limiter bucket is seeded immediately.
    client
        .post(&base)
        .body(r#"{"client_id":"tiny","capacity":2,"rate_per_sec":1}"#)
        .send()
        .await
        .unwrap();

    assert!(state.limiter.allow_request("tiny").await);
    assert!(state.limiter.allow_request("tiny").await);
    assert!(!state.limiter.allow_request("tiny").await);

    // Delete drops the bucket; the next request falls back to the
    // process default (capacity 10) since the row is gone.
    client.delete(format!("{base}/tiny")).send().await.unwrap();
    assert!(state.limiter.allow_request("tiny").await);
}
