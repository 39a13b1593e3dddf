pub mod sqlite;

pub use sqlite::SqliteClientRepo;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A client's persisted rate-limit parameters. Field names double as the
/// wire names on the `/clients` surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientLimit {
    pub client_id: String,
    pub capacity: i64,
    #[serde(rename = "rate_per_sec")]
    pub refill_rate: i64,
}

#[derive(Debug)]
pub enum StorageError {
    /// No row for the requested client id.
    NotFound,
    /// Create on an id that already exists.
    Conflict,
    Database(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "client not found"),
            StorageError::Conflict => write!(f, "client already exists"),
            StorageError::Database(msg) => write!(f, "database error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Durable CRUD over client limits. The repository is the source of
/// truth; the rate limiter's bucket map is a derived cache that callers
/// must sync after every mutation.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, limit: &ClientLimit) -> Result<(), StorageError>;
    async fn get(&self, client_id: &str) -> Result<ClientLimit, StorageError>;
    async fn update(&self, limit: &ClientLimit) -> Result<(), StorageError>;
    async fn delete(&self, client_id: &str) -> Result<(), StorageError>;
    async fn list(&self) -> Result<Vec<ClientLimit>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_limit_wire_names() {
        let limit = ClientLimit {
            client_id: "c1".to_string(),
            capacity: 5,
            refill_rate: 1,
        };
        let json = serde_json::to_value(&limit).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"client_id": "c1", "capacity": 5, "rate_per_sec": 1})
        );

        let parsed: ClientLimit =
            serde_json::from_str(r#"{"client_id":"c1","capacity":5,"rate_per_sec":1}"#).unwrap();
        assert_eq!(parsed, limit);
    }

    #[test]
    fn error_display() {
        assert_eq!(StorageError::NotFound.to_string(), "client not found");
        assert_eq!(StorageError::Conflict.to_string(), "client already exists");
        assert_eq!(
            StorageError::Database("disk io".to_string()).to_string(),
            "database error: disk io"
        );
    }
}
