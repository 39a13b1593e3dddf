use super::{ClientLimit, ClientRepository, StorageError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;

/// SQLite-backed client-limit repository.
pub struct SqliteClientRepo {
    pool: SqlitePool,
}

impl SqliteClientRepo {
    /// Open (or create) the database file and ensure the schema exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. A single connection keeps the
    /// database alive for the repo's lifetime.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            client_id TEXT PRIMARY KEY,
            capacity INTEGER NOT NULL,
            refill_rate INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_err)?;
    Ok(())
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn row_to_limit(row: &sqlx::sqlite::SqliteRow) -> Result<ClientLimit, StorageError> {
    Ok(ClientLimit {
        client_id: row.try_get("client_id").map_err(db_err)?,
        capacity: row.try_get("capacity").map_err(db_err)?,
        refill_rate: row.try_get("refill_rate").map_err(db_err)?,
    })
}

#[async_trait]
impl ClientRepository for SqliteClientRepo {
    async fn create(&self, limit: &ClientLimit) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO clients (client_id, capacity, refill_rate) VALUES (?, ?, ?)")
            .bind(&limit.client_id)
            .bind(limit.capacity)
            .bind(limit.refill_rate)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
                _ => db_err(e),
            })?;
        Ok(())
    }

    async fn get(&self, client_id: &str) -> Result<ClientLimit, StorageError> {
        let row = sqlx::query(
            "SELECT client_id, capacity, refill_rate FROM clients WHERE client_id = ?",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row_to_limit(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn update(&self, limit: &ClientLimit) -> Result<(), StorageError> {
        let result =
            sqlx::query("UPDATE clients SET capacity = ?, refill_rate = ? WHERE client_id = ?")
                .bind(limit.capacity)
                .bind(limit.refill_rate)
                .bind(&limit.client_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, client_id: &str) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM clients WHERE client_id = ?")
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ClientLimit>, StorageError> {
        let rows = sqlx::query("SELECT client_id, capacity, refill_rate FROM clients")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(row_to_limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(id: &str, capacity: i64, refill: i64) -> ClientLimit {
        ClientLimit {
            client_id: id.to_string(),
            capacity,
            refill_rate: refill,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = SqliteClientRepo::in_memory().await.unwrap();
        repo.create(&limit("c1", 5, 1)).await.unwrap();

        let got = repo.get("c1").await.unwrap();
        assert_eq!(got, limit("c1", 5, 1));
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let repo = SqliteClientRepo::in_memory().await.unwrap();
        repo.create(&limit("c1", 5, 1)).await.unwrap();

        match repo.create(&limit("c1", 9, 9)).await {
            Err(StorageError::Conflict) => {}
            other => panic!("expected conflict, got {:?}", other.err()),
        }
        // The original row is untouched.
        assert_eq!(repo.get("c1").await.unwrap(), limit("c1", 5, 1));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let repo = SqliteClientRepo::in_memory().await.unwrap();
        assert!(matches!(repo.get("nope").await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn update_existing_and_missing() {
        let repo = SqliteClientRepo::in_memory().await.unwrap();
        repo.create(&limit("c1", 5, 1)).await.unwrap();

        repo.update(&limit("c1", 10, 2)).await.unwrap();
        assert_eq!(repo.get("c1").await.unwrap(), limit("c1", 10, 2));

        assert!(matches!(
            repo.update(&limit("ghost", 1, 1)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_twice_yields_not_found() {
        let repo = SqliteClientRepo::in_memory().await.unwrap();
        repo.create(&limit("c1", 5, 1)).await.unwrap();

        repo.delete("c1").await.unwrap();
        assert!(matches!(repo.delete("c1").await, Err(StorageError::NotFound)));
        assert!(matches!(repo.get("c1").await, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn list_returns_all_rows() {
        let repo = SqliteClientRepo::in_memory().await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());

        repo.create(&limit("a", 1, 1)).await.unwrap();
        repo.create(&limit("b", 2, 2)).await.unwrap();

        let mut all = repo.list().await.unwrap();
        all.sort_by(|x, y| x.client_id.cmp(&y.client_id));
        assert_eq!(all, vec![limit("a", 1, 1), limit("b", 2, 2)]);
    }

    #[tokio::test]
    async fn open_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.db");

        let repo = SqliteClientRepo::open(&path).await.unwrap();
        repo.create(&limit("c1", 5, 1)).await.unwrap();
        assert!(path.exists());
    }
}
