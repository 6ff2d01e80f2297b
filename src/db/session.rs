//! Session records persisted as TTL rows.
//!
//! Expiry is stored as a Unix millisecond timestamp and checked on every read,
//! so an expired row behaves as absent even before cleanup removes it.

use sqlx::sqlite::SqlitePool;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::session::{SessionRecord, SessionStore, SessionStoreError, session_key};

/// Session store backed by the `sessions` table.
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete all expired rows.
    pub async fn purge_expired(&self) -> Result<u64, SessionStoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected())
    }
}

fn unavailable(e: sqlx::Error) -> SessionStoreError {
    SessionStoreError::Unavailable(e.to_string())
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn expiry_after(ttl: Duration) -> i64 {
    now_millis().saturating_add(ttl.as_millis() as i64)
}

impl SessionStore for SqliteSessionStore {
    async fn put(
        &self,
        principal_id: i64,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let payload = record.encode()?;

        sqlx::query(
            "INSERT INTO sessions (session_key, payload, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(session_key) DO UPDATE SET payload = excluded.payload, expires_at = excluded.expires_at",
        )
        .bind(session_key(principal_id))
        .bind(payload)
        .bind(expiry_after(ttl))
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }

    async fn get(&self, principal_id: i64) -> Result<SessionRecord, SessionStoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM sessions WHERE session_key = ? AND expires_at > ?")
                .bind(session_key(principal_id))
                .bind(now_millis())
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        match row {
            Some((payload,)) => SessionRecord::decode(&payload),
            None => Err(SessionStoreError::NotFound),
        }
    }

    async fn extend(&self, principal_id: i64, ttl: Duration) -> Result<(), SessionStoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET expires_at = ? WHERE session_key = ? AND expires_at > ?",
        )
        .bind(expiry_after(ttl))
        .bind(session_key(principal_id))
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(SessionStoreError::NotFound)
        }
    }

    async fn remove(&self, principal_id: i64) -> Result<bool, SessionStoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_key = ? AND expires_at > ?")
            .bind(session_key(principal_id))
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    const TTL: Duration = Duration::from_secs(600);

    fn record(access: &str, refresh: &str) -> SessionRecord {
        SessionRecord {
            access_session_id: access.to_string(),
            refresh_session_id: refresh.to_string(),
        }
    }

    async fn expire_all(db: &Database) {
        sqlx::query("UPDATE sessions SET expires_at = 0")
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.put(1, &record("a1", "r1"), TTL).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), record("a1", "r1"));
        assert!(matches!(store.get(2).await, Err(SessionStoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.put(1, &record("a1", "r1"), TTL).await.unwrap();
        store.put(1, &record("a2", "r2"), TTL).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), record("a2", "r2"));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_stored_payload_is_id_pair() {
        let db = Database::open(":memory:").await.unwrap();
        db.sessions().put(5, &record("a1", "r1"), TTL).await.unwrap();

        let row: (String, String) = sqlx::query_as("SELECT session_key, payload FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, "token-5");
        assert_eq!(row.1, r#"{"access":"a1","refresh":"r1"}"#);
    }

    #[tokio::test]
    async fn test_expired_record_is_not_found() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.put(1, &record("a1", "r1"), TTL).await.unwrap();
        expire_all(&db).await;

        assert!(matches!(store.get(1).await, Err(SessionStoreError::NotFound)));
        assert!(matches!(
            store.extend(1, TTL).await,
            Err(SessionStoreError::NotFound)
        ));
        assert!(!store.remove(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_extend_moves_expiry() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.put(1, &record("a1", "r1"), Duration::from_secs(1)).await.unwrap();
        store.extend(1, TTL).await.unwrap();

        let (expires_at,): (i64,) = sqlx::query_as("SELECT expires_at FROM sessions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(expires_at >= now_millis() + 500_000);
    }

    #[tokio::test]
    async fn test_remove() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.put(1, &record("a1", "r1"), TTL).await.unwrap();
        assert!(store.remove(1).await.unwrap());
        assert!(matches!(store.get(1).await, Err(SessionStoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.sessions();

        store.put(1, &record("a1", "r1"), TTL).await.unwrap();
        store.put(2, &record("a2", "r2"), TTL).await.unwrap();
        sqlx::query("UPDATE sessions SET expires_at = 0 WHERE session_key = 'token-1'")
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.get(2).await.is_ok());
    }
}
