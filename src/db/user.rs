use sqlx::sqlite::SqlitePool;

use crate::principal::{
    NewPrincipal, Principal, PrincipalStore, PrincipalStoreError, normalize_email,
};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    password_hash: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl From<UserRow> for Principal {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user, returning the stored row.
    pub async fn create(&self, user: &NewPrincipal) -> Result<Principal, sqlx::Error> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (email, name, password_hash) VALUES (?, ?, ?) RETURNING id, email, name, password_hash, created_at, updated_at, deleted_at",
        )
        .bind(normalize_email(&user.email))
        .bind(&user.name)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    /// Get a live user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, password_hash, created_at, updated_at, deleted_at FROM users WHERE email = ? AND deleted_at IS NULL",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Principal::from))
    }

    /// Get a live user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Principal>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, password_hash, created_at, updated_at, deleted_at FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Principal::from))
    }

    /// Replace the password hash of a live user.
    pub async fn set_password_hash(&self, id: i64, hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = datetime('now') WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a live user as deleted. The row is kept.
    pub async fn mark_deleted(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = datetime('now'), updated_at = datetime('now') WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn unavailable(e: sqlx::Error) -> PrincipalStoreError {
    PrincipalStoreError::Unavailable(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

impl PrincipalStore for UserStore {
    async fn find_by_email(&self, email: &str) -> Result<Principal, PrincipalStoreError> {
        self.get_by_email(email)
            .await
            .map_err(unavailable)?
            .ok_or(PrincipalStoreError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> Result<Principal, PrincipalStoreError> {
        self.get_by_id(id)
            .await
            .map_err(unavailable)?
            .ok_or(PrincipalStoreError::NotFound)
    }

    async fn insert(&self, principal: NewPrincipal) -> Result<Principal, PrincipalStoreError> {
        self.create(&principal).await.map_err(|e| {
            if is_unique_violation(&e) {
                PrincipalStoreError::UniquenessViolation
            } else {
                unavailable(e)
            }
        })
    }

    async fn update_password(
        &self,
        id: i64,
        password_hash: &str,
    ) -> Result<(), PrincipalStoreError> {
        if self
            .set_password_hash(id, password_hash)
            .await
            .map_err(unavailable)?
        {
            Ok(())
        } else {
            Err(PrincipalStoreError::NotFound)
        }
    }

    async fn soft_delete(&self, id: i64) -> Result<(), PrincipalStoreError> {
        if self.mark_deleted(id).await.map_err(unavailable)? {
            Ok(())
        } else {
            Err(PrincipalStoreError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn new_user(email: &str) -> NewPrincipal {
        NewPrincipal {
            email: email.to_string(),
            name: "alice".to_string(),
            password_hash: "$argon2id$stub".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_returns_persisted_principal() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.users();

        let principal = store.insert(new_user(" Alice@Example.com ")).await.unwrap();
        assert_eq!(principal.id, 1);
        assert_eq!(principal.email, "alice@example.com");
        assert_eq!(principal.password_hash, "$argon2id$stub");
        assert!(!principal.created_at.is_empty());
    }

    #[tokio::test]
    async fn test_insert_returns_the_stored_row() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.users();

        store.insert(new_user("bob@example.com")).await.unwrap();
        let inserted = store.insert(new_user("alice@example.com")).await.unwrap();
        let stored = store.get_by_id(inserted.id).await.unwrap().unwrap();

        assert_eq!(inserted.id, 2);
        assert_eq!(inserted.email, stored.email);
        assert_eq!(inserted.password_hash, stored.password_hash);
        assert_eq!(inserted.created_at, stored.created_at);
        assert_eq!(inserted.updated_at, stored.updated_at);
        assert!(inserted.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_uniqueness_violation() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.users();

        store.insert(new_user("alice@example.com")).await.unwrap();
        let result = store.insert(new_user("ALICE@example.com")).await;

        assert!(matches!(
            result,
            Err(PrincipalStoreError::UniquenessViolation)
        ));
    }

    #[tokio::test]
    async fn test_lookups_report_not_found() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.users();

        assert!(matches!(
            store.find_by_email("nobody@example.com").await,
            Err(PrincipalStoreError::NotFound)
        ));
        assert!(matches!(
            store.find_by_id(99).await,
            Err(PrincipalStoreError::NotFound)
        ));
        assert!(matches!(
            store.soft_delete(99).await,
            Err(PrincipalStoreError::NotFound)
        ));
        assert!(matches!(
            store.update_password(99, "x").await,
            Err(PrincipalStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_closed_pool_is_unavailable() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.users();
        db.pool().close().await;

        assert!(matches!(
            store.find_by_id(1).await,
            Err(PrincipalStoreError::Unavailable(_))
        ));
    }
}
