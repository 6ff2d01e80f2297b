//! Session records: the currently valid session identifiers per principal.
//!
//! A record holds only the identifiers minted into the principal's latest
//! access/refresh pair, never the tokens. Writing a record overwrites any
//! previous one, so a principal has at most one live pair at a time.

mod memory;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::db::SqliteSessionStore;
use crate::jwt::TokenPurpose;

pub use memory::MemorySessionStore;

/// Identifiers of a principal's current token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "access")]
    pub access_session_id: String,
    #[serde(rename = "refresh")]
    pub refresh_session_id: String,
}

impl SessionRecord {
    /// The identifier a token of `purpose` must carry.
    pub fn session_id(&self, purpose: TokenPurpose) -> &str {
        match purpose {
            TokenPurpose::Access => &self.access_session_id,
            TokenPurpose::Refresh => &self.refresh_session_id,
        }
    }

    pub(crate) fn encode(&self) -> Result<String, SessionStoreError> {
        serde_json::to_string(self).map_err(|e| SessionStoreError::Unavailable(e.to_string()))
    }

    pub(crate) fn decode(payload: &str) -> Result<Self, SessionStoreError> {
        serde_json::from_str(payload).map_err(|e| SessionStoreError::Unavailable(e.to_string()))
    }
}

/// Key under which a principal's record is stored.
pub fn session_key(principal_id: i64) -> String {
    format!("token-{}", principal_id)
}

/// TTL-keyed store of session records, one per principal.
pub trait SessionStore: Clone + Send + Sync + 'static {
    /// Write the record, replacing any previous one, expiring after `ttl`.
    fn put(
        &self,
        principal_id: i64,
        record: &SessionRecord,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), SessionStoreError>> + Send;

    /// Fetch the live record. Absent or expired records are `NotFound`.
    fn get(
        &self,
        principal_id: i64,
    ) -> impl Future<Output = Result<SessionRecord, SessionStoreError>> + Send;

    /// Push the expiry of a live record out to `ttl` from now.
    fn extend(
        &self,
        principal_id: i64,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), SessionStoreError>> + Send;

    /// Delete the record. Returns whether one existed.
    fn remove(&self, principal_id: i64)
    -> impl Future<Output = Result<bool, SessionStoreError>> + Send;
}

/// Errors reported by a session store.
#[derive(Debug)]
pub enum SessionStoreError {
    NotFound,
    /// Backend unreachable or failed
    Unavailable(String),
}

impl std::fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStoreError::NotFound => write!(f, "Session not found"),
            SessionStoreError::Unavailable(e) => write!(f, "Session store unavailable: {}", e),
        }
    }
}

impl std::error::Error for SessionStoreError {}

/// Session store selected at startup.
#[derive(Clone)]
pub enum SessionBackend {
    Memory(MemorySessionStore),
    Sqlite(SqliteSessionStore),
}

impl SessionBackend {
    /// Drop expired records. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, SessionStoreError> {
        match self {
            SessionBackend::Memory(store) => store.purge_expired(),
            SessionBackend::Sqlite(store) => store.purge_expired().await,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionBackend::Memory(_) => "memory",
            SessionBackend::Sqlite(_) => "sqlite",
        }
    }
}

impl SessionStore for SessionBackend {
    async fn put(
        &self,
        principal_id: i64,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        match self {
            SessionBackend::Memory(store) => store.put(principal_id, record, ttl).await,
            SessionBackend::Sqlite(store) => store.put(principal_id, record, ttl).await,
        }
    }

    async fn get(&self, principal_id: i64) -> Result<SessionRecord, SessionStoreError> {
        match self {
            SessionBackend::Memory(store) => store.get(principal_id).await,
            SessionBackend::Sqlite(store) => store.get(principal_id).await,
        }
    }

    async fn extend(&self, principal_id: i64, ttl: Duration) -> Result<(), SessionStoreError> {
        match self {
            SessionBackend::Memory(store) => store.extend(principal_id, ttl).await,
            SessionBackend::Sqlite(store) => store.extend(principal_id, ttl).await,
        }
    }

    async fn remove(&self, principal_id: i64) -> Result<bool, SessionStoreError> {
        match self {
            SessionBackend::Memory(store) => store.remove(principal_id).await,
            SessionBackend::Sqlite(store) => store.remove(principal_id).await,
        }
    }
}
