//! In-process TTL key-value store for session records.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use super::{SessionRecord, SessionStore, SessionStoreError, session_key};

struct Entry {
    payload: String,
    expires_at: Instant,
}

/// Session store backed by a shared in-memory map.
///
/// Values are kept serialized, the same as in the SQLite store, and expire
/// lazily on read.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

fn poisoned<T>(_: T) -> SessionStoreError {
    SessionStoreError::Unavailable("session map lock poisoned".to_string())
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) -> Result<u64, SessionStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    async fn put(
        &self,
        principal_id: i64,
        record: &SessionRecord,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let payload = record.encode()?;
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(
            session_key(principal_id),
            Entry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, principal_id: i64) -> Result<SessionRecord, SessionStoreError> {
        let entries = self.entries.read().map_err(poisoned)?;
        match entries.get(&session_key(principal_id)) {
            Some(entry) if entry.expires_at > Instant::now() => {
                SessionRecord::decode(&entry.payload)
            }
            _ => Err(SessionStoreError::NotFound),
        }
    }

    async fn extend(&self, principal_id: i64, ttl: Duration) -> Result<(), SessionStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        match entries.get_mut(&session_key(principal_id)) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(())
            }
            _ => Err(SessionStoreError::NotFound),
        }
    }

    async fn remove(&self, principal_id: i64) -> Result<bool, SessionStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries
            .remove(&session_key(principal_id))
            .is_some_and(|entry| entry.expires_at > now))
    }
}
