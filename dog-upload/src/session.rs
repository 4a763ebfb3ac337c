use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use crate::{Result, SessionId};

/// Persisted state of a resumable upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    pub session_id: SessionId,

    /// Storage the completed file will live in
    pub storage_name: String,

    /// Object allocated for the upload when the session started
    pub file_path: String,

    pub content_type: String,

    /// Declared total length; fixed for the session lifetime
    pub content_length: u64,

    /// Bound form data captured at session start
    pub form_data: Value,

    pub created_at: DateTime<Utc>,

    /// Set once every byte arrived and the file was finished; `file_path` and
    /// `storage_name` then point at the finished file
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Object name used when bytes are staged in temp storage
    pub fn staging_path(&self) -> String {
        format!("{}.tmp", self.session_id)
    }
}

/// Session persistence
#[async_trait]
pub trait UploadSessionStore: Send + Sync {
    async fn find(&self, session_id: &str) -> Result<Option<UploadSession>>;

    /// Insert or replace
    async fn save(&self, session: UploadSession) -> Result<()>;

    /// Delete; deleting a missing session is not an error
    async fn delete(&self, session_id: &SessionId) -> Result<()>;

    /// Sessions created strictly before `cutoff`
    async fn find_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadSession>>;
}

/// In-memory session store
#[derive(Debug, Clone, Default)]
pub struct MemoryUploadSessionStore {
    sessions: Arc<RwLock<HashMap<String, UploadSession>>>,
}

impl MemoryUploadSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl UploadSessionStore for MemoryUploadSessionStore {
    async fn find(&self, session_id: &str) -> Result<Option<UploadSession>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn save(&self, session: UploadSession) -> Result<()> {
        self.sessions
            .write()
            .insert(session.session_id.as_str().to_string(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.write().remove(session_id.as_str());
        Ok(())
    }

    async fn find_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadSession>> {
        let mut expired: Vec<UploadSession> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|s| s.created_at);
        Ok(expired)
    }
}

/// Per-session async locks shared by everything that touches a session's bytes.
///
/// An entry lives while someone holds or waits for its lock and is removed
/// when the last of them goes away, including when a waiting or holding
/// future is dropped.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    entries: Arc<Mutex<HashMap<String, LockEntry>>>,
}

#[derive(Debug)]
struct LockEntry {
    lock: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`
    pub async fn lock(&self, session_id: &str) -> SessionLockGuard {
        let ticket = self.enter(session_id);
        let guard = ticket.lock.clone().lock_owned().await;
        SessionLockGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Sessions with a holder or a waiter
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn enter(&self, session_id: &str) -> Ticket {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(session_id.to_string())
            .or_insert_with(|| LockEntry {
                lock: Arc::default(),
                users: 0,
            });
        entry.users += 1;
        Ticket {
            locks: self.clone(),
            session_id: session_id.to_string(),
            lock: entry.lock.clone(),
        }
    }
}

// One holder or waiter of a session lock
struct Ticket {
    locks: SessionLocks,
    session_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut entries = self.locks.entries.lock();
        if let Some(entry) = entries.get_mut(&self.session_id) {
            entry.users -= 1;
            if entry.users == 0 {
                entries.remove(&self.session_id);
            }
        }
    }
}

/// Exclusive access to one session until dropped
pub struct SessionLockGuard {
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket,
}
