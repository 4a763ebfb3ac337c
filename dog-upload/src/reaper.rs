use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::{Result, StorageHandler, UploadSession, UploadSessionStore};

/// Delete a session record together with the bytes it still owns.
///
/// Unfinished sessions own their staging object and their placeholder. A
/// completed session points at the finished file, which is left alone.
pub(crate) async fn purge_session(
    handler: &StorageHandler,
    sessions: &dyn UploadSessionStore,
    session: &UploadSession,
) -> Result<()> {
    if !session.is_completed() {
        let voter = handler.voter();
        let mut owned = Vec::new();
        if let Some(temp) = voter.temp_storage() {
            owned.push((temp.clone(), session.staging_path()));
        }
        if let Some(storage) = voter.storage(&session.storage_name) {
            owned.push((storage.clone(), session.file_path.clone()));
        }

        for (storage, path) in owned {
            if let Err(e) = storage.filesystem().delete(&path).await {
                warn!(
                    session_id = %session.session_id,
                    storage = %storage.name(),
                    path = %path,
                    error = %e,
                    "failed to delete upload bytes"
                );
            }
        }
    }

    sessions.delete(&session.session_id).await
}

/// Expires resumable sessions older than the configured ttl.
///
/// Each purge runs under the session lock of the shared [`StorageHandler`].
pub struct SessionReaper {
    handler: Arc<StorageHandler>,
    sessions: Arc<dyn UploadSessionStore>,
    ttl: Duration,
    interval: Duration,
}

impl SessionReaper {
    pub fn new(handler: Arc<StorageHandler>, sessions: Arc<dyn UploadSessionStore>, ttl: Duration) -> Self {
        Self {
            handler,
            sessions,
            ttl,
            interval: Duration::from_secs(300),
        }
    }

    /// How often `start` runs a cycle
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run cycles forever
    pub async fn start(self) {
        let mut ticker = interval(self.interval);

        info!("Starting upload session reaper with interval: {:?}", self.interval);

        loop {
            ticker.tick().await;

            match self.reap_once(Utc::now()).await {
                Ok(count) if count > 0 => info!("Reaped {} expired upload sessions", count),
                Ok(_) => debug!("No expired upload sessions found"),
                Err(e) => warn!("Error during upload session reaping: {}", e),
            }
        }
    }

    /// Purge every session created before `now - ttl`; returns how many were purged
    pub async fn reap_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let expired = self.sessions.find_created_before(cutoff).await?;
        let mut reaped = 0;
        for candidate in &expired {
            let id = candidate.session_id.as_str();
            // Chunks in flight finish before the session goes
            let _guard = self.handler.session_locks().lock(id).await;
            let Some(session) = self.sessions.find(id).await? else {
                continue;
            };
            debug!(session_id = %session.session_id, completed = session.is_completed(), "reaping upload session");
            match purge_session(&self.handler, self.sessions.as_ref(), &session).await {
                Ok(()) => reaped += 1,
                Err(e) => warn!(session_id = %session.session_id, error = %e, "failed to reap upload session"),
            }
        }

        Ok(reaped)
    }
}
