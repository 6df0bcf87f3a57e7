//! Session store: local cache first, remote mirror in the background

use crate::local::LocalStore;
use crate::remote::RemoteStore;
use crate::sync::{SessionCell, SyncHandle, SyncJob, SyncWorker};
use labsync_model::{SessionPatch, WorkshopSession};
use std::fmt::Debug;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Access to the single current workshop session
///
/// All operations are synchronous and never wait on the network.
pub trait SessionStore: Send + Sync + Debug {
    /// Cached session; a miss schedules a background remote fetch
    fn read(&self) -> Option<WorkshopSession>;

    /// Replace the session
    fn write(&self, session: WorkshopSession);

    /// Merge a partial update onto the cached session
    ///
    /// Returns the merged session, or `None` when no session exists yet.
    fn update(&self, patch: SessionPatch) -> Option<WorkshopSession>;
}

/// [`SessionStore`] over a [`LocalStore`] cache and a [`RemoteStore`] mirror
#[derive(Debug)]
pub struct CachedSessionStore {
    cell: Arc<SessionCell>,
    sync: SyncHandle,
}

impl CachedSessionStore {
    /// Load the cache and start the sync worker on the current tokio runtime
    #[must_use]
    pub fn start(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteStore>) -> Self {
        let cell = Arc::new(SessionCell::load(local));
        let (sync, _worker) = SyncWorker::spawn(remote, Arc::clone(&cell));
        Self { cell, sync }
    }

    /// Handle for enqueueing other background pushes
    #[inline]
    #[must_use]
    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Wait for every enqueued remote call to finish
    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    /// Schedule a background pull of the remote session
    ///
    /// The remote copy replaces the cache when it differs, unless a local write
    /// has not reached the remote yet; that write is pushed again instead. At
    /// most one pull is outstanding.
    pub fn refresh(&self) {
        if self.cell.try_begin_fetch() {
            self.sync.enqueue(SyncJob::FetchSession);
        }
    }

    /// Call [`Self::refresh`] every `period` until the store is dropped
    ///
    /// A zero `period` is raised to one millisecond.
    #[must_use]
    pub fn spawn_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("session store gone, refresh stopped");
                    break;
                };
                store.refresh();
            }
        })
    }
}

impl Drop for CachedSessionStore {
    fn drop(&mut self) {
        self.sync.shutdown();
    }
}

impl SessionStore for CachedSessionStore {
    fn read(&self) -> Option<WorkshopSession> {
        let cached = self.cell.get();
        if cached.is_none() && self.cell.try_begin_fetch() {
            debug!("session cache miss, scheduling remote fetch");
            self.sync.enqueue(SyncJob::FetchSession);
        }
        cached
    }

    fn write(&self, mut session: WorkshopSession) {
        session.normalize();
        info!(session = %session.id, labs_enabled = session.labs_enabled, "workshop session written");
        let version = self.cell.replace(session.clone());
        self.sync.push_session(session, version);
    }

    fn update(&self, patch: SessionPatch) -> Option<WorkshopSession> {
        let Some((merged, version)) = self.cell.modify(|session| patch.apply(session)) else {
            debug!("session update without a current session ignored");
            return None;
        };
        self.sync.push_session(merged.clone(), version);
        Some(merged)
    }
}
