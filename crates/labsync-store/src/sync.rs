//! Background push/fetch worker
//!
//! Every remote call goes through one tokio task fed by an unbounded channel, so
//! callers only enqueue and never wait on the network. Jobs run in enqueue order.
//! Failures are logged at `warn` and dropped.
//!
//! The session cell numbers local writes. A fetched remote session replaces the
//! cache only when every local write has reached the remote; until then the local
//! copy is pushed again instead.

use crate::keys;
use crate::local::{LocalStore, LocalStoreExt};
use crate::remote::RemoteStore;
use labsync_model::{LeaderboardEntry, WorkshopSession};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Work items for the sync task
#[derive(Debug)]
pub enum SyncJob {
    /// Mirror the session produced by local write `version`
    PushSession {
        /// Session as written
        session: Box<WorkshopSession>,
        /// Local write number the session belongs to
        version: u64,
    },
    /// Pull the remote session into the cache, or push again while a local
    /// write has not been mirrored yet
    FetchSession,
    /// Mirror one leaderboard row
    PushLeaderboardEntry(Box<LeaderboardEntry>),
    /// Acknowledge once every earlier job has run
    Flush(oneshot::Sender<()>),
    /// Stop the worker
    Shutdown,
}

/// Session cache shared between the store front-end and the sync task
#[derive(Debug)]
pub struct SessionCell {
    current: RwLock<Option<WorkshopSession>>,
    local: Arc<dyn LocalStore>,
    fetch_pending: AtomicBool,
    /// Number of the latest local write
    written: AtomicU64,
    /// Number of the latest local write the remote acknowledged
    synced: AtomicU64,
}

impl SessionCell {
    /// Load the cached session from the local store
    #[must_use]
    pub fn load(local: Arc<dyn LocalStore>) -> Self {
        let current = local.load_or_log::<WorkshopSession>(keys::SESSION);
        Self {
            current: RwLock::new(current),
            local,
            fetch_pending: AtomicBool::new(false),
            written: AtomicU64::new(0),
            synced: AtomicU64::new(0),
        }
    }

    /// Cached session
    #[must_use]
    pub fn get(&self) -> Option<WorkshopSession> {
        self.current.read().clone()
    }

    /// Replace the cached session and persist it
    ///
    /// Returns the write number to hand to [`SyncHandle::push_session`].
    pub fn replace(&self, session: WorkshopSession) -> u64 {
        let mut guard = self.current.write();
        self.local.save_or_log(keys::SESSION, &session);
        *guard = Some(session);
        self.written.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Read-merge-write under the cache lock
    ///
    /// Returns the merged session and its write number, or `None` when nothing
    /// is cached.
    pub fn modify(&self, f: impl FnOnce(&mut WorkshopSession)) -> Option<(WorkshopSession, u64)> {
        let mut guard = self.current.write();
        let session = guard.as_mut()?;
        f(session);
        let merged = session.clone();
        self.local.save_or_log(keys::SESSION, &merged);
        let version = self.written.fetch_add(1, Ordering::SeqCst) + 1;
        Some((merged, version))
    }

    /// Does a local write still wait for the remote
    #[must_use]
    pub fn has_unsynced_writes(&self) -> bool {
        self.synced.load(Ordering::SeqCst) < self.written.load(Ordering::SeqCst)
    }

    fn mark_synced(&self, version: u64) {
        self.synced.fetch_max(version, Ordering::SeqCst);
    }

    /// Install a fetched session unless it matches the cache or a local write
    /// is still unsynced
    fn apply_remote(&self, session: WorkshopSession) -> bool {
        let mut guard = self.current.write();
        if self.has_unsynced_writes() || guard.as_ref() == Some(&session) {
            return false;
        }
        self.local.save_or_log(keys::SESSION, &session);
        *guard = Some(session);
        true
    }

    /// Cached session with its write number
    fn snapshot(&self) -> Option<(WorkshopSession, u64)> {
        let guard = self.current.read();
        let session = guard.clone()?;
        Some((session, self.written.load(Ordering::SeqCst)))
    }

    /// Claim the single outstanding fetch slot
    pub(crate) fn try_begin_fetch(&self) -> bool {
        !self.fetch_pending.swap(true, Ordering::SeqCst)
    }

    fn end_fetch(&self) {
        self.fetch_pending.store(false, Ordering::SeqCst);
    }
}

/// Sender side of the sync task
#[derive(Debug, Clone)]
pub struct SyncHandle {
    sender: mpsc::UnboundedSender<SyncJob>,
}

impl SyncHandle {
    /// Enqueue a job; a stopped worker drops it
    pub fn enqueue(&self, job: SyncJob) {
        if self.sender.send(job).is_err() {
            debug!("sync worker stopped, job dropped");
        }
    }

    /// Mirror the session produced by local write `version` in the background
    pub fn push_session(&self, session: WorkshopSession, version: u64) {
        self.enqueue(SyncJob::PushSession {
            session: Box::new(session),
            version,
        });
    }

    /// Mirror a leaderboard row in the background
    pub fn push_leaderboard_entry(&self, entry: LeaderboardEntry) {
        self.enqueue(SyncJob::PushLeaderboardEntry(Box::new(entry)));
    }

    /// Wait until every job enqueued before this call has run
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(SyncJob::Flush(tx));
        // a stopped worker drops the sender, which also ends the wait
        let _ = rx.await;
    }

    /// Ask the worker to stop after draining earlier jobs
    pub fn shutdown(&self) {
        self.enqueue(SyncJob::Shutdown);
    }
}

/// The background sync task
#[derive(Debug)]
pub struct SyncWorker {
    remote: Arc<dyn RemoteStore>,
    cell: Arc<SessionCell>,
    receiver: mpsc::UnboundedReceiver<SyncJob>,
}

impl SyncWorker {
    /// Spawn the worker on the current tokio runtime
    #[must_use]
    pub fn spawn(remote: Arc<dyn RemoteStore>, cell: Arc<SessionCell>) -> (SyncHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = Self {
            remote,
            cell,
            receiver,
        };
        let join = tokio::spawn(worker.run());
        (SyncHandle { sender }, join)
    }

    async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            match job {
                SyncJob::PushSession { session, version } => self.push_session(&session, version).await,
                SyncJob::FetchSession => self.fetch_session().await,
                SyncJob::PushLeaderboardEntry(entry) => {
                    if let Err(e) = self.remote.push_leaderboard_entry(&entry).await {
                        warn!(participant = %entry.participant_id, error = %e, "failed to push leaderboard entry");
                    }
                }
                SyncJob::Flush(ack) => {
                    let _ = ack.send(());
                }
                SyncJob::Shutdown => break,
            }
        }
        debug!("sync worker stopped");
    }

    async fn push_session(&self, session: &WorkshopSession, version: u64) {
        match self.remote.push_session(session).await {
            Ok(()) => self.cell.mark_synced(version),
            Err(e) => warn!(session = %session.id, error = %e, "failed to push workshop session"),
        }
    }

    async fn fetch_session(&self) {
        if self.cell.has_unsynced_writes() {
            if let Some((session, version)) = self.cell.snapshot() {
                debug!(session = %session.id, "local session not mirrored yet, pushing again");
                self.push_session(&session, version).await;
            }
            self.cell.end_fetch();
            return;
        }
        match self.remote.fetch_session().await {
            Ok(Some(session)) => {
                let id = session.id.clone();
                if self.cell.apply_remote(session) {
                    info!(session = %id, "workshop session updated from remote");
                } else {
                    debug!(session = %id, "remote session unchanged or superseded locally");
                }
            }
            Ok(None) => debug!("no workshop session on remote"),
            Err(e) => warn!(error = %e, "failed to fetch workshop session"),
        }
        self.cell.end_fetch();
    }
}
