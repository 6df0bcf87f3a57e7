//! Durable remote mirror contract

use crate::error::RemoteError;
use async_trait::async_trait;
use indexmap::IndexMap;
use labsync_model::{LeaderboardEntry, ParticipantId, WorkshopSession};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared store observed by every workshop instance
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// Current session, `None` when the remote has none
    async fn fetch_session(&self) -> Result<Option<WorkshopSession>, RemoteError>;

    /// Replace the remote session with `session`
    async fn push_session(&self, session: &WorkshopSession) -> Result<(), RemoteError>;

    /// All leaderboard rows
    async fn fetch_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, RemoteError>;

    /// Upsert one participant's row
    async fn push_leaderboard_entry(&self, entry: &LeaderboardEntry) -> Result<(), RemoteError>;
}

/// Remote for instances running without a shared backend
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRemote;

#[async_trait]
impl RemoteStore for OfflineRemote {
    async fn fetch_session(&self) -> Result<Option<WorkshopSession>, RemoteError> {
        Ok(None)
    }

    async fn push_session(&self, _session: &WorkshopSession) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn fetch_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, RemoteError> {
        Ok(Vec::new())
    }

    async fn push_leaderboard_entry(&self, _entry: &LeaderboardEntry) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// In-process remote shared by several engine instances
///
/// Failure injection makes every call return [`RemoteError::Unavailable`] until
/// switched off again.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    session: RwLock<Option<WorkshopSession>>,
    leaderboard: RwLock<IndexMap<ParticipantId, LeaderboardEntry>>,
    failing: AtomicBool,
    session_pushes: AtomicUsize,
    session_fetches: AtomicUsize,
    entry_pushes: AtomicUsize,
}

impl MemoryRemote {
    /// Empty remote
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote pre-seeded with a session
    #[must_use]
    pub fn with_session(session: WorkshopSession) -> Self {
        let remote = Self::new();
        *remote.session.write() = Some(session);
        remote
    }

    /// Toggle failure injection
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored session
    #[must_use]
    pub fn session(&self) -> Option<WorkshopSession> {
        self.session.read().clone()
    }

    /// Stored row for a participant
    #[must_use]
    pub fn entry(&self, participant: &ParticipantId) -> Option<LeaderboardEntry> {
        self.leaderboard.read().get(participant).cloned()
    }

    /// Seed a row as if another instance had pushed it
    pub fn seed_entry(&self, entry: LeaderboardEntry) {
        self.leaderboard
            .write()
            .insert(entry.participant_id.clone(), entry);
    }

    /// Successful session pushes so far
    #[must_use]
    pub fn session_pushes(&self) -> usize {
        self.session_pushes.load(Ordering::SeqCst)
    }

    /// Session fetch attempts so far, failed ones included
    #[must_use]
    pub fn session_fetches(&self) -> usize {
        self.session_fetches.load(Ordering::SeqCst)
    }

    /// Successful leaderboard row pushes so far
    #[must_use]
    pub fn entry_pushes(&self) -> usize {
        self.entry_pushes.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RemoteError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_session(&self) -> Result<Option<WorkshopSession>, RemoteError> {
        self.session_fetches.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.session.read().clone())
    }

    async fn push_session(&self, session: &WorkshopSession) -> Result<(), RemoteError> {
        self.check()?;
        *self.session.write() = Some(session.clone());
        self.session_pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, RemoteError> {
        self.check()?;
        Ok(self.leaderboard.read().values().cloned().collect())
    }

    async fn push_leaderboard_entry(&self, entry: &LeaderboardEntry) -> Result<(), RemoteError> {
        self.check()?;
        self.seed_entry(entry.clone());
        self.entry_pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
