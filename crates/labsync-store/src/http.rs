//! HTTP remote store
//!
//! Routes on the workshop server:
//!
//! - `GET /api/workshop-session` answers `{ session }`, `null` when none exists
//! - `POST /api/workshop-session` stores `{ session }`
//! - `GET /api/leaderboard` answers `{ entries }`
//! - `POST /api/leaderboard/upsert` replaces one row with `{ email, entry }`
//!
//! The per-event routes under `/api/leaderboard/` (`add-points`,
//! `complete-lab`, ...) each apply a delta on the server. Rows here are
//! merged locally and pushed whole, so a delta would count points twice.

use crate::error::RemoteError;
use crate::remote::RemoteStore;
use async_trait::async_trait;
use labsync_model::{LeaderboardEntry, WorkshopSession};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SESSION_PATH: &str = "/api/workshop-session";
const LEADERBOARD_PATH: &str = "/api/leaderboard";
const LEADERBOARD_UPSERT_PATH: &str = "/api/leaderboard/upsert";

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    #[serde(default)]
    session: Option<WorkshopSession>,
}

#[derive(Debug, Serialize)]
struct SessionBody<'a> {
    session: &'a WorkshopSession,
}

#[derive(Debug, Deserialize)]
struct LeaderboardEnvelope {
    #[serde(default)]
    entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize)]
struct EntryBody<'a> {
    email: &'a str,
    entry: &'a LeaderboardEntry,
}

impl<'a> EntryBody<'a> {
    fn new(entry: &'a LeaderboardEntry) -> Self {
        Self {
            email: entry.participant_id.as_str(),
            entry,
        }
    }
}

/// Remote store backed by the workshop server's JSON endpoints
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create a client for `base_url`
    ///
    /// # Errors
    /// Returns [`RemoteError::Config`] when the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        Self::handle_response(response).await
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        Self::handle_response::<serde_json::Value>(response)
            .await
            .map(|_| ())
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Decode(e.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_session(&self) -> Result<Option<WorkshopSession>, RemoteError> {
        match self.get::<SessionEnvelope>(SESSION_PATH).await {
            Ok(envelope) => Ok(envelope.session),
            Err(RemoteError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn push_session(&self, session: &WorkshopSession) -> Result<(), RemoteError> {
        self.post(SESSION_PATH, &SessionBody { session }).await
    }

    async fn fetch_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, RemoteError> {
        let envelope: LeaderboardEnvelope = self.get(LEADERBOARD_PATH).await?;
        Ok(envelope.entries)
    }

    async fn push_leaderboard_entry(&self, entry: &LeaderboardEntry) -> Result<(), RemoteError> {
        self.post(LEADERBOARD_UPSERT_PATH, &EntryBody::new(entry)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labsync_model::ParticipantId;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let store = HttpRemoteStore::new("http://localhost:5173/", Duration::from_secs(5)).unwrap();
        assert_eq!(store.base_url, "http://localhost:5173");
    }

    #[test]
    fn null_session_envelope_decodes_to_none() {
        let envelope: SessionEnvelope =
            serde_json::from_str(r#"{"success":true,"session":null}"#).unwrap();
        assert!(envelope.session.is_none());
    }

    #[test]
    fn row_push_wraps_the_entry() {
        let entry = LeaderboardEntry::new(ParticipantId::new("a@x.io"), 0);
        let body = serde_json::to_value(EntryBody::new(&entry)).unwrap();
        assert_eq!(body["email"], "a@x.io");
        assert_eq!(body["entry"]["score"], 0);
        assert!(LEADERBOARD_UPSERT_PATH.starts_with(LEADERBOARD_PATH));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let store = HttpRemoteStore::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = store.fetch_leaderboard().await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)));
    }
}
