//! Cache-then-sync behavior of the session store

use labsync_model::{MongoSource, SessionPatch, WorkshopSession};
use labsync_store::{
    keys, CachedSessionStore, LocalStore, LocalStoreExt, MemoryLocalStore, MemoryRemote,
    SessionStore,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn session(customer: &str) -> WorkshopSession {
    let date = WorkshopSession::parse_date("2026-05-20").unwrap();
    WorkshopSession::new(customer, date, 1_000)
}

#[tokio::test]
async fn write_is_visible_immediately_and_mirrored_later() {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(MemoryRemote::new());
    let store = CachedSessionStore::start(local.clone(), remote.clone());

    let s = session("Acme");
    store.write(s.clone());
    assert_eq!(store.read(), Some(s.clone()));
    assert_eq!(local.load::<WorkshopSession>(keys::SESSION).unwrap(), Some(s.clone()));

    store.flush().await;
    assert_eq!(remote.session(), Some(s));
    assert_eq!(remote.session_pushes(), 1);
}

#[tokio::test]
async fn miss_returns_none_then_fills_from_remote() {
    let remote = Arc::new(MemoryRemote::with_session(session("Remote Co")));
    let store = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());

    assert_eq!(store.read(), None);
    // second miss while the first fetch is outstanding does not enqueue another
    assert_eq!(store.read(), None);
    store.flush().await;

    let loaded = store.read().expect("filled from remote");
    assert_eq!(loaded.customer_name, "Remote Co");
    assert_eq!(remote.session_fetches(), 1);
}

#[tokio::test]
async fn local_write_wins_over_late_fetch() {
    let remote = Arc::new(MemoryRemote::with_session(session("Stale")));
    let store = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());

    assert_eq!(store.read(), None);
    store.write(session("Fresh"));
    store.flush().await;

    assert_eq!(store.read().unwrap().customer_name, "Fresh");
    assert_eq!(remote.session().unwrap().customer_name, "Fresh");
}

#[tokio::test]
async fn remote_failure_keeps_local_authoritative() {
    let remote = Arc::new(MemoryRemote::new());
    remote.set_failing(true);
    let store = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());

    store.write(session("Acme"));
    let updated = store
        .update(SessionPatch::new().labs_enabled(true))
        .expect("session exists");
    store.flush().await;

    assert!(updated.labs_enabled);
    assert!(store.read().unwrap().labs_enabled);
    assert_eq!(remote.session(), None);
    assert_eq!(remote.session_pushes(), 0);
}

#[tokio::test]
async fn update_without_session_is_ignored() {
    let store = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), Arc::new(MemoryRemote::new()));
    assert_eq!(store.update(SessionPatch::new().labs_enabled(true)), None);
}

#[tokio::test]
async fn source_switch_round_trip_clears_connection_string() {
    let remote = Arc::new(MemoryRemote::new());
    let store = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());
    store.write(session("Acme"));

    store.update(SessionPatch::new().source(
        MongoSource::Atlas,
        Some("mongodb+srv://user:pw@cluster0.example.net".into()),
    ));
    assert!(store.read().unwrap().atlas_connection_string.is_some());

    store.update(SessionPatch::new().source(MongoSource::Local, None));
    store.flush().await;

    let current = store.read().unwrap();
    assert_eq!(current.mongodb_source, MongoSource::Local);
    assert_eq!(current.atlas_connection_string, None);
    assert_eq!(remote.session().unwrap().atlas_connection_string, None);
}

#[tokio::test]
async fn cached_session_survives_restart() {
    let local: Arc<dyn LocalStore> = Arc::new(MemoryLocalStore::new());
    let s = session("Acme");
    {
        let store = CachedSessionStore::start(Arc::clone(&local), Arc::new(MemoryRemote::new()));
        store.write(s.clone());
    }
    let remote = Arc::new(MemoryRemote::new());
    let store = CachedSessionStore::start(local, remote.clone());
    assert_eq!(store.read(), Some(s));
    store.flush().await;
    assert_eq!(remote.session_fetches(), 0);
}

#[tokio::test]
async fn refresh_picks_up_another_instances_session() {
    let remote = Arc::new(MemoryRemote::new());
    let facilitator = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());
    let participant = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());

    facilitator.write(session("First"));
    facilitator.flush().await;
    assert_eq!(participant.read(), None);
    participant.flush().await;
    assert_eq!(participant.read().unwrap().customer_name, "First");

    let second = session("Second");
    facilitator.write(second.clone());
    facilitator.flush().await;
    // a cached session is not re-fetched on read
    participant.read();
    participant.flush().await;
    assert_eq!(participant.read().unwrap().customer_name, "First");

    participant.refresh();
    participant.flush().await;
    assert_eq!(participant.read(), Some(second));

    facilitator.update(SessionPatch::new().labs_enabled(true));
    facilitator.flush().await;
    participant.refresh();
    participant.flush().await;
    assert!(participant.read().unwrap().labs_enabled);
}

#[tokio::test]
async fn refresh_keeps_an_unpushed_local_write() {
    let remote = Arc::new(MemoryRemote::with_session(session("Remote Co")));
    let store = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());

    remote.set_failing(true);
    store.write(session("Local Co"));
    store.refresh();
    store.flush().await;
    assert_eq!(store.read().unwrap().customer_name, "Local Co");
    assert_eq!(remote.session().unwrap().customer_name, "Remote Co");

    // once the remote is back the pending write is pushed instead of overwritten
    remote.set_failing(false);
    store.refresh();
    store.flush().await;
    assert_eq!(store.read().unwrap().customer_name, "Local Co");
    assert_eq!(remote.session().unwrap().customer_name, "Local Co");
    assert_eq!(remote.session_fetches(), 0);

    store.refresh();
    store.flush().await;
    assert_eq!(remote.session_fetches(), 1);
    assert_eq!(store.read().unwrap().customer_name, "Local Co");
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_follows_the_remote() {
    let remote = Arc::new(MemoryRemote::with_session(session("First")));
    let store = Arc::new(CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone()));
    store.read();
    store.flush().await;
    assert_eq!(store.read().unwrap().customer_name, "First");

    let _refresh = store.spawn_refresh(Duration::from_secs(10));
    let other = CachedSessionStore::start(Arc::new(MemoryLocalStore::new()), remote.clone());
    other.write(session("Second"));
    other.flush().await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    store.flush().await;
    assert_eq!(store.read().unwrap().customer_name, "Second");
}
