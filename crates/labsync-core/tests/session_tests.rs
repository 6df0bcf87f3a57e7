//! Facilitator session lifecycle and remote mirroring

use labsync_core::{AccessError, ConfigError, EngineConfig, LabSyncError, WorkshopEngine, WorkshopOptions};
use labsync_model::{MongoSource, SessionPatch};
use labsync_test_utils::{participant, sample_catalog, step, TestWorkshop, GAMIFIED};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[tokio::test]
async fn switching_back_to_local_drops_the_connection_string() {
    let w = TestWorkshop::started(WorkshopOptions::new("Acme"));
    let facilitator = w.engine.facilitator();

    let atlas = facilitator
        .update_session(SessionPatch::new().source(
            MongoSource::Atlas,
            Some("mongodb+srv://cluster0.example.net".into()),
        ))
        .unwrap();
    assert_eq!(
        atlas.atlas_connection_string.as_deref(),
        Some("mongodb+srv://cluster0.example.net")
    );

    let local = facilitator
        .update_session(SessionPatch::new().source(MongoSource::Local, None))
        .unwrap();
    assert_eq!(local.mongodb_source, MongoSource::Local);
    assert_eq!(local.atlas_connection_string, None);
}

#[tokio::test]
async fn invalid_workshop_options_change_nothing() {
    let w = TestWorkshop::gamified();
    let before = w.engine.session().unwrap();

    let missing = w
        .engine
        .facilitator()
        .start_new_workshop(WorkshopOptions::new("Globex").with_atlas("   "))
        .unwrap_err();
    assert!(matches!(
        missing,
        LabSyncError::Config(ConfigError::MissingConnectionString)
    ));

    let malformed = w
        .engine
        .facilitator()
        .start_new_workshop(WorkshopOptions::new("Globex").with_atlas("https://cluster0.example.net"))
        .unwrap_err();
    assert!(matches!(
        malformed,
        LabSyncError::Config(ConfigError::MalformedConnectionString(_))
    ));

    let unknown = w
        .engine
        .facilitator()
        .start_new_workshop(WorkshopOptions::new("Globex").with_template("nope"))
        .unwrap_err();
    assert!(matches!(unknown, LabSyncError::Config(ConfigError::UnknownTemplate(_))));

    assert_eq!(w.engine.session(), Some(before));
}

#[tokio::test]
async fn new_workshop_archives_the_previous_leaderboard() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");
    w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap();
    let first = w.engine.session().unwrap();
    assert_eq!(w.engine.facilitator().participant_count(), 1);

    let second = w
        .engine
        .facilitator()
        .start_new_workshop(WorkshopOptions::new("Globex").with_template(GAMIFIED))
        .unwrap();
    assert_ne!(second.id, first.id);
    assert!(second.labs_enabled);
    assert!(w.engine.ranked_leaderboard().is_empty());

    let history = w.engine.facilitator().workshop_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].session_id, first.id);
    assert_eq!(history[0].customer_name, "Acme");
    assert_eq!(history[0].entries[0].participant_id, p);
    assert_eq!(history[0].entries[0].score, 10);

    // an empty leaderboard is not archived again
    w.engine
        .facilitator()
        .start_new_workshop(WorkshopOptions::new("Initech"))
        .unwrap();
    assert_eq!(w.engine.facilitator().workshop_history().len(), 1);
}

#[tokio::test]
async fn blank_customer_gets_a_default_label() {
    let w = TestWorkshop::started(WorkshopOptions::new("  "));
    let session = w.engine.session().unwrap();
    assert_eq!(session.customer_name, "Workshop");
    assert_eq!(session.workshop_date.to_string(), "2026-01-01");
}

#[tokio::test]
async fn session_and_rows_are_mirrored_to_the_remote() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");
    w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap();
    w.engine.flush().await;

    assert_eq!(w.remote.session(), w.engine.session());
    assert_eq!(w.remote.entry(&p).map(|e| e.score), Some(10));
}

#[tokio::test]
async fn participant_instance_follows_the_facilitator() {
    let facilitator = TestWorkshop::gamified();
    facilitator.engine.flush().await;

    let participant_engine = WorkshopEngine::builder(EngineConfig::default(), Arc::new(sample_catalog()))
        .with_remote(facilitator.remote.clone())
        .build()
        .unwrap();
    participant_engine.refresh_session();
    participant_engine.flush().await;
    assert_eq!(participant_engine.session(), facilitator.engine.session());

    facilitator.engine.facilitator().set_labs_enabled(false);
    facilitator.engine.flush().await;
    participant_engine.refresh_session();
    participant_engine.flush().await;

    let p = participant("ada@example.com");
    let err = participant_engine
        .complete_step(&p, &step("lab1-connect"), false)
        .unwrap_err();
    assert!(matches!(err, LabSyncError::Access(AccessError::LabsDisabled)));
}

#[tokio::test]
async fn remote_outage_does_not_block_participants() {
    let w = TestWorkshop::gamified();
    w.remote.set_failing(true);
    let p = participant("ada@example.com");

    let report = w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap();
    w.engine.flush().await;
    assert_eq!(report.score, 10);
    assert_eq!(w.engine.refresh_leaderboard().await, 0);
    assert_eq!(w.engine.ranked_leaderboard()[0].score, 10);
}

#[tokio::test]
async fn file_store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::default().with_storage_path(dir.path().join("labsync.json"));
    let p = participant("ada@example.com");

    let session_id = {
        let engine = WorkshopEngine::builder(config.clone(), Arc::new(sample_catalog()))
            .build()
            .unwrap();
        let session = engine
            .facilitator()
            .start_new_workshop(WorkshopOptions::new("Acme").with_template(GAMIFIED))
            .unwrap();
        engine.complete_step(&p, &step("lab1-connect"), false).unwrap();
        engine.flush().await;
        session.id
    };

    let engine = WorkshopEngine::builder(config, Arc::new(sample_catalog()))
        .build()
        .unwrap();
    assert_eq!(engine.session().map(|s| s.id), Some(session_id));
    let tracker = engine.progress(&p);
    assert!(tracker.progress().is_step_done(&step("lab1-connect")));
    assert_eq!(tracker.score(), 10);
    assert_eq!(engine.ranked_leaderboard()[0].score, 10);
}
