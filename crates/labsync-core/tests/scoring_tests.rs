//! Step, hint and solution scoring through the engine

use labsync_core::{
    AccessError, ConfigError, EngineConfig, LabSyncError, StepOutcome, WorkshopEngine, WorkshopOptions,
};
use labsync_model::{LabNumber, LeaderboardEntry, ParticipantId};
use labsync_test_utils::{participant, sample_catalog, step, TestWorkshop, UNSCORED};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn row(w: &TestWorkshop, p: &ParticipantId) -> LeaderboardEntry {
    w.engine
        .ranked_leaderboard()
        .into_iter()
        .find(|e| &e.participant_id == p)
        .unwrap()
}

#[tokio::test]
async fn solution_reveal_then_assisted_completion() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");

    for id in ["lab1-connect", "lab1-create-key", "lab1-encrypt"] {
        let report = w.engine.complete_step(&p, &step(id), false).unwrap();
        assert_eq!(report.points, 10);
    }
    assert_eq!(w.engine.progress(&p).score(), 30);

    assert_eq!(w.engine.reveal_solution(&p, &step("lab1-verify")).unwrap(), -5);
    assert_eq!(w.engine.progress(&p).score(), 25);

    // help used earlier makes this completion assisted without the flag
    let report = w.engine.complete_step(&p, &step("lab1-verify"), false).unwrap();
    assert_eq!(
        report.outcome,
        StepOutcome::Completed {
            assisted: true,
            lab_started: false,
            lab_completed: true,
        }
    );
    assert_eq!(report.points, 5);
    assert_eq!(report.score, 30);

    let entry = row(&w, &p);
    assert_eq!(entry.score, 30);
    assert_eq!(entry.solutions_revealed, 1);
    assert_eq!(entry.completed_labs, vec![LabNumber(1)]);
}

#[tokio::test]
async fn completing_twice_scores_once() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");

    w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap();
    let again = w.engine.complete_step(&p, &step("lab1-connect"), true).unwrap();

    assert_eq!(again.outcome, StepOutcome::AlreadyDone);
    assert_eq!(again.points, 0);
    assert_eq!(again.score, 10);
    assert_eq!(w.engine.progress(&p).progress().steps_done(), 1);
}

#[tokio::test]
async fn hint_schedule_charges_each_index_once() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");
    w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap();

    let key = step("lab1-create-key");
    assert_eq!(w.engine.reveal_hint(&p, &key, 0).unwrap(), -1);
    assert_eq!(w.engine.reveal_hint(&p, &key, 1).unwrap(), -2);
    assert_eq!(w.engine.reveal_hint(&p, &key, 0).unwrap(), 0);
    assert_eq!(w.engine.progress(&p).score(), 7);
    assert_eq!(row(&w, &p).hints_used, 2);

    let report = w.engine.complete_step(&p, &key, false).unwrap();
    assert_eq!(report.points, 5);
    assert_eq!(report.score, 12);
}

#[tokio::test]
async fn solution_after_completion_costs_nothing() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");
    let connect = step("lab1-connect");

    w.engine.complete_step(&p, &connect, false).unwrap();
    assert_eq!(w.engine.reveal_solution(&p, &connect).unwrap(), 0);
    assert_eq!(w.engine.progress(&p).score(), 10);

    let entry = row(&w, &p);
    assert_eq!(entry.score, 10);
    assert_eq!(entry.solutions_revealed, 1);

    // an open step still pays
    assert_eq!(w.engine.reveal_solution(&p, &step("lab1-create-key")).unwrap(), -5);
    assert_eq!(w.engine.progress(&p).score(), 5);
}

#[tokio::test]
async fn hint_penalty_follows_position_not_order() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");
    w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap();

    let key = step("lab1-create-key");
    assert_eq!(w.engine.reveal_hint(&p, &key, 1).unwrap(), -2);
    assert_eq!(w.engine.reveal_hint(&p, &key, 0).unwrap(), -1);
    assert_eq!(w.engine.progress(&p).score(), 7);
}

#[test]
fn engine_refuses_unusable_config() {
    for config in [
        EngineConfig::default().with_heartbeat_secs(0),
        EngineConfig::default().with_session_refresh_secs(0),
        EngineConfig::default().with_metrics_capacity(0),
    ] {
        let err = WorkshopEngine::builder(config, Arc::new(sample_catalog()))
            .build()
            .unwrap_err();
        assert!(matches!(err, LabSyncError::Config(ConfigError::Invalid(_))), "{err}");
    }
}

#[tokio::test]
async fn penalties_clamp_at_zero() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");

    assert_eq!(w.engine.reveal_solution(&p, &step("lab1-connect")).unwrap(), 0);
    assert_eq!(w.engine.progress(&p).score(), 0);
    assert_eq!(row(&w, &p).score, 0);
}

#[tokio::test]
async fn session_without_template_uses_flat_scoring() {
    let w = TestWorkshop::started(WorkshopOptions::new("Acme"));
    let p = participant("ada@example.com");

    assert_eq!(w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap().points, 10);
    assert_eq!(w.engine.complete_step(&p, &step("lab1-create-key"), true).unwrap().points, 5);
}

#[tokio::test]
async fn disabled_gamification_scores_nothing() {
    let w = TestWorkshop::started(WorkshopOptions::new("Acme").with_template(UNSCORED));
    let p = participant("ada@example.com");

    assert_eq!(w.engine.complete_step(&p, &step("lab1-connect"), false).unwrap().points, 0);
    assert_eq!(w.engine.reveal_solution(&p, &step("lab1-encrypt")).unwrap(), 0);
    assert_eq!(w.engine.progress(&p).progress().steps_done(), 1);
}

#[tokio::test]
async fn ranking_orders_by_score_then_labs() {
    let w = TestWorkshop::gamified();
    let ada = participant("ada@example.com");
    let bob = participant("bob@example.com");
    let eve = participant("eve@example.com");

    w.finish_lab(&ada, "lab-1");
    w.engine.complete_step(&bob, &step("lab1-connect"), false).unwrap();
    for id in ["lab1-connect", "lab1-create-key", "lab1-encrypt", "lab1-verify"] {
        w.engine.complete_step(&eve, &step(id), false).unwrap();
    }

    let order: Vec<String> = w
        .engine
        .ranked_leaderboard()
        .into_iter()
        .map(|e| e.participant_id.to_string())
        .collect();
    assert_eq!(order, vec!["ada@example.com", "eve@example.com", "bob@example.com"]);
}

#[tokio::test]
async fn actions_need_enabled_labs() {
    let w = TestWorkshop::new();
    let p = participant("ada@example.com");
    assert!(matches!(
        w.engine.complete_step(&p, &step("lab1-connect"), false),
        Err(LabSyncError::NoSession)
    ));

    w.engine.facilitator().set_labs_enabled(false);
    assert!(matches!(
        w.engine.complete_step(&p, &step("lab1-connect"), false),
        Err(LabSyncError::Access(AccessError::LabsDisabled))
    ));

    w.engine.facilitator().set_labs_enabled(true);
    assert!(w.engine.complete_step(&p, &step("lab1-connect"), false).is_ok());
}

#[tokio::test]
async fn unknown_step_is_rejected() {
    let w = TestWorkshop::gamified();
    let p = participant("ada@example.com");
    let err = w.engine.complete_step(&p, &step("lab9-nowhere"), false).unwrap_err();
    assert!(matches!(err, LabSyncError::Access(AccessError::UnknownStep(_))));
    assert!(err.is_user_facing());
}
