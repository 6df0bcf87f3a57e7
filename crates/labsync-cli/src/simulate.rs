//! Scripted multi-participant workshop run
//!
//! Participants work through the session's labs (or quests in challenge mode) at
//! different depths. Odd participants peek at hints, every third one reveals a
//! solution, and failed checks are retried once before the step is completed as
//! assisted.

use anyhow::{Context, Result};
use labsync_core::{session_labs, session_quests, CheckParams, WorkshopEngine};
use labsync_model::{FlagId, ManualClock, ParticipantId, StepDefinition};
use tracing::{debug, info};

/// Key alias every simulated participant uses
const KEY_ALIAS: &str = "alias/labsync-demo";

/// Knobs for one simulated run
#[derive(Debug, Clone, Copy)]
pub(crate) struct Plan {
    pub(crate) participants: usize,
    /// Simulated minutes between consecutive actions of a participant
    pub(crate) minutes_per_step: i64,
}

pub(crate) fn participant(index: usize) -> ParticipantId {
    ParticipantId::new(format!("participant{index}@example.com"))
}

/// Drive every participant through the active session
pub(crate) async fn run(engine: &WorkshopEngine, clock: &ManualClock, plan: Plan) -> Result<()> {
    let session = engine.session().context("no workshop session is active")?;
    for index in 1..=plan.participants {
        let who = participant(index);
        if session.is_challenge() {
            run_quests(engine, clock, plan, &who, index).await?;
        } else {
            run_labs(engine, clock, plan, &who, index).await?;
        }
        engine.heartbeat(&who);
    }
    engine.flush().await;
    info!(participants = plan.participants, mode = %session.mode, "simulation finished");
    Ok(())
}

async fn run_labs(
    engine: &WorkshopEngine,
    clock: &ManualClock,
    plan: Plan,
    who: &ParticipantId,
    index: usize,
) -> Result<()> {
    let session = engine.session().context("no workshop session is active")?;
    let labs: Vec<_> = session_labs(engine.catalog(), &session).into_iter().cloned().collect();
    let depth = (index % labs.len().max(1)) + 1;

    for lab in labs.iter().take(depth) {
        engine.start_lab(who, lab.number)?;
        let steps: Vec<&StepDefinition> = lab.required_steps(session.mode).collect();
        for (position, step) in steps.iter().enumerate() {
            clock.advance_secs(plan.minutes_per_step * 60);
            engine.heartbeat(who);
            if index % 2 == 1 && !step.hints.is_empty() {
                engine.reveal_hint(who, &step.id, 0)?;
            }
            if index % 3 == 0 && position + 1 == steps.len() {
                engine.reveal_solution(who, &step.id)?;
            }
            complete(engine, who, step).await?;
        }
    }
    Ok(())
}

async fn complete(engine: &WorkshopEngine, who: &ParticipantId, step: &StepDefinition) -> Result<()> {
    if step.verification_id.is_none() {
        engine.complete_step(who, &step.id, false)?;
        return Ok(());
    }
    let params = CheckParams::new().with_alias(KEY_ALIAS);
    for attempt in 1..=2 {
        let outcome = engine
            .verify_step(who, &step.id, params.clone())
            .await
            .with_context(|| format!("verifying {}", step.id))?;
        if outcome.success {
            return Ok(());
        }
        debug!(participant = %who, step = %step.id, attempt, message = %outcome.message, "check failed");
    }
    engine.complete_step(who, &step.id, true)?;
    Ok(())
}

async fn run_quests(
    engine: &WorkshopEngine,
    clock: &ManualClock,
    plan: Plan,
    who: &ParticipantId,
    index: usize,
) -> Result<()> {
    let session = engine.session().context("no workshop session is active")?;
    let quests: Vec<_> = session_quests(engine.catalog(), &session).into_iter().cloned().collect();
    let depth = (index % quests.len().max(1)) + 1;

    for quest in quests.iter().take(depth) {
        let optional = quest.optional_flag_ids.iter().filter(|_| index % 2 == 0);
        let flags: Vec<&FlagId> = quest.required_flag_ids.iter().chain(optional).collect();
        for flag in flags {
            clock.advance_secs(plan.minutes_per_step * 60);
            for _ in 0..2 {
                let (outcome, report) = engine
                    .verify_flag(who, flag, CheckParams::new())
                    .await
                    .with_context(|| format!("verifying {flag}"))?;
                if outcome.success {
                    debug!(participant = %who, flag = %flag, points = report.points, "flag captured");
                    break;
                }
            }
        }
    }
    Ok(())
}
