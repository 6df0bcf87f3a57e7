//! Gamification scorer
//!
//! Converts a progress event into a signed point delta. Rules, in priority order:
//!
//! 1. Scoring disabled for the template: 0
//! 2. Unassisted step: `+base`
//! 3. Assisted step: `+floor(base / 2)`
//! 4. Flag captured: `+flag.points` (0 when unset)
//! 5. Solution revealed before the step is completed: `-solution penalty`
//! 6. Hint revealed: `-hint penalty` for the hint's position
//!
//! Templates without gamification settings use the legacy flat 10/5 step scoring.
//! Clamping at zero is the caller's job.

use crate::config::PenaltyConfig;
use labsync_model::{
    FlagDefinition, GamificationConfig, GamificationEvent, GamificationEventKind, WorkshopTemplate,
    DEFAULT_BASE_POINTS,
};

/// Extra facts the scorer needs for some event kinds
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreContext<'a> {
    /// Definition of the captured flag
    pub flag: Option<&'a FlagDefinition>,
    /// The step was already completed when the event happened
    pub step_completed: bool,
}

impl<'a> ScoreContext<'a> {
    /// Attach the captured flag
    #[inline]
    #[must_use]
    pub fn with_flag(mut self, flag: &'a FlagDefinition) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Mark whether the step was already done
    #[inline]
    #[must_use]
    pub fn after_completion(mut self, completed: bool) -> Self {
        self.step_completed = completed;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rules {
    Template(GamificationConfig),
    Legacy,
}

/// Point rules for the active template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scorer {
    rules: Rules,
    penalties: PenaltyConfig,
}

impl Scorer {
    /// Legacy flat scoring
    #[must_use]
    pub fn legacy(penalties: PenaltyConfig) -> Self {
        Self {
            rules: Rules::Legacy,
            penalties,
        }
    }

    /// Template-level scoring
    #[must_use]
    pub fn with_config(config: GamificationConfig, penalties: PenaltyConfig) -> Self {
        Self {
            rules: Rules::Template(config),
            penalties,
        }
    }

    /// Scorer for a session's template, falling back to legacy rules
    #[must_use]
    pub fn for_template(template: Option<&WorkshopTemplate>, penalties: PenaltyConfig) -> Self {
        match template.and_then(|t| t.gamification) {
            Some(config) => Self::with_config(config, penalties),
            None => Self::legacy(penalties),
        }
    }

    /// Is scoring switched on
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self.rules {
            Rules::Template(config) => config.enabled,
            Rules::Legacy => true,
        }
    }

    /// Is this the legacy rule set
    #[inline]
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.rules == Rules::Legacy
    }

    fn base_points(&self) -> u32 {
        match self.rules {
            Rules::Template(config) => config.base_points(),
            Rules::Legacy => DEFAULT_BASE_POINTS,
        }
    }

    fn quest_bonus(&self) -> u32 {
        match self.rules {
            Rules::Template(config) => config.bonus_points_per_quest.unwrap_or(0),
            Rules::Legacy => 0,
        }
    }

    /// Point delta for `event`
    #[must_use]
    pub fn score(&self, event: &GamificationEvent, ctx: ScoreContext<'_>) -> i64 {
        if !self.is_enabled() {
            return 0;
        }
        let points = match event.kind {
            GamificationEventKind::StepCompleted if event.assisted => self.base_points() / 2,
            GamificationEventKind::StepCompleted => self.base_points(),
            GamificationEventKind::FlagCaptured => ctx.flag.map_or(0, FlagDefinition::point_value),
            GamificationEventKind::QuestCompleted => self.quest_bonus(),
            GamificationEventKind::LabCompleted => 0,
            GamificationEventKind::SolutionRevealed if ctx.step_completed => 0,
            GamificationEventKind::SolutionRevealed => return -i64::from(self.penalties.solution),
            GamificationEventKind::HintRevealed => {
                return -i64::from(self.penalties.hint(event.hint_index.unwrap_or(0)));
            }
        };
        i64::from(points)
    }
}
