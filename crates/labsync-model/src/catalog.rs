//! Content definitions resolved from the external catalog

use crate::ids::{FlagId, LabId, LabNumber, QuestId, StepId, TemplateId};
use crate::session::WorkshopMode;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Points per unassisted step when a template does not say otherwise
pub const DEFAULT_BASE_POINTS: u32 = 10;

/// One step of a lab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Catalog-unique step id
    pub id: StepId,
    /// Display title
    pub title: String,
    /// Modes in which the step counts; empty means every mode
    #[serde(default)]
    pub modes: Vec<WorkshopMode>,
    /// Hints in reveal order; the position decides the penalty
    #[serde(default)]
    pub hints: Vec<String>,
    /// Check run by the verification oracle, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_id: Option<String>,
    /// Extra content resolved through the enhancement registry, e.g. `rich-query.compound`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement_id: Option<String>,
}

impl StepDefinition {
    /// Step counted in every mode, with no hints or check
    #[must_use]
    pub fn new(id: impl Into<StepId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            modes: Vec::new(),
            hints: Vec::new(),
            verification_id: None,
            enhancement_id: None,
        }
    }

    /// Restrict to the given modes
    #[inline]
    #[must_use]
    pub fn with_modes(mut self, modes: impl IntoIterator<Item = WorkshopMode>) -> Self {
        self.modes = modes.into_iter().collect();
        self
    }

    /// With hint texts
    #[inline]
    #[must_use]
    pub fn with_hints(mut self, hints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.hints = hints.into_iter().map(Into::into).collect();
        self
    }

    /// With verification check
    #[inline]
    #[must_use]
    pub fn with_verification(mut self, check: impl Into<String>) -> Self {
        self.verification_id = Some(check.into());
        self
    }

    /// With enhancement reference
    #[inline]
    #[must_use]
    pub fn with_enhancement(mut self, id: impl Into<String>) -> Self {
        self.enhancement_id = Some(id.into());
        self
    }

    /// Does the step count toward completion in `mode`
    #[inline]
    #[must_use]
    pub fn applies_to(&self, mode: WorkshopMode) -> bool {
        self.modes.is_empty() || self.modes.contains(&mode)
    }
}

/// An ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabDefinition {
    /// Catalog-unique lab id
    pub id: LabId,
    /// Position in the unlock chain
    pub number: LabNumber,
    /// Display title
    pub title: String,
    /// Steps in presentation order
    pub steps: Vec<StepDefinition>,
    /// Labs that must be completed first; `None` falls back to the default rule table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<Vec<LabNumber>>,
}

impl LabDefinition {
    /// Lab without steps
    #[must_use]
    pub fn new(id: impl Into<LabId>, number: LabNumber, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number,
            title: title.into(),
            steps: Vec::new(),
            prerequisites: None,
        }
    }

    /// Append a step
    #[inline]
    #[must_use]
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Declare prerequisites explicitly (an empty list means always accessible)
    #[inline]
    #[must_use]
    pub fn with_prerequisites(mut self, labs: impl IntoIterator<Item = LabNumber>) -> Self {
        self.prerequisites = Some(labs.into_iter().collect());
        self
    }

    /// Steps required for completion in `mode`
    pub fn required_steps(&self, mode: WorkshopMode) -> impl Iterator<Item = &StepDefinition> + '_ {
        self.steps.iter().filter(move |s| s.applies_to(mode))
    }

    /// Look up a step by id
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| &s.id == id)
    }
}

/// Whether a flag is listed before capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagVisibility {
    /// Listed from the start
    #[default]
    Visible,
    /// Listed only once captured
    Hidden,
}

/// Challenge-mode objective confirmed by the verification oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    /// Catalog-unique flag id
    pub id: FlagId,
    /// Quest the flag belongs to
    pub quest_id: QuestId,
    /// Display title
    pub title: String,
    /// Capture reward; the template base points otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    /// Whether the flag is listed before capture
    #[serde(default)]
    pub visibility: FlagVisibility,
    /// Check confirming the capture, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_id: Option<String>,
}

impl FlagDefinition {
    /// Visible flag worth the template base points
    #[must_use]
    pub fn new(id: impl Into<FlagId>, quest_id: impl Into<QuestId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            quest_id: quest_id.into(),
            title: title.into(),
            points: None,
            visibility: FlagVisibility::Visible,
            verification_id: None,
        }
    }

    /// With point value
    #[inline]
    #[must_use]
    pub fn with_points(mut self, points: u32) -> Self {
        self.points = Some(points);
        self
    }

    /// With verification check
    #[inline]
    #[must_use]
    pub fn with_verification(mut self, check: impl Into<String>) -> Self {
        self.verification_id = Some(check.into());
        self
    }

    /// Points awarded on capture, zero when unset
    #[inline]
    #[must_use]
    pub fn point_value(&self) -> u32 {
        self.points.unwrap_or(0)
    }
}

/// Challenge-mode unit gated by capturing flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestDefinition {
    /// Catalog-unique quest id
    pub id: QuestId,
    /// Display title
    pub title: String,
    /// Flags that complete the quest once all are captured
    #[serde(default)]
    pub required_flag_ids: Vec<FlagId>,
    /// Extra objectives that never gate completion
    #[serde(default)]
    pub optional_flag_ids: Vec<FlagId>,
}

impl QuestDefinition {
    /// Quest without flags
    #[must_use]
    pub fn new(id: impl Into<QuestId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            required_flag_ids: Vec::new(),
            optional_flag_ids: Vec::new(),
        }
    }

    /// Add flags needed for completion
    #[inline]
    #[must_use]
    pub fn with_required(mut self, flags: impl IntoIterator<Item = impl Into<FlagId>>) -> Self {
        self.required_flag_ids = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Add flags that score but are not needed
    #[inline]
    #[must_use]
    pub fn with_optional(mut self, flags: impl IntoIterator<Item = impl Into<FlagId>>) -> Self {
        self.optional_flag_ids = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Every required flag is captured
    ///
    /// A quest with no required flags is complete from the start.
    #[must_use]
    pub fn is_completed_by(&self, captured: &IndexSet<FlagId>) -> bool {
        self.required_flag_ids.iter().all(|f| captured.contains(f))
    }

    /// Does this quest declare the flag, required or optional
    #[must_use]
    pub fn declares(&self, flag: &FlagId) -> bool {
        self.required_flag_ids.contains(flag) || self.optional_flag_ids.contains(flag)
    }
}

/// Scoring switches carried by a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationConfig {
    /// Master switch; `false` scores nothing
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Points per completed step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_points_per_step: Option<u32>,
    /// Points per completed quest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_points_per_quest: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl Default for GamificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_points_per_step: None,
            bonus_points_per_quest: None,
        }
    }
}

impl GamificationConfig {
    /// Scoring switched off for the template
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the per-step points
    #[inline]
    #[must_use]
    pub fn with_base_points(mut self, points: u32) -> Self {
        self.base_points_per_step = Some(points);
        self
    }

    /// Set the per-quest bonus
    #[inline]
    #[must_use]
    pub fn with_quest_bonus(mut self, points: u32) -> Self {
        self.bonus_points_per_quest = Some(points);
        self
    }

    /// Effective points per unassisted step
    #[inline]
    #[must_use]
    pub fn base_points(&self) -> u32 {
        self.base_points_per_step.unwrap_or(DEFAULT_BASE_POINTS)
    }
}

/// Named bundle of labs and quests a facilitator picks for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopTemplate {
    /// Catalog-unique template id
    pub id: TemplateId,
    /// Display name
    pub name: String,
    /// Mode used when the facilitator picks none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<WorkshopMode>,
    /// Labs a session from this template contains
    #[serde(default)]
    pub lab_ids: Vec<LabId>,
    /// Quests a session from this template contains
    #[serde(default)]
    pub quest_ids: Vec<QuestId>,
    /// Scoring switches; flat scoring when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamification: Option<GamificationConfig>,
}

impl WorkshopTemplate {
    /// Empty template without gamification
    #[must_use]
    pub fn new(id: impl Into<TemplateId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            default_mode: None,
            lab_ids: Vec::new(),
            quest_ids: Vec::new(),
            gamification: None,
        }
    }

    /// Set the lab list
    #[inline]
    #[must_use]
    pub fn with_labs(mut self, labs: impl IntoIterator<Item = impl Into<LabId>>) -> Self {
        self.lab_ids = labs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the quest list
    #[inline]
    #[must_use]
    pub fn with_quests(mut self, quests: impl IntoIterator<Item = impl Into<QuestId>>) -> Self {
        self.quest_ids = quests.into_iter().map(Into::into).collect();
        self
    }

    /// Enable scoring
    #[inline]
    #[must_use]
    pub fn with_gamification(mut self, config: GamificationConfig) -> Self {
        self.gamification = Some(config);
        self
    }

    /// Set the default mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: WorkshopMode) -> Self {
        self.default_mode = Some(mode);
        self
    }
}
