//! Content catalog contract
//!
//! The catalog is external and read-only. [`StaticCatalog`] is the in-process
//! implementation used by the CLI and tests; it can also be loaded from JSON.

use labsync_model::{
    FlagDefinition, FlagId, LabDefinition, LabId, LabNumber, QuestDefinition, QuestId, StepDefinition,
    StepId, TemplateId, WorkshopSession, WorkshopTemplate,
};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Resolves content identifiers to definitions
pub trait ContentCatalog: Send + Sync + Debug {
    /// Every lab, in lab-number order
    fn labs(&self) -> &[LabDefinition];

    /// Every quest, in play order
    fn quests(&self) -> &[QuestDefinition];

    /// Flag by id
    fn flag(&self, id: &FlagId) -> Option<&FlagDefinition>;

    /// Template by id
    fn template(&self, id: &TemplateId) -> Option<&WorkshopTemplate>;

    /// Lab by number
    fn lab(&self, number: LabNumber) -> Option<&LabDefinition> {
        self.labs().iter().find(|l| l.number == number)
    }

    /// Lab by id
    fn lab_by_id(&self, id: &LabId) -> Option<&LabDefinition> {
        self.labs().iter().find(|l| &l.id == id)
    }

    /// Quest by id
    fn quest(&self, id: &QuestId) -> Option<&QuestDefinition> {
        self.quests().iter().find(|q| &q.id == id)
    }

    /// Lab containing a step, with the step itself
    fn step(&self, id: &StepId) -> Option<(&LabDefinition, &StepDefinition)> {
        self.labs()
            .iter()
            .find_map(|lab| lab.step(id).map(|step| (lab, step)))
    }

    /// Quest declaring a flag
    fn quest_for_flag(&self, flag: &FlagId) -> Option<&QuestDefinition> {
        self.quests().iter().find(|q| q.declares(flag))
    }
}

/// Labs in play for a session: its selection, or the whole catalog
#[must_use]
pub fn session_labs<'a>(catalog: &'a dyn ContentCatalog, session: &WorkshopSession) -> Vec<&'a LabDefinition> {
    if session.lab_ids.is_empty() {
        catalog.labs().iter().collect()
    } else {
        session
            .lab_ids
            .iter()
            .filter_map(|id| catalog.lab_by_id(id))
            .collect()
    }
}

/// Quests in play for a session, in play order
#[must_use]
pub fn session_quests<'a>(catalog: &'a dyn ContentCatalog, session: &WorkshopSession) -> Vec<&'a QuestDefinition> {
    if session.quest_ids.is_empty() {
        catalog.quests().iter().collect()
    } else {
        session
            .quest_ids
            .iter()
            .filter_map(|id| catalog.quest(id))
            .collect()
    }
}

/// Catalog held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticCatalog {
    #[serde(default)]
    labs: Vec<LabDefinition>,
    #[serde(default)]
    quests: Vec<QuestDefinition>,
    #[serde(default)]
    flags: Vec<FlagDefinition>,
    #[serde(default)]
    templates: Vec<WorkshopTemplate>,
}

impl StaticCatalog {
    /// Create empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON catalog document
    ///
    /// # Errors
    /// Returns the decode error for malformed documents
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut catalog: Self = serde_json::from_str(raw)?;
        catalog.labs.sort_by_key(|l| l.number);
        Ok(catalog)
    }

    /// With lab, kept in lab-number order
    #[must_use]
    pub fn with_lab(mut self, lab: LabDefinition) -> Self {
        self.labs.retain(|l| l.number != lab.number);
        self.labs.push(lab);
        self.labs.sort_by_key(|l| l.number);
        self
    }

    /// With quest, appended to play order
    #[inline]
    #[must_use]
    pub fn with_quest(mut self, quest: QuestDefinition) -> Self {
        self.quests.push(quest);
        self
    }

    /// Add a flag
    #[inline]
    #[must_use]
    pub fn with_flag(mut self, flag: FlagDefinition) -> Self {
        self.flags.push(flag);
        self
    }

    /// Add a template
    #[inline]
    #[must_use]
    pub fn with_template(mut self, template: WorkshopTemplate) -> Self {
        self.templates.push(template);
        self
    }
}

impl ContentCatalog for StaticCatalog {
    fn labs(&self) -> &[LabDefinition] {
        &self.labs
    }

    fn quests(&self) -> &[QuestDefinition] {
        &self.quests
    }

    fn flag(&self, id: &FlagId) -> Option<&FlagDefinition> {
        self.flags.iter().find(|f| &f.id == id)
    }

    fn template(&self, id: &TemplateId) -> Option<&WorkshopTemplate> {
        self.templates.iter().find(|t| &t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_lab(
                LabDefinition::new("lab-2", LabNumber(2), "Two")
                    .with_step(StepDefinition::new("lab2-a", "A")),
            )
            .with_lab(
                LabDefinition::new("lab-1", LabNumber(1), "One")
                    .with_step(StepDefinition::new("lab1-a", "A")),
            )
            .with_quest(QuestDefinition::new("q1", "Q").with_required(["f1"]).with_optional(["f2"]))
    }

    #[test]
    fn labs_are_kept_in_number_order() {
        let c = catalog();
        let numbers: Vec<u32> = c.labs().iter().map(|l| l.number.value()).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn step_and_flag_lookup() {
        let c = catalog();
        let (lab, step) = c.step(&StepId::new("lab2-a")).unwrap();
        assert_eq!(lab.number, LabNumber(2));
        assert_eq!(step.title, "A");
        assert_eq!(c.quest_for_flag(&FlagId::new("f2")).unwrap().id, QuestId::new("q1"));
        assert!(c.quest_for_flag(&FlagId::new("nope")).is_none());
    }

    #[test]
    fn session_selection_filters_labs() {
        let c = catalog();
        let date = WorkshopSession::parse_date("2026-01-01").unwrap();
        let mut session = WorkshopSession::new("Acme", date, 0);
        assert_eq!(session_labs(&c, &session).len(), 2);
        session.lab_ids = vec![LabId::new("lab-2")];
        let labs = session_labs(&c, &session);
        assert_eq!(labs.len(), 1);
        assert_eq!(labs[0].number, LabNumber(2));
    }

    #[test]
    fn json_catalog_loads() {
        let raw = r#"{
            "labs": [{"id": "lab-1", "number": 1, "title": "One",
                      "steps": [{"id": "s1", "title": "Connect", "modes": ["lab"]}]}],
            "quests": [{"id": "q1", "title": "Q", "requiredFlagIds": ["f1"]}],
            "flags": [{"id": "f1", "questId": "q1", "title": "F", "points": 25}]
        }"#;
        let c = StaticCatalog::from_json(raw).unwrap();
        assert_eq!(c.flag(&FlagId::new("f1")).unwrap().point_value(), 25);
        assert_eq!(c.lab(LabNumber(1)).unwrap().steps.len(), 1);
    }
}
