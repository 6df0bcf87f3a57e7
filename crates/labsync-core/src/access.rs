//! Lab and quest unlock rules
//!
//! Lab accessibility is a declared predicate over the completed-lab set. The first
//! lab is always open. Quests unlock strictly in sequence.

use indexmap::IndexSet;
use labsync_model::{FlagId, LabDefinition, LabNumber, QuestDefinition};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Predicate over completed labs
pub type UnlockPredicate = Arc<dyn Fn(&BTreeSet<LabNumber>) -> bool + Send + Sync>;

/// Per-lab unlock predicates
#[derive(Clone, Default)]
pub struct LabAccessRules {
    rules: BTreeMap<LabNumber, UnlockPredicate>,
}

impl fmt::Debug for LabAccessRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabAccessRules")
            .field("gated_labs", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LabAccessRules {
    /// No rules: every lab open
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the stock content, where labs 2 and 3 both require lab 1
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new()
            .with_prerequisites(LabNumber(2), [LabNumber::FIRST])
            .with_prerequisites(LabNumber(3), [LabNumber::FIRST])
    }

    /// Rules derived from lab definitions
    ///
    /// Labs declaring prerequisites get an all-of rule. Labs that declare nothing
    /// keep the stock rule when one exists and are open otherwise.
    #[must_use]
    pub fn from_labs<'a>(labs: impl IntoIterator<Item = &'a LabDefinition>) -> Self {
        let defaults = Self::with_defaults();
        let mut rules = Self::new();
        for lab in labs {
            match &lab.prerequisites {
                Some(prereqs) => rules = rules.with_prerequisites(lab.number, prereqs.iter().copied()),
                None => {
                    if let Some(rule) = defaults.rules.get(&lab.number) {
                        rules.rules.insert(lab.number, Arc::clone(rule));
                    }
                }
            }
        }
        rules
    }

    /// Require every lab in `prerequisites` (an empty set always passes)
    #[must_use]
    pub fn with_prerequisites(mut self, lab: LabNumber, prerequisites: impl IntoIterator<Item = LabNumber>) -> Self {
        let required: BTreeSet<LabNumber> = prerequisites.into_iter().collect();
        self.rules.insert(
            lab,
            Arc::new(move |completed: &BTreeSet<LabNumber>| required.is_subset(completed)),
        );
        self
    }

    /// Arbitrary predicate
    #[must_use]
    pub fn with_rule(
        mut self,
        lab: LabNumber,
        rule: impl Fn(&BTreeSet<LabNumber>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rules.insert(lab, Arc::new(rule));
        self
    }

    /// Is `lab` accessible given the completed labs
    #[must_use]
    pub fn is_accessible(&self, lab: LabNumber, completed: &BTreeSet<LabNumber>) -> bool {
        if lab == LabNumber::FIRST {
            return true;
        }
        self.rules.get(&lab).map_or(true, |rule| rule(completed))
    }
}

/// Is the quest at `index` in play order unlocked
///
/// Quest 0 is always unlocked; quest i needs quest i-1's completion predicate to
/// hold over the captured flags right now.
#[must_use]
pub fn is_quest_unlocked(quests: &[&QuestDefinition], index: usize, captured: &IndexSet<FlagId>) -> bool {
    match index.checked_sub(1) {
        None => true,
        Some(prev) => quests.get(prev).map_or(false, |q| q.is_completed_by(captured)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(labs: &[u32]) -> BTreeSet<LabNumber> {
        labs.iter().copied().map(LabNumber).collect()
    }

    #[test]
    fn stock_rules_gate_on_lab_one() {
        let rules = LabAccessRules::with_defaults();
        assert!(rules.is_accessible(LabNumber(1), &completed(&[])));
        assert!(!rules.is_accessible(LabNumber(2), &completed(&[])));
        assert!(!rules.is_accessible(LabNumber(3), &completed(&[2])));
        assert!(rules.is_accessible(LabNumber(3), &completed(&[1])));
    }

    #[test]
    fn declared_prerequisites_override_stock_rule() {
        let labs = [
            LabDefinition::new("a", LabNumber(2), "A").with_prerequisites([]),
            LabDefinition::new("b", LabNumber(4), "B").with_prerequisites([LabNumber(2), LabNumber(3)]),
            LabDefinition::new("c", LabNumber(5), "C"),
        ];
        let rules = LabAccessRules::from_labs(&labs);
        assert!(rules.is_accessible(LabNumber(2), &completed(&[])));
        assert!(!rules.is_accessible(LabNumber(4), &completed(&[2])));
        assert!(rules.is_accessible(LabNumber(4), &completed(&[2, 3])));
        assert!(rules.is_accessible(LabNumber(5), &completed(&[])));
    }

    #[test]
    fn custom_predicate() {
        let rules = LabAccessRules::new().with_rule(LabNumber(3), |done| done.len() >= 2);
        assert!(!rules.is_accessible(LabNumber(3), &completed(&[1])));
        assert!(rules.is_accessible(LabNumber(3), &completed(&[1, 2])));
    }

    #[test]
    fn quests_unlock_in_sequence() {
        let q1 = QuestDefinition::new("q1", "One").with_required(["a"]);
        let q2 = QuestDefinition::new("q2", "Two").with_required(["b"]);
        let q3 = QuestDefinition::new("q3", "Three");
        let quests = [&q1, &q2, &q3];
        let mut captured = IndexSet::new();
        assert!(is_quest_unlocked(&quests, 0, &captured));
        assert!(!is_quest_unlocked(&quests, 1, &captured));
        captured.insert(FlagId::new("a"));
        assert!(is_quest_unlocked(&quests, 1, &captured));
        assert!(!is_quest_unlocked(&quests, 2, &captured));
        captured.insert(FlagId::new("b"));
        assert!(is_quest_unlocked(&quests, 2, &captured));
    }
}
