//! Conflict policy table
//!
//! Rules are matched in declaration order; the first rule whose categories and
//! condition match decides the strategy. Pairs with no matching rule do not
//! conflict.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Operation, OperationCategory, OperationKind};

use super::strategy::{OperationConflict, ResolutionStrategy};

/// Extra condition on a rule, comparing the operations' payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RuleCondition {
    #[default]
    Always,
    /// Payloads are equal (e.g. two analyses with the same mode)
    SameMode,
    /// Payloads differ (e.g. a themes analysis and a todos analysis)
    DifferentMode,
}

impl RuleCondition {
    fn matches(&self, existing: &OperationKind, proposed: &OperationKind) -> bool {
        match self {
            Self::Always => true,
            Self::SameMode => existing.analysis_mode() == proposed.analysis_mode(),
            Self::DifferentMode => existing.analysis_mode() != proposed.analysis_mode(),
        }
    }
}

impl std::fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::SameMode => write!(f, "same-mode"),
            Self::DifferentMode => write!(f, "different-mode"),
        }
    }
}

/// One entry of the policy table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Category of the operation already active on the memo
    pub existing: OperationCategory,

    /// Category of the operation being registered
    pub proposed: OperationCategory,

    #[serde(default)]
    pub when: RuleCondition,

    pub strategy: ResolutionStrategy,
}

impl PolicyRule {
    pub fn new(existing: OperationCategory, proposed: OperationCategory, strategy: ResolutionStrategy) -> Self {
        Self {
            existing,
            proposed,
            when: RuleCondition::Always,
            strategy,
        }
    }

    pub fn when(mut self, condition: RuleCondition) -> Self {
        self.when = condition;
        self
    }

    fn matches(&self, existing: &OperationKind, proposed: &OperationKind) -> bool {
        self.existing == existing.category()
            && self.proposed == proposed.category()
            && self.when.matches(existing, proposed)
    }
}

/// Built-in pairing table for recording, transcription and analysis
pub fn default_rules() -> Vec<PolicyRule> {
    use OperationCategory::*;
    use ResolutionStrategy as S;

    vec![
        PolicyRule::new(Recording, Recording, S::Cancel),
        PolicyRule::new(Recording, Transcription, S::Queue),
        PolicyRule::new(Recording, Analysis, S::Queue),
        // A new take invalidates the transcript being produced
        PolicyRule::new(Transcription, Recording, S::Replace),
        PolicyRule::new(Transcription, Transcription, S::Cancel),
        PolicyRule::new(Transcription, Analysis, S::Queue),
        PolicyRule::new(Analysis, Recording, S::Queue),
        PolicyRule::new(Analysis, Transcription, S::Replace),
        PolicyRule::new(Analysis, Analysis, S::Cancel).when(RuleCondition::SameMode),
        PolicyRule::new(Analysis, Analysis, S::Allow).when(RuleCondition::DifferentMode),
    ]
}

/// Pure lookup from (existing operation, proposed kind) to a conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictPolicy {
    rules: Vec<PolicyRule>,
}

impl ConflictPolicy {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        debug!(rule_count = rules.len(), "ConflictPolicy::new: called");
        Self { rules }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Strategy for a pair of kinds, ignoring memo scope
    pub fn strategy_for(&self, existing: &OperationKind, proposed: &OperationKind) -> Option<ResolutionStrategy> {
        self.rules
            .iter()
            .find(|rule| rule.matches(existing, proposed))
            .map(|rule| rule.strategy)
    }

    /// Evaluate one existing operation against a proposal
    ///
    /// Operations on different memos never conflict.
    pub fn evaluate(&self, existing: &Operation, proposed: &OperationKind) -> Option<OperationConflict> {
        if existing.memo_id() != proposed.memo_id() {
            return None;
        }
        let strategy = self.strategy_for(&existing.kind, proposed)?;
        debug!(
            existing_id = %existing.id,
            existing_kind = %existing.kind,
            proposed_kind = %proposed,
            %strategy,
            "ConflictPolicy::evaluate: conflict"
        );
        Some(OperationConflict {
            existing_id: existing.id,
            existing_kind: existing.kind,
            strategy,
        })
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AnalysisMode, MemoId, Priority};

    fn active(kind: OperationKind) -> Operation {
        Operation::new(kind, kind.default_priority(), 0)
    }

    #[test]
    fn test_default_recording_then_transcription_queues() {
        let policy = ConflictPolicy::default();
        let memo = MemoId::new();
        let existing = active(OperationKind::recording(memo));

        let conflict = policy.evaluate(&existing, &OperationKind::transcription(memo)).unwrap();
        assert_eq!(conflict.strategy, ResolutionStrategy::Queue);
        assert_eq!(conflict.existing_id, existing.id);
    }

    #[test]
    fn test_different_memos_never_conflict() {
        let policy = ConflictPolicy::default();
        let existing = active(OperationKind::recording(MemoId::new()));
        assert!(policy.evaluate(&existing, &OperationKind::recording(MemoId::new())).is_none());
    }

    #[test]
    fn test_analysis_modes() {
        let policy = ConflictPolicy::default();
        let memo = MemoId::new();
        let themes = active(OperationKind::analysis(memo, AnalysisMode::Themes));

        let same = policy
            .evaluate(&themes, &OperationKind::analysis(memo, AnalysisMode::Themes))
            .unwrap();
        assert_eq!(same.strategy, ResolutionStrategy::Cancel);

        let different = policy
            .evaluate(&themes, &OperationKind::analysis(memo, AnalysisMode::Todos))
            .unwrap();
        assert_eq!(different.strategy, ResolutionStrategy::Allow);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        use OperationCategory::*;
        let policy = ConflictPolicy::new(vec![
            PolicyRule::new(Recording, Transcription, ResolutionStrategy::Cancel),
            PolicyRule::new(Recording, Transcription, ResolutionStrategy::Queue),
        ]);
        let memo = MemoId::new();
        assert_eq!(
            policy.strategy_for(&OperationKind::recording(memo), &OperationKind::transcription(memo)),
            Some(ResolutionStrategy::Cancel)
        );
    }

    #[test]
    fn test_unlisted_pair_has_no_conflict() {
        let policy = ConflictPolicy::new(vec![]);
        let memo = MemoId::new();
        let existing = Operation::new(OperationKind::recording(memo), Priority::High, 0);
        assert!(policy.evaluate(&existing, &OperationKind::recording(memo)).is_none());
    }

    #[test]
    fn test_default_table_covers_every_pair() {
        let policy = ConflictPolicy::default();
        let memo = MemoId::new();
        let kinds = [
            OperationKind::recording(memo),
            OperationKind::transcription(memo),
            OperationKind::analysis(memo, AnalysisMode::Summary),
        ];
        for existing in &kinds {
            for proposed in &kinds {
                assert!(
                    policy.strategy_for(existing, proposed).is_some(),
                    "no rule for {} -> {}",
                    existing,
                    proposed
                );
            }
        }
    }

    #[test]
    fn test_rule_yaml() {
        let yaml = r#"
- existing: analysis
  proposed: analysis
  when: different-mode
  strategy: allow
- existing: recording
  proposed: transcription
  strategy: queue
"#;
        let rules: Vec<PolicyRule> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].when, RuleCondition::DifferentMode);
        assert_eq!(rules[1].when, RuleCondition::Always);
        assert_eq!(rules[1].strategy, ResolutionStrategy::Queue);
    }
}
