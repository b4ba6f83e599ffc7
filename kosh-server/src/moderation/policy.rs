//! Vote thresholds, centralized so no call site carries its own copy.

use kosh_core::{EntityKind, VoteDecision};

/// Number of same-direction votes that triggers an automatic transition.
///
/// Words need broader agreement (5) than corrections (3), which target a
/// single field of an already-approved entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub word_approval: u32,
    pub word_rejection: u32,
    pub correction_approval: u32,
    pub correction_rejection: u32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            word_approval: 5,
            word_rejection: 5,
            correction_approval: 3,
            correction_rejection: 3,
        }
    }
}

impl ThresholdPolicy {
    pub fn threshold(&self, kind: EntityKind, direction: VoteDecision) -> u32 {
        match (kind, direction) {
            (EntityKind::Word, VoteDecision::Approve) => self.word_approval,
            (EntityKind::Word, VoteDecision::Reject) => self.word_rejection,
            (EntityKind::Correction, VoteDecision::Approve) => self.correction_approval,
            (EntityKind::Correction, VoteDecision::Reject) => self.correction_rejection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.threshold(EntityKind::Word, VoteDecision::Approve), 5);
        assert_eq!(policy.threshold(EntityKind::Word, VoteDecision::Reject), 5);
        assert_eq!(
            policy.threshold(EntityKind::Correction, VoteDecision::Approve),
            3
        );
        assert_eq!(
            policy.threshold(EntityKind::Correction, VoteDecision::Reject),
            3
        );
    }
}
