//! Pure state transition functions for both entity kinds.
//!
//! The transition functions are the core of the moderation engine. Each one
//! takes the current status and an event, and returns the next status or a
//! typed error. They have NO side effects and never look at storage; the
//! caller supplies the post-event vote tallies. All guard violations are
//! hard errors, not silent no-ops, so a failed transition leaves the entity
//! untouched by construction.

use kosh_core::{AdminDecision, VoteDecision};

use super::entity::{CorrectionStatus, WordStatus};
use super::error::ModerationError;
use super::policy::ThresholdPolicy;

/// An event that can move a word through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEvent {
    /// A community vote was appended; tallies are the values *after* the
    /// new vote was recorded.
    CommunityVote {
        decision: VoteDecision,
        votes_for: u32,
        votes_against: u32,
    },
    /// An administrator issued a final decision.
    AdminDecision { decision: AdminDecision },
}

/// An event that can move a correction through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionEvent {
    CommunityVote {
        decision: VoteDecision,
        votes_for: u32,
        votes_against: u32,
    },
    AdminDecision { decision: AdminDecision },
    /// The approved correction was applied to its word.
    Apply,
}

/// Compute the next word status.
///
/// Community votes are legal while the word is not terminal. In
/// `community_review`, crossing the approval threshold promotes to
/// `pending_review` and crossing the rejection threshold terminates at
/// `community_rejected` with no admin step. In `pending_review` a vote
/// appends to the ledger but never moves the status: the promotion happens
/// on exactly the vote that crossed the threshold, and a vote racing with
/// it still counts. Admin decisions are legal from any non-terminal state:
/// the normal stage is `pending_review`, and deciding from
/// `community_review` is the gateway's override of the community stage.
pub fn word_transition(
    status: WordStatus,
    event: WordEvent,
    policy: &ThresholdPolicy,
) -> Result<WordStatus, ModerationError> {
    match event {
        WordEvent::CommunityVote {
            decision,
            votes_for,
            votes_against,
        } => {
            if !status.is_votable() {
                return Err(ModerationError::InvalidStateForOperation {
                    status: status.to_string(),
                    operation: "vote on",
                });
            }
            if status == WordStatus::PendingReview {
                return Ok(WordStatus::PendingReview);
            }
            match decision {
                VoteDecision::Approve if votes_for >= policy.word_approval => {
                    Ok(WordStatus::PendingReview)
                }
                VoteDecision::Reject if votes_against >= policy.word_rejection => {
                    Ok(WordStatus::CommunityRejected)
                }
                _ => Ok(status),
            }
        }
        WordEvent::AdminDecision { decision } => {
            if status.is_terminal() {
                return Err(ModerationError::InvalidStateForOperation {
                    status: status.to_string(),
                    operation: "decide",
                });
            }
            Ok(match decision {
                AdminDecision::Approve => WordStatus::Approved,
                AdminDecision::Reject => WordStatus::Rejected,
            })
        }
    }
}

/// Compute the next correction status.
///
/// Community votes are legal only in `shallow_review` (threshold 3 either
/// direction). Admin decisions bypass the community count but are likewise
/// legal only while the correction is still in review; a correction the
/// community has already decided cannot be re-decided. `Apply` is legal
/// exactly once, from an approved state.
pub fn correction_transition(
    status: CorrectionStatus,
    event: CorrectionEvent,
    policy: &ThresholdPolicy,
) -> Result<CorrectionStatus, ModerationError> {
    match event {
        CorrectionEvent::CommunityVote {
            decision,
            votes_for,
            votes_against,
        } => {
            if !status.is_votable() {
                return Err(ModerationError::InvalidStateForOperation {
                    status: status.to_string(),
                    operation: "vote on",
                });
            }
            match decision {
                VoteDecision::Approve if votes_for >= policy.correction_approval => {
                    Ok(CorrectionStatus::Approved)
                }
                VoteDecision::Reject if votes_against >= policy.correction_rejection => {
                    Ok(CorrectionStatus::Rejected)
                }
                _ => Ok(status),
            }
        }
        CorrectionEvent::AdminDecision { decision } => {
            if !status.is_votable() {
                return Err(ModerationError::InvalidStateForOperation {
                    status: status.to_string(),
                    operation: "decide",
                });
            }
            Ok(match decision {
                AdminDecision::Approve => CorrectionStatus::AdminApproved,
                AdminDecision::Reject => CorrectionStatus::AdminRejected,
            })
        }
        CorrectionEvent::Apply => {
            if status == CorrectionStatus::Applied {
                return Err(ModerationError::AlreadyApplied);
            }
            if !status.is_applicable() {
                return Err(ModerationError::InvalidStateForOperation {
                    status: status.to_string(),
                    operation: "apply",
                });
            }
            Ok(CorrectionStatus::Applied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy::default()
    }

    fn approve(votes_for: u32) -> WordEvent {
        WordEvent::CommunityVote {
            decision: VoteDecision::Approve,
            votes_for,
            votes_against: 0,
        }
    }

    fn reject(votes_against: u32) -> WordEvent {
        WordEvent::CommunityVote {
            decision: VoteDecision::Reject,
            votes_for: 0,
            votes_against,
        }
    }

    #[test]
    fn test_word_stays_in_review_below_threshold() {
        for n in 1..5 {
            let next = word_transition(WordStatus::CommunityReview, approve(n), &policy());
            assert_eq!(next.unwrap(), WordStatus::CommunityReview, "at {n} votes");
        }
    }

    #[test]
    fn test_word_promotes_at_approval_threshold() {
        let next = word_transition(WordStatus::CommunityReview, approve(5), &policy());
        assert_eq!(next.unwrap(), WordStatus::PendingReview);
    }

    #[test]
    fn test_word_community_rejected_at_rejection_threshold() {
        let next = word_transition(WordStatus::CommunityReview, reject(5), &policy());
        assert_eq!(next.unwrap(), WordStatus::CommunityRejected);
    }

    #[test]
    fn test_word_vote_rejected_on_terminal() {
        for status in [
            WordStatus::Approved,
            WordStatus::Rejected,
            WordStatus::CommunityRejected,
        ] {
            let err = word_transition(status, approve(1), &policy()).unwrap_err();
            assert_eq!(err.kind(), "invalid_state_for_operation", "from {status}");
        }
    }

    /// A vote landing after the promotion appends without a second
    /// transition, whatever the tallies say.
    #[test]
    fn test_word_vote_in_pending_review_keeps_status() {
        for event in [approve(6), approve(9), reject(6)] {
            let next = word_transition(WordStatus::PendingReview, event, &policy());
            assert_eq!(next.unwrap(), WordStatus::PendingReview);
        }
    }

    #[test]
    fn test_word_admin_decision_from_pending_review() {
        let next = word_transition(
            WordStatus::PendingReview,
            WordEvent::AdminDecision {
                decision: AdminDecision::Approve,
            },
            &policy(),
        );
        assert_eq!(next.unwrap(), WordStatus::Approved);

        let next = word_transition(
            WordStatus::PendingReview,
            WordEvent::AdminDecision {
                decision: AdminDecision::Reject,
            },
            &policy(),
        );
        assert_eq!(next.unwrap(), WordStatus::Rejected);
    }

    #[test]
    fn test_word_admin_override_from_community_review() {
        let next = word_transition(
            WordStatus::CommunityReview,
            WordEvent::AdminDecision {
                decision: AdminDecision::Approve,
            },
            &policy(),
        );
        assert_eq!(next.unwrap(), WordStatus::Approved);
    }

    #[test]
    fn test_word_admin_decision_rejected_on_terminal() {
        for status in [
            WordStatus::Approved,
            WordStatus::Rejected,
            WordStatus::CommunityRejected,
        ] {
            let err = word_transition(
                status,
                WordEvent::AdminDecision {
                    decision: AdminDecision::Approve,
                },
                &policy(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), "invalid_state_for_operation", "from {status}");
        }
    }

    #[test]
    fn test_correction_approved_at_threshold() {
        let next = correction_transition(
            CorrectionStatus::ShallowReview,
            CorrectionEvent::CommunityVote {
                decision: VoteDecision::Approve,
                votes_for: 3,
                votes_against: 0,
            },
            &policy(),
        );
        assert_eq!(next.unwrap(), CorrectionStatus::Approved);
    }

    #[test]
    fn test_correction_stays_below_threshold() {
        let next = correction_transition(
            CorrectionStatus::ShallowReview,
            CorrectionEvent::CommunityVote {
                decision: VoteDecision::Reject,
                votes_for: 0,
                votes_against: 2,
            },
            &policy(),
        );
        assert_eq!(next.unwrap(), CorrectionStatus::ShallowReview);
    }

    #[test]
    fn test_correction_rejected_at_threshold() {
        let next = correction_transition(
            CorrectionStatus::ShallowReview,
            CorrectionEvent::CommunityVote {
                decision: VoteDecision::Reject,
                votes_for: 0,
                votes_against: 3,
            },
            &policy(),
        );
        assert_eq!(next.unwrap(), CorrectionStatus::Rejected);
    }

    #[test]
    fn test_correction_admin_decision_bypasses_count() {
        let next = correction_transition(
            CorrectionStatus::ShallowReview,
            CorrectionEvent::AdminDecision {
                decision: AdminDecision::Approve,
            },
            &policy(),
        );
        assert_eq!(next.unwrap(), CorrectionStatus::AdminApproved);
    }

    #[test]
    fn test_correction_admin_decision_rejected_after_community_decided() {
        let err = correction_transition(
            CorrectionStatus::Approved,
            CorrectionEvent::AdminDecision {
                decision: AdminDecision::Reject,
            },
            &policy(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_state_for_operation");
    }

    #[test]
    fn test_correction_apply_from_approved_states() {
        for status in [CorrectionStatus::Approved, CorrectionStatus::AdminApproved] {
            let next = correction_transition(status, CorrectionEvent::Apply, &policy());
            assert_eq!(next.unwrap(), CorrectionStatus::Applied);
        }
    }

    #[test]
    fn test_correction_apply_twice_is_already_applied() {
        let err = correction_transition(CorrectionStatus::Applied, CorrectionEvent::Apply, &policy())
            .unwrap_err();
        assert_eq!(err, ModerationError::AlreadyApplied);
    }

    #[test]
    fn test_correction_apply_rejected_from_review() {
        let err = correction_transition(
            CorrectionStatus::ShallowReview,
            CorrectionEvent::Apply,
            &policy(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_state_for_operation");
    }

    /// Threshold property: walking vote-by-vote, the promotion fires exactly
    /// once, on the vote that reaches the threshold; later votes keep the
    /// promoted status.
    #[test]
    fn test_threshold_fires_exactly_once() {
        let mut status = WordStatus::CommunityReview;
        let mut promotions = 0;
        for votes_for in 1..=7 {
            let prev = status;
            status = word_transition(status, approve(votes_for), &policy()).unwrap();
            if prev == WordStatus::CommunityReview && status == WordStatus::PendingReview {
                promotions += 1;
            }
        }
        assert_eq!(promotions, 1);
        assert_eq!(status, WordStatus::PendingReview);
    }
}
