//! Vote aggregation and entity submission.
//!
//! `ModerationService` is the community-facing orchestrator: it validates a
//! request, applies it inside a single store transaction (guard checks,
//! ledger append, threshold evaluation, and status write all see the same
//! transaction-fresh entity), and fans the committed result out through the
//! change notifier.

use std::sync::Arc;

use chrono::Utc;
use kosh_core::{
    CorrectionId, CorrectionType, EntityKind, IdentityContext, ReportId, UserId, VoteDecision,
    WordId,
};
use serde::Serialize;
use tracing::info;

use super::entity::{
    CorrectionEntity, CorrectionStatus, EntityStatus, ReportEntity, ReportStatus, VoteRecord,
    WordDraft, WordEntity, WordStatus,
};
use super::error::ModerationError;
use super::notifier::{ChangeNotifier, EntityChange};
use super::policy::ThresholdPolicy;
use super::store::{transact_correction, transact_word, EntityStore};
use super::transition::{correction_transition, word_transition, CorrectionEvent, WordEvent};

/// Result of a successfully recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub status: EntityStatus,
    pub votes_for: u32,
    pub votes_against: u32,
}

/// Point-in-time view of an entity's moderation state, for display.
/// May be stale by the time the caller looks at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub status: EntityStatus,
    pub votes_for: u32,
    pub votes_against: u32,
    pub reviewed_by: Vec<VoteRecord>,
}

/// The community-facing moderation orchestrator.
pub struct ModerationService {
    store: Arc<dyn EntityStore>,
    policy: ThresholdPolicy,
    notifier: ChangeNotifier,
}

impl ModerationService {
    pub fn new(store: Arc<dyn EntityStore>, policy: ThresholdPolicy, notifier: ChangeNotifier) -> Self {
        Self {
            store,
            policy,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Submit a new word; it enters `community_review`.
    pub async fn submit_word(
        &self,
        draft: WordDraft,
        contributor: &IdentityContext,
    ) -> Result<WordId, ModerationError> {
        validate_draft(&draft)?;

        let word = WordEntity::new(draft, contributor.user_id.clone(), Utc::now());
        self.store.create_word(&word).await?;

        info!(word_id = %word.id, contributor = %word.contributor, "word submitted");
        self.notifier.publish(EntityChange {
            kind: EntityKind::Word,
            id: word.id.to_string(),
            status: word.status.to_string(),
            votes_for: 0,
            votes_against: 0,
        });
        Ok(word.id)
    }

    /// Record a community vote on a word or correction.
    ///
    /// The guard checks, ledger append, threshold evaluation, and status
    /// write execute against one transaction-fresh read; two racing votes
    /// serialize through the store's compare-and-swap, so exactly one of
    /// them crosses a threshold.
    pub async fn vote(
        &self,
        kind: EntityKind,
        id: uuid::Uuid,
        identity: &IdentityContext,
        decision: VoteDecision,
        comment: Option<String>,
    ) -> Result<VoteOutcome, ModerationError> {
        let comment = normalize_comment(comment);
        if decision == VoteDecision::Reject && comment.is_none() {
            return Err(ModerationError::validation(
                "a reject vote requires a reason",
            ));
        }

        let outcome = match kind {
            EntityKind::Word => self.vote_word(WordId(id), identity, decision, comment).await?,
            EntityKind::Correction => {
                self.vote_correction(CorrectionId(id), identity, decision, comment)
                    .await?
            }
        };

        info!(
            kind = %kind,
            id = %id,
            voter = %identity.user_id,
            decision = %decision,
            status = %outcome.status,
            "vote recorded"
        );
        self.notifier.publish(EntityChange {
            kind,
            id: id.to_string(),
            status: outcome.status.to_string(),
            votes_for: outcome.votes_for,
            votes_against: outcome.votes_against,
        });
        Ok(outcome)
    }

    async fn vote_word(
        &self,
        id: WordId,
        identity: &IdentityContext,
        decision: VoteDecision,
        comment: Option<String>,
    ) -> Result<VoteOutcome, ModerationError> {
        let policy = self.policy;
        let voter = identity.user_id.clone();

        let word = transact_word(self.store.as_ref(), id, |word| {
            check_word_vote_guards(word, &voter)?;

            let (votes_for, votes_against) = tally_after(
                word.votes_for,
                word.votes_against,
                decision,
            );
            let next = word_transition(
                word.status,
                WordEvent::CommunityVote {
                    decision,
                    votes_for,
                    votes_against,
                },
                &policy,
            )?;

            word.record_vote(VoteRecord {
                user: voter.clone(),
                decision,
                comment: comment.clone(),
                timestamp: Utc::now(),
            });
            word.status = next;
            debug_assert!(word.ledger_consistent());
            Ok(())
        })
        .await?;

        Ok(VoteOutcome {
            status: EntityStatus::Word(word.status),
            votes_for: word.votes_for,
            votes_against: word.votes_against,
        })
    }

    async fn vote_correction(
        &self,
        id: CorrectionId,
        identity: &IdentityContext,
        decision: VoteDecision,
        comment: Option<String>,
    ) -> Result<VoteOutcome, ModerationError> {
        let policy = self.policy;
        let voter = identity.user_id.clone();

        let correction = transact_correction(self.store.as_ref(), id, |correction| {
            check_correction_vote_guards(correction, &voter)?;

            let (votes_for, votes_against) = tally_after(
                correction.votes_for,
                correction.votes_against,
                decision,
            );
            let next = correction_transition(
                correction.status,
                CorrectionEvent::CommunityVote {
                    decision,
                    votes_for,
                    votes_against,
                },
                &policy,
            )?;

            correction.record_vote(VoteRecord {
                user: voter.clone(),
                decision,
                comment: comment.clone(),
                timestamp: Utc::now(),
            });
            correction.status = next;
            debug_assert!(correction.ledger_consistent());
            Ok(())
        })
        .await?;

        Ok(VoteOutcome {
            status: EntityStatus::Correction(correction.status),
            votes_for: correction.votes_for,
            votes_against: correction.votes_against,
        })
    }

    /// Propose a correction to one field of an approved word.
    pub async fn propose_correction(
        &self,
        word_id: WordId,
        identity: &IdentityContext,
        correction_type: CorrectionType,
        current_value: String,
        proposed_change: String,
        explanation: String,
    ) -> Result<CorrectionId, ModerationError> {
        if proposed_change.trim().is_empty() {
            return Err(ModerationError::validation("proposed change is empty"));
        }
        if explanation.trim().is_empty() {
            return Err(ModerationError::validation("an explanation is required"));
        }

        let word = self
            .store
            .load_word(word_id)
            .await?
            .ok_or_else(|| ModerationError::not_found(EntityKind::Word, word_id))?
            .value;
        if word.status != WordStatus::Approved {
            return Err(ModerationError::InvalidStateForOperation {
                status: word.status.to_string(),
                operation: "propose a correction for",
            });
        }

        let now = Utc::now();
        let correction = CorrectionEntity {
            id: CorrectionId::generate(),
            word_id,
            proposer: identity.user_id.clone(),
            correction_type,
            current_value,
            proposed_change,
            explanation,
            status: CorrectionStatus::ShallowReview,
            votes_for: 0,
            votes_against: 0,
            reviewed_by: Vec::new(),
            applied_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_correction(&correction).await?;

        info!(
            correction_id = %correction.id,
            word_id = %word_id,
            proposer = %correction.proposer,
            correction_type = %correction_type,
            "correction proposed"
        );
        self.notifier.publish(EntityChange {
            kind: EntityKind::Correction,
            id: correction.id.to_string(),
            status: correction.status.to_string(),
            votes_for: 0,
            votes_against: 0,
        });
        Ok(correction.id)
    }

    /// File a report against a word. Reports carry no threshold logic;
    /// an admin resolves them through the gateway.
    pub async fn file_report(
        &self,
        word_id: WordId,
        identity: &IdentityContext,
        reason: String,
    ) -> Result<ReportId, ModerationError> {
        if reason.trim().is_empty() {
            return Err(ModerationError::validation("a report reason is required"));
        }
        if self.store.load_word(word_id).await?.is_none() {
            return Err(ModerationError::not_found(EntityKind::Word, word_id));
        }

        let report = ReportEntity {
            id: ReportId::generate(),
            word_id,
            reporter: identity.user_id.clone(),
            reason,
            status: ReportStatus::Open,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        };
        self.store.create_report(&report).await?;
        info!(report_id = %report.id, word_id = %word_id, "report filed");
        Ok(report.id)
    }

    /// Non-transactional read of an entity's moderation state.
    pub async fn load_status(
        &self,
        kind: EntityKind,
        id: uuid::Uuid,
    ) -> Result<StatusView, ModerationError> {
        match kind {
            EntityKind::Word => {
                let word = self
                    .store
                    .load_word(WordId(id))
                    .await?
                    .ok_or_else(|| ModerationError::not_found(kind, id))?
                    .value;
                Ok(StatusView {
                    status: EntityStatus::Word(word.status),
                    votes_for: word.votes_for,
                    votes_against: word.votes_against,
                    reviewed_by: word.reviewed_by,
                })
            }
            EntityKind::Correction => {
                let correction = self
                    .store
                    .load_correction(CorrectionId(id))
                    .await?
                    .ok_or_else(|| ModerationError::not_found(kind, id))?
                    .value;
                Ok(StatusView {
                    status: EntityStatus::Correction(correction.status),
                    votes_for: correction.votes_for,
                    votes_against: correction.votes_against,
                    reviewed_by: correction.reviewed_by,
                })
            }
        }
    }
}

fn validate_draft(draft: &WordDraft) -> Result<(), ModerationError> {
    if draft.kurukh_word.trim().is_empty() {
        return Err(ModerationError::validation("kurukh_word is empty"));
    }
    if draft.meanings.is_empty() {
        return Err(ModerationError::validation(
            "a word needs at least one meaning",
        ));
    }
    for meaning in &draft.meanings {
        if meaning.language.trim().is_empty() {
            return Err(ModerationError::validation("meaning language is empty"));
        }
        if meaning.definition.trim().is_empty() {
            return Err(ModerationError::validation("meaning definition is empty"));
        }
    }
    Ok(())
}

fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment.and_then(|c| {
        let trimmed = c.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn tally_after(votes_for: u32, votes_against: u32, decision: VoteDecision) -> (u32, u32) {
    match decision {
        VoteDecision::Approve => (votes_for + 1, votes_against),
        VoteDecision::Reject => (votes_for, votes_against + 1),
    }
}

fn check_word_vote_guards(word: &WordEntity, voter: &UserId) -> Result<(), ModerationError> {
    if !word.status.is_votable() {
        return Err(ModerationError::InvalidStateForOperation {
            status: word.status.to_string(),
            operation: "vote on",
        });
    }
    if &word.contributor == voter {
        return Err(ModerationError::SelfVote {
            user: voter.clone(),
        });
    }
    if word.has_vote_from(voter) {
        return Err(ModerationError::AlreadyVoted {
            user: voter.clone(),
        });
    }
    Ok(())
}

fn check_correction_vote_guards(
    correction: &CorrectionEntity,
    voter: &UserId,
) -> Result<(), ModerationError> {
    if !correction.status.is_votable() {
        return Err(ModerationError::InvalidStateForOperation {
            status: correction.status.to_string(),
            operation: "vote on",
        });
    }
    if &correction.proposer == voter {
        return Err(ModerationError::SelfVote {
            user: voter.clone(),
        });
    }
    if correction.has_vote_from(voter) {
        return Err(ModerationError::AlreadyVoted {
            user: voter.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::store::InMemoryStore;
    use kosh_core::{Meaning, PartOfSpeech};

    fn service() -> ModerationService {
        ModerationService::new(
            Arc::new(InMemoryStore::new()),
            ThresholdPolicy::default(),
            ChangeNotifier::default(),
        )
    }

    fn draft(word: &str) -> WordDraft {
        WordDraft {
            kurukh_word: word.to_string(),
            meanings: vec![Meaning {
                language: "en".to_string(),
                definition: "meaning".to_string(),
                example: None,
                example_translation: None,
            }],
            part_of_speech: PartOfSpeech::Noun,
            pronunciation: None,
        }
    }

    async fn submit(service: &ModerationService, contributor: &str) -> WordId {
        service
            .submit_word(draft("chicka"), &IdentityContext::member(contributor))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_word_enters_community_review() {
        let service = service();
        let id = submit(&service, "u1").await;

        let view = service.load_status(EntityKind::Word, id.0).await.unwrap();
        assert_eq!(view.status, EntityStatus::Word(WordStatus::CommunityReview));
        assert_eq!(view.votes_for, 0);
        assert!(view.reviewed_by.is_empty());
    }

    #[tokio::test]
    async fn test_submit_word_validates_fields() {
        let service = service();
        let err = service
            .submit_word(draft("  "), &IdentityContext::member("u1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let mut empty_meanings = draft("ala");
        empty_meanings.meanings.clear();
        let err = service
            .submit_word(empty_meanings, &IdentityContext::member("u1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    /// Scenario A: one approve vote leaves the word in community review.
    #[tokio::test]
    async fn test_single_vote_stays_in_review() {
        let service = service();
        let id = submit(&service, "u1").await;

        let outcome = service
            .vote(
                EntityKind::Word,
                id.0,
                &IdentityContext::member("u2"),
                VoteDecision::Approve,
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.votes_for, 1);
        assert_eq!(outcome.votes_against, 0);
        assert_eq!(
            outcome.status,
            EntityStatus::Word(WordStatus::CommunityReview)
        );
    }

    /// Scenario B: the fifth approval promotes to pending review.
    #[tokio::test]
    async fn test_fifth_approval_promotes() {
        let service = service();
        let id = submit(&service, "u1").await;

        let mut last = None;
        for voter in ["u2", "u3", "u4", "u5", "u6"] {
            last = Some(
                service
                    .vote(
                        EntityKind::Word,
                        id.0,
                        &IdentityContext::member(voter),
                        VoteDecision::Approve,
                        None,
                    )
                    .await
                    .unwrap(),
            );
        }

        let outcome = last.unwrap();
        assert_eq!(outcome.votes_for, 5);
        assert_eq!(outcome.status, EntityStatus::Word(WordStatus::PendingReview));
    }

    /// A vote arriving after the promotion still counts: the ledger grows,
    /// the tally reaches six, and the status stays `pending_review`.
    #[tokio::test]
    async fn test_vote_after_promotion_appends_without_second_transition() {
        let service = service();
        let id = submit(&service, "u1").await;

        for voter in ["u2", "u3", "u4", "u5", "u6"] {
            service
                .vote(
                    EntityKind::Word,
                    id.0,
                    &IdentityContext::member(voter),
                    VoteDecision::Approve,
                    None,
                )
                .await
                .unwrap();
        }

        let outcome = service
            .vote(
                EntityKind::Word,
                id.0,
                &IdentityContext::member("u7"),
                VoteDecision::Approve,
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.votes_for, 6);
        assert_eq!(outcome.status, EntityStatus::Word(WordStatus::PendingReview));

        let view = service.load_status(EntityKind::Word, id.0).await.unwrap();
        assert_eq!(view.reviewed_by.len(), 6);

        // The guards still hold after promotion.
        let err = service
            .vote(
                EntityKind::Word,
                id.0,
                &IdentityContext::member("u7"),
                VoteDecision::Approve,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "already_voted");
    }

    #[tokio::test]
    async fn test_fifth_rejection_community_rejects() {
        let service = service();
        let id = submit(&service, "u1").await;

        let mut last = None;
        for voter in ["u2", "u3", "u4", "u5", "u6"] {
            last = Some(
                service
                    .vote(
                        EntityKind::Word,
                        id.0,
                        &IdentityContext::member(voter),
                        VoteDecision::Reject,
                        Some("wrong language".to_string()),
                    )
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(
            last.unwrap().status,
            EntityStatus::Word(WordStatus::CommunityRejected)
        );
    }

    /// Scenario C: contributors cannot vote on their own words.
    #[tokio::test]
    async fn test_self_vote_rejected() {
        let service = service();
        let id = submit(&service, "u1").await;

        let err = service
            .vote(
                EntityKind::Word,
                id.0,
                &IdentityContext::member("u1"),
                VoteDecision::Approve,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "self_vote");

        // State unchanged.
        let view = service.load_status(EntityKind::Word, id.0).await.unwrap();
        assert_eq!(view.votes_for, 0);
        assert!(view.reviewed_by.is_empty());
    }

    /// Scenario D: a second vote from the same user fails and changes nothing.
    #[tokio::test]
    async fn test_duplicate_vote_rejected() {
        let service = service();
        let id = submit(&service, "u1").await;
        let voter = IdentityContext::member("u2");

        service
            .vote(EntityKind::Word, id.0, &voter, VoteDecision::Approve, None)
            .await
            .unwrap();
        let err = service
            .vote(EntityKind::Word, id.0, &voter, VoteDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "already_voted");

        let view = service.load_status(EntityKind::Word, id.0).await.unwrap();
        assert_eq!(view.votes_for, 1);
        assert_eq!(view.reviewed_by.len(), 1);
    }

    #[tokio::test]
    async fn test_vote_on_missing_word_is_not_found() {
        let service = service();
        let err = service
            .vote(
                EntityKind::Word,
                uuid::Uuid::new_v4(),
                &IdentityContext::member("u2"),
                VoteDecision::Approve,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_reject_vote_requires_reason() {
        let service = service();
        let id = submit(&service, "u1").await;

        let err = service
            .vote(
                EntityKind::Word,
                id.0,
                &IdentityContext::member("u2"),
                VoteDecision::Reject,
                Some("   ".to_string()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn test_vote_publishes_change() {
        let service = service();
        let id = submit(&service, "u1").await;
        let mut sub = service
            .notifier()
            .subscribe_entity(EntityKind::Word, id.to_string());

        service
            .vote(
                EntityKind::Word,
                id.0,
                &IdentityContext::member("u2"),
                VoteDecision::Approve,
                None,
            )
            .await
            .unwrap();

        let change = sub.next().await.unwrap();
        assert_eq!(change.votes_for, 1);
        assert_eq!(change.status, "community_review");
    }

    #[tokio::test]
    async fn test_propose_correction_requires_approved_word() {
        let service = service();
        let id = submit(&service, "u1").await;

        let err = service
            .propose_correction(
                id,
                &IdentityContext::member("u2"),
                CorrectionType::Spelling,
                "chicka".to_string(),
                "chickaa".to_string(),
                "long vowel".to_string(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state_for_operation");
    }

    #[tokio::test]
    async fn test_correction_votes_use_correction_threshold() {
        let service = service();
        let id = submit(&service, "u1").await;

        // Promote and approve the word through the admin path is exercised
        // elsewhere; here we drive the store directly to an approved word.
        crate::moderation::store::transact_word(service.store().as_ref(), id, |w| {
            w.status = WordStatus::Approved;
            Ok(())
        })
        .await
        .unwrap();

        let correction_id = service
            .propose_correction(
                id,
                &IdentityContext::member("u2"),
                CorrectionType::Spelling,
                "chicka".to_string(),
                "chickaa".to_string(),
                "long vowel".to_string(),
            )
            .await
            .unwrap();

        let mut last = None;
        for voter in ["u3", "u4", "u5"] {
            last = Some(
                service
                    .vote(
                        EntityKind::Correction,
                        correction_id.0,
                        &IdentityContext::member(voter),
                        VoteDecision::Approve,
                        None,
                    )
                    .await
                    .unwrap(),
            );
        }

        let outcome = last.unwrap();
        assert_eq!(outcome.votes_for, 3);
        assert_eq!(
            outcome.status,
            EntityStatus::Correction(CorrectionStatus::Approved)
        );
    }

    #[tokio::test]
    async fn test_proposer_cannot_vote_own_correction() {
        let service = service();
        let id = submit(&service, "u1").await;
        crate::moderation::store::transact_word(service.store().as_ref(), id, |w| {
            w.status = WordStatus::Approved;
            Ok(())
        })
        .await
        .unwrap();

        let correction_id = service
            .propose_correction(
                id,
                &IdentityContext::member("u2"),
                CorrectionType::Spelling,
                "chicka".to_string(),
                "chickaa".to_string(),
                "long vowel".to_string(),
            )
            .await
            .unwrap();

        let err = service
            .vote(
                EntityKind::Correction,
                correction_id.0,
                &IdentityContext::member("u2"),
                VoteDecision::Approve,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "self_vote");
    }

    #[tokio::test]
    async fn test_file_report() {
        let service = service();
        let id = submit(&service, "u1").await;

        let report_id = service
            .file_report(id, &IdentityContext::member("u2"), "duplicate entry".to_string())
            .await
            .unwrap();

        let report = service
            .store()
            .load_report(report_id)
            .await
            .unwrap()
            .unwrap()
            .value;
        assert_eq!(report.status, ReportStatus::Open);
        assert_eq!(report.word_id, id);
    }

    #[tokio::test]
    async fn test_file_report_requires_reason_and_word() {
        let service = service();
        let id = submit(&service, "u1").await;

        let err = service
            .file_report(id, &IdentityContext::member("u2"), " ".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = service
            .file_report(
                WordId::generate(),
                &IdentityContext::member("u2"),
                "reason".to_string(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
