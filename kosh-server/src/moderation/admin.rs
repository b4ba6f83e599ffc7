//! Privileged operations: direct decisions and report resolution.
//!
//! The gateway bypasses community thresholds but never the transition
//! guards, so an admin cannot decide an already-terminal entity. The caller
//! role check runs against the `IdentityContext` supplied by the external
//! identity collaborator; there is no ambient current user.

use std::sync::Arc;

use chrono::Utc;
use kosh_core::{AdminDecision, CorrectionId, EntityKind, IdentityContext, ReportId, WordId};
use tracing::info;

use super::entity::{EntityStatus, ReportEntity, ReportStatus};
use super::error::ModerationError;
use super::notifier::{ChangeNotifier, EntityChange};
use super::policy::ThresholdPolicy;
use super::store::{transact_correction, transact_report, transact_word, EntityStore};
use super::transition::{correction_transition, word_transition, CorrectionEvent, WordEvent};

/// Privileged moderation operations.
pub struct AdminGateway {
    store: Arc<dyn EntityStore>,
    policy: ThresholdPolicy,
    notifier: ChangeNotifier,
}

impl AdminGateway {
    pub fn new(
        store: Arc<dyn EntityStore>,
        policy: ThresholdPolicy,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            store,
            policy,
            notifier,
        }
    }

    /// Issue a final decision on an entity, bypassing the vote count.
    pub async fn admin_decide(
        &self,
        kind: EntityKind,
        id: uuid::Uuid,
        decision: AdminDecision,
        identity: &IdentityContext,
    ) -> Result<EntityStatus, ModerationError> {
        self.require_admin(identity)?;
        let policy = self.policy;

        let (status, votes_for, votes_against) = match kind {
            EntityKind::Word => {
                let word = transact_word(self.store.as_ref(), WordId(id), |word| {
                    word.status =
                        word_transition(word.status, WordEvent::AdminDecision { decision }, &policy)?;
                    word.updated_at = Utc::now();
                    Ok(())
                })
                .await?;
                (
                    EntityStatus::Word(word.status),
                    word.votes_for,
                    word.votes_against,
                )
            }
            EntityKind::Correction => {
                let correction =
                    transact_correction(self.store.as_ref(), CorrectionId(id), |correction| {
                        correction.status = correction_transition(
                            correction.status,
                            CorrectionEvent::AdminDecision { decision },
                            &policy,
                        )?;
                        correction.updated_at = Utc::now();
                        Ok(())
                    })
                    .await?;
                (
                    EntityStatus::Correction(correction.status),
                    correction.votes_for,
                    correction.votes_against,
                )
            }
        };

        info!(
            kind = %kind,
            id = %id,
            admin = %identity.user_id,
            status = %status,
            "admin decision recorded"
        );
        self.notifier.publish(EntityChange {
            kind,
            id: id.to_string(),
            status: status.to_string(),
            votes_for,
            votes_against,
        });
        Ok(status)
    }

    /// Resolve an open report. Resolving a resolved report is an error.
    pub async fn resolve_report(
        &self,
        id: ReportId,
        resolution: String,
        identity: &IdentityContext,
    ) -> Result<ReportEntity, ModerationError> {
        self.require_admin(identity)?;
        if resolution.trim().is_empty() {
            return Err(ModerationError::validation("a resolution note is required"));
        }

        let admin = identity.user_id.clone();
        let report = transact_report(self.store.as_ref(), id, |report| {
            if report.status == ReportStatus::Resolved {
                return Err(ModerationError::InvalidStateForOperation {
                    status: "resolved".to_string(),
                    operation: "resolve",
                });
            }
            report.status = ReportStatus::Resolved;
            report.resolution = Some(resolution.clone());
            report.resolved_by = Some(admin.clone());
            report.resolved_at = Some(Utc::now());
            Ok(())
        })
        .await?;

        info!(report_id = %id, admin = %identity.user_id, "report resolved");
        Ok(report)
    }

    fn require_admin(&self, identity: &IdentityContext) -> Result<(), ModerationError> {
        if identity.is_admin() {
            Ok(())
        } else {
            Err(ModerationError::PermissionDenied {
                user: identity.user_id.clone(),
            })
        }
    }
}
