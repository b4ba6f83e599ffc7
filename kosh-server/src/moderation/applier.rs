//! One-time application of an approved correction to its word.
//!
//! The apply step is the only operation that touches two entities: the
//! correction (marked `applied`, stamped `applied_at`) and the word (one
//! field replaced). Both commit together or neither does.
//!
//! A correction carries a snapshot of the value it targeted at proposal
//! time. If the live value has since diverged, the snapshot no longer
//! identifies what the reviewers approved changing, so the apply surfaces
//! `ApplyConflict` instead of overwriting.

use std::sync::Arc;

use chrono::Utc;
use kosh_core::{CorrectionId, CorrectionType, EntityKind, PartOfSpeech};
use tracing::info;

use super::entity::WordEntity;
use super::error::ModerationError;
use super::notifier::{ChangeNotifier, EntityChange};
use super::policy::ThresholdPolicy;
use super::store::{transact_correction_with_word, EntityStore};
use super::transition::{correction_transition, CorrectionEvent};

/// Applies approved corrections to live words.
pub struct CorrectionApplier {
    store: Arc<dyn EntityStore>,
    policy: ThresholdPolicy,
    notifier: ChangeNotifier,
}

impl CorrectionApplier {
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

    /// Apply the correction to its word.
    ///
    /// Preconditions: the correction is `approved` or `admin_approved` and
    /// `applied_at` is unset. A second call fails with `AlreadyApplied`;
    /// the word is mutated at most once per correction.
    pub async fn apply(&self, id: CorrectionId) -> Result<(), ModerationError> {
        let policy = self.policy;

        let (correction, word) =
            transact_correction_with_word(self.store.as_ref(), id, |correction, word| {
                if correction.applied_at.is_some() {
                    return Err(ModerationError::AlreadyApplied);
                }
                let next = correction_transition(correction.status, CorrectionEvent::Apply, &policy)?;

                patch_word_field(
                    word,
                    correction.correction_type,
                    &correction.current_value,
                    &correction.proposed_change,
                )?;

                let now = Utc::now();
                word.updated_at = now;
                correction.status = next;
                correction.applied_at = Some(now);
                correction.updated_at = now;
                Ok(())
            })
            .await?;

        info!(
            correction_id = %correction.id,
            word_id = %word.id,
            correction_type = %correction.correction_type,
            "correction applied"
        );
        self.notifier.publish(EntityChange {
            kind: EntityKind::Correction,
            id: correction.id.to_string(),
            status: correction.status.to_string(),
            votes_for: correction.votes_for,
            votes_against: correction.votes_against,
        });
        self.notifier.publish(EntityChange {
            kind: EntityKind::Word,
            id: word.id.to_string(),
            status: word.status.to_string(),
            votes_for: word.votes_for,
            votes_against: word.votes_against,
        });
        Ok(())
    }
}

/// Replace the field a correction targets, keyed on the snapshot value.
///
/// The snapshot must equal the live value (for list fields: some element's
/// value) or the patch is refused with `ApplyConflict`.
fn patch_word_field(
    word: &mut WordEntity,
    correction_type: CorrectionType,
    current_value: &str,
    proposed_change: &str,
) -> Result<(), ModerationError> {
    let conflict = |found: &str| ModerationError::ApplyConflict {
        field: correction_type,
        expected: current_value.to_string(),
        found: found.to_string(),
    };

    match correction_type {
        CorrectionType::Spelling => {
            if word.kurukh_word != current_value {
                return Err(conflict(&word.kurukh_word));
            }
            word.kurukh_word = proposed_change.to_string();
        }
        CorrectionType::Pronunciation => {
            // An absent pronunciation matches an empty snapshot, so the
            // first pronunciation can be added via correction.
            let live = word.pronunciation.as_deref().unwrap_or("");
            if live != current_value {
                return Err(conflict(live));
            }
            word.pronunciation = Some(proposed_change.to_string());
        }
        CorrectionType::PartOfSpeech => {
            let live = word.part_of_speech.as_str();
            if live != current_value {
                return Err(conflict(live));
            }
            word.part_of_speech = PartOfSpeech::parse(proposed_change).ok_or_else(|| {
                ModerationError::validation(format!(
                    "unknown part of speech {:?}",
                    proposed_change
                ))
            })?;
        }
        CorrectionType::Definition => {
            let meaning = word
                .meanings
                .iter_mut()
                .find(|m| m.definition == current_value)
                .ok_or_else(|| conflict("no meaning with the expected definition"))?;
            meaning.definition = proposed_change.to_string();
        }
        CorrectionType::Example => {
            let meaning = word
                .meanings
                .iter_mut()
                .find(|m| m.example.as_deref() == Some(current_value))
                .ok_or_else(|| conflict("no meaning with the expected example"))?;
            meaning.example = Some(proposed_change.to_string());
        }
        CorrectionType::ExampleTranslation => {
            let meaning = word
                .meanings
                .iter_mut()
                .find(|m| m.example_translation.as_deref() == Some(current_value))
                .ok_or_else(|| conflict("no meaning with the expected translation"))?;
            meaning.example_translation = Some(proposed_change.to_string());
        }
        CorrectionType::Other => {
            // Free-form corrections name no patchable field; an editor
            // carries them out by hand.
            return Err(ModerationError::validation(
                "corrections of type 'other' must be applied manually",
            ));
        }
    }
    Ok(())
}
