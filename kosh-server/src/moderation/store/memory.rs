//! In-memory implementation of `EntityStore`.
//!
//! Entities live in `HashMap`s behind `RwLock`s; all state is lost on
//! restart. Compare-and-swap is implemented honestly (read lock for loads,
//! write lock plus version check for commits), so concurrent-writer races
//! behave the same way here as against a real backend. This is the store
//! the tests run against.

use std::collections::HashMap;

use async_trait::async_trait;
use kosh_core::{CorrectionId, ReportId, WordId};
use tokio::sync::RwLock;

use super::{EntityStore, Versioned};
use crate::moderation::entity::{
    CorrectionEntity, CorrectionStatus, ReportEntity, ReportStatus, WordEntity, WordStatus,
};
use crate::moderation::error::ModerationError;

/// In-memory entity store.
#[derive(Default)]
pub struct InMemoryStore {
    words: RwLock<HashMap<WordId, Versioned<WordEntity>>>,
    corrections: RwLock<HashMap<CorrectionId, Versioned<CorrectionEntity>>>,
    reports: RwLock<HashMap<ReportId, Versioned<ReportEntity>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create_word(&self, word: &WordEntity) -> Result<(), ModerationError> {
        let mut words = self.words.write().await;
        if words.contains_key(&word.id) {
            return Err(ModerationError::storage(
                "create word",
                format!("duplicate id {}", word.id),
            ));
        }
        words.insert(
            word.id,
            Versioned {
                version: 1,
                value: word.clone(),
            },
        );
        Ok(())
    }

    async fn load_word(
        &self,
        id: WordId,
    ) -> Result<Option<Versioned<WordEntity>>, ModerationError> {
        let words = self.words.read().await;
        Ok(words.get(&id).cloned())
    }

    async fn store_word(
        &self,
        expected_version: u64,
        word: &WordEntity,
    ) -> Result<bool, ModerationError> {
        let mut words = self.words.write().await;
        match words.get_mut(&word.id) {
            Some(stored) if stored.version == expected_version => {
                stored.version += 1;
                stored.value = word.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_words(
        &self,
        status: Option<WordStatus>,
    ) -> Result<Vec<WordEntity>, ModerationError> {
        let words = self.words.read().await;
        let mut out: Vec<WordEntity> = words
            .values()
            .filter(|v| status.is_none_or(|s| v.value.status == s))
            .map(|v| v.value.clone())
            .collect();
        out.sort_by_key(|w| w.created_at);
        Ok(out)
    }

    async fn create_correction(
        &self,
        correction: &CorrectionEntity,
    ) -> Result<(), ModerationError> {
        let mut corrections = self.corrections.write().await;
        if corrections.contains_key(&correction.id) {
            return Err(ModerationError::storage(
                "create correction",
                format!("duplicate id {}", correction.id),
            ));
        }
        corrections.insert(
            correction.id,
            Versioned {
                version: 1,
                value: correction.clone(),
            },
        );
        Ok(())
    }

    async fn load_correction(
        &self,
        id: CorrectionId,
    ) -> Result<Option<Versioned<CorrectionEntity>>, ModerationError> {
        let corrections = self.corrections.read().await;
        Ok(corrections.get(&id).cloned())
    }

    async fn store_correction(
        &self,
        expected_version: u64,
        correction: &CorrectionEntity,
    ) -> Result<bool, ModerationError> {
        let mut corrections = self.corrections.write().await;
        match corrections.get_mut(&correction.id) {
            Some(stored) if stored.version == expected_version => {
                stored.version += 1;
                stored.value = correction.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_corrections(
        &self,
        status: Option<CorrectionStatus>,
    ) -> Result<Vec<CorrectionEntity>, ModerationError> {
        let corrections = self.corrections.read().await;
        let mut out: Vec<CorrectionEntity> = corrections
            .values()
            .filter(|v| status.is_none_or(|s| v.value.status == s))
            .map(|v| v.value.clone())
            .collect();
        out.sort_by_key(|c| c.created_at);
        Ok(out)
    }

    async fn store_correction_with_word(
        &self,
        correction_version: u64,
        correction: &CorrectionEntity,
        word_version: u64,
        word: &WordEntity,
    ) -> Result<bool, ModerationError> {
        // Both locks held across the check and both writes: either entity
        // commits only if both versions still match.
        let mut corrections = self.corrections.write().await;
        let mut words = self.words.write().await;

        let correction_ok = corrections
            .get(&correction.id)
            .is_some_and(|v| v.version == correction_version);
        let word_ok = words
            .get(&word.id)
            .is_some_and(|v| v.version == word_version);
        if !correction_ok || !word_ok {
            return Ok(false);
        }

        let stored_correction = corrections
            .get_mut(&correction.id)
            .expect("checked presence above");
        stored_correction.version += 1;
        stored_correction.value = correction.clone();

        let stored_word = words.get_mut(&word.id).expect("checked presence above");
        stored_word.version += 1;
        stored_word.value = word.clone();

        Ok(true)
    }

    async fn create_report(&self, report: &ReportEntity) -> Result<(), ModerationError> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.id) {
            return Err(ModerationError::storage(
                "create report",
                format!("duplicate id {}", report.id),
            ));
        }
        reports.insert(
            report.id,
            Versioned {
                version: 1,
                value: report.clone(),
            },
        );
        Ok(())
    }

    async fn load_report(
        &self,
        id: ReportId,
    ) -> Result<Option<Versioned<ReportEntity>>, ModerationError> {
        let reports = self.reports.read().await;
        Ok(reports.get(&id).cloned())
    }

    async fn store_report(
        &self,
        expected_version: u64,
        report: &ReportEntity,
    ) -> Result<bool, ModerationError> {
        let mut reports = self.reports.write().await;
        match reports.get_mut(&report.id) {
            Some(stored) if stored.version == expected_version => {
                stored.version += 1;
                stored.value = report.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportEntity>, ModerationError> {
        let reports = self.reports.read().await;
        let mut out: Vec<ReportEntity> = reports
            .values()
            .filter(|v| status.is_none_or(|s| v.value.status == s))
            .map(|v| v.value.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }
}
