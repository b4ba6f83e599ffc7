//! Storage abstraction for moderation entities.
//!
//! The `EntityStore` trait exposes versioned reads and compare-and-swap
//! writes; the free `transact_*` helpers build atomic read-modify-write
//! transactions on top of them with bounded optimistic retry. The store is
//! the only shared mutable resource in the engine and therefore its sole
//! synchronization point.
//!
//! Implementations provide different backends (in-memory for tests and
//! ephemeral deployments, SQLite for durability).

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use kosh_core::{CorrectionId, EntityKind, ReportId, WordId};
use tracing::debug;

use super::entity::{
    CorrectionEntity, CorrectionStatus, ReportEntity, ReportStatus, WordEntity, WordStatus,
};
use super::error::ModerationError;

/// How many times a conflicted optimistic transaction is retried with a
/// fresh read before surfacing `Conflict`. Human voting bursts are small;
/// a handful of retries absorbs them without long-held locks.
pub const MAX_TXN_RETRIES: u32 = 5;

/// A stored value together with its optimistic-concurrency version.
///
/// The version increments on every committed write; a compare-and-swap
/// write only commits if the stored version still matches the one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Versioned key/value persistence for moderation entities.
///
/// `store_*` methods return `Ok(false)` when the expected version no longer
/// matches (a concurrent writer won); callers retry with a fresh read via
/// the `transact_*` helpers.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn create_word(&self, word: &WordEntity) -> Result<(), ModerationError>;
    async fn load_word(&self, id: WordId) -> Result<Option<Versioned<WordEntity>>, ModerationError>;
    async fn store_word(
        &self,
        expected_version: u64,
        word: &WordEntity,
    ) -> Result<bool, ModerationError>;
    async fn list_words(
        &self,
        status: Option<WordStatus>,
    ) -> Result<Vec<WordEntity>, ModerationError>;

    async fn create_correction(&self, correction: &CorrectionEntity)
        -> Result<(), ModerationError>;
    async fn load_correction(
        &self,
        id: CorrectionId,
    ) -> Result<Option<Versioned<CorrectionEntity>>, ModerationError>;
    async fn store_correction(
        &self,
        expected_version: u64,
        correction: &CorrectionEntity,
    ) -> Result<bool, ModerationError>;
    async fn list_corrections(
        &self,
        status: Option<CorrectionStatus>,
    ) -> Result<Vec<CorrectionEntity>, ModerationError>;

    /// Commit a Correction and its Word together, or neither.
    ///
    /// This is the only two-entity transaction in the system; it exists for
    /// the correction-apply step, which must mark the correction applied and
    /// mutate the word atomically.
    async fn store_correction_with_word(
        &self,
        correction_version: u64,
        correction: &CorrectionEntity,
        word_version: u64,
        word: &WordEntity,
    ) -> Result<bool, ModerationError>;

    async fn create_report(&self, report: &ReportEntity) -> Result<(), ModerationError>;
    async fn load_report(
        &self,
        id: ReportId,
    ) -> Result<Option<Versioned<ReportEntity>>, ModerationError>;
    async fn store_report(
        &self,
        expected_version: u64,
        report: &ReportEntity,
    ) -> Result<bool, ModerationError>;
    async fn list_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportEntity>, ModerationError>;
}

/// Atomically read-modify-write a word.
///
/// The mutator runs against a transaction-fresh copy on every attempt, so
/// guard checks inside it (duplicate vote, self vote, votable state) always
/// see the latest committed ledger. A guard error aborts immediately and
/// leaves the entity unchanged; only version conflicts are retried.
pub async fn transact_word<F>(
    store: &dyn EntityStore,
    id: WordId,
    mut mutate: F,
) -> Result<WordEntity, ModerationError>
where
    F: FnMut(&mut WordEntity) -> Result<(), ModerationError>,
{
    for attempt in 0..MAX_TXN_RETRIES {
        let Versioned {
            version,
            value: mut word,
        } = store
            .load_word(id)
            .await?
            .ok_or_else(|| ModerationError::not_found(EntityKind::Word, id))?;

        mutate(&mut word)?;

        if store.store_word(version, &word).await? {
            return Ok(word);
        }
        debug!(word_id = %id, attempt, "word transaction conflicted, retrying with fresh read");
    }
    Err(ModerationError::Conflict {
        retries: MAX_TXN_RETRIES,
    })
}

/// Atomically read-modify-write a correction. Same contract as
/// [`transact_word`].
pub async fn transact_correction<F>(
    store: &dyn EntityStore,
    id: CorrectionId,
    mut mutate: F,
) -> Result<CorrectionEntity, ModerationError>
where
    F: FnMut(&mut CorrectionEntity) -> Result<(), ModerationError>,
{
    for attempt in 0..MAX_TXN_RETRIES {
        let Versioned {
            version,
            value: mut correction,
        } = store
            .load_correction(id)
            .await?
            .ok_or_else(|| ModerationError::not_found(EntityKind::Correction, id))?;

        mutate(&mut correction)?;

        if store.store_correction(version, &correction).await? {
            return Ok(correction);
        }
        debug!(
            correction_id = %id,
            attempt, "correction transaction conflicted, retrying with fresh read"
        );
    }
    Err(ModerationError::Conflict {
        retries: MAX_TXN_RETRIES,
    })
}

/// Atomically read-modify-write a correction together with its word.
///
/// Both entities are re-read fresh on every attempt and committed together
/// or not at all. Used only by the correction applier.
pub async fn transact_correction_with_word<F>(
    store: &dyn EntityStore,
    id: CorrectionId,
    mut mutate: F,
) -> Result<(CorrectionEntity, WordEntity), ModerationError>
where
    F: FnMut(&mut CorrectionEntity, &mut WordEntity) -> Result<(), ModerationError>,
{
    for attempt in 0..MAX_TXN_RETRIES {
        let Versioned {
            version: correction_version,
            value: mut correction,
        } = store
            .load_correction(id)
            .await?
            .ok_or_else(|| ModerationError::not_found(EntityKind::Correction, id))?;

        let word_id = correction.word_id;
        let Versioned {
            version: word_version,
            value: mut word,
        } = store
            .load_word(word_id)
            .await?
            .ok_or_else(|| ModerationError::not_found(EntityKind::Word, word_id))?;

        mutate(&mut correction, &mut word)?;

        if store
            .store_correction_with_word(correction_version, &correction, word_version, &word)
            .await?
        {
            return Ok((correction, word));
        }
        debug!(
            correction_id = %id,
            attempt, "correction+word transaction conflicted, retrying with fresh read"
        );
    }
    Err(ModerationError::Conflict {
        retries: MAX_TXN_RETRIES,
    })
}

/// Atomically read-modify-write a report.
pub async fn transact_report<F>(
    store: &dyn EntityStore,
    id: ReportId,
    mut mutate: F,
) -> Result<ReportEntity, ModerationError>
where
    F: FnMut(&mut ReportEntity) -> Result<(), ModerationError>,
{
    for attempt in 0..MAX_TXN_RETRIES {
        let Versioned {
            version,
            value: mut report,
        } = store
            .load_report(id)
            .await?
            .ok_or(ModerationError::ReportNotFound { id: id.to_string() })?;

        mutate(&mut report)?;

        if store.store_report(version, &report).await? {
            return Ok(report);
        }
        debug!(report_id = %id, attempt, "report transaction conflicted, retrying with fresh read");
    }
    Err(ModerationError::Conflict {
        retries: MAX_TXN_RETRIES,
    })
}
