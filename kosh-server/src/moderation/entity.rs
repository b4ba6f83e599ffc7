//! Entity types for the moderation lifecycle.
//!
//! This module defines the records the engine moves through review stages.
//! Following the principle of "make illegal states unrepresentable", each
//! entity kind carries exactly one canonical status enum; the snake_case
//! serde representation is the single (de)serialization boundary for both
//! persistence and the wire. There is no parallel vocabulary of display
//! names mapped ad hoc at call sites.

use chrono::{DateTime, Utc};
use kosh_core::{
    CorrectionId, CorrectionType, Meaning, PartOfSpeech, ReportId, UserId, VoteDecision, WordId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle stage of a word entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordStatus {
    /// Open for community voting (initial state on submission).
    CommunityReview,
    /// Passed the community approval threshold; awaiting an admin decision.
    PendingReview,
    /// Accepted into the dictionary (terminal).
    Approved,
    /// Rejected by an admin (terminal).
    Rejected,
    /// Rejected by community vote without reaching an admin (terminal).
    CommunityRejected,
}

impl WordStatus {
    /// True for states no event may leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::CommunityRejected
        )
    }

    /// True if community votes are accepted in this state.
    ///
    /// Votes stay legal in `pending_review`: a vote racing with the one that
    /// crossed the threshold still lands in the ledger, it just cannot
    /// promote the word a second time.
    pub fn is_votable(&self) -> bool {
        matches!(self, Self::CommunityReview | Self::PendingReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommunityReview => "community_review",
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::CommunityRejected => "community_rejected",
        }
    }
}

impl fmt::Display for WordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle stage of a proposed correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    /// Open for community voting (initial state on proposal).
    ShallowReview,
    /// Approved by community vote; awaiting application to the word.
    Approved,
    /// Rejected by community vote (terminal).
    Rejected,
    /// Approved directly by an admin; awaiting application to the word.
    AdminApproved,
    /// Rejected directly by an admin (terminal).
    AdminRejected,
    /// Applied to the live word (terminal).
    Applied,
}

impl CorrectionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::AdminRejected | Self::Applied)
    }

    pub fn is_votable(&self) -> bool {
        matches!(self, Self::ShallowReview)
    }

    /// True if the correction may be applied to its word.
    pub fn is_applicable(&self) -> bool {
        matches!(self, Self::Approved | Self::AdminApproved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShallowReview => "shallow_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::AdminApproved => "admin_approved",
            Self::AdminRejected => "admin_rejected",
            Self::Applied => "applied",
        }
    }
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of either entity kind, for operations that span both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityStatus {
    Word(WordStatus),
    Correction(CorrectionStatus),
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Word(s) => s.as_str(),
            Self::Correction(s) => s.as_str(),
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in an entity's vote ledger.
///
/// Ledger entries are append-only: a recorded vote is never edited or
/// removed, which is what makes retrying a timed-out vote request safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub user: UserId,
    pub decision: VoteDecision,
    #[serde(default)]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A dictionary word under moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntity {
    pub id: WordId,
    pub kurukh_word: String,
    pub meanings: Vec<Meaning>,
    pub part_of_speech: PartOfSpeech,
    #[serde(default)]
    pub pronunciation: Option<String>,
    /// The submitting user; barred from voting on this word.
    pub contributor: UserId,
    pub status: WordStatus,
    pub votes_for: u32,
    pub votes_against: u32,
    pub reviewed_by: Vec<VoteRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WordEntity {
    /// Construct a freshly submitted word in `community_review`.
    pub fn new(draft: WordDraft, contributor: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: WordId::generate(),
            kurukh_word: draft.kurukh_word,
            meanings: draft.meanings,
            part_of_speech: draft.part_of_speech,
            pronunciation: draft.pronunciation,
            contributor,
            status: WordStatus::CommunityReview,
            votes_for: 0,
            votes_against: 0,
            reviewed_by: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks the ledger invariant: tallies match the ledger, no duplicate
    /// voters, and the contributor never appears.
    pub fn ledger_consistent(&self) -> bool {
        ledger_consistent(
            &self.reviewed_by,
            self.votes_for,
            self.votes_against,
            Some(&self.contributor),
        )
    }

    pub fn has_vote_from(&self, user: &UserId) -> bool {
        self.reviewed_by.iter().any(|r| &r.user == user)
    }

    /// Append a vote and update the tallies. Callers are responsible for the
    /// guard checks; this only mutates the ledger.
    pub fn record_vote(&mut self, record: VoteRecord) {
        match record.decision {
            VoteDecision::Approve => self.votes_for += 1,
            VoteDecision::Reject => self.votes_against += 1,
        }
        self.updated_at = record.timestamp;
        self.reviewed_by.push(record);
    }
}

/// Caller-supplied fields of a word submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDraft {
    pub kurukh_word: String,
    pub meanings: Vec<Meaning>,
    pub part_of_speech: PartOfSpeech,
    #[serde(default)]
    pub pronunciation: Option<String>,
}

/// A proposed change to one field of an existing word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionEntity {
    pub id: CorrectionId,
    /// Reference, not ownership: the word may be mutated independently.
    pub word_id: WordId,
    /// The proposing user; barred from voting on this correction.
    pub proposer: UserId,
    pub correction_type: CorrectionType,
    /// Snapshot of the targeted value at proposal time, used as the match
    /// key when the correction is applied.
    pub current_value: String,
    pub proposed_change: String,
    pub explanation: String,
    pub status: CorrectionStatus,
    pub votes_for: u32,
    pub votes_against: u32,
    pub reviewed_by: Vec<VoteRecord>,
    /// Set exactly once when the correction is applied; immutable after.
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CorrectionEntity {
    pub fn ledger_consistent(&self) -> bool {
        ledger_consistent(
            &self.reviewed_by,
            self.votes_for,
            self.votes_against,
            Some(&self.proposer),
        )
    }

    pub fn has_vote_from(&self, user: &UserId) -> bool {
        self.reviewed_by.iter().any(|r| &r.user == user)
    }

    pub fn record_vote(&mut self, record: VoteRecord) {
        match record.decision {
            VoteDecision::Approve => self.votes_for += 1,
            VoteDecision::Reject => self.votes_against += 1,
        }
        self.updated_at = record.timestamp;
        self.reviewed_by.push(record);
    }
}

fn ledger_consistent(
    ledger: &[VoteRecord],
    votes_for: u32,
    votes_against: u32,
    barred: Option<&UserId>,
) -> bool {
    let approvals = ledger
        .iter()
        .filter(|r| r.decision == VoteDecision::Approve)
        .count() as u32;
    let rejections = ledger.len() as u32 - approvals;
    if approvals != votes_for || rejections != votes_against {
        return false;
    }
    if let Some(barred) = barred {
        if ledger.iter().any(|r| &r.user == barred) {
            return false;
        }
    }
    for (i, record) in ledger.iter().enumerate() {
        if ledger[..i].iter().any(|r| r.user == record.user) {
            return false;
        }
    }
    true
}

/// Status of a user-filed report against a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Resolved,
}

/// A user-filed report against a word. No threshold logic; a plain
/// append/resolve log handled by the admin gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntity {
    pub id: ReportId,
    pub word_id: WordId,
    pub reporter: UserId,
    pub reason: String,
    pub status: ReportStatus,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<UserId>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
