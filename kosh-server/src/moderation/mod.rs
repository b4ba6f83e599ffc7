//! The moderation state machine for dictionary entries.
//!
//! This module implements the community review lifecycle. The design
//! separates:
//! - **Entities**: what is being moderated (`entity`)
//! - **Transitions**: the pure lifecycle function (`transition`)
//! - **Policy**: vote thresholds (`policy`)
//! - **Store**: the single synchronization point, with optimistic
//!   compare-and-swap transactions (`store`)
//! - **Orchestrators**: vote aggregation (`service`), privileged bypass
//!   (`admin`), correction application (`applier`)
//! - **Notifier**: fan-out of committed state changes (`notifier`)

pub mod admin;
pub mod applier;
pub mod entity;
pub mod error;
pub mod notifier;
pub mod policy;
pub mod service;
pub mod store;
pub mod transition;

pub use admin::AdminGateway;
pub use applier::CorrectionApplier;
pub use entity::{
    CorrectionEntity, CorrectionStatus, EntityStatus, ReportEntity, ReportStatus, VoteRecord,
    WordDraft, WordEntity, WordStatus,
};
pub use error::ModerationError;
pub use notifier::{ChangeNotifier, EntityChange, EntityChanges};
pub use policy::ThresholdPolicy;
pub use service::{ModerationService, StatusView, VoteOutcome};
pub use store::{EntityStore, InMemoryStore, SqliteStore};
