//! Shared domain vocabulary for the kosh moderation engine.
//!
//! This crate holds the types that both the server and the CLI speak:
//! entity identifiers, the caller's identity context, vote/decision enums,
//! and the dictionary-entry value types. The moderation lifecycle itself
//! lives in `kosh-server`.

pub mod entry;
pub mod identity;

pub use entry::*;
pub use identity::*;
