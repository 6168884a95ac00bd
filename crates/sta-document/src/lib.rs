//! STA Document Model
//!
//! Plain-data view of host documents as seen by the migration subsystem.
//!
//! # Core Concepts
//!
//! - [`DocumentSnapshot`]: Deep, owned copy of one host document (actor, item, token)
//! - [`Diff`]: Structural difference between two snapshots, in the host's update format
//! - [`MigrationRecord`]: Per-document provenance stored under `flags.<namespace>._migration`
//! - [`SchemaVersion`]: Totally ordered migration version number
//!
//! # Example
//!
//! ```rust
//! use sta_document::{DocumentSnapshot, RuntimeVersions, SchemaVersion};
//! use serde_json::json;
//!
//! let original = DocumentSnapshot::new(json!({
//!     "_id": "a1",
//!     "type": "character",
//!     "flags": {},
//!     "items": []
//! }))
//! .unwrap();
//!
//! let mut working = original.clone();
//! working.stamp_migration("sta-enhanced", SchemaVersion::new(0.1), &RuntimeVersions::default());
//!
//! let diff = original.diff(&working);
//! assert!(!diff.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod diff;
mod error;
mod pointer;
mod provenance;
mod snapshot;
mod version;

pub use diff::{apply_diff, Diff, DELETION_PREFIX};
pub use error::DocumentError;
pub use provenance::{MigrationRecord, PreviousState, RuntimeVersions, MIGRATION_FLAG_KEY};
pub use snapshot::{
    DocumentSnapshot, FLAGS_KEY, ID_KEY, ITEMS_KEY, NAME_KEY, SYSTEM_KEY, TYPE_KEY,
};
pub use version::SchemaVersion;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
