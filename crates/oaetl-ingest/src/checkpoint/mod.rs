//! Crash-recoverable ingestion progress
//!
//! The checkpoint answers two questions for the pipeline: which source files
//! of an entity kind are already fully loaded, and whether the whole entity
//! kind is done. A file is only added to `completed_files` after its final
//! flush committed, so a crash at any point leaves it eligible for a full
//! reprocess on the next run.

pub mod state;
pub mod store;

pub use state::{
    CheckpointState, CheckpointSummary, EntityState, EntityStatus, EntitySummary, ErrorEntry,
};
pub use store::CheckpointStore;
