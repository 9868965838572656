//! Remote snapshot access
//!
//! The snapshot is laid out as `<prefix>/<entity>/<partition>/<file>.gz`,
//! where partitions are named like `updated_date=2024-02-01/`. A
//! [`RemoteSource`] lists partitions and files and copies one file to local
//! disk; [`Enumerator`] decides which of those files still need loading.

pub mod enumerator;
pub mod local;
pub mod s3;

pub use enumerator::{select_latest_partition, Enumerator, Listing};
pub use local::LocalSource;
pub use s3::S3Source;

use crate::entity::EntityKind;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Extension of the compressed JSON-lines data files
pub const DATA_FILE_SUFFIX: &str = ".gz";

/// Listing and download contract for a snapshot store
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Child partition names of the entity directory, each ending in `/`
    async fn list_partitions(&self, entity: EntityKind) -> Result<Vec<String>>;

    /// Data file names directly inside a partition
    async fn list_files(&self, entity: EntityKind, partition: &str) -> Result<Vec<String>>;

    /// Copy one file to `dest`, returning the number of bytes written
    async fn fetch(
        &self,
        entity: EntityKind,
        partition: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<u64>;

    /// Human-readable location of a file, e.g. `s3://openalex/data/works/...`
    fn location(&self, entity: EntityKind, partition: &str, file_name: &str) -> String;
}

/// One data file of an entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub entity: EntityKind,
    /// Partition name including the trailing `/`
    pub partition: String,
    pub name: String,
    pub full_path: String,
}

impl SourceFile {
    /// Idempotency key recorded in the checkpoint: `partition + name`
    pub fn key(&self) -> String {
        format!("{}{}", self.partition, self.name)
    }
}

/// Ensure a partition name carries exactly one trailing `/`
pub fn normalize_partition(name: &str) -> String {
    format!("{}/", name.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_joins_partition_and_name() {
        let file = SourceFile {
            entity: EntityKind::Works,
            partition: "updated_date=2024-02-01/".into(),
            name: "part_000.gz".into(),
            full_path: "s3://openalex/data/works/updated_date=2024-02-01/part_000.gz".into(),
        };
        assert_eq!(file.key(), "updated_date=2024-02-01/part_000.gz");
    }

    #[test]
    fn test_normalize_partition() {
        assert_eq!(normalize_partition("updated_date=2024-02-01"), "updated_date=2024-02-01/");
        assert_eq!(normalize_partition("updated_date=2024-02-01//"), "updated_date=2024-02-01/");
    }
}
