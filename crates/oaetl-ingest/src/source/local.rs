//! Directory mirror of the snapshot
//!
//! Reads `<root>/<entity>/<partition>/<file>.gz`, the same layout
//! `aws s3 sync s3://openalex/data <root>` produces. Useful for offline
//! reloads and for exercising the pipeline without network access.

use super::{RemoteSource, DATA_FILE_SUFFIX};
use crate::entity::EntityKind;
use crate::error::Result;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, entity: EntityKind, partition: &str, file_name: &str) -> PathBuf {
        self.root
            .join(entity.as_str())
            .join(partition.trim_end_matches('/'))
            .join(file_name)
    }
}

/// Directory (or file) names under `dir`, sorted. A missing directory is empty.
async fn read_names(dir: &Path, want_dirs: bool) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() != want_dirs {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl RemoteSource for LocalSource {
    async fn list_partitions(&self, entity: EntityKind) -> Result<Vec<String>> {
        let dirs = read_names(&self.root.join(entity.as_str()), true).await?;
        Ok(dirs.into_iter().map(|d| format!("{}/", d)).collect())
    }

    async fn list_files(&self, entity: EntityKind, partition: &str) -> Result<Vec<String>> {
        let dir = self
            .root
            .join(entity.as_str())
            .join(partition.trim_end_matches('/'));
        let files = read_names(&dir, false).await?;
        Ok(files
            .into_iter()
            .filter(|name| name.ends_with(DATA_FILE_SUFFIX))
            .collect())
    }

    async fn fetch(
        &self,
        entity: EntityKind,
        partition: &str,
        file_name: &str,
        dest: &Path,
    ) -> Result<u64> {
        let bytes = tokio::fs::copy(self.file_path(entity, partition, file_name), dest).await?;
        Ok(bytes)
    }

    fn location(&self, entity: EntityKind, partition: &str, file_name: &str) -> String {
        self.file_path(entity, partition, file_name)
            .display()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lists_partitions_and_gz_files() {
        let dir = tempfile::tempdir().unwrap();
        let partition = dir.path().join("authors").join("updated_date=2024-01-01");
        std::fs::create_dir_all(&partition).unwrap();
        std::fs::write(partition.join("part_001.gz"), b"x").unwrap();
        std::fs::write(partition.join("part_000.gz"), b"x").unwrap();
        std::fs::write(partition.join("manifest"), b"x").unwrap();

        let source = LocalSource::new(dir.path());

        assert_eq!(
            source.list_partitions(EntityKind::Authors).await.unwrap(),
            vec!["updated_date=2024-01-01/".to_string()]
        );
        assert_eq!(
            source
                .list_files(EntityKind::Authors, "updated_date=2024-01-01/")
                .await
                .unwrap(),
            vec!["part_000.gz".to_string(), "part_001.gz".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_entity_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new(dir.path());
        assert!(source.list_partitions(EntityKind::Works).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let partition = dir.path().join("works").join("updated_date=2024-01-01");
        std::fs::create_dir_all(&partition).unwrap();
        std::fs::write(partition.join("part_000.gz"), b"payload").unwrap();
        let dest = dir.path().join("copy.gz");

        let source = LocalSource::new(dir.path());
        let bytes = source
            .fetch(EntityKind::Works, "updated_date=2024-01-01/", "part_000.gz", &dest)
            .await
            .unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }
}
