//! Download of source files into local scratch space
//!
//! A fetched file is owned by a [`ScratchFile`] guard. Dropping the guard
//! deletes the local copy, so scratch space is reclaimed whether the file
//! was loaded successfully or processing bailed out early.

use crate::error::{IngestError, Result};
use crate::source::{RemoteSource, SourceFile};
use oaetl_common::retry::{retry_with_backoff, RetryPolicy};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Local copy of a remote file, removed on drop
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    bytes: u64,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file"),
        }
    }
}

/// Copies source files to `scratch_dir/<entity>/<name>` with retries
pub struct Fetcher {
    source: Arc<dyn RemoteSource>,
    scratch_dir: PathBuf,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(source: Arc<dyn RemoteSource>, scratch_dir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            source,
            scratch_dir: scratch_dir.into(),
            retry,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Download `file`. On exhaustion no partial file is left behind.
    #[instrument(skip(self, file), fields(entity = %file.entity, file = %file.key()))]
    pub async fn fetch(&self, file: &SourceFile) -> Result<ScratchFile> {
        let dir = self.scratch_dir.join(file.entity.as_str());
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(&file.name);

        let operation = format!("fetch {}", file.full_path);
        let result = retry_with_backoff(&self.retry, &operation, |attempt| {
            let dest = dest.clone();
            async move {
                debug!(attempt, dest = %dest.display(), "Downloading");
                match self
                    .source
                    .fetch(file.entity, &file.partition, &file.name, &dest)
                    .await
                {
                    Ok(bytes) => Ok(bytes),
                    Err(e) => {
                        remove_partial(&dest).await;
                        Err(e)
                    },
                }
            }
        })
        .await;

        match result {
            Ok(bytes) => {
                info!(bytes, path = %dest.display(), "Fetched source file");
                Ok(ScratchFile { path: dest, bytes })
            },
            Err(e) => {
                remove_partial(&dest).await;
                Err(IngestError::FetchExhausted {
                    key: file.key(),
                    attempts: self.retry.max_attempts,
                    message: e.to_string(),
                })
            },
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial download"),
        Err(e) if e.kind() == ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial download"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Writes half a file and fails until `fail_times` attempts have been made
    struct FlakySource {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RemoteSource for FlakySource {
        async fn list_partitions(&self, _entity: EntityKind) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn list_files(&self, _entity: EntityKind, _partition: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, _entity: EntityKind, _partition: &str, _file_name: &str, dest: &Path) -> Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::fs::write(dest, b"partial").await?;
            if call <= self.fail_times {
                Err(IngestError::Remote(format!("connection reset on call {}", call)))
            } else {
                tokio::fs::write(dest, b"complete").await?;
                Ok(8)
            }
        }

        fn location(&self, _entity: EntityKind, partition: &str, file_name: &str) -> String {
            format!("flaky://{}{}", partition, file_name)
        }
    }

    fn file() -> SourceFile {
        SourceFile {
            entity: EntityKind::Authors,
            partition: "updated_date=2024-02-01/".into(),
            name: "b.gz".into(),
            full_path: "flaky://updated_date=2024-02-01/b.gz".into(),
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FlakySource { fail_times: 2, calls: AtomicU32::new(0) });
        let fetcher = Fetcher::new(source.clone(), dir.path(), RetryPolicy::immediate(3));

        let scratch = fetcher.fetch(&file()).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(std::fs::read(scratch.path()).unwrap(), b"complete");
        assert_eq!(scratch.path(), dir.path().join("authors").join("b.gz"));
    }

    #[tokio::test]
    async fn test_exhaustion_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FlakySource { fail_times: 10, calls: AtomicU32::new(0) });
        let fetcher = Fetcher::new(source.clone(), dir.path(), RetryPolicy::immediate(3));

        let err = fetcher.fetch(&file()).await.unwrap_err();

        assert!(matches!(err, IngestError::FetchExhausted { attempts: 3, .. }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(!dir.path().join("authors").join("b.gz").exists());
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FlakySource { fail_times: 0, calls: AtomicU32::new(0) });
        let fetcher = Fetcher::new(source, dir.path(), RetryPolicy::immediate(1));

        let scratch = fetcher.fetch(&file()).await.unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());

        drop(scratch);
        assert!(!path.exists());
    }
}
