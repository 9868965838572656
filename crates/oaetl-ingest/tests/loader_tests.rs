//! Batch loader behaviour across reruns and partial failures

mod common;

use async_trait::async_trait;
use common::{authors, write_gz, Harness, PARTITION};
use oaetl_ingest::checkpoint::EntityStatus;
use oaetl_ingest::config::LoaderConfig;
use oaetl_ingest::error::IngestError;
use oaetl_ingest::loader::BatchLoader;
use oaetl_ingest::normalize::OpenAlexNormalizer;
use oaetl_ingest::schema::SqlValue;
use oaetl_ingest::sink::{MemorySink, Sink, TableBatch};
use oaetl_ingest::source::SourceFile;
use oaetl_ingest::EntityKind;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn source_file(kind: EntityKind, name: &str) -> SourceFile {
    SourceFile {
        entity: kind,
        partition: format!("{}/", PARTITION),
        name: name.to_string(),
        full_path: format!("mirror/{}/{}/{}", kind, PARTITION, name),
    }
}

fn loader<S: Sink>(h: &Harness, sink: S, batch_size: usize) -> BatchLoader<OpenAlexNormalizer, S> {
    BatchLoader::new(
        OpenAlexNormalizer,
        sink,
        h.checkpoint.clone(),
        LoaderConfig {
            batch_size,
            max_record_errors: 5,
        },
    )
}

fn local_gz(h: &Harness, name: &str, lines: &[String]) -> PathBuf {
    let path = h.root.path().join("files").join(name);
    write_gz(&path, lines);
    path
}

fn work_line() -> String {
    json!({
        "id": "https://openalex.org/W100",
        "doi": "https://doi.org/10.1/abc",
        "title": "On loading",
        "publication_year": 2021,
        "publication_date": "2021-03-04",
        "ids": {"openalex": "https://openalex.org/W100", "pmid": "123"},
        "primary_location": {"is_oa": true, "source": {"id": "https://openalex.org/S1"}},
        "locations": [
            {"is_oa": true, "source": {"id": "https://openalex.org/S1"}},
            {"is_oa": false, "landing_page_url": "https://example.org/w100"}
        ],
        "open_access": {"is_oa": true, "oa_status": "gold"},
        "authorships": [
            {"author_position": "first", "author": {"id": "https://openalex.org/A1"},
             "institutions": [{"id": "https://openalex.org/I1"}]},
            {"author_position": "last", "author": {"id": "https://openalex.org/A2"}}
        ],
        "topics": [{"id": "https://openalex.org/T1", "score": 0.9}],
        "referenced_works": ["https://openalex.org/W1", "https://openalex.org/W2"],
        "related_works": ["https://openalex.org/W3"],
        "counts_by_year": [{"year": 2023, "cited_by_count": 4}]
    })
    .to_string()
}

#[tokio::test]
async fn test_reloading_a_file_is_idempotent() {
    let h = Harness::new();
    let path = local_gz(&h, "a.gz", &authors(0..4));
    let file = source_file(EntityKind::Authors, "a.gz");
    let loader = loader(&h, h.sink.clone(), 3);

    loader.process_file(&path, &file).await.unwrap();
    let first = h.sink.rows("authors");
    loader.process_file(&path, &file).await.unwrap();

    assert_eq!(h.sink.rows("authors"), first);
    assert_eq!(h.sink.row_count("authors_counts_by_year"), 4);
    // The counter only moves when a file is newly completed.
    assert_eq!(h.checkpoint.load().total_processed["authors_count"], 4);
}

/// Fails exactly one write, the `fail_at`-th (zero-based)
struct FailOnce {
    inner: Arc<MemorySink>,
    fail_at: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Sink for FailOnce {
    async fn write(&self, batches: &[TableBatch]) -> oaetl_ingest::Result<u64> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            self.inner.fail_next(1);
        }
        self.inner.write(batches).await
    }
}

#[tokio::test]
async fn test_rerun_after_mid_file_failure() {
    let h = Harness::new();
    let path = local_gz(&h, "a.gz", &authors(0..4));
    let file = source_file(EntityKind::Authors, "a.gz");

    let failing = FailOnce {
        inner: h.sink.clone(),
        fail_at: 1,
        calls: AtomicUsize::new(0),
    };
    let err = loader(&h, failing, 2).process_file(&path, &file).await.unwrap_err();
    assert!(matches!(err, IngestError::Flush { .. }));

    // The first flush is durable, the file is not.
    assert_eq!(h.sink.row_count("authors"), 2);
    let state = h.checkpoint.load();
    let entity = state.entity(EntityKind::Authors).unwrap();
    assert_eq!(entity.status, EntityStatus::InProgress);
    assert_eq!(entity.current_file.as_deref(), Some("updated_date=2024-02-01/a.gz"));
    assert!(entity.completed_files.is_empty());

    let report = loader(&h, h.sink.clone(), 2).process_file(&path, &file).await.unwrap();

    assert_eq!(report.records, 4);
    assert_eq!(h.sink.row_count("authors"), 4);
    assert_eq!(h.checkpoint.load().total_processed["authors_count"], 4);
}

#[tokio::test]
async fn test_work_fans_out_to_every_table() {
    let h = Harness::new();
    let path = local_gz(&h, "w.gz", &[work_line()]);

    let report = loader(&h, h.sink.clone(), 10)
        .process_file(&path, &source_file(EntityKind::Works, "w.gz"))
        .await
        .unwrap();

    assert_eq!(report.records, 1);
    assert_eq!(h.sink.row_count("works"), 1);
    assert_eq!(h.sink.row_count("works_ids"), 1);
    assert_eq!(h.sink.row_count("works_primary_locations"), 1);
    assert_eq!(h.sink.row_count("works_locations"), 2);
    assert_eq!(h.sink.row_count("works_open_access"), 1);
    assert_eq!(h.sink.row_count("works_authorships"), 2);
    assert_eq!(h.sink.row_count("works_topics"), 1);
    assert_eq!(h.sink.row_count("works_referenced_works"), 2);
    assert_eq!(h.sink.row_count("works_related_works"), 1);
    assert_eq!(h.sink.row_count("works_counts_by_year"), 1);

    let works = h.sink.rows("works");
    assert_eq!(works[0]["publication_year"], SqlValue::Integer(Some(2021)));
}

#[tokio::test]
async fn test_rerun_keeps_keyed_tables_unique() {
    let h = Harness::new();
    let path = local_gz(&h, "w.gz", &[work_line()]);
    let file = source_file(EntityKind::Works, "w.gz");
    let loader = loader(&h, h.sink.clone(), 10);

    loader.process_file(&path, &file).await.unwrap();
    loader.process_file(&path, &file).await.unwrap();

    assert_eq!(h.sink.row_count("works"), 1);
    assert_eq!(h.sink.row_count("works_authorships"), 2);
    assert_eq!(h.sink.row_count("works_referenced_works"), 2);
    assert_eq!(h.sink.row_count("works_locations"), 2);
}

#[tokio::test]
async fn test_locations_survive_crash_rerun_without_duplicates() {
    let h = Harness::new();
    let lines = [work_line(), work_line().replace("W100", "W101")];
    let path = local_gz(&h, "w.gz", &lines);
    let file = source_file(EntityKind::Works, "w.gz");

    let failing = FailOnce {
        inner: h.sink.clone(),
        fail_at: 1,
        calls: AtomicUsize::new(0),
    };
    assert!(loader(&h, failing, 1).process_file(&path, &file).await.is_err());
    assert_eq!(h.sink.row_count("works_locations"), 2);

    loader(&h, h.sink.clone(), 1).process_file(&path, &file).await.unwrap();

    // W100's locations were flushed twice but stored once.
    assert_eq!(h.sink.row_count("works"), 2);
    assert_eq!(h.sink.row_count("works_locations"), 4);
    let sources: Vec<SqlValue> = h
        .sink
        .rows("works_locations")
        .iter()
        .map(|row| row["source_id"].clone())
        .collect();
    assert!(sources.contains(&SqlValue::Text(Some(String::new()))));
}

#[tokio::test]
async fn test_concatenated_gzip_members_are_read() {
    let h = Harness::new();
    let first = local_gz(&h, "first.gz", &authors(0..2));
    let second = local_gz(&h, "second.gz", &authors(2..3));
    let mut joined = std::fs::read(&first).unwrap();
    joined.extend(std::fs::read(&second).unwrap());
    let path = h.root.path().join("files").join("joined.gz");
    std::fs::write(&path, joined).unwrap();

    let report = loader(&h, h.sink.clone(), 10)
        .process_file(&path, &source_file(EntityKind::Authors, "joined.gz"))
        .await
        .unwrap();

    assert_eq!(report.records, 3);
}

#[tokio::test]
async fn test_corrupt_gzip_fails_file() {
    let h = Harness::new();
    let path = h.root.path().join("broken.gz");
    std::fs::write(&path, b"\x1f\x8b\x08\x00 definitely not deflate").unwrap();

    let result = loader(&h, h.sink.clone(), 10)
        .process_file(&path, &source_file(EntityKind::Authors, "broken.gz"))
        .await;

    assert!(result.is_err());
    assert!(!h
        .checkpoint
        .is_file_complete(EntityKind::Authors, "updated_date=2024-02-01/broken.gz"));
}
