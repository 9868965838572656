//! OAETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the OAETL workspace.
//!
//! # Overview
//!
//! This crate provides functionality used by every OAETL workspace member:
//!
//! - **Error Handling**: Common error type and result alias
//! - **Logging**: Console/file/JSON tracing setup driven by environment
//! - **Retry**: Bounded retry with exponential backoff for remote I/O
//!
//! # Example
//!
//! ```no_run
//! use oaetl_common::retry::{retry_with_backoff, RetryPolicy};
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let policy = RetryPolicy::new(3, std::time::Duration::from_secs(5));
//! let body = retry_with_backoff(&policy, "download", |_attempt| async {
//!     tokio::fs::read("part_000.gz").await
//! })
//! .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod logging;
pub mod retry;

// Re-export commonly used types
pub use error::{EtlError, Result};
