//! s3pipe library
//!
//! Transfers very large objects out of S3 at aggregate throughput
//! approaching the network link, by running many concurrent range requests
//! and reassembling the segments in strict byte order on a sequential
//! output stream — a pipe, stdout, or an append-only file.
//!
//! # Key properties
//!
//! - **Strict ordering**: the sink receives segments exactly in offset
//!   order, whatever order the fetches complete in
//! - **Bounded memory**: at most `max_buffered` segment-sized buffers exist
//!   at any instant, leased from a fixed pool
//! - **Bounded concurrency**: a counting semaphore caps in-flight fetches
//! - **Stall detection**: a per-fetch inactivity watchdog kills silent
//!   connections
//! - **Fail fast**: the first fault aborts the run; partial output is the
//!   caller's to keep or discard
//! - **Credential rollover**: snapshots refresh before expiry without
//!   interrupting in-flight fetches
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use s3pipe::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let locator = ObjectLocator::parse("s3://my-bucket/huge-object.bin")?;
//!     let store = Arc::new(S3Client::new()?);
//!     let credentials = Arc::new(CredentialCache::ambient());
//!
//!     let snapshot = credentials.current().await;
//!     let size = store.object_size(&locator, &snapshot).await?;
//!
//!     let engine = TransferEngine::new(store, credentials, EngineConfig::default())?;
//!     let mut sink = tokio::io::stdout();
//!     let report = engine.run(&locator, size, &mut sink).await?;
//!     eprintln!("{} bytes in {:?}", report.bytes_written, report.elapsed);
//!     Ok(())
//! }
//! ```

// Core modules
pub mod app;
pub mod auth;
pub mod constants;
pub mod errors;

// Prelude module for convenient imports
pub mod prelude;

// CLI module - public for main.rs access but contents not re-exported,
// so CLI types do not leak to library consumers
pub mod cli;

// Re-export the most commonly used types at the top level
pub use errors::{AppError, Result};

pub use app::{
    BufferPool, ByteRange, ClientConfig, EngineConfig, FaultTally, ObjectLocator, ObjectStore,
    RangePlanner, S3Client, SegmentLease, TransferEngine, TransferReport,
};

pub use auth::{
    AmbientProvider, CredentialCache, CredentialProvider, CredentialSnapshot, StaticProvider,
};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
