//! Core application logic for s3pipe
//!
//! This module contains the transfer engine and its parts: the range
//! planner, the pooled segment buffers, the object-store client, the fetch
//! workers, and the fault tally that ties their failure handling together.

pub mod buffer;
pub mod client;
pub mod engine;
pub mod fault;
pub mod planner;
pub mod worker;

// Re-export main public API
pub use buffer::{BufferPool, SegmentLease};
pub use client::{ClientConfig, ObjectLocator, ObjectStore, S3Client};
pub use engine::{EngineConfig, TransferEngine, TransferReport};
pub use fault::FaultTally;
pub use planner::{ByteRange, RangePlanner};
pub use worker::SegmentTicket;
