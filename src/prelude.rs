//! Prelude module for the s3pipe library
//!
//! Re-exports the items needed for typical usage with a single
//! `use s3pipe::prelude::*;` statement.

// Core result types
pub use crate::errors::{AppError, Result};

// Engine and its collaborators
pub use crate::app::{
    ClientConfig, EngineConfig, ObjectLocator, ObjectStore, S3Client, TransferEngine,
    TransferReport,
};

// Credential handling
pub use crate::auth::{
    AmbientProvider, CredentialCache, CredentialProvider, CredentialSnapshot,
};
