//! Error types for s3pipe
//!
//! This module defines the error types for all components of the application.
//! Errors are designed to be actionable and to name the failing segment where
//! one is involved, so diagnostics on stderr point at the exact range request
//! that went wrong.

use std::path::PathBuf;

use thiserror::Error;

/// Credential discovery and refresh errors
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The provider could not produce a snapshot
    #[error("credential provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },

    /// The provider produced a snapshot that is already expired
    #[error("credential snapshot expired at {expired_at}")]
    SnapshotExpired { expired_at: String },

    /// Request signing failed
    #[error("request signing failed: {reason}")]
    SigningFailed { reason: String },
}

/// Transfer engine errors, one variant per fault kind
#[derive(Error, Debug)]
pub enum TransferError {
    /// HTTP request for a segment terminated abnormally
    #[error("segment {segment}: transport failure")]
    Http {
        segment: u64,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered a range request with an unexpected status
    #[error("segment {segment}: server returned HTTP {status}")]
    Server { segment: u64, status: u16 },

    /// Response body ended before the requested range was delivered
    #[error("segment {segment}: short response, received {received} of {expected} bytes")]
    ShortRead {
        segment: u64,
        expected: u64,
        received: u64,
    },

    /// Response body exceeded the requested range
    #[error("segment {segment}: response longer than requested range of {expected} bytes")]
    Overrun { segment: u64, expected: u64 },

    /// Inactivity watchdog fired: no bytes arrived within the timeout
    #[error("segment {segment}: stalled, no data for {}s", .timeout.as_secs())]
    Stalled {
        segment: u64,
        timeout: std::time::Duration,
    },

    /// Supervisor could not hand a segment to the pipeline in time
    #[error("segment {segment}: pipeline backpressure exceeded {}s", .timeout.as_secs())]
    BackpressureTimeout {
        segment: u64,
        timeout: std::time::Duration,
    },

    /// Writing a segment to the sink failed
    #[error("segment {segment}: sink write failed")]
    Sink {
        segment: u64,
        #[source]
        source: std::io::Error,
    },

    /// Credential fault during the transfer
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// Metadata lookup could not produce an object size
    #[error("object size unavailable: {reason}")]
    SizeProbe { reason: String },

    /// Segment ticket arrived out of planner order
    #[error("segment ordering violated: expected {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    /// A fetch task vanished without reporting a result
    #[error("segment {segment}: fetch worker terminated without a result")]
    WorkerLost { segment: u64 },

    /// The run was aborted by an earlier fault
    #[error("transfer aborted after {faults} fault(s)")]
    Aborted { faults: u64 },

    /// Total bytes delivered did not match the object size
    #[error("delivered {written} bytes, object size is {expected}")]
    Incomplete { written: u64, expected: u64 },
}

/// Object metadata and locator errors
#[derive(Error, Debug)]
pub enum ObjectError {
    /// The source locator could not be parsed
    #[error("invalid object locator '{input}': expected s3://bucket/key")]
    InvalidLocator { input: String },

    /// HEAD request failed, so the object size is unknown
    #[error("could not determine size of s3://{bucket}/{key}")]
    SizeUnavailable {
        bucket: String,
        key: String,
        #[source]
        source: Box<TransferError>,
    },
}

/// Configuration validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A numeric option is outside its accepted range
    #[error("invalid value for {option}: {value} ({reason})")]
    InvalidValue {
        option: &'static str,
        value: String,
        reason: &'static str,
    },

    /// Destination handling error for the cp command
    #[error("destination {path} already exists (pass --force to overwrite)")]
    DestinationExists { path: PathBuf },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Object(#[from] ObjectError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("{message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Credential(_) => "credential",
            AppError::Transfer(_) => "transfer",
            AppError::Object(_) => "object",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Credential result type alias
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_errors_name_the_segment() {
        let err = TransferError::ShortRead {
            segment: 7,
            expected: 100,
            received: 42,
        };
        assert!(err.to_string().contains("segment 7"));
        assert!(err.to_string().contains("42 of 100"));
    }

    #[test]
    fn app_error_categories() {
        let err: AppError = TransferError::OutOfOrder {
            expected: 1,
            actual: 3,
        }
        .into();
        assert_eq!(err.category(), "transfer");

        let err: AppError = CredentialError::ProviderUnavailable {
            reason: "no chain".into(),
        }
        .into();
        assert_eq!(err.category(), "credential");
    }
}
