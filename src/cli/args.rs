//! Command-line argument parsing for s3pipe
//!
//! This module defines the CLI structure using clap derive macros. Two
//! subcommands share the transfer options: `cat` streams the object to
//! stdout, `cp` downloads it to a file and renames on success.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::constants::transfer;
use crate::errors::ConfigError;

/// s3pipe - stream very large S3 objects at line rate
#[derive(Parser, Debug)]
#[command(
    name = "s3pipe",
    version,
    about = "Transfer very large S3 objects to a pipe or file at line rate",
    long_about = "Transfers very large objects out of S3 by running many concurrent range \
requests and reassembling the segments in strict byte order on a sequential output stream. \
Concurrency and buffer memory are capped and auto-tuned from host memory."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.global.quiet {
            "error"
        } else if self.global.very_verbose {
            "trace"
        } else if self.global.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (trace level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress informational output and the progress bar
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream an object to standard output
    Cat(CatArgs),

    /// Download an object to a local file, renaming into place on success
    Cp(CpArgs),
}

/// Arguments for the cat command
#[derive(Args, Debug, Clone)]
pub struct CatArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Arguments for the cp command
#[derive(Args, Debug, Clone)]
pub struct CpArgs {
    #[command(flatten)]
    pub transfer: TransferArgs,

    /// Destination file path
    #[arg(value_name = "DEST")]
    pub dest: PathBuf,

    /// Overwrite the destination if it already exists
    #[arg(short, long)]
    pub force: bool,
}

/// Transfer options shared by cat and cp
#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Source object, e.g. s3://bucket/key
    #[arg(value_name = "S3_URI")]
    pub source: String,

    /// Bytes per range request (default 384 MiB)
    #[arg(long, value_name = "BYTES")]
    pub segment_size: Option<u64>,

    /// Maximum in-flight range requests (default auto-tuned from host memory)
    #[arg(short = 'c', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Maximum buffered segments; bounds memory at N x segment size
    /// (default auto-tuned from host memory)
    #[arg(long, value_name = "N")]
    pub buffered_segments: Option<usize>,

    /// Per-fetch inactivity timeout in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 120)]
    pub stall_timeout: u64,

    /// Refresh credentials when fewer than this many seconds remain
    #[arg(long, value_name = "SECONDS", default_value_t = 300)]
    pub refresh_margin: u64,

    /// Custom object-store endpoint (S3-compatible stores); implies
    /// path-style addressing
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<Url>,
}

impl TransferArgs {
    /// Validate option values before any network traffic
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(size) = self.segment_size {
            if size < transfer::MIN_SEGMENT_SIZE {
                return Err(ConfigError::InvalidValue {
                    option: "segment-size",
                    value: size.to_string(),
                    reason: "must be at least 1 MiB",
                });
            }
        }
        if self.concurrency == Some(0) {
            return Err(ConfigError::InvalidValue {
                option: "concurrency",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        if self.buffered_segments == Some(0) {
            return Err(ConfigError::InvalidValue {
                option: "buffered-segments",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        if self.stall_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                option: "stall-timeout",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cat_parses_with_defaults() {
        let cli = Cli::try_parse_from(["s3pipe", "cat", "s3://bucket/key"]).unwrap();
        match cli.command {
            Commands::Cat(args) => {
                assert_eq!(args.transfer.source, "s3://bucket/key");
                assert_eq!(args.transfer.stall_timeout, 120);
                assert_eq!(args.transfer.refresh_margin, 300);
                assert!(args.transfer.segment_size.is_none());
            }
            _ => panic!("expected cat"),
        }
    }

    #[test]
    fn cp_parses_source_and_dest() {
        let cli =
            Cli::try_parse_from(["s3pipe", "cp", "s3://bucket/key", "/tmp/out.bin", "--force"])
                .unwrap();
        match cli.command {
            Commands::Cp(args) => {
                assert_eq!(args.transfer.source, "s3://bucket/key");
                assert_eq!(args.dest, PathBuf::from("/tmp/out.bin"));
                assert!(args.force);
            }
            _ => panic!("expected cp"),
        }
    }

    #[test]
    fn tiny_segment_size_is_rejected() {
        let cli = Cli::try_parse_from([
            "s3pipe",
            "cat",
            "s3://bucket/key",
            "--segment-size",
            "1024",
        ])
        .unwrap();
        let Commands::Cat(args) = cli.command else {
            panic!("expected cat")
        };
        assert!(args.transfer.validate().is_err());
    }

    #[test]
    fn quiet_wins_log_level() {
        let cli = Cli::try_parse_from(["s3pipe", "--quiet", "-v", "cat", "s3://b/k"]).unwrap();
        assert_eq!(cli.log_level(), "error");
    }
}
