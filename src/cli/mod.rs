//! Command-line interface for s3pipe
//!
//! Argument parsing, command handlers, and progress display. This module is
//! public so the binary can reach it, but it is not re-exported from the
//! crate root; library consumers use `app` and `auth` directly.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{CatArgs, Cli, Commands, CpArgs, GlobalArgs, TransferArgs};
pub use commands::{handle_cat, handle_cp};
pub use progress::ProgressSink;
