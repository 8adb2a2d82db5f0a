//! s3pipe CLI application
//!
//! Streams very large S3 objects to stdout (`cat`) or a local file (`cp`)
//! with many concurrent range requests reassembled in strict byte order.

use std::process;

use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use s3pipe::cli::{handle_cat, handle_cp, Cli, Commands};
use s3pipe::errors::Result;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(category = e.category(), "{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli);

    info!("s3pipe v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Cat(args) => handle_cat(&cli.global, args).await,
        Commands::Cp(args) => handle_cp(&cli.global, args).await,
    }
}

/// Initialize logging based on CLI verbosity settings
///
/// Everything goes to stderr: stdout carries object bytes in cat mode.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("s3pipe={}", cli.log_level()).parse().unwrap());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
