//! Command handlers for the s3pipe CLI
//!
//! Both commands share the same preparation: parse the locator, build the
//! client and credential cache, resolve the object size with one HEAD
//! request, and assemble the engine. `cat` then streams to stdout; `cp`
//! streams to a per-process partial file and renames it into place only on
//! success.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::app::{
    ClientConfig, EngineConfig, ObjectLocator, ObjectStore, S3Client, TransferEngine,
};
use crate::auth::{AmbientProvider, CredentialCache};
use crate::cli::args::{CatArgs, CpArgs, GlobalArgs, TransferArgs};
use crate::cli::progress::ProgressSink;
use crate::constants::{files, transfer};
use crate::errors::{ConfigError, ObjectError, Result};

/// Everything a transfer command needs, assembled from the CLI options
struct TransferSetup {
    locator: ObjectLocator,
    engine: TransferEngine,
    object_size: u64,
}

async fn prepare(args: &TransferArgs) -> Result<TransferSetup> {
    args.validate()?;

    let locator = ObjectLocator::parse(&args.source)?;

    let client_config = ClientConfig {
        endpoint: args.endpoint.clone(),
        ..Default::default()
    };
    let store: Arc<S3Client> = Arc::new(S3Client::with_config(client_config)?);

    let credentials = Arc::new(CredentialCache::new(
        Arc::new(AmbientProvider::new()),
        Duration::from_secs(args.refresh_margin),
    ));

    // Size lookup happens exactly once, before the engine starts. An object
    // whose size cannot be determined is a hard error.
    let snapshot = credentials.current().await;
    let object_size = store
        .object_size(&locator, &snapshot)
        .await
        .map_err(|source| ObjectError::SizeUnavailable {
            bucket: locator.bucket.clone(),
            key: locator.key.clone(),
            source: Box::new(source),
        })?;

    let (auto_in_flight, auto_buffered) = transfer::auto_tune_from_host();
    let engine_config = EngineConfig {
        segment_size: args.segment_size.unwrap_or(transfer::DEFAULT_SEGMENT_SIZE),
        max_in_flight: args.concurrency.unwrap_or(auto_in_flight),
        max_buffered: args.buffered_segments.unwrap_or(auto_buffered),
        stall_timeout: Duration::from_secs(args.stall_timeout),
        ..Default::default()
    };

    let engine = TransferEngine::new(store, credentials, engine_config)?;

    Ok(TransferSetup {
        locator,
        engine,
        object_size,
    })
}

/// Handle the cat command: stream the object to stdout
pub async fn handle_cat(global: &GlobalArgs, args: CatArgs) -> Result<()> {
    let setup = prepare(&args.transfer).await?;
    info!(object = %setup.locator, size = setup.object_size, "streaming to stdout");

    let stdout = tokio::io::stdout();
    let mut sink = ProgressSink::new(stdout, setup.object_size, global.quiet);
    let report = setup
        .engine
        .run(&setup.locator, setup.object_size, &mut sink)
        .await?;
    drop(sink.into_inner());

    info!(
        bytes = report.bytes_written,
        mib_per_s = report.throughput_bps() / (1024.0 * 1024.0),
        "cat complete"
    );
    Ok(())
}

/// Handle the cp command: download to a partial file, rename on success
pub async fn handle_cp(global: &GlobalArgs, args: CpArgs) -> Result<()> {
    if args.dest.exists() && !args.force {
        return Err(ConfigError::DestinationExists {
            path: args.dest.clone(),
        }
        .into());
    }

    let setup = prepare(&args.transfer).await?;
    info!(
        object = %setup.locator,
        size = setup.object_size,
        dest = %args.dest.display(),
        "downloading"
    );

    let partial = partial_path(&args.dest, process::id());
    let outcome = download_to(&setup, &partial, &args.dest, global.quiet).await;

    if outcome.is_err() {
        remove_partial(&partial).await;
    }
    outcome
}

async fn download_to(
    setup: &TransferSetup,
    partial: &Path,
    dest: &Path,
    quiet: bool,
) -> Result<()> {
    let file = tokio::fs::File::create(partial).await?;
    let mut sink = ProgressSink::new(file, setup.object_size, quiet);

    let report = setup
        .engine
        .run(&setup.locator, setup.object_size, &mut sink)
        .await?;

    // Durability before the rename publishes the name
    let file = sink.into_inner();
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(partial, dest).await?;

    info!(
        bytes = report.bytes_written,
        mib_per_s = report.throughput_bps() / (1024.0 * 1024.0),
        dest = %dest.display(),
        "cp complete"
    );
    Ok(())
}

/// Per-process name for the in-progress download
fn partial_path(dest: &Path, pid: u32) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(format!(".{}.{}", pid, files::PARTIAL_FILE_SUFFIX));
    PathBuf::from(name)
}

/// Best-effort removal: absence is fine, failure is logged and forgotten
async fn remove_partial(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => info!(partial = %partial.display(), "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(partial = %partial.display(), error = %e, "could not remove partial download"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_name_is_per_process() {
        let path = partial_path(Path::new("/data/out.bin"), 4242);
        assert_eq!(path, PathBuf::from("/data/out.bin.4242.partial"));
    }

    #[tokio::test]
    async fn removing_a_missing_partial_is_silent() {
        // Must not panic or log an error for a file that never existed
        remove_partial(Path::new("/nonexistent/dir/never-here.partial")).await;
    }

    #[tokio::test]
    async fn partial_files_are_removed_on_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let partial = partial_path(&dir.path().join("out.bin"), process::id());
        tokio::fs::write(&partial, b"half a download").await.unwrap();

        remove_partial(&partial).await;
        assert!(!partial.exists());
    }
}
