//! The parallel ranged-fetch and ordered-reassembly engine
//!
//! The engine turns one object of known size into many concurrent range
//! fetches and emits their bytes to a non-seekable sink in strict offset
//! order. Two independent backpressure mechanisms bound the pipeline: a
//! counting semaphore caps in-flight fetches, and the buffer pool caps
//! resident segment memory. A shared fault tally aborts every stage as soon
//! as any of them fails; nothing is retried within a run.
//!
//! Internally one supervisor task walks the range plan and spawns a fetch
//! worker per segment, while the sequencer — running in the caller's
//! context, where the sink lives — drains the ticket queue in plan order,
//! waits for each segment's fetch, and writes it with a single `write_all`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::app::buffer::{BufferPool, SegmentLease};
use crate::app::client::{ObjectLocator, ObjectStore};
use crate::app::fault::FaultTally;
use crate::app::planner::RangePlanner;
use crate::app::worker::{FetchWorker, SegmentTicket};
use crate::auth::CredentialCache;
use crate::constants::transfer;
use crate::errors::{ConfigError, TransferError, TransferResult};

/// Tuning for one transfer engine instance
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bytes per range request
    pub segment_size: u64,
    /// Maximum concurrently running fetches
    pub max_in_flight: usize,
    /// Maximum segment buffers alive at once; bounds resident memory at
    /// `max_buffered * segment_size`
    pub max_buffered: usize,
    /// Inactivity bound applied to each fetch, to the supervisor's enqueue,
    /// and to the sequencer's wait on a segment
    pub stall_timeout: Duration,
    /// How often waiting stages re-check the fault tally
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let (max_in_flight, max_buffered) = transfer::auto_tune_from_host();
        Self {
            segment_size: transfer::DEFAULT_SEGMENT_SIZE,
            max_in_flight,
            max_buffered,
            stall_timeout: transfer::DEFAULT_STALL_TIMEOUT,
            poll_interval: transfer::SEQUENCER_POLL_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_size == 0 {
            return Err(ConfigError::InvalidValue {
                option: "segment-size",
                value: self.segment_size.to_string(),
                reason: "must be positive",
            });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::InvalidValue {
                option: "concurrency",
                value: self.max_in_flight.to_string(),
                reason: "must be positive",
            });
        }
        if self.max_buffered == 0 {
            return Err(ConfigError::InvalidValue {
                option: "buffered-segments",
                value: self.max_buffered.to_string(),
                reason: "must be positive",
            });
        }
        if self.stall_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                option: "stall-timeout",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    /// Size the engine was asked to deliver
    pub object_size: u64,
    /// Bytes actually written to the sink
    pub bytes_written: u64,
    /// Segments emitted
    pub segments: u64,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl TransferReport {
    /// Mean delivery rate in bytes per second
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_written as f64 / secs
        } else {
            0.0
        }
    }
}

/// One-object transfer engine
///
/// Holds no per-run state; `run` may be called again after a failed run,
/// and separate engine instances never share fault state.
pub struct TransferEngine {
    store: Arc<dyn ObjectStore>,
    credentials: Arc<CredentialCache>,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        credentials: Arc<CredentialCache>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            credentials,
            config,
        })
    }

    /// Transfer the whole object to `sink`, emitting segments in strict
    /// offset order
    ///
    /// On success exactly `object_size` bytes have been written and flushed.
    /// On failure the sink keeps whatever prefix was already emitted; the
    /// caller decides what to do with it.
    pub async fn run<W>(
        &self,
        locator: &ObjectLocator,
        object_size: u64,
        sink: &mut W,
    ) -> TransferResult<TransferReport>
    where
        W: AsyncWrite + Unpin,
    {
        let started_at = Utc::now();
        let started = Instant::now();
        let planner = RangePlanner::new(object_size, self.config.segment_size);
        let total_segments = planner.segment_count();

        info!(
            object = %locator,
            size = object_size,
            segments = total_segments,
            in_flight = self.config.max_in_flight,
            buffered = self.config.max_buffered,
            "transfer starting"
        );

        let tally = Arc::new(FaultTally::new());
        let pool = BufferPool::new(self.config.max_buffered, self.config.segment_size as usize);
        let gate = Arc::new(Semaphore::new(self.config.max_in_flight));
        let (ticket_tx, mut ticket_rx) = mpsc::channel(self.config.max_buffered);

        let supervisor = Supervisor {
            store: Arc::clone(&self.store),
            locator: locator.clone(),
            credentials: Arc::clone(&self.credentials),
            config: self.config.clone(),
            planner,
            tally: Arc::clone(&tally),
            pool,
            gate,
            tickets: ticket_tx,
        };
        let supervisor = tokio::spawn(supervisor.run());

        let (written, mut first_error) = self.sequence(&mut ticket_rx, &tally, sink).await;

        // Shutdown: nothing new enters the queue, and whatever is still in
        // flight is terminated so its buffers return to the pool.
        ticket_rx.close();
        while let Ok(ticket) = ticket_rx.try_recv() {
            ticket.abort.abort();
        }

        match supervisor.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                tally.raise();
                warn!(error = %join_error, "supervisor task failed");
                first_error.get_or_insert(TransferError::WorkerLost { segment: 0 });
            }
        }

        if first_error.is_none() {
            if let Err(source) = sink.flush().await {
                tally.raise();
                first_error = Some(TransferError::Sink {
                    segment: total_segments.saturating_sub(1),
                    source,
                });
            }
        }

        if let Some(error) = first_error {
            info!(
                object = %locator,
                written,
                faults = tally.count(),
                "transfer aborted"
            );
            return Err(error);
        }
        if tally.aborted() {
            return Err(TransferError::Aborted {
                faults: tally.count(),
            });
        }
        if written != object_size {
            tally.raise();
            return Err(TransferError::Incomplete {
                written,
                expected: object_size,
            });
        }

        let elapsed = started.elapsed();
        info!(
            object = %locator,
            written,
            elapsed_ms = elapsed.as_millis() as u64,
            mib_per_s = (written as f64 / (1024.0 * 1024.0)) / elapsed.as_secs_f64().max(1e-9),
            "transfer complete"
        );

        Ok(TransferReport {
            object_size,
            bytes_written: written,
            segments: total_segments,
            elapsed,
            started_at,
        })
    }

    /// Sequencer: drain tickets in plan order, writing each segment to the
    /// sink. Returns the bytes written and the first error, if any.
    async fn sequence<W>(
        &self,
        tickets: &mut mpsc::Receiver<SegmentTicket>,
        tally: &Arc<FaultTally>,
        sink: &mut W,
    ) -> (u64, Option<TransferError>)
    where
        W: AsyncWrite + Unpin,
    {
        let mut written: u64 = 0;
        let mut expected_index: u64 = 0;

        while let Some(ticket) = tickets.recv().await {
            let segment = ticket.range.index;

            if segment != expected_index {
                tally.raise();
                ticket.abort.abort();
                return (
                    written,
                    Some(TransferError::OutOfOrder {
                        expected: expected_index,
                        actual: segment,
                    }),
                );
            }
            expected_index += 1;

            let buf = match self.await_segment(ticket, tally).await {
                Ok(buf) => buf,
                Err(e) => return (written, Some(e)),
            };

            if tally.aborted() {
                // A later segment already failed; emitting more bytes would
                // only delay shutdown.
                return (
                    written,
                    Some(TransferError::Aborted {
                        faults: tally.count(),
                    }),
                );
            }

            if let Err(source) = sink.write_all(&buf).await {
                let faults = tally.raise();
                warn!(segment, error = %source, faults, "sink write failed");
                return (written, Some(TransferError::Sink { segment, source }));
            }
            written += buf.len() as u64;
            debug!(segment, written, "segment emitted");
            // The lease drops here, returning its region to the pool.
        }

        (written, None)
    }

    /// Wait for one segment's fetch, re-checking the fault tally at every
    /// poll interval and bounding the total wait by the stall timeout
    async fn await_segment(
        &self,
        mut ticket: SegmentTicket,
        tally: &Arc<FaultTally>,
    ) -> TransferResult<SegmentLease> {
        let segment = ticket.range.index;
        let deadline = Instant::now() + self.config.stall_timeout;

        loop {
            match timeout(self.config.poll_interval, &mut ticket.done).await {
                Ok(Ok(outcome)) => return outcome,
                Ok(Err(_)) => {
                    let faults = tally.raise();
                    warn!(segment, faults, "fetch worker vanished without a result");
                    return Err(TransferError::WorkerLost { segment });
                }
                Err(_) => {}
            }

            if tally.aborted() {
                // Another stage failed while this fetch was still running:
                // terminate it and count its cancellation.
                ticket.abort.abort();
                let faults = tally.raise();
                debug!(segment, faults, "terminated in-flight fetch after fault");
                return Err(TransferError::Aborted { faults });
            }

            if Instant::now() >= deadline {
                ticket.abort.abort();
                let faults = tally.raise();
                warn!(segment, faults, "segment did not complete within the stall timeout");
                return Err(TransferError::Stalled {
                    segment,
                    timeout: self.config.stall_timeout,
                });
            }
        }
    }
}

/// Walks the range plan, spawning one fetch worker per segment under
/// gate and pool backpressure
struct Supervisor {
    store: Arc<dyn ObjectStore>,
    locator: ObjectLocator,
    credentials: Arc<CredentialCache>,
    config: EngineConfig,
    planner: RangePlanner,
    tally: Arc<FaultTally>,
    pool: BufferPool,
    gate: Arc<Semaphore>,
    tickets: mpsc::Sender<SegmentTicket>,
}

impl Supervisor {
    async fn run(self) -> TransferResult<()> {
        for range in self.planner.iter() {
            if self.tally.aborted() {
                debug!(segment = range.index, "supervisor stopping after fault");
                break;
            }

            // Snapshot first: the cache refreshes when the held credentials
            // are within the margin of expiry, so every fetch starts with
            // usable credentials.
            let snapshot = self.credentials.current().await;

            let permit = self
                .gate
                .clone()
                .acquire_owned()
                .await
                .expect("concurrency gate is never closed");

            if self.tally.aborted() {
                break;
            }

            let lease = match timeout(self.config.stall_timeout, self.pool.lease()).await {
                Ok(lease) => lease,
                Err(_) => {
                    let faults = self.tally.raise();
                    warn!(segment = range.index, faults, "no buffer freed within the stall timeout");
                    return Err(TransferError::BackpressureTimeout {
                        segment: range.index,
                        timeout: self.config.stall_timeout,
                    });
                }
            };

            let worker = FetchWorker::new(
                Arc::clone(&self.store),
                self.locator.clone(),
                snapshot,
                Arc::clone(&self.tally),
                self.config.stall_timeout,
            );
            let ticket = worker.spawn(range, lease, permit);

            match self
                .tickets
                .send_timeout(ticket, self.config.stall_timeout)
                .await
            {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(ticket)) => {
                    ticket.abort.abort();
                    let faults = self.tally.raise();
                    warn!(segment = range.index, faults, "could not enqueue within the stall timeout");
                    return Err(TransferError::BackpressureTimeout {
                        segment: range.index,
                        timeout: self.config.stall_timeout,
                    });
                }
                Err(SendTimeoutError::Closed(ticket)) => {
                    // The sequencer already shut down; it has recorded why.
                    ticket.abort.abort();
                    break;
                }
            }
        }

        // Dropping the sender is the end-of-stream sentinel.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_options_are_rejected() {
        let config = EngineConfig {
            segment_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_buffered: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            stall_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn report_throughput() {
        let report = TransferReport {
            object_size: 1000,
            bytes_written: 1000,
            segments: 4,
            elapsed: Duration::from_secs(2),
            started_at: Utc::now(),
        };
        assert!((report.throughput_bps() - 500.0).abs() < f64::EPSILON);
    }
}
