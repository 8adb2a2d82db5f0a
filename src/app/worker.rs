//! Fetch workers: one task per in-flight segment
//!
//! A worker executes a single ranged fetch into its leased buffer and hands
//! the result to the sequencer over a one-shot channel. The worker owns its
//! concurrency-gate permit for its whole lifetime, so the permit is released
//! exactly once, on the task's terminal transition, whatever the outcome —
//! including abort, where dropping the task's locals releases both the
//! permit and the buffer lease.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::app::buffer::SegmentLease;
use crate::app::client::{ObjectLocator, ObjectStore};
use crate::app::fault::FaultTally;
use crate::app::planner::ByteRange;
use crate::auth::CredentialSnapshot;
use crate::errors::TransferResult;

/// Pipeline handle for one spawned segment
///
/// Flows through the ordered queue from supervisor to sequencer. `done`
/// resolves with the filled buffer or the fetch error; `abort` terminates
/// the worker if the run is already lost.
pub struct SegmentTicket {
    pub range: ByteRange,
    pub done: oneshot::Receiver<TransferResult<SegmentLease>>,
    pub abort: AbortHandle,
}

/// Executes one segment fetch with the snapshot it was spawned with
pub struct FetchWorker {
    store: Arc<dyn ObjectStore>,
    locator: ObjectLocator,
    snapshot: CredentialSnapshot,
    tally: Arc<FaultTally>,
    stall_timeout: Duration,
}

impl FetchWorker {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        locator: ObjectLocator,
        snapshot: CredentialSnapshot,
        tally: Arc<FaultTally>,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locator,
            snapshot,
            tally,
            stall_timeout,
        }
    }

    /// Spawn the fetch task for `range`, consuming a gate permit and a
    /// buffer lease
    pub fn spawn(
        self,
        range: ByteRange,
        mut buf: SegmentLease,
        permit: OwnedSemaphorePermit,
    ) -> SegmentTicket {
        let (done_tx, done_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            debug!(
                segment = range.index,
                first = range.first,
                last = range.last,
                "fetch started"
            );

            let outcome = match self
                .store
                .fetch_range(
                    &self.locator,
                    &range,
                    &self.snapshot,
                    &mut buf,
                    self.stall_timeout,
                )
                .await
            {
                Ok(()) => {
                    debug!(segment = range.index, bytes = buf.len(), "fetch complete");
                    Ok(buf)
                }
                Err(e) => {
                    let faults = self.tally.raise();
                    warn!(segment = range.index, error = %e, faults, "fetch failed");
                    // The failed lease drops here, returning its region.
                    Err(e)
                }
            };

            // Nobody listening means the sequencer already gave up; the
            // buffer inside the outcome is reclaimed by the drop.
            let _ = done_tx.send(outcome);
            drop(permit);
        });

        SegmentTicket {
            range,
            done: done_rx,
            abort: handle.abort_handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::buffer::BufferPool;
    use crate::errors::TransferError;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    struct ScriptedStore {
        fail_segment: Option<u64>,
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        async fn object_size(
            &self,
            _locator: &ObjectLocator,
            _snapshot: &CredentialSnapshot,
        ) -> TransferResult<u64> {
            unreachable!("workers never look up sizes")
        }

        async fn fetch_range(
            &self,
            _locator: &ObjectLocator,
            range: &ByteRange,
            _snapshot: &CredentialSnapshot,
            buf: &mut SegmentLease,
            _stall_timeout: Duration,
        ) -> TransferResult<()> {
            if self.fail_segment == Some(range.index) {
                return Err(TransferError::Server {
                    segment: range.index,
                    status: 500,
                });
            }
            buf.extend(std::iter::repeat(range.index as u8).take(range.len() as usize));
            Ok(())
        }
    }

    fn worker(store: ScriptedStore, tally: Arc<FaultTally>) -> FetchWorker {
        FetchWorker::new(
            Arc::new(store),
            ObjectLocator::parse("s3://bucket/key").unwrap(),
            CredentialSnapshot::passthrough("us-east-1"),
            tally,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn successful_fetch_delivers_the_buffer() {
        let tally = Arc::new(FaultTally::new());
        let pool = BufferPool::new(1, 8);
        let gate = Arc::new(Semaphore::new(1));

        let range = ByteRange {
            index: 2,
            first: 16,
            last: 23,
        };
        let permit = gate.clone().acquire_owned().await.unwrap();
        let ticket = worker(ScriptedStore { fail_segment: None }, tally.clone()).spawn(
            range,
            pool.lease().await,
            permit,
        );

        let buf = ticket.done.await.unwrap().unwrap();
        assert_eq!(buf.as_slice(), &[2u8; 8]);
        assert_eq!(tally.count(), 0);
        // Terminal transition released the permit
        assert_eq!(gate.available_permits(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_raises_the_tally_and_frees_resources() {
        let tally = Arc::new(FaultTally::new());
        let pool = BufferPool::new(1, 8);
        let gate = Arc::new(Semaphore::new(1));

        let range = ByteRange {
            index: 0,
            first: 0,
            last: 7,
        };
        let permit = gate.clone().acquire_owned().await.unwrap();
        let ticket = worker(ScriptedStore { fail_segment: Some(0) }, tally.clone()).spawn(
            range,
            pool.lease().await,
            permit,
        );

        let outcome = ticket.done.await.unwrap();
        assert!(matches!(
            outcome,
            Err(TransferError::Server { segment: 0, status: 500 })
        ));
        assert_eq!(tally.count(), 1);
        assert_eq!(gate.available_permits(), 1);
        assert_eq!(pool.leased(), 0);
    }

    #[tokio::test]
    async fn aborted_worker_releases_permit_and_lease() {
        struct HangingStore;

        #[async_trait]
        impl ObjectStore for HangingStore {
            async fn object_size(
                &self,
                _locator: &ObjectLocator,
                _snapshot: &CredentialSnapshot,
            ) -> TransferResult<u64> {
                unreachable!()
            }

            async fn fetch_range(
                &self,
                _locator: &ObjectLocator,
                _range: &ByteRange,
                _snapshot: &CredentialSnapshot,
                _buf: &mut SegmentLease,
                _stall_timeout: Duration,
            ) -> TransferResult<()> {
                std::future::pending().await
            }
        }

        let tally = Arc::new(FaultTally::new());
        let pool = BufferPool::new(1, 8);
        let gate = Arc::new(Semaphore::new(1));

        let range = ByteRange {
            index: 0,
            first: 0,
            last: 7,
        };
        let permit = gate.clone().acquire_owned().await.unwrap();
        let worker = FetchWorker::new(
            Arc::new(HangingStore),
            ObjectLocator::parse("s3://bucket/key").unwrap(),
            CredentialSnapshot::passthrough("us-east-1"),
            tally,
            Duration::from_secs(60),
        );
        let ticket = worker.spawn(range, pool.lease().await, permit);

        ticket.abort.abort();
        assert!(ticket.done.await.is_err());

        // Dropping the aborted task's locals returned everything
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(gate.available_permits(), 1);
        assert_eq!(pool.leased(), 0);
    }
}
