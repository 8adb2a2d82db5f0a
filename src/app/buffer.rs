//! Pooled segment buffers
//!
//! A fixed pool of segment-sized byte regions bounds the engine's resident
//! memory: at most `capacity` regions exist at any instant, so worst-case
//! buffer memory is `capacity * segment_size`. Waiting for a free region is
//! the engine's memory backpressure.
//!
//! Regions are handed out as [`SegmentLease`]s and return to the pool when
//! the lease drops, so every exit path (emit, fetch failure, abort) reclaims
//! each buffer exactly once.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

struct PoolShared {
    /// Recycled regions, cleared but with capacity retained
    free: Mutex<Vec<Vec<u8>>>,
    /// One permit per region the pool may still hand out
    slots: Semaphore,
    segment_size: usize,
    leased: AtomicUsize,
}

/// Bounded pool of segment-sized byte regions
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

impl BufferPool {
    /// Create a pool that will hand out at most `capacity` regions of
    /// `segment_size` bytes each. Regions are allocated on first lease and
    /// recycled afterwards.
    pub fn new(capacity: usize, segment_size: usize) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                free: Mutex::new(Vec::with_capacity(capacity)),
                slots: Semaphore::new(capacity),
                segment_size,
                leased: AtomicUsize::new(0),
            }),
        }
    }

    /// Lease a region, waiting until one is free
    ///
    /// Callers bound the wait with `tokio::time::timeout`; a lease is never
    /// refused once a slot frees up.
    pub async fn lease(&self) -> SegmentLease {
        let permit = self
            .shared
            .slots
            .acquire()
            .await
            .expect("buffer pool semaphore is never closed");
        // The permit is restored by SegmentLease::drop.
        permit.forget();

        let data = {
            let mut free = self.shared.free.lock().expect("pool lock poisoned");
            free.pop()
        }
        .unwrap_or_else(|| Vec::with_capacity(self.shared.segment_size));

        self.shared.leased.fetch_add(1, Ordering::SeqCst);
        SegmentLease {
            data: Some(data),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of regions currently leased out
    pub fn leased(&self) -> usize {
        self.shared.leased.load(Ordering::SeqCst)
    }

    /// Bytes each region can hold
    pub fn segment_size(&self) -> usize {
        self.shared.segment_size
    }
}

/// Exclusive handle to one pooled region
///
/// Dereferences to the underlying `Vec<u8>`; dropping the lease clears the
/// region and returns it to the pool.
pub struct SegmentLease {
    data: Option<Vec<u8>>,
    shared: Arc<PoolShared>,
}

impl Deref for SegmentLease {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.data.as_ref().expect("lease accessed after drop")
    }
}

impl DerefMut for SegmentLease {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.data.as_mut().expect("lease accessed after drop")
    }
}

impl Drop for SegmentLease {
    fn drop(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.clear();
            if let Ok(mut free) = self.shared.free.lock() {
                free.push(data);
            }
            self.shared.leased.fetch_sub(1, Ordering::SeqCst);
            self.shared.slots.add_permits(1);
        }
    }
}

impl std::fmt::Debug for SegmentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentLease")
            .field("len", &self.data.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn pool_hands_out_up_to_capacity() {
        let pool = BufferPool::new(2, 16);
        let a = pool.lease().await;
        let b = pool.lease().await;
        assert_eq!(pool.leased(), 2);

        // Third lease must wait until one is returned
        let blocked = timeout(Duration::from_millis(50), pool.lease()).await;
        assert!(blocked.is_err());

        drop(a);
        let c = timeout(Duration::from_millis(50), pool.lease()).await;
        assert!(c.is_ok());
        drop(b);
        drop(c);
        assert_eq!(pool.leased(), 0);
    }

    #[tokio::test]
    async fn regions_are_recycled_cleared() {
        let pool = BufferPool::new(1, 8);
        {
            let mut lease = pool.lease().await;
            lease.extend_from_slice(b"abcdefgh");
            assert_eq!(lease.len(), 8);
        }
        let lease = pool.lease().await;
        assert!(lease.is_empty());
        assert!(lease.capacity() >= 8);
    }

    #[tokio::test]
    async fn drop_on_error_path_frees_the_slot() {
        let pool = BufferPool::new(1, 8);
        let lease = pool.lease().await;
        // Simulate an aborted fetch: the lease is dropped inside a dead task
        let handle = tokio::spawn(async move {
            let _held = lease;
            std::future::pending::<()>().await;
        });
        handle.abort();
        let _ = handle.await;

        let reclaimed = timeout(Duration::from_millis(100), pool.lease()).await;
        assert!(reclaimed.is_ok());
    }
}
