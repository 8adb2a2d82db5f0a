//! Shared fault tally for a single transfer
//!
//! A monotonically increasing fault counter owned by the engine instance.
//! Zero means healthy; any positive value means the run is aborted. The
//! first non-zero transition stops the supervisor from starting new fetches
//! and stops the sequencer from waiting on in-flight work.
//!
//! Access is serialized under one lock held only for the increment or read,
//! so the tally is cheap to consult from every stage.

use std::sync::Mutex;

/// Serialized fault counter; any value above zero aborts the run
#[derive(Debug, Default)]
pub struct FaultTally {
    count: Mutex<u64>,
}

impl FaultTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fault and return the new total
    pub fn raise(&self) -> u64 {
        let mut count = self.count.lock().expect("fault tally lock poisoned");
        *count += 1;
        *count
    }

    /// Current fault count
    pub fn count(&self) -> u64 {
        *self.count.lock().expect("fault tally lock poisoned")
    }

    /// Whether the run is aborted
    pub fn aborted(&self) -> bool {
        self.count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_healthy() {
        let tally = FaultTally::new();
        assert_eq!(tally.count(), 0);
        assert!(!tally.aborted());
    }

    #[test]
    fn raise_is_monotonic() {
        let tally = FaultTally::new();
        assert_eq!(tally.raise(), 1);
        assert_eq!(tally.raise(), 2);
        assert!(tally.aborted());
        assert_eq!(tally.count(), 2);
    }

    #[tokio::test]
    async fn concurrent_raises_are_serialized() {
        let tally = Arc::new(FaultTally::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tally = Arc::clone(&tally);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    tally.raise();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(tally.count(), 800);
    }
}
