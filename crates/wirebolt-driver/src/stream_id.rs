//! Bounded FIFO pool of request stream ids: at most `pool_size` ids
//! allocated at once, never a duplicate, and `-1` never enters the pool.
//!
//! Ids are handed out and reclaimed in FIFO order rather than an
//! unbounded monotonic counter, which maximises the time between reuse
//! of the same id — useful when correlating stream ids across log lines.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Semaphore;

/// A bounded pool of `i16` stream ids in `0..pool_size`.
pub struct StreamIdPool {
    free: Mutex<VecDeque<i16>>,
    // Bounds concurrent `acquire` callers to the number of ids actually
    // free, suspending the rest until a `release` posts a permit.
    permits: Semaphore,
}

impl StreamIdPool {
    /// Creates a pool with `pool_size` ids, `0..pool_size`, all free.
    #[must_use]
    pub fn new(pool_size: u16) -> Self {
        let free: VecDeque<i16> = (0..pool_size as i32).map(|i| i as i16).collect();
        Self { permits: Semaphore::new(free.len()), free: Mutex::new(free) }
    }

    /// Acquires a stream id, suspending the caller until one is free.
    ///
    /// # Panics
    ///
    /// Panics if the pool's semaphore was closed, which this type never
    /// does; `close` is not exposed.
    #[allow(clippy::expect_used)]
    pub async fn acquire(&self) -> i16 {
        let permit = self.permits.acquire().await.expect("pool semaphore is never closed");
        permit.forget();
        let mut free = self.free.lock().expect("stream id pool mutex poisoned");
        let id = free.pop_front().expect("semaphore permit implies a free id is available");
        debug_assert!(id >= 0, "stream id -1 must never be allocated from the pool");
        id
    }

    /// Returns a stream id to the free pool. Releasing an id not
    /// currently allocated, or releasing `-1`, is a caller bug.
    #[allow(clippy::expect_used)]
    pub fn release(&self, id: i16) {
        debug_assert!(id >= 0, "stream id -1 must never be released back into the pool");
        self.free.lock().expect("stream id pool mutex poisoned").push_back(id);
        self.permits.add_permits(1);
    }

    /// Number of ids currently free.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn available(&self) -> usize {
        self.free.lock().expect("stream id pool mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn acquired_ids_are_unique_and_bounded() {
        let pool = StreamIdPool::new(4);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let id = pool.acquire().await;
            assert!((0..4).contains(&id));
            assert!(seen.insert(id), "duplicate id handed out while others were outstanding");
        }
        assert_eq!(pool.available(), 0);
    }

    #[tokio::test]
    async fn acquire_suspends_when_pool_is_exhausted_until_a_release() {
        let pool = Arc::new(StreamIdPool::new(1));
        let first = pool.acquire().await;

        let waiter_pool = Arc::clone(&pool);
        let waiter = tokio::spawn(async move { waiter_pool.acquire().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "acquire must suspend while the pool is empty");

        pool.release(first);
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("acquire resumes once a slot frees up")
            .expect("task did not panic");
        assert_eq!(second, first);
    }

    #[test]
    fn negative_one_is_never_in_the_initial_pool() {
        let pool = StreamIdPool::new(10);
        assert!(!pool.free.lock().expect("lock").contains(&-1));
    }
}
