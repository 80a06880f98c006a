use std::future::Future;
use std::num::NonZeroUsize;

use futures::stream::{self, StreamExt, TryStreamExt};

/// Bounded pool that runs at most `size` jobs at once and returns results in
/// submission order.
///
/// The pool lives for a single [`WorkerPool::try_map`] call. The first error
/// ends the call and drops every job still in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    /// One worker per available processing unit.
    pub fn per_core() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        )
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn try_map<I, F, Fut, T, E>(&self, items: I, job: F) -> Result<Vec<T>, E>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        stream::iter(items)
            .map(job)
            .buffered(self.size)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn keeps_submission_order() {
        let pool = WorkerPool::new(4);
        let out: Result<Vec<u64>, ()> = pool
            .try_map(0..8u64, |i| async move {
                // Later items finish first.
                tokio::time::sleep(Duration::from_millis(40 - i * 5)).await;
                Ok(i * 10)
            })
            .await;
        assert_eq!(out.unwrap(), vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn never_exceeds_size() {
        let pool = WorkerPool::new(3);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let out: Result<Vec<()>, ()> = pool
            .try_map(0..12, |_| async {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(out.unwrap().len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn first_error_aborts() {
        let pool = WorkerPool::new(2);
        let out: Result<Vec<i32>, String> = pool
            .try_map(1..=5, |i| async move {
                if i == 3 { Err(format!("item {i}")) } else { Ok(i) }
            })
            .await;
        assert_eq!(out.unwrap_err(), "item 3");
    }

    #[test]
    fn size_is_at_least_one() {
        assert_eq!(WorkerPool::new(0).size(), 1);
        assert!(WorkerPool::per_core().size() >= 1);
    }
}
