//! Bounded pool for blocking engine calls.
//!
//! A [`WorkerPool`] is a semaphore in front of `tokio::task::spawn_blocking`.
//! Callers queue for a permit (nothing is ever rejected), then the closure
//! runs on the blocking thread pool while holding that permit. The permit
//! moves into the blocking closure, so a caller that stops waiting (timeout,
//! dropped request) never frees a slot that is still busy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mg_core::{Error, Result};
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a pool with `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of closures currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait for a slot, then run `f` on the blocking pool.
    ///
    /// A panic inside `f` is reported as [`Error::Internal`].
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("worker pool closed".into()))?;

        let in_flight = self.in_flight.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            in_flight.fetch_add(1, Ordering::SeqCst);
            let _busy = BusyGuard(in_flight);
            f()
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                tracing::error!("Worker panicked");
                Error::Internal("worker panicked".into())
            } else {
                Error::Internal(format!("worker cancelled: {e}"))
            }
        })
    }

    /// Like [`run`](Self::run), but give up after `limit`, queueing included.
    ///
    /// On expiry the closure (if it already started) keeps its slot until it
    /// returns; its result is discarded.
    pub async fn run_with_timeout<F, T>(&self, operation: &str, limit: Duration, f: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(limit, self.run(f)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, limit_secs = limit.as_secs_f64(), "Worker call timed out");
                Err(Error::timeout(operation, limit))
            }
        }
    }
}

/// Decrements the in-flight counter even when the closure unwinds.
struct BusyGuard(Arc<AtomicUsize>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_closure_and_returns_value() {
        let pool = WorkerPool::new(2);
        let value = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn zero_capacity_is_raised() {
        assert_eq!(WorkerPool::new(0).capacity(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_capacity() {
        let pool = WorkerPool::new(2);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            let current = current.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    current.fetch_sub(1, Ordering::SeqCst);
                    i
                })
                .await
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap().unwrap());
        }
        results.sort();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let pool = WorkerPool::new(1);
        let err = pool.run(|| -> u32 { panic!("boom") }).await.unwrap_err();
        assert!(matches!(err, Error::Internal(ref m) if m == "worker panicked"));
        assert_eq!(pool.in_flight(), 0);

        // The slot is released after the panic.
        assert_eq!(pool.run(|| 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn timeout_returns_timeout_error() {
        let pool = WorkerPool::new(1);
        let err = pool
            .run_with_timeout("inspection", Duration::from_millis(50), || {
                std::thread::sleep(Duration::from_millis(300));
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(err.http_status(), 408);
    }

    #[tokio::test]
    async fn timeout_covers_queueing() {
        let pool = WorkerPool::new(1);
        let blocker = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(|| std::thread::sleep(Duration::from_millis(300))).await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = pool
            .run_with_timeout("inspection", Duration::from_millis(50), || 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        blocker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn timed_out_call_keeps_its_slot() {
        let pool = WorkerPool::new(1);
        let _ = pool
            .run_with_timeout("inspection", Duration::from_millis(20), || {
                std::thread::sleep(Duration::from_millis(200));
            })
            .await;
        // Still running in the background.
        assert_eq!(pool.in_flight(), 1);

        pool.run(|| ()).await.unwrap();
        assert_eq!(pool.in_flight(), 0);
    }
}
