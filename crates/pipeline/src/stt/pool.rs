//! Process-wide STT connection pool
//!
//! Streaming providers cap concurrent connections (20 for the primary
//! provider), so live streams are acquired through this pool. Acquires
//! beyond capacity queue; queued requests time out after 30 s and at most
//! 50 may wait. Re-acquiring for an existing client id returns the same
//! connection.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

/// Pool acquisition failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    #[error("Acquire timed out after {0:?}")]
    Timeout(Duration),

    #[error("Acquire queue full ({0} waiting)")]
    QueueFull(usize),

    #[error("Connection factory failed: {0}")]
    Factory(String),
}

/// Pool limits
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_queued: usize,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            max_queued: 50,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters exposed on `/metrics` and the pool introspection API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub active: u64,
    pub queued: u64,
    pub total_acquired: u64,
    pub total_released: u64,
    pub total_timeout: u64,
    pub total_failed: u64,
}

#[derive(Default)]
struct PoolMetrics {
    total_acquired: AtomicU64,
    total_released: AtomicU64,
    total_timeout: AtomicU64,
    total_failed: AtomicU64,
}

struct PoolInner<T> {
    clients: HashMap<String, Arc<T>>,
    /// Slots claimed, including ones whose factory is still running
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Generic capacity-bounded connection pool keyed by client id
pub struct ConnectionPool<T> {
    config: PoolConfig,
    inner: Mutex<PoolInner<T>>,
    metrics: PoolMetrics,
}

impl<T> ConnectionPool<T> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner {
                clients: HashMap::new(),
                active: 0,
                waiters: VecDeque::new(),
            }),
            metrics: PoolMetrics::default(),
        }
    }

    /// Acquire a connection for `client_id`, creating one via `make` when
    /// a slot is free. Idempotent per client id.
    pub async fn acquire_with<F, Fut, E>(
        self: &Arc<Self>,
        client_id: &str,
        make: F,
    ) -> Result<Arc<T>, PoolError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        // Fast path: existing client or free slot
        let claimed = {
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.clients.get(client_id) {
                return Ok(Arc::clone(existing));
            }
            if inner.active < self.config.max_connections {
                inner.active += 1;
                true
            } else {
                false
            }
        };

        if !claimed {
            // A releasing holder hands its slot directly to one waiter, so
            // `active` stays claimed across the handoff.
            self.wait_for_slot().await?;
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.clients.get(client_id) {
                let existing = Arc::clone(existing);
                Self::dispose_slot(&mut inner);
                return Ok(existing);
            }
        }

        match make().await {
            Ok(connection) => {
                let connection = Arc::new(connection);
                let mut inner = self.inner.lock();
                inner
                    .clients
                    .insert(client_id.to_string(), Arc::clone(&connection));
                self.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
                self.publish_gauges(&inner);
                Ok(connection)
            },
            Err(e) => {
                let mut inner = self.inner.lock();
                Self::dispose_slot(&mut inner);
                self.metrics.total_failed.fetch_add(1, Ordering::Relaxed);
                self.publish_gauges(&inner);
                Err(PoolError::Factory(e.to_string()))
            },
        }
    }

    async fn wait_for_slot(&self) -> Result<(), PoolError> {
        let rx = {
            let mut inner = self.inner.lock();
            // Re-check: a slot may have freed while unlocked
            if inner.active < self.config.max_connections {
                inner.active += 1;
                return Ok(());
            }
            if inner.waiters.len() >= self.config.max_queued {
                return Err(PoolError::QueueFull(inner.waiters.len()));
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };

        match tokio::time::timeout(self.config.acquire_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            // Sender dropped: pool shut down while waiting
            Ok(Err(_)) => Err(PoolError::Timeout(self.config.acquire_timeout)),
            Err(_) => {
                self.metrics.total_timeout.fetch_add(1, Ordering::Relaxed);
                Err(PoolError::Timeout(self.config.acquire_timeout))
            },
        }
    }

    /// Release the connection held by `client_id`
    pub fn release(&self, client_id: &str) -> Option<Arc<T>> {
        let mut inner = self.inner.lock();
        let connection = inner.clients.remove(client_id)?;
        self.metrics.total_released.fetch_add(1, Ordering::Relaxed);
        Self::dispose_slot(&mut inner);
        self.publish_gauges(&inner);
        Some(connection)
    }

    /// Hand the freed slot to the first live waiter, or return it to the
    /// free capacity
    fn dispose_slot(inner: &mut PoolInner<T>) {
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        inner.active -= 1;
    }

    fn publish_gauges(&self, inner: &PoolInner<T>) {
        metrics::gauge!("stt_pool_active").set(inner.active as f64);
        metrics::gauge!("stt_pool_queued").set(inner.waiters.len() as f64);
    }

    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        let inner = self.inner.lock();
        PoolMetricsSnapshot {
            active: inner.active as u64,
            queued: inner.waiters.len() as u64,
            total_acquired: self.metrics.total_acquired.load(Ordering::Relaxed),
            total_released: self.metrics.total_released.load(Ordering::Relaxed),
            total_timeout: self.metrics.total_timeout.load(Ordering::Relaxed),
            total_failed: self.metrics.total_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max: usize, queued: usize, timeout_ms: u64) -> Arc<ConnectionPool<u32>> {
        Arc::new(ConnectionPool::new(PoolConfig {
            max_connections: max,
            max_queued: queued,
            acquire_timeout: Duration::from_millis(timeout_ms),
        }))
    }

    async fn ok_conn(value: u32) -> Result<u32, String> {
        Ok(value)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let pool = pool(2, 5, 100);

        let a = pool.acquire_with("a", || ok_conn(1)).await.unwrap();
        assert_eq!(*a, 1);
        assert_eq!(pool.snapshot().active, 1);

        pool.release("a");
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.total_acquired, 1);
        assert_eq!(snapshot.total_released, 1);
    }

    #[tokio::test]
    async fn test_idempotent_per_client() {
        let pool = pool(2, 5, 100);

        let first = pool.acquire_with("caller", || ok_conn(7)).await.unwrap();
        let second = pool
            .acquire_with("caller", || ok_conn(99))
            .await
            .unwrap();

        // Same connection, factory not re-run
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.snapshot().active, 1);
    }

    #[tokio::test]
    async fn test_waiter_served_on_release() {
        let pool = pool(1, 5, 1000);
        let _held = pool.acquire_with("one", || ok_conn(1)).await.unwrap();

        let pool_clone = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            pool_clone.acquire_with("two", || ok_conn(2)).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.snapshot().queued, 1);

        pool.release("one");
        let result = waiter.await.unwrap().unwrap();
        assert_eq!(*result, 2);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let pool = pool(1, 5, 50);
        let _held = pool.acquire_with("one", || ok_conn(1)).await.unwrap();

        let result = pool.acquire_with("two", || ok_conn(2)).await;
        assert!(matches!(result, Err(PoolError::Timeout(_))));
        assert_eq!(pool.snapshot().total_timeout, 1);
    }

    #[tokio::test]
    async fn test_queue_cap() {
        let pool = pool(1, 1, 200);
        let _held = pool.acquire_with("one", || ok_conn(1)).await.unwrap();

        let pool_clone = Arc::clone(&pool);
        let _waiting = tokio::spawn(async move {
            pool_clone.acquire_with("two", || ok_conn(2)).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = pool.acquire_with("three", || ok_conn(3)).await;
        assert!(matches!(result, Err(PoolError::QueueFull(_))));
    }

    #[tokio::test]
    async fn test_factory_failure_frees_slot() {
        let pool = pool(1, 5, 100);

        let result = pool
            .acquire_with("bad", || async { Err::<u32, _>("boom".to_string()) })
            .await;
        assert!(matches!(result, Err(PoolError::Factory(_))));
        assert_eq!(pool.snapshot().active, 0);
        assert_eq!(pool.snapshot().total_failed, 1);

        // Slot is usable again
        let ok = pool.acquire_with("good", || ok_conn(4)).await.unwrap();
        assert_eq!(*ok, 4);
    }
}
