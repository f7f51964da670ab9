//! Bounded pool of transport connections.
//!
//! Connections are built by background tasks, at most `capacity` at a time,
//! and handed out through a bounded channel. A connection is either queued in
//! that channel or owned by one [`Pooled`] guard, never both.

use crate::classify::{Classifier, Disposition};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::transport::{Connection, ConnectionError, SmtpTransport, Transport, establish};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

/// A bounded pool of connections to one server.
///
/// Cloning is cheap and clones share the same connections.
pub struct Pool<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("host", &self.inner.config.host)
            .field("capacity", &self.inner.config.capacity)
            .field("created", &self.created())
            .finish_non_exhaustive()
    }
}

struct Inner<T: Transport> {
    transport: T,
    config: Config,
    classifier: Option<Box<dyn Classifier<ConnectionError<T>>>>,
    /// Connections built, being built, idle or in use.
    created: Mutex<usize>,
    ready_tx: mpsc::Sender<T::Connection>,
    ready_rx: tokio::sync::Mutex<mpsc::Receiver<T::Connection>>,
    slot_freed: Notify,
}

impl Pool<SmtpTransport> {
    /// Creates an SMTP pool for the server in `config`.
    #[must_use]
    pub fn smtp(config: Config) -> Self {
        Self::new(SmtpTransport::new(&config), config)
    }
}

impl<T: Transport> Pool<T> {
    /// Creates a pool. No connection is opened until the first acquire.
    #[must_use]
    pub fn new(transport: T, config: Config) -> Self {
        Self::build(transport, config, None)
    }

    /// Creates a pool that decides reuse with `classifier` instead of the
    /// transport's own classification.
    #[must_use]
    pub fn with_classifier(
        transport: T,
        config: Config,
        classifier: impl Classifier<ConnectionError<T>> + 'static,
    ) -> Self {
        Self::build(transport, config, Some(Box::new(classifier)))
    }

    fn build(
        transport: T,
        mut config: Config,
        classifier: Option<Box<dyn Classifier<ConnectionError<T>>>>,
    ) -> Self {
        // Public fields can bypass the builder's clamp.
        config.capacity = config.capacity.max(1);
        let (ready_tx, ready_rx) = mpsc::channel(config.capacity);
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                classifier,
                created: Mutex::new(0),
                ready_tx,
                ready_rx: tokio::sync::Mutex::new(ready_rx),
                slot_freed: Notify::new(),
            }),
        }
    }

    /// Maximum number of connections.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Number of connections currently built, being built, idle or in use.
    #[must_use]
    pub fn created(&self) -> usize {
        self.inner.created()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Waits up to `timeout` for a connection.
    ///
    /// An idle connection is returned immediately. Otherwise a new one is
    /// built in the background if there is room, and the caller waits for
    /// the first connection to become ready.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolTimeout`] if no connection became ready in time.
    pub async fn acquire(&self, timeout: Duration) -> Result<Pooled<T>> {
        let connection = tokio::time::timeout(timeout, Arc::clone(&self.inner).next_ready())
            .await
            .map_err(|_| {
                tracing::debug!(?timeout, created = self.created(), "pool acquire timed out");
                Error::PoolTimeout
            })?;
        Ok(Pooled {
            connection: Some(connection),
            inner: Arc::clone(&self.inner),
        })
    }

    /// Returns a connection after use.
    ///
    /// `outcome` is the result of the work done on it. On success the
    /// connection goes straight back to the pool. On failure the error is
    /// classified: a reusable session is reset and re-queued, anything else
    /// is closed and its slot freed for a fresh build.
    ///
    /// Returns the disposition that was applied.
    pub async fn release(
        &self,
        mut pooled: Pooled<T>,
        outcome: std::result::Result<(), &ConnectionError<T>>,
    ) -> Disposition {
        debug_assert!(Arc::ptr_eq(&self.inner, &pooled.inner), "released into another pool");
        let inner = &self.inner;
        let Some(mut connection) = pooled.connection.take() else {
            return Disposition::Unknown;
        };

        let Err(error) = outcome else {
            inner.requeue(connection);
            return Disposition::Reusable;
        };

        let disposition = inner.classify(error);
        tracing::debug!(?disposition, %error, "delivery failed");
        if disposition.is_reusable() {
            match connection.reset().await {
                Ok(()) => inner.requeue(connection),
                Err(err) => {
                    tracing::warn!(error = %err, "reset failed, discarding connection");
                    inner.discard(connection).await;
                    return Disposition::Broken;
                }
            }
        } else {
            inner.discard(connection).await;
        }
        disposition
    }

    /// Closes every idle connection. Connections in use are unaffected.
    pub async fn close_idle(&self) {
        let idle: Vec<T::Connection> = {
            let mut ready = self.inner.ready_rx.lock().await;
            std::iter::from_fn(|| ready.try_recv().ok()).collect()
        };
        for connection in idle {
            self.inner.discard(connection).await;
        }
    }
}

impl<T: Transport> Inner<T> {
    fn created(&self) -> usize {
        *self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn classify(&self, error: &ConnectionError<T>) -> Disposition {
        match &self.classifier {
            Some(classifier) => classifier.classify(error),
            None => self.transport.classify(error),
        }
    }

    /// Reserves a slot if the pool is below capacity.
    fn try_reserve(&self) -> bool {
        let mut created = self.created.lock().unwrap_or_else(PoisonError::into_inner);
        if *created >= self.config.capacity {
            return false;
        }
        *created += 1;
        true
    }

    /// Gives a slot back and wakes a waiter so it can build a replacement.
    fn free_slot(&self) {
        {
            let mut created = self.created.lock().unwrap_or_else(PoisonError::into_inner);
            *created = created.saturating_sub(1);
        }
        self.slot_freed.notify_one();
    }

    fn requeue(&self, connection: T::Connection) {
        if self.ready_tx.try_send(connection).is_err() {
            // Only reachable if the slot accounting is off.
            tracing::error!("ready queue full, dropping connection");
            self.free_slot();
        }
    }

    async fn discard(&self, connection: T::Connection) {
        connection.close().await;
        self.free_slot();
    }

    async fn next_ready(self: Arc<Self>) -> T::Connection {
        if let Ok(mut ready) = self.ready_rx.try_lock() {
            if let Ok(connection) = ready.try_recv() {
                return connection;
            }
        }

        self.spawn_build();

        // Waiters line up on the receiver lock; the one holding it gets the
        // next connection and reacts to freed slots.
        let mut ready = self.ready_rx.lock().await;
        loop {
            tokio::select! {
                Some(connection) = ready.recv() => return connection,
                () = self.slot_freed.notified() => self.spawn_build(),
            }
        }
    }

    fn spawn_build(self: &Arc<Self>) {
        if !self.try_reserve() {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            match inner.open().await {
                Ok(connection) => {
                    tracing::debug!(created = inner.created(), "connection ready");
                    inner.requeue(connection);
                }
                Err(err) => {
                    tracing::warn!(error = %err, host = %inner.config.host, "connection build failed");
                    inner.free_slot();
                }
            }
        });
    }

    async fn open(&self) -> std::result::Result<T::Connection, ConnectionError<T>> {
        establish(&self.transport, &self.config).await
    }
}

/// A connection checked out of a [`Pool`].
///
/// Hand it back with [`Pool::release`]. Dropping it instead discards the
/// connection, since its session state is unknown.
pub struct Pooled<T: Transport> {
    connection: Option<T::Connection>,
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Deref for Pooled<T> {
    type Target = T::Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection is only taken on release"))
    }
}

impl<T: Transport> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .unwrap_or_else(|| unreachable!("connection is only taken on release"))
    }
}

impl<T: Transport> Drop for Pooled<T> {
    fn drop(&mut self) {
        if self.connection.take().is_some() {
            tracing::debug!("pooled connection dropped without release");
            self.inner.free_slot();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Security;
    use crate::test_support::{MockError, MockTransport};

    fn pool(capacity: usize) -> (Pool<MockTransport>, MockTransport) {
        let transport = MockTransport::default();
        let config = Config::builder("mock.example.com").capacity(capacity).build();
        (Pool::new(transport.clone(), config), transport)
    }

    #[tokio::test]
    async fn test_acquire_builds_and_reuses() {
        let (pool, transport) = pool(2);
        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.release(conn, Ok(())).await, Disposition::Reusable);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(conn.id, 0);
        assert_eq!(transport.connects(), 1);
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_is_never_exceeded() {
        let (pool, transport) = pool(2);
        let first = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let second = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let third = pool.acquire(Duration::from_millis(100)).await;
        assert!(matches!(third, Err(Error::PoolTimeout)));
        assert_eq!(pool.created(), 2);
        assert_eq!(transport.connects(), 2);

        pool.release(first, Ok(())).await;
        pool.release(second, Ok(())).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_released_connection() {
        let (pool, transport) = pool(1);
        let held = pool.acquire(Duration::from_secs(1)).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.release(held, Ok(())).await;

        let conn = waiter.await.unwrap().unwrap();
        assert_eq!(conn.id, 0);
        assert_eq!(transport.connects(), 1);
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test]
    async fn test_concurrent_acquirers_share_capacity() {
        let (pool, transport) = pool(2);
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                let conn = pool.acquire(Duration::from_secs(5)).await?;
                tokio::time::sleep(Duration::from_millis(10)).await;
                pool.release(conn, Ok(())).await;
                Ok::<_, Error>(())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(transport.connects() <= 2);
        assert!(pool.created() <= 2);
    }

    #[tokio::test]
    async fn test_rejection_resets_and_requeues() {
        let (pool, transport) = pool(1);
        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let error = MockError::Rejected("550 no such user".into());

        assert_eq!(pool.release(conn, Err(&error)).await, Disposition::Reusable);
        assert_eq!(pool.created(), 1);
        assert_eq!(transport.log(), vec!["connect 0", "reset 0"]);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(conn.id, 0);
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test]
    async fn test_broken_connection_frees_slot() {
        let (pool, transport) = pool(1);
        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let error = MockError::Broken("connection reset".into());

        assert_eq!(pool.release(conn, Err(&error)).await, Disposition::Broken);
        assert_eq!(pool.created(), 0);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(transport.log(), vec!["connect 0", "close 0", "connect 1"]);
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test]
    async fn test_failed_reset_discards() {
        let (pool, transport) = pool(1);
        transport.fail_resets();
        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let error = MockError::Rejected("452 too many recipients".into());

        assert_eq!(pool.release(conn, Err(&error)).await, Disposition::Broken);
        assert_eq!(pool.created(), 0);
    }

    #[tokio::test]
    async fn test_failed_build_frees_slot_and_retries() {
        let (pool, transport) = pool(1);
        transport.fail_next_connects(1);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(pool.created(), 1);
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test]
    async fn test_custom_classifier() {
        let transport = MockTransport::default();
        let config = Config::builder("mock.example.com").capacity(1).build();
        let pool = Pool::with_classifier(transport, config, |_: &MockError| Disposition::Broken);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        let error = MockError::Rejected("550 no".into());
        assert_eq!(pool.release(conn, Err(&error)).await, Disposition::Broken);
        assert_eq!(pool.created(), 0);
    }

    #[tokio::test]
    async fn test_zero_capacity_config_is_raised_to_one() {
        let transport = MockTransport::default();
        let mut config = Config::new("mock.example.com");
        config.capacity = 0;
        let pool = Pool::new(transport.clone(), config);
        assert_eq!(pool.capacity(), 1);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(transport.connects(), 1);
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test]
    async fn test_dropped_guard_frees_slot() {
        let (pool, _transport) = pool(1);
        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        drop(conn);
        assert_eq!(pool.created(), 0);
    }

    #[tokio::test]
    async fn test_build_upgrades_and_authenticates() {
        let transport = MockTransport::default();
        transport.advertise_all();
        let config = Config::builder("mock.example.com")
            .credentials("user", "secret")
            .build();
        let pool = Pool::new(transport.clone(), config);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            transport.log(),
            vec!["connect 0", "upgrade 0 mock.example.com", "auth 0 user"]
        );
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test]
    async fn test_plaintext_security_skips_upgrade() {
        let transport = MockTransport::default();
        transport.advertise_all();
        let config = Config::builder("mock.example.com")
            .security(Security::None)
            .build();
        let pool = Pool::new(transport.clone(), config);

        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        assert_eq!(transport.log(), vec!["connect 0"]);
        pool.release(conn, Ok(())).await;
    }

    #[tokio::test]
    async fn test_close_idle() {
        let (pool, transport) = pool(2);
        let conn = pool.acquire(Duration::from_secs(1)).await.unwrap();
        pool.release(conn, Ok(())).await;

        pool.close_idle().await;
        assert_eq!(pool.created(), 0);
        assert_eq!(transport.log(), vec!["connect 0", "close 0"]);
    }
}
