//! # Session Pool
//!
//! Owns a fixed set of `PageSession`s and leases each to one task at a time.
//!
//! - `lease()` suspends until a session is free (no fairness guarantee)
//! - a `SessionLease` hands its session back when dropped, including
//!   during panic unwinding
//! - `close()` waits for every lease to come back, then closes each session
//!   exactly once; later leases fail with `SessionPoolError::Closed`

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::domain::{PageSession, SessionFactory, SessionPoolError};

/// A session plus its pool-assigned id
pub struct SessionHandle {
    session_id: usize,
    session: Box<dyn PageSession>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(session_id: usize, session: Box<dyn PageSession>) -> Self {
        Self { session_id, session }
    }

    #[must_use]
    pub const fn session_id(&self) -> usize {
        self.session_id
    }

    pub fn session_mut(&mut self) -> &mut dyn PageSession {
        self.session.as_mut()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionPoolStats {
    pub size: usize,
    pub available: usize,
    pub leased: usize,
    pub peak_leased: usize,
}

#[derive(Debug)]
struct PoolInner {
    /// Free handles; never locked across an await
    free: Mutex<Vec<SessionHandle>>,
    /// One permit per free handle
    permits: Arc<Semaphore>,
    size: usize,
    leased: AtomicUsize,
    peak_leased: AtomicUsize,
}

impl PoolInner {
    fn free(&self) -> MutexGuard<'_, Vec<SessionHandle>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-size pool of page sessions
#[derive(Debug, Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Starts `size` sessions through `factory`.
    ///
    /// If any session fails to start, the ones already started are closed
    /// and the error is returned.
    pub async fn initialize(size: usize, factory: &dyn SessionFactory) -> Result<Self, SessionPoolError> {
        check_capacity(size)?;
        info!("🚀 Starting {} page sessions", size);

        let mut sessions: Vec<Box<dyn PageSession>> = Vec::with_capacity(size);
        for session_id in 0..size {
            match factory.create(session_id).await {
                Ok(session) => sessions.push(session),
                Err(source) => {
                    warn!("❌ Session {} failed to start: {}", session_id, source);
                    for mut started in sessions {
                        if let Err(e) = started.close().await {
                            warn!("⚠️ Failed to close session during rollback: {}", e);
                        }
                    }
                    return Err(SessionPoolError::Initialization { session_id, source });
                }
            }
        }

        Self::from_sessions(sessions)
    }

    /// Wraps already-started sessions; ids are assigned in order from 0.
    pub fn from_sessions(sessions: Vec<Box<dyn PageSession>>) -> Result<Self, SessionPoolError> {
        let size = sessions.len();
        check_capacity(size)?;

        let handles = sessions
            .into_iter()
            .enumerate()
            .map(|(id, session)| SessionHandle::new(id, session))
            .collect();

        Ok(Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(handles),
                permits: Arc::new(Semaphore::new(size)),
                size,
                leased: AtomicUsize::new(0),
                peak_leased: AtomicUsize::new(0),
            }),
        })
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Waits for a free session.
    pub async fn lease(&self) -> Result<SessionLease, SessionPoolError> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| SessionPoolError::Closed)?;

        let handle = self.inner.free().pop().ok_or(SessionPoolError::Closed)?;

        let leased = self.inner.leased.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_leased.fetch_max(leased, Ordering::SeqCst);
        debug!("🔑 Leased session {} ({} of {} in use)", handle.session_id, leased, self.inner.size);

        Ok(SessionLease {
            handle: Some(handle),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Returns a session early; equivalent to dropping the lease.
    pub fn release(&self, lease: SessionLease) {
        drop(lease);
    }

    /// Closes every session once all leases have been returned.
    ///
    /// Returns the number of sessions closed. A second call fails with
    /// `SessionPoolError::Closed`.
    pub async fn close(&self) -> Result<usize, SessionPoolError> {
        let size = u32::try_from(self.inner.size).map_err(|_| SessionPoolError::InvalidCapacity(self.inner.size))?;
        let all_permits = Arc::clone(&self.inner.permits)
            .acquire_many_owned(size)
            .await
            .map_err(|_| SessionPoolError::Closed)?;
        self.inner.permits.close();

        let handles = std::mem::take(&mut *self.inner.free());
        info!("🛑 Closing {} page sessions", handles.len());

        let mut closed = 0;
        for mut handle in handles {
            match handle.session.close().await {
                Ok(()) => debug!("Session {} closed", handle.session_id),
                Err(e) => warn!("⚠️ Session {} did not close cleanly: {}", handle.session_id, e),
            }
            closed += 1;
        }

        drop(all_permits);
        Ok(closed)
    }

    #[must_use]
    pub fn stats(&self) -> SessionPoolStats {
        SessionPoolStats {
            size: self.inner.size,
            available: self.inner.permits.available_permits(),
            leased: self.inner.leased.load(Ordering::SeqCst),
            peak_leased: self.inner.peak_leased.load(Ordering::SeqCst),
        }
    }
}

fn check_capacity(size: usize) -> Result<(), SessionPoolError> {
    if size == 0 || size > Semaphore::MAX_PERMITS || u32::try_from(size).is_err() {
        return Err(SessionPoolError::InvalidCapacity(size));
    }
    Ok(())
}

/// Exclusive use of one session; returned to the pool on drop
pub struct SessionLease {
    handle: Option<SessionHandle>,
    pool: Arc<PoolInner>,
    // Released after the handle is back on the free list.
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    #[must_use]
    pub fn session_id(&self) -> usize {
        self.handle.as_ref().map_or(usize::MAX, SessionHandle::session_id)
    }

    pub fn session_mut(&mut self) -> Option<&mut dyn PageSession> {
        self.handle.as_mut().map(SessionHandle::session_mut)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("🔓 Session {} returned to pool", handle.session_id);
            self.pool.free().push(handle);
            self.pool.leased.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockSessionFactory, MockSite};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_lease_and_release_cycle() {
        let site = MockSite::new();
        let pool = SessionPool::initialize(2, &MockSessionFactory::new(site.clone())).await.unwrap();

        let a = pool.lease().await.unwrap();
        let b = pool.lease().await.unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(pool.stats().available, 0);
        assert_eq!(pool.stats().leased, 2);

        pool.release(a);
        drop(b);
        let stats = pool.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.leased, 0);
        assert_eq!(stats.peak_leased, 2);
    }

    #[tokio::test]
    async fn test_lease_waits_for_release() {
        let pool = SessionPool::initialize(1, &MockSessionFactory::new(MockSite::new())).await.unwrap();
        let held = pool.lease().await.unwrap();

        let waiter = pool.clone();
        let pending = tokio::spawn(async move { waiter.lease().await.map(|l| l.session_id()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        drop(held);
        assert_eq!(pending.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_waits_for_outstanding_lease_and_closes_once() {
        let site = MockSite::new();
        let pool = SessionPool::initialize(3, &MockSessionFactory::new(site.clone())).await.unwrap();
        let held = pool.lease().await.unwrap();

        let closer = pool.clone();
        let closing = tokio::spawn(async move { closer.close().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closing.is_finished());
        assert_eq!(site.close_count(), 0);

        drop(held);
        assert_eq!(closing.await.unwrap().unwrap(), 3);
        assert_eq!(site.close_count(), 3);

        assert_eq!(pool.close().await.unwrap_err(), SessionPoolError::Closed);
        assert_eq!(pool.lease().await.unwrap_err(), SessionPoolError::Closed);
        assert_eq!(site.close_count(), 3);
    }

    #[tokio::test]
    async fn test_lease_returns_on_panic() {
        let pool = SessionPool::initialize(1, &MockSessionFactory::new(MockSite::new())).await.unwrap();
        let worker = pool.clone();
        let result = tokio::spawn(async move {
            let lease = worker.lease().await.unwrap();
            if lease.session_id() == 0 {
                panic!("task blew up while holding session {}", lease.session_id());
            }
        })
        .await;
        assert_err!(result);
        assert_eq!(pool.stats().available, 1);
        assert_ok!(pool.lease().await);
    }

    #[tokio::test]
    async fn test_initialization_failure_rolls_back() {
        let site = MockSite::new();
        let factory = MockSessionFactory::new(site.clone()).failing_at(2);
        let err = SessionPool::initialize(4, &factory).await.unwrap_err();
        assert!(matches!(err, SessionPoolError::Initialization { session_id: 2, .. }));
        assert_eq!(site.close_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_rejected() {
        let err = SessionPool::initialize(0, &MockSessionFactory::new(MockSite::new())).await.unwrap_err();
        assert_eq!(err, SessionPoolError::InvalidCapacity(0));
    }
}
