use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use super::{Session, SessionFactory};
use crate::core::{DriverError, Result};

/// Bounded pool of reusable server sessions.
///
/// Admission and membership are deliberately separate: a counting
/// [`Semaphore`] grants the right to hold a session, while an idle queue
/// stores the sessions themselves. The fresh-session creation path holds a
/// permit while no idle session exists, which is why the two must never be
/// conflated.
pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<Arc<Session>>>,
    closed: AtomicBool,
    capacity: usize,
    acquire_timeout: Duration,
}

impl SessionPool {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        capacity: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            permits: Arc::new(Semaphore::new(capacity)),
            idle: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            capacity,
            acquire_timeout,
        }
    }

    /// Check out a session, waiting at most the configured timeout for a
    /// permit.
    ///
    /// An idle session is reused when available; otherwise a new one is
    /// opened through the factory. If the factory fails, the permit is
    /// released before the error propagates.
    pub async fn acquire(&self) -> Result<PooledSession> {
        if self.is_closed() {
            return Err(DriverError::DriverClosed);
        }

        let permit = tokio::time::timeout(
            self.acquire_timeout,
            self.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| DriverError::PoolTimeout(self.acquire_timeout))?
        .map_err(|_| DriverError::DriverClosed)?;

        // Closing may have raced the permit wait.
        if self.is_closed() {
            return Err(DriverError::DriverClosed);
        }

        let idle = self.idle.lock().pop_front();
        let session = match idle {
            Some(session) => session,
            None => Arc::new(self.factory.open_session().await?),
        };

        debug!(session_id = %session.session_id(), "session checked out");
        Ok(PooledSession {
            session,
            _permit: permit,
            released: false,
        })
    }

    /// Return a checked-out session.
    ///
    /// An alive session goes back to the idle queue while the pool is
    /// open; a dead one (or any session returned after close) is ended
    /// best-effort and discarded. The permit is released exactly once, by
    /// dropping the guard.
    pub async fn release(&self, mut pooled: PooledSession, alive: bool) {
        pooled.released = true;
        let session = pooled.session.clone();

        if alive && !self.is_closed() {
            // Requeue before freeing the permit so the pool never holds
            // more live sessions than its capacity.
            self.idle.lock().push_back(session.clone());
            drop(pooled);
            debug!(session_id = %session.session_id(), "session returned to pool");
        } else {
            drop(pooled);
            if let Err(error) = session.end().await {
                debug!(session_id = %session.session_id(), %error, "end-session failed during discard");
            }
            debug!(session_id = %session.session_id(), "session discarded");
        }
    }

    /// Close the pool: new acquisitions fail, idle sessions are ended.
    /// Checked-out sessions are discarded when their callers release them.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<Arc<Session>> =
            self.idle.lock().drain(..).collect();
        for session in drained {
            if let Err(error) = session.end().await {
                warn!(session_id = %session.session_id(), %error, "end-session failed during close");
            }
        }
        debug!("session pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently grantable. Equals `capacity` when nothing is
    /// checked out.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Sessions sitting in the idle queue.
    pub fn idle_sessions(&self) -> usize {
        self.idle.lock().len()
    }
}

/// A checked-out session plus the permit that admitted it.
///
/// Dropping the guard without an explicit [`SessionPool::release`] (the
/// cancellation path) discards the session and frees the permit; a
/// possibly mid-transaction session is never silently reused.
pub struct PooledSession {
    session: Arc<Session>,
    _permit: OwnedSemaphorePermit,
    released: bool,
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("released", &self.released)
            .finish()
    }
}

impl PooledSession {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if !self.released {
            debug!(session_id = %self.session.session_id(), "session dropped without release; discarding");
        }
    }
}
