//! Process-scoped SQLite connection pool.
//!
//! # Responsibility
//! - Open the store explicitly at startup and drain it explicitly at shutdown.
//! - Hand out at most `pool_size` connections, waiting up to the configured
//!   acquire timeout when all are checked out.
//!
//! # Invariants
//! - A [`PooledConnection`] is owned by exactly one caller; dropping it
//!   returns the connection on every exit path, including early returns.
//! - A connection left inside an open transaction is discarded, not reused.
//! - After [`ConnectionPool::shutdown`] no connection is handed out and
//!   returned connections are closed.

use super::{open_db, DbError, DbResult};
use crate::config::StoreConfig;
use log::{info, warn};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections currently open (idle + checked out).
    pub open: usize,
    /// Connections waiting in the pool.
    pub idle: usize,
    /// Upper bound on open connections.
    pub max: usize,
    /// Whether the pool has been shut down.
    pub closed: bool,
}

struct PoolState {
    idle: Vec<Connection>,
    open: usize,
    closed: bool,
}

struct PoolInner {
    database_path: PathBuf,
    max_size: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        // Counters stay consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, conn: Connection) {
        let reusable = conn.is_autocommit();
        let mut state = self.lock_state();
        if state.closed || !reusable {
            state.open = state.open.saturating_sub(1);
            drop(state);
            if !reusable {
                warn!("event=pool_release module=db status=error error_code=open_transaction_discarded");
            }
            drop(conn);
        } else {
            state.idle.push(conn);
            drop(state);
        }
        self.available.notify_one();
    }
}

/// Shared handle to the connection pool. Cloning shares the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Opens the pool and eagerly bootstraps one connection.
    ///
    /// The eager connection applies migrations, so schema problems surface
    /// here rather than on the first request.
    ///
    /// # Errors
    /// - Any [`DbError`] raised while opening or migrating the first
    ///   connection.
    pub fn open(config: &StoreConfig) -> DbResult<Self> {
        let first = open_db(&config.database_path)?;
        let max_size = config.pool_size.max(1);
        info!(
            "event=pool_open module=db status=ok max={} acquire_timeout_ms={}",
            max_size,
            config.acquire_timeout.as_millis()
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                database_path: config.database_path.clone(),
                max_size,
                acquire_timeout: config.acquire_timeout,
                state: Mutex::new(PoolState {
                    idle: vec![first],
                    open: 1,
                    closed: false,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Checks out one connection.
    ///
    /// # Errors
    /// - [`DbError::PoolClosed`] after shutdown.
    /// - [`DbError::PoolTimeout`] when no connection frees up in time.
    /// - Any bootstrap error when a new connection has to be opened.
    pub fn acquire(&self) -> DbResult<PooledConnection> {
        let started_at = Instant::now();
        let mut state = self.inner.lock_state();

        loop {
            if state.closed {
                return Err(DbError::PoolClosed);
            }

            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(conn, Arc::clone(&self.inner)));
            }

            if state.open < self.inner.max_size {
                state.open += 1;
                drop(state);
                return match open_db(&self.inner.database_path) {
                    Ok(conn) => Ok(PooledConnection::new(conn, Arc::clone(&self.inner))),
                    Err(err) => {
                        let mut state = self.inner.lock_state();
                        state.open = state.open.saturating_sub(1);
                        drop(state);
                        self.inner.available.notify_one();
                        Err(err)
                    }
                };
            }

            let waited = started_at.elapsed();
            if waited >= self.inner.acquire_timeout {
                warn!(
                    "event=pool_acquire module=db status=error error_code=pool_timeout waited_ms={}",
                    waited.as_millis()
                );
                return Err(DbError::PoolTimeout {
                    waited_ms: waited.as_millis(),
                });
            }

            let (next, _) = self
                .inner
                .available
                .wait_timeout(state, self.inner.acquire_timeout - waited)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    /// Drains the pool: idle connections close now, checked-out ones close
    /// when returned, and further [`acquire`](Self::acquire) calls fail.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock_state();
        if state.closed {
            return;
        }
        state.closed = true;
        let idle = std::mem::take(&mut state.idle);
        state.open = state.open.saturating_sub(idle.len());
        let still_open = state.open;
        drop(state);

        drop(idle);
        self.inner.available.notify_all();
        info!(
            "event=pool_shutdown module=db status=ok checked_out={}",
            still_open
        );
    }

    /// Returns the current occupancy snapshot.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.lock_state();
        PoolStatus {
            open: state.open,
            idle: state.idle.len(),
            max: self.inner.max_size,
            closed: state.closed,
        }
    }
}

/// Scope guard over a checked-out connection.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(conn: Connection, pool: Arc<PoolInner>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
