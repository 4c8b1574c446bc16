//! Bounded connection pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OnceCell, RwLock, Semaphore};
use tracing::{debug, warn};

use crate::conn::{ConnectionFactory, Rows};
use crate::errors::{ConnectionError, Result};
use crate::retry::RetryingConnection;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Hard upper bound on physical connections.
    pub max_connections: usize,
    /// Connections kept open even when idle past the timeout.
    pub min_connections: usize,
    /// Idle age beyond which a connection is culled on release.
    pub idle_timeout: Duration,
}

pub const DEFAULT_POOL_CONFIG: PoolConfig = PoolConfig {
    max_connections: 8,
    min_connections: 1,
    idle_timeout: Duration::from_secs(300),
};

impl Default for PoolConfig {
    fn default() -> Self {
        DEFAULT_POOL_CONFIG
    }
}

struct IdleConn {
    id: u64,
    conn: RetryingConnection,
    since: Instant,
}

#[derive(Default)]
struct PoolState {
    /// Idle connections; most recently released at the back, so culling
    /// walks from the front.
    idle: Vec<IdleConn>,
    in_use: HashSet<u64>,
    total: usize,
}

struct PoolInner {
    factory: Arc<dyn ConnectionFactory>,
    config: PoolConfig,
    state: RwLock<PoolState>,
    /// Counting release signal: a permit is added on every release, and an
    /// exhausted `acquire` blocks consuming one before retrying.
    released: Semaphore,
    init: OnceCell<()>,
    next_id: AtomicU64,
}

/// A leased connection. Must be handed back with [`ConnectionPool::release`].
pub struct PooledConnection {
    pub(crate) id: u64,
    pub(crate) conn: RetryingConnection,
}

impl PooledConnection {
    pub async fn execute(&mut self, sql: &str) -> Result<Rows> {
        self.conn.execute(sql).await
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.conn.commit().await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.conn.rollback().await
    }
}

/// Bounded pool of physical connections.
///
/// `acquire` prefers an idle connection, creates one while below the
/// configured maximum, and otherwise blocks until a release signal arrives.
/// There is deliberately no acquire timeout; callers needing one wrap the
/// call themselves.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: PoolConfig) -> ConnectionPool {
        ConnectionPool {
            inner: Arc::new(PoolInner {
                factory,
                config,
                state: RwLock::new(PoolState::default()),
                released: Semaphore::new(0),
                init: OnceCell::new(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Eagerly open connections up to the configured minimum. Runs once;
    /// `acquire` calls it implicitly on first use.
    pub async fn ensure_minimum(&self) -> Result<()> {
        self.inner
            .init
            .get_or_try_init(|| async {
                loop {
                    {
                        let state = self.inner.state.read().await;
                        if state.total >= self.inner.config.min_connections {
                            return Ok(());
                        }
                    }
                    let (id, conn) = self.open_connection().await?;
                    let mut state = self.inner.state.write().await;
                    state.total += 1;
                    state.idle.push(IdleConn {
                        id,
                        conn,
                        since: Instant::now(),
                    });
                }
            })
            .await
            .copied()
    }

    /// Lease a connection, blocking while the pool is exhausted.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.ensure_minimum().await?;

        loop {
            // Shared mode for the check; exclusive mode only to take the
            // connection out. The read guard is dropped before upgrading.
            let has_idle = { !self.inner.state.read().await.idle.is_empty() };
            if has_idle {
                let mut state = self.inner.state.write().await;
                if let Some(idle) = state.idle.pop() {
                    state.in_use.insert(idle.id);
                    return Ok(PooledConnection {
                        id: idle.id,
                        conn: idle.conn,
                    });
                }
                // Lost the race to another acquirer; fall through.
            }

            let below_max =
                { self.inner.state.read().await.total < self.inner.config.max_connections };
            if below_max {
                let reserved = {
                    let mut state = self.inner.state.write().await;
                    if state.total < self.inner.config.max_connections {
                        state.total += 1;
                        true
                    } else {
                        false
                    }
                };
                if reserved {
                    match self.open_connection().await {
                        Ok((id, conn)) => {
                            self.inner.state.write().await.in_use.insert(id);
                            return Ok(PooledConnection { id, conn });
                        }
                        Err(e) => {
                            self.inner.state.write().await.total -= 1;
                            return Err(e);
                        }
                    }
                }
            }

            // Exhausted: wait for a release signal, then retry.
            let permit = self
                .inner
                .released
                .acquire()
                .await
                .map_err(|_| ConnectionError::PoolClosed)?;
            permit.forget();
        }
    }

    /// Return a leased connection, wake one waiter, then cull idle
    /// connections past the idle timeout down to the minimum size.
    pub async fn release(&self, lease: PooledConnection) {
        let PooledConnection { id, mut conn } = lease;

        if conn.is_broken() {
            debug!(id, "evicting broken connection");
            {
                let mut state = self.inner.state.write().await;
                state.in_use.remove(&id);
                state.total -= 1;
            }
            let _ = conn.close().await;
        } else {
            let mut state = self.inner.state.write().await;
            state.in_use.remove(&id);
            state.idle.push(IdleConn {
                id,
                conn,
                since: Instant::now(),
            });
        }

        self.inner.released.add_permits(1);
        self.cull_idle().await;
    }

    async fn cull_idle(&self) {
        let mut victims = Vec::new();
        {
            let mut state = self.inner.state.write().await;
            while state.total > self.inner.config.min_connections {
                match state.idle.first() {
                    Some(idle) if idle.since.elapsed() >= self.inner.config.idle_timeout => {
                        victims.push(state.idle.remove(0));
                        state.total -= 1;
                    }
                    _ => break,
                }
            }
        }

        for mut idle in victims {
            debug!(id = idle.id, "culling idle connection");
            if let Err(e) = idle.conn.close().await {
                warn!(%e, id = idle.id, "error closing culled connection");
            }
        }
    }

    async fn open_connection(&self) -> Result<(u64, RetryingConnection)> {
        let raw = self.inner.factory.open().await?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        Ok((id, RetryingConnection::new(raw, self.inner.factory.clone())))
    }

    pub async fn total_connections(&self) -> usize {
        self.inner.state.read().await.total
    }

    pub async fn idle_connections(&self) -> usize {
        self.inner.state.read().await.idle.len()
    }
}
