//! Reconnect-once connection wrapper.

use std::sync::Arc;

use tracing::debug;

use crate::conn::{ConnectionFactory, DatabaseConnection, IsolationLevel, Rows};
use crate::errors::Result;

/// Wraps a physical connection and swaps in a fresh one when a call fails
/// through a stale connection.
///
/// The retry happens exactly once, inline; a second failure propagates and
/// marks the wrapper broken so the pool evicts it on release.
pub struct RetryingConnection {
    inner: Box<dyn DatabaseConnection>,
    factory: Arc<dyn ConnectionFactory>,
    broken: bool,
}

impl RetryingConnection {
    pub fn new(
        inner: Box<dyn DatabaseConnection>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> RetryingConnection {
        RetryingConnection {
            inner,
            factory,
            broken: false,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub async fn execute(&mut self, sql: &str) -> Result<Rows> {
        match self.inner.execute(sql).await {
            Ok(rows) => Ok(rows),
            Err(first) => {
                if self.inner.is_valid().await {
                    // The connection is fine; the statement itself failed.
                    return Err(first);
                }
                debug!(%first, "connection went stale, reconnecting");
                match self.factory.open().await {
                    Ok(fresh) => self.inner = fresh,
                    Err(e) => {
                        self.broken = true;
                        return Err(e);
                    }
                }
                self.inner.execute(sql).await.inspect_err(|_| {
                    self.broken = true;
                })
            }
        }
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.inner.commit().await
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback().await
    }

    pub async fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.inner.set_isolation(level).await
    }

    pub async fn is_valid(&self) -> bool {
        self.inner.is_valid().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

impl std::fmt::Debug for RetryingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingConnection")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}
