//! In-memory debug connection for exercising pool and cache behavior
//! without a real database. Supports scripted result sets and failure
//! injection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::conn::{ConnectionFactory, DatabaseConnection, IsolationLevel, Rows};
use crate::errors::{ConnectionError, Result};

type QueryHandler = dyn Fn(&str) -> Result<Rows> + Send + Sync;

/// Shared factory state, visible to tests.
struct DebugShared {
    handler: Box<QueryHandler>,
    executed: Mutex<Vec<String>>,
    opened: AtomicUsize,
    fail_executes: AtomicUsize,
    fail_opens: AtomicUsize,
}

pub struct DebugConnectionFactory {
    shared: Arc<DebugShared>,
}

impl DebugConnectionFactory {
    /// Factory whose connections answer every statement via `handler`.
    pub fn new<F>(handler: F) -> DebugConnectionFactory
    where
        F: Fn(&str) -> Result<Rows> + Send + Sync + 'static,
    {
        DebugConnectionFactory {
            shared: Arc::new(DebugShared {
                handler: Box::new(handler),
                executed: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
                fail_executes: AtomicUsize::new(0),
                fail_opens: AtomicUsize::new(0),
            }),
        }
    }

    /// Factory whose connections return an empty result set for everything.
    pub fn empty() -> DebugConnectionFactory {
        Self::new(|_| Ok(Rows::empty()))
    }

    /// Statements executed across all connections, in order.
    pub fn executed(&self) -> Vec<String> {
        self.shared.executed.lock().clone()
    }

    pub fn executed_count(&self) -> usize {
        self.shared.executed.lock().len()
    }

    pub fn opened_count(&self) -> usize {
        self.shared.opened.load(Ordering::Relaxed)
    }

    /// Make the next `n` executes fail and invalidate their connection.
    pub fn fail_next_executes(&self, n: usize) {
        self.shared.fail_executes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` opens fail.
    pub fn fail_next_opens(&self, n: usize) {
        self.shared.fail_opens.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionFactory for DebugConnectionFactory {
    async fn open(&self) -> Result<Box<dyn DatabaseConnection>> {
        if take_one(&self.shared.fail_opens) {
            return Err(ConnectionError::Open("injected open failure".to_string()));
        }
        self.shared.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(DebugConnection {
            shared: self.shared.clone(),
            valid: AtomicBool::new(true),
        }))
    }
}

struct DebugConnection {
    shared: Arc<DebugShared>,
    valid: AtomicBool,
}

#[async_trait]
impl DatabaseConnection for DebugConnection {
    async fn execute(&mut self, sql: &str) -> Result<Rows> {
        if !self.valid.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        if take_one(&self.shared.fail_executes) {
            // An injected failure also kills the connection, driving the
            // reconnect path.
            self.valid.store(false, Ordering::SeqCst);
            return Err(ConnectionError::Execute(
                "injected execute failure".to_string(),
            ));
        }
        self.shared.executed.lock().push(sql.to_string());
        (self.shared.handler)(sql)
    }

    async fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    async fn set_isolation(&mut self, _level: IsolationLevel) -> Result<()> {
        Ok(())
    }

    async fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    async fn close(&mut self) -> Result<()> {
        self.valid.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Decrement a countdown if positive; true when a count was taken.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
