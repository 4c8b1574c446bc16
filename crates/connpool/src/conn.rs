//! Database client boundary.
//!
//! The core only needs the ability to execute SQL text and get back rows of
//! ordered, named, typed values, plus connection lifecycle calls. Vendor
//! clients implement these traits outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use sqlrepr::value::SqlValue;

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// One result row; column names are shared across the result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// An executed statement's full result.
#[derive(Debug, Clone, Default)]
pub struct Rows {
    columns: Arc<Vec<String>>,
    rows: Vec<Row>,
}

impl Rows {
    pub fn new(columns: Vec<String>) -> Rows {
        Rows {
            columns: Arc::new(columns),
            rows: Vec::new(),
        }
    }

    pub fn empty() -> Rows {
        Rows::default()
    }

    pub fn push(&mut self, values: Vec<SqlValue>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.rows.push(Row {
            columns: self.columns.clone(),
            values,
        });
    }

    pub fn with_row(mut self, values: Vec<SqlValue>) -> Rows {
        self.push(values);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// A physical database connection.
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// Execute literal SQL text, returning all result rows. Statements with
    /// no result set return an empty `Rows`.
    async fn execute(&mut self, sql: &str) -> Result<Rows>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn set_isolation(&mut self, level: IsolationLevel) -> Result<()>;

    /// Health check; false when the connection has gone stale.
    async fn is_valid(&self) -> bool;

    async fn close(&mut self) -> Result<()>;
}

/// Opens new physical connections for a data source.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn DatabaseConnection>>;
}
