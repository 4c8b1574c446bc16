//! Metadata resolution boundary.
//!
//! The parser and caches need to turn table names into identities and
//! validate column references. Actual metadata introspection (querying the
//! database for primary keys, column types, foreign keys) lives behind this
//! trait; a static in-memory implementation is provided for embedders that
//! supply schema up front and for tests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::column::TableColumn;
use crate::ident::TableIdentity;

/// Resolved schema for one table: ordered columns plus key columns.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub identity: TableIdentity,
    pub columns: Vec<TableColumn>,
    /// Primary key column names, in key order.
    pub key_columns: Vec<String>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_key_column(&self, name: &str) -> bool {
        self.key_columns.iter().any(|k| k.eq_ignore_ascii_case(name))
    }
}

/// Resolves table names to identities and identities to schemas.
pub trait SchemaResolver: Send + Sync {
    /// Resolve a possibly dot-qualified table name. Returns `None` for
    /// tables unknown to the metadata source.
    fn resolve_table(&self, name: &str) -> Option<TableIdentity>;

    /// Schema for a previously resolved table.
    fn table_schema(&self, table: &TableIdentity) -> Option<Arc<TableSchema>>;
}

/// Static resolver over schemas registered up front.
#[derive(Debug, Default)]
pub struct StaticResolver {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl StaticResolver {
    pub fn new() -> StaticResolver {
        StaticResolver::default()
    }

    pub fn register(&mut self, schema: TableSchema) {
        let key = schema.identity.table().to_ascii_lowercase();
        self.tables.insert(key, Arc::new(schema));
    }

    pub fn with_table(mut self, schema: TableSchema) -> StaticResolver {
        self.register(schema);
        self
    }
}

impl SchemaResolver for StaticResolver {
    fn resolve_table(&self, name: &str) -> Option<TableIdentity> {
        let candidate = TableIdentity::from_qualified(name);
        let schema = self.tables.get(&candidate.table().to_ascii_lowercase())?;
        // Fuzzy match lets unqualified statement names hit qualified
        // metadata entries, but a mismatched schema must not.
        if schema.identity.same_table(&candidate) {
            Some(schema.identity.clone())
        } else {
            None
        }
    }

    fn table_schema(&self, table: &TableIdentity) -> Option<Arc<TableSchema>> {
        let schema = self.tables.get(&table.table().to_ascii_lowercase())?;
        if schema.identity.same_table(table) {
            Some(schema.clone())
        } else {
            None
        }
    }
}
