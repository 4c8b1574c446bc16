//! Object cache core.
//!
//! One `ObjectCache` holds row-derived objects for a single table. Reads go
//! through [`ObjectCache::get`]; notification replay goes through
//! `apply_notification`, which either removes entries, synthesizes their new
//! state from pinned statement values, or re-fetches them with a correlated
//! SELECT composed off the cache's base statement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use connpool::conn::{Row, Rows};
use connpool::pool::ConnectionPool;
use parking_lot::Mutex;
use sqlparse::compose::{ComposeRequest, StatementComposer};
use sqlparse::errors::ParseError;
use sqlparse::parser::Parser;
use sqlparse::statement::{ParsedStatement, StatementKind};
use sqlrepr::fmt::StatementFormatter;
use sqlrepr::ident::TableIdentity;
use sqlrepr::resolve::{SchemaResolver, TableSchema};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, trace, warn};

use crate::errors::{CacheError, Result};
use crate::events::{ChangeEvent, ChangeKind, ListenerSet};
use crate::key::CacheKey;
use crate::object::{CacheRef, CachedObject};
use crate::stats::{CacheStats, StatsSnapshot};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache name, also the target of foreign-key references from other
    /// caches.
    pub name: String,
    /// Cached table, possibly dot-qualified.
    pub table: String,
    /// Point-lookup mode: load one row per requested key instead of the
    /// whole base statement.
    pub high_cardinality: bool,
    /// Optional membership predicate appended to the base statement.
    pub filter: Option<String>,
    /// Foreign-key column -> target cache name.
    pub foreign_keys: HashMap<String, String>,
}

impl CacheConfig {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> CacheConfig {
        CacheConfig {
            name: name.into(),
            table: table.into(),
            high_cardinality: false,
            filter: None,
            foreign_keys: HashMap::new(),
        }
    }

    pub fn high_cardinality(mut self) -> CacheConfig {
        self.high_cardinality = true;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> CacheConfig {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_foreign_key(
        mut self,
        column: impl Into<String>,
        target_cache: impl Into<String>,
    ) -> CacheConfig {
        self.foreign_keys
            .insert(column.into().to_ascii_lowercase(), target_cache.into());
        self
    }
}

/// A foreign-key reference found during a first inflation pass, resolved in
/// the second pass once every object touched by the batch exists.
#[derive(Debug, Clone)]
pub struct DeferredRef {
    /// Key of the owning entry.
    pub key: CacheKey,
    /// Foreign-key column on the owning entry.
    pub column: String,
    pub target_cache: String,
    /// `None` for a NULL foreign key.
    pub target_key: Option<CacheKey>,
}

/// Outcome of applying one notification statement to one cache.
pub(crate) enum Applied {
    /// Nothing to do: ignorable update, irrelevant statement, or empty cache.
    Skipped,
    /// Cache cleared wholesale, pending bulk reload.
    Invalidated,
    /// Individual entries changed. Deferred references still need a second
    /// pass, change and loaded events still need dispatching.
    Rows {
        deferred: Vec<DeferredRef>,
        changes: Vec<ChangeEvent>,
        loaded: Vec<CacheKey>,
    },
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CachedObject>,
    /// SQL text of statements whose full result set is cached. A repeat of a
    /// satisfied statement is answered without a round trip, including the
    /// row-absent case.
    satisfied: HashSet<String>,
    /// Lowercased columns that loaded statements filter or key on. Updates
    /// touching none of these cannot change membership or identity.
    criteria: HashSet<String>,
    /// Set when a loaded statement carried a predicate the parser could not
    /// decompose; disables the ignorable-update shortcut.
    opaque_criteria: bool,
    needs_reload: bool,
}

pub struct ObjectCache {
    config: CacheConfig,
    schema: Arc<TableSchema>,
    base: ParsedStatement,
    formatter: StatementFormatter,
    listeners: Arc<ListenerSet>,
    /// Serializes load and notification application; held across awaits.
    load_lock: AsyncMutex<()>,
    state: Mutex<CacheState>,
    stats: CacheStats,
}

impl ObjectCache {
    pub fn new(
        config: CacheConfig,
        resolver: &dyn SchemaResolver,
        listeners: Arc<ListenerSet>,
    ) -> Result<ObjectCache> {
        Self::with_formatter(config, resolver, listeners, StatementFormatter::default())
    }

    pub fn with_formatter(
        config: CacheConfig,
        resolver: &dyn SchemaResolver,
        listeners: Arc<ListenerSet>,
        formatter: StatementFormatter,
    ) -> Result<ObjectCache> {
        let identity = resolver
            .resolve_table(&config.table)
            .ok_or_else(|| ParseError::UnknownTable(config.table.clone()))?;
        let schema = resolver
            .table_schema(&identity)
            .ok_or_else(|| ParseError::UnknownTable(config.table.clone()))?;
        if schema.key_columns.is_empty() {
            return Err(CacheError::Internal(format!(
                "table '{}' has no key columns",
                config.table
            )));
        }

        let mut sql = format!("SELECT * FROM {}", identity.qualified_name());
        if let Some(filter) = &config.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        let base = Parser::parse(&sql, resolver)?;

        Ok(ObjectCache {
            config,
            schema,
            base,
            formatter,
            listeners,
            load_lock: AsyncMutex::new(()),
            state: Mutex::new(CacheState::default()),
            stats: CacheStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn table(&self) -> &TableIdentity {
        &self.schema.identity
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Whether this cache consumes notifications touching `table`.
    pub fn watches(&self, table: &TableIdentity) -> bool {
        self.schema.identity.same_table(table)
    }

    /// Peek at a cached entry without loading or touching counters.
    pub fn cached(&self, key: &CacheKey) -> Option<CachedObject> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Look up an object, loading from the database on miss.
    ///
    /// A miss against a statement whose result set is already fully cached
    /// returns `None` without a round trip: the database is known not to
    /// hold a matching row.
    pub async fn get(
        &self,
        key: &CacheKey,
        pool: &ConnectionPool,
    ) -> Result<Option<CachedObject>> {
        if let Some(obj) = self.state.lock().entries.get(key) {
            self.stats.hit();
            return Ok(Some(obj.clone()));
        }

        let _load = self.load_lock.lock().await;
        if let Some(obj) = self.state.lock().entries.get(key) {
            // Another task loaded it while we waited on the lock.
            self.stats.hit();
            return Ok(Some(obj.clone()));
        }
        self.stats.miss();

        let stmt = if self.config.high_cardinality {
            self.point_statement(key)?
        } else {
            self.base.clone()
        };
        let sql = stmt.sql_text();

        {
            let state = self.state.lock();
            if !state.needs_reload && state.satisfied.contains(&sql) {
                trace!(cache = %self.config.name, %key, "satisfied statement, miss is final");
                return Ok(None);
            }
        }

        let rows = self.execute_sql(&sql, pool).await?;

        let mut deferred = Vec::new();
        let mut touched = Vec::new();
        let result = {
            let mut state = self.state.lock();
            if state.needs_reload && !self.config.high_cardinality {
                state.entries.clear();
                state.satisfied.clear();
            }
            state.needs_reload = false;
            self.first_pass(&mut state, &rows, &mut deferred, &mut touched)?;
            for d in &deferred {
                Self::resolve_ref_locked(&mut state, d);
            }
            state.satisfied.insert(sql);
            self.record_criteria(&mut state);
            state.entries.get(key).cloned()
        };

        for (loaded_key, _) in &touched {
            self.listeners
                .each(|l| l.on_loaded(&self.config.name, loaded_key));
        }
        Ok(result)
    }

    /// Drop all entries and loaded-statement knowledge; the next read
    /// reloads from the database.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.satisfied.clear();
        state.criteria.clear();
        state.opaque_criteria = false;
        state.needs_reload = true;
        self.stats.invalidated();
        debug!(cache = %self.config.name, "cache invalidated");
    }

    pub(crate) async fn apply_notification(
        &self,
        stmt: &ParsedStatement,
        pool: &ConnectionPool,
    ) -> Result<Applied> {
        let _load = self.load_lock.lock().await;

        {
            let state = self.state.lock();
            if state.entries.is_empty() && state.satisfied.is_empty() && !state.needs_reload {
                // Never loaded, nothing to maintain.
                self.stats.skipped();
                return Ok(Applied::Skipped);
            }
        }

        match stmt.kind() {
            StatementKind::Truncate | StatementKind::Drop => {
                self.invalidate();
                self.stats.applied();
                Ok(Applied::Invalidated)
            }
            StatementKind::Delete => self.apply_delete(stmt, pool).await,
            StatementKind::Insert => self.apply_insert(stmt, pool).await,
            StatementKind::Update => self.apply_update(stmt, pool).await,
            kind => {
                debug!(cache = %self.config.name, %kind, "ignoring notification kind");
                self.stats.skipped();
                Ok(Applied::Skipped)
            }
        }
    }

    async fn apply_delete(&self, stmt: &ParsedStatement, pool: &ConnectionPool) -> Result<Applied> {
        if !stmt.pins_all(&self.schema.key_columns) {
            debug!(cache = %self.config.name, "delete without full key, invalidating");
            self.invalidate();
            self.stats.applied();
            return Ok(Applied::Invalidated);
        }

        let key = self.pinned_key(stmt)?;
        if stmt.pinned_complete() {
            // The WHERE was exactly the key; the row is gone.
            let removed = self.state.lock().entries.remove(&key).is_some();
            self.stats.applied();
            let changes = if removed {
                vec![ChangeEvent {
                    cache: self.config.name.clone(),
                    kind: ChangeKind::Removed,
                    key,
                }]
            } else {
                Vec::new()
            };
            return Ok(Applied::Rows {
                deferred: Vec::new(),
                changes,
                loaded: Vec::new(),
            });
        }

        // Extra predicates beside the key: the row may have survived the
        // delete. Re-fetch it to find out.
        self.refetch_by_key(key, pool).await
    }

    async fn apply_insert(&self, stmt: &ParsedStatement, pool: &ConnectionPool) -> Result<Applied> {
        if !stmt.pins_all(&self.schema.key_columns) {
            // INSERT ... SELECT or similar: affected keys are unknown.
            debug!(cache = %self.config.name, "insert without pinned key, invalidating");
            self.invalidate();
            self.stats.applied();
            return Ok(Applied::Invalidated);
        }
        let key = self.pinned_key(stmt)?;

        match self.matches_filter(stmt) {
            Some(false) => {
                trace!(cache = %self.config.name, %key, "inserted row outside membership filter");
                self.stats.skipped();
                return Ok(Applied::Skipped);
            }
            Some(true) => {}
            // Membership undecidable from pinned values alone.
            None => return self.refetch_by_key(key, pool).await,
        }

        let column_names: Vec<String> =
            self.schema.columns.iter().map(|c| c.name.clone()).collect();
        if stmt.pins_all(&column_names) {
            // Every column value is in the statement; synthesize the row
            // without a round trip.
            let row = self.synthesize_row(stmt)?;
            return self.apply_rows(&row);
        }

        self.refetch_by_key(key, pool).await
    }

    async fn apply_update(&self, stmt: &ParsedStatement, pool: &ConnectionPool) -> Result<Applied> {
        {
            let state = self.state.lock();
            let ignorable = !state.opaque_criteria
                && stmt
                    .modified_columns()
                    .iter()
                    .all(|m| !state.criteria.contains(&m.to_ascii_lowercase()));
            if ignorable {
                trace!(
                    cache = %self.config.name,
                    "update touches no criterion column, ignoring"
                );
                self.stats.skipped();
                return Ok(Applied::Skipped);
            }
        }

        if !stmt.pins_all(&self.schema.key_columns) {
            // The update's extent is unknown; any number of rows may have
            // entered or left the cached result sets.
            debug!(cache = %self.config.name, "update without pinned key, invalidating");
            self.invalidate();
            self.stats.applied();
            return Ok(Applied::Invalidated);
        }
        if stmt
            .modified_columns()
            .iter()
            .any(|m| self.schema.is_key_column(m))
        {
            // Re-keying a row would strand the entry under its old key.
            debug!(cache = %self.config.name, "update modifies a key column, invalidating");
            self.invalidate();
            self.stats.applied();
            return Ok(Applied::Invalidated);
        }

        let key = self.pinned_key(stmt)?;
        let entry_exists = self.state.lock().entries.contains_key(&key);
        let all_set_values_pinned = stmt
            .modified_columns()
            .iter()
            .all(|m| stmt.pinned_value(m).is_some());

        match self.matches_filter(stmt) {
            Some(false) => {
                // The new row state fails the membership filter; the row
                // left the cache's extent.
                let removed = self.state.lock().entries.remove(&key).is_some();
                self.stats.applied();
                let changes = if removed {
                    vec![ChangeEvent {
                        cache: self.config.name.clone(),
                        kind: ChangeKind::Removed,
                        key,
                    }]
                } else {
                    Vec::new()
                };
                Ok(Applied::Rows {
                    deferred: Vec::new(),
                    changes,
                    loaded: Vec::new(),
                })
            }
            Some(true) if entry_exists && all_set_values_pinned => self.patch_entry(&key, stmt),
            Some(true) if !entry_exists && self.base.where_clause().is_none() => {
                // Unfiltered cache without the row: either the full extent
                // is cached and the row does not exist, or it was never
                // requested. Updates create no rows either way.
                self.stats.skipped();
                Ok(Applied::Skipped)
            }
            // Membership undecidable, the row may have entered the filter's
            // extent, or a SET value lives only in the database.
            _ => self.refetch_by_key(key, pool).await,
        }
    }

    /// Apply pinned SET values directly onto a cached entry, no round trip.
    fn patch_entry(&self, key: &CacheKey, stmt: &ParsedStatement) -> Result<Applied> {
        let mut deferred = Vec::new();
        {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(key) else {
                self.stats.skipped();
                return Ok(Applied::Skipped);
            };
            for modified in stmt.modified_columns() {
                let Some(column) = self.schema.column(modified) else {
                    warn!(
                        cache = %self.config.name,
                        column = %modified,
                        "modified column missing from schema"
                    );
                    continue;
                };
                let literal = stmt
                    .pinned_value(modified)
                    .ok_or_else(|| CacheError::Internal("unpinned SET value".to_string()))?;
                let value = self.formatter.decode(literal, column.sql_type)?;

                let lowered = column.name.to_ascii_lowercase();
                if let Some(target_cache) = self.config.foreign_keys.get(&lowered) {
                    let target_key = (!value.renders_null())
                        .then(|| self.formatter.literal(&value).map(CacheKey::single))
                        .transpose()?;
                    deferred.push(DeferredRef {
                        key: key.clone(),
                        column: column.name.clone(),
                        target_cache: target_cache.clone(),
                        target_key,
                    });
                }
                entry.set_field(&column.name, value);
            }
        }
        self.stats.applied();
        Ok(Applied::Rows {
            deferred,
            changes: vec![ChangeEvent {
                cache: self.config.name.clone(),
                kind: ChangeKind::Updated,
                key: key.clone(),
            }],
            loaded: vec![key.clone()],
        })
    }

    /// Re-fetch one row by key through the base statement. An empty result
    /// removes the entry; a row inflates over it.
    async fn refetch_by_key(&self, key: CacheKey, pool: &ConnectionPool) -> Result<Applied> {
        let predicate = self.key_predicate(&key);
        let select = StatementComposer::new().compose(
            &self.base,
            ComposeRequest {
                extra_predicates: &[predicate],
                ..Default::default()
            },
        );
        let rows = self.execute_sql(&select.sql_text(), pool).await?;

        if rows.is_empty() {
            let removed = self.state.lock().entries.remove(&key).is_some();
            self.stats.applied();
            let changes = if removed {
                vec![ChangeEvent {
                    cache: self.config.name.clone(),
                    kind: ChangeKind::Removed,
                    key,
                }]
            } else {
                Vec::new()
            };
            return Ok(Applied::Rows {
                deferred: Vec::new(),
                changes,
                loaded: Vec::new(),
            });
        }
        self.apply_rows(&rows)
    }

    /// Inflate fetched or synthesized rows into entries (first pass),
    /// leaving reference resolution to the caller's second pass.
    fn apply_rows(&self, rows: &Rows) -> Result<Applied> {
        let mut deferred = Vec::new();
        let mut touched = Vec::new();
        {
            let mut state = self.state.lock();
            self.first_pass(&mut state, rows, &mut deferred, &mut touched)?;
        }
        self.stats.applied();
        let changes = touched
            .iter()
            .map(|(key, kind)| ChangeEvent {
                cache: self.config.name.clone(),
                kind: *kind,
                key: key.clone(),
            })
            .collect();
        let loaded = touched.into_iter().map(|(key, _)| key).collect();
        Ok(Applied::Rows {
            deferred,
            changes,
            loaded,
        })
    }

    /// First inflation pass: create or update entries from rows, recording
    /// foreign-key references for the deferred second pass.
    fn first_pass(
        &self,
        state: &mut CacheState,
        rows: &Rows,
        deferred: &mut Vec<DeferredRef>,
        touched: &mut Vec<(CacheKey, ChangeKind)>,
    ) -> Result<()> {
        for row in rows.iter() {
            let Some(key) = self.row_key(row)? else {
                warn!(cache = %self.config.name, "result row missing key column, skipped");
                continue;
            };

            let is_new = !state.entries.contains_key(&key);
            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(|| CachedObject::new(key.clone()));
            for column in &self.schema.columns {
                if let Some(value) = row.get(&column.name) {
                    entry.set_field(&column.name, value.clone());
                }
            }

            for (column, target_cache) in &self.config.foreign_keys {
                let target_key = match row.get(column) {
                    Some(value) if !value.renders_null() => {
                        Some(CacheKey::single(self.formatter.literal(value)?))
                    }
                    Some(_) => None,
                    None => {
                        debug!(
                            cache = %self.config.name,
                            column = %column,
                            "foreign key column absent from result row"
                        );
                        continue;
                    }
                };
                deferred.push(DeferredRef {
                    key: key.clone(),
                    column: column.clone(),
                    target_cache: target_cache.clone(),
                    target_key,
                });
            }

            let kind = if is_new {
                ChangeKind::Inserted
            } else {
                ChangeKind::Updated
            };
            touched.push((key, kind));
        }
        Ok(())
    }

    /// Second inflation pass for one deferred reference.
    pub(crate) fn resolve_ref(&self, deferred: &DeferredRef) {
        let mut state = self.state.lock();
        Self::resolve_ref_locked(&mut state, deferred);
    }

    fn resolve_ref_locked(state: &mut CacheState, deferred: &DeferredRef) {
        let Some(entry) = state.entries.get_mut(&deferred.key) else {
            trace!(key = %deferred.key, "entry vanished before reference resolution");
            return;
        };
        let target = deferred.target_key.clone().map(|key| CacheRef {
            cache: deferred.target_cache.clone(),
            key,
        });
        entry.set_reference(&deferred.column, target);
    }

    /// Record which columns loaded statements filter or key on, for the
    /// ignorable-update shortcut. Point lookups restate the base filter,
    /// so the base statement covers both load shapes.
    fn record_criteria(&self, state: &mut CacheState) {
        for key_column in &self.schema.key_columns {
            state.criteria.insert(key_column.to_ascii_lowercase());
        }
        for column in self.base.pinned_values().keys() {
            state.criteria.insert(column.to_ascii_lowercase());
        }
        if self.base.where_clause().is_some() && !self.base.pinned_complete() {
            state.opaque_criteria = true;
        }
    }

    /// Whether a statement's pinned values satisfy the cache's membership
    /// filter. `None` when the filter cannot be evaluated from pins alone.
    fn matches_filter(&self, stmt: &ParsedStatement) -> Option<bool> {
        if self.base.where_clause().is_none() {
            return Some(true);
        }
        if !self.base.pinned_complete() {
            return None;
        }
        for (column, base_literal) in self.base.pinned_values() {
            let Some(column_def) = self.schema.column(column) else {
                return None;
            };
            let Some(stmt_literal) = stmt.pinned_value(column) else {
                return None;
            };
            let base_value = self.formatter.decode(base_literal, column_def.sql_type).ok()?;
            let stmt_value = self.formatter.decode(stmt_literal, column_def.sql_type).ok()?;
            if base_value != stmt_value {
                return Some(false);
            }
        }
        Some(true)
    }

    /// Build a one-row result set from an INSERT's pinned column values.
    fn synthesize_row(&self, stmt: &ParsedStatement) -> Result<Rows> {
        let names: Vec<String> = self.schema.columns.iter().map(|c| c.name.clone()).collect();
        let mut values = Vec::with_capacity(names.len());
        for column in &self.schema.columns {
            let literal = stmt
                .pinned_value(&column.name)
                .ok_or_else(|| CacheError::Internal("unpinned column in synthesis".to_string()))?;
            values.push(self.formatter.decode(literal, column.sql_type)?);
        }
        Ok(Rows::new(names).with_row(values))
    }

    /// Key of the row a fully key-pinned statement targets. Literal text is
    /// canonicalized through decode/encode so it compares equal to keys
    /// derived from result rows.
    fn pinned_key(&self, stmt: &ParsedStatement) -> Result<CacheKey> {
        let mut parts = Vec::with_capacity(self.schema.key_columns.len());
        for key_column in &self.schema.key_columns {
            let column = self.schema.column(key_column).ok_or_else(|| {
                CacheError::Internal(format!("key column '{key_column}' missing from schema"))
            })?;
            let literal = stmt
                .pinned_value(key_column)
                .ok_or_else(|| CacheError::Internal("unpinned key column".to_string()))?;
            let value = self.formatter.decode(literal, column.sql_type)?;
            parts.push(self.formatter.literal(&value)?);
        }
        Ok(CacheKey::compound(parts))
    }

    /// Key of a result row, `None` when a key column is absent.
    fn row_key(&self, row: &Row) -> Result<Option<CacheKey>> {
        let mut parts = Vec::with_capacity(self.schema.key_columns.len());
        for key_column in &self.schema.key_columns {
            match row.get(key_column) {
                Some(value) => parts.push(self.formatter.literal(value)?),
                None => return Ok(None),
            }
        }
        Ok(Some(CacheKey::compound(parts)))
    }

    fn key_predicate(&self, key: &CacheKey) -> String {
        debug_assert_eq!(key.parts().len(), self.schema.key_columns.len());
        self.schema
            .key_columns
            .iter()
            .zip(key.parts())
            .map(|(column, part)| format!("{column} = {part}"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn point_statement(&self, key: &CacheKey) -> Result<ParsedStatement> {
        if key.parts().len() != self.schema.key_columns.len() {
            return Err(CacheError::Internal(format!(
                "key '{key}' has {} parts, table '{}' keys on {}",
                key.parts().len(),
                self.config.table,
                self.schema.key_columns.len()
            )));
        }
        let predicate = self.key_predicate(key);
        Ok(StatementComposer::new().compose(
            &self.base,
            ComposeRequest {
                extra_predicates: &[predicate],
                ..Default::default()
            },
        ))
    }

    async fn execute_sql(&self, sql: &str, pool: &ConnectionPool) -> Result<Rows> {
        self.stats.round_trip();
        trace!(cache = %self.config.name, %sql, "cache round trip");
        let mut conn = pool.acquire().await?;
        let result = conn.execute(sql).await;
        pool.release(conn).await;
        Ok(result?)
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("name", &self.config.name)
            .field("table", &self.schema.identity)
            .field("entries", &self.state.lock().entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlrepr::column::{SqlType, TableColumn};
    use sqlrepr::resolve::StaticResolver;

    fn resolver() -> StaticResolver {
        let customer = TableIdentity::intern(None, None, "customer");
        StaticResolver::new().with_table(TableSchema {
            identity: customer.clone(),
            columns: vec![
                TableColumn::new(customer.clone(), "id", SqlType::Int64),
                TableColumn::new(customer.clone(), "region", SqlType::Utf8),
                TableColumn::new(customer.clone(), "comment", SqlType::Utf8),
            ],
            key_columns: vec!["id".to_string()],
        })
    }

    fn cache(config: CacheConfig) -> ObjectCache {
        ObjectCache::new(config, &resolver(), ListenerSet::new()).unwrap()
    }

    #[test]
    fn point_statement_appends_key_predicate() {
        let cache = cache(CacheConfig::new("customers", "customer").high_cardinality());
        let stmt = cache.point_statement(&CacheKey::single("5")).unwrap();
        assert_eq!(
            stmt.sql_text(),
            "SELECT id, region, comment FROM customer WHERE id = 5"
        );
    }

    #[test]
    fn filter_joins_the_key_predicate() {
        let cache = cache(
            CacheConfig::new("customers", "customer")
                .high_cardinality()
                .with_filter("region = 'east'"),
        );
        let stmt = cache.point_statement(&CacheKey::single("5")).unwrap();
        assert_eq!(
            stmt.sql_text(),
            "SELECT id, region, comment FROM customer WHERE (region = 'east') AND (id = 5)"
        );
    }

    #[test]
    fn pinned_key_canonicalizes_literals() {
        let resolver = resolver();
        let cache = cache(CacheConfig::new("customers", "customer"));
        let stmt = Parser::parse("DELETE FROM customer WHERE id = 07", &resolver).unwrap();
        assert_eq!(cache.pinned_key(&stmt).unwrap(), CacheKey::single("7"));
    }

    #[test]
    fn filter_membership_from_pinned_values() {
        let resolver = resolver();
        let cache =
            cache(CacheConfig::new("customers", "customer").with_filter("region = 'east'"));

        let outside = Parser::parse(
            "UPDATE customer SET region = 'west' WHERE id = 1",
            &resolver,
        )
        .unwrap();
        assert_eq!(cache.matches_filter(&outside), Some(false));

        let inside = Parser::parse(
            "UPDATE customer SET region = 'east' WHERE id = 1",
            &resolver,
        )
        .unwrap();
        assert_eq!(cache.matches_filter(&inside), Some(true));

        // The update says nothing about region; membership is undecidable.
        let unknown = Parser::parse(
            "UPDATE customer SET comment = 'x' WHERE id = 1",
            &resolver,
        )
        .unwrap();
        assert_eq!(cache.matches_filter(&unknown), None);
    }

    #[test]
    fn unknown_table_is_rejected() {
        let err = ObjectCache::new(
            CacheConfig::new("nope", "missing"),
            &resolver(),
            ListenerSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, CacheError::Parse(ParseError::UnknownTable(_))));
    }
}
