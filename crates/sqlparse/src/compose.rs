//! Statement composition.
//!
//! Merges two decomposed statements, or a statement and ad hoc predicates,
//! into a single SELECT: clause concatenation, table-list union and alias
//! rewriting for tables referenced by both sides.

use std::collections::HashMap;

use regex::Regex;
use sqlrepr::ident::TableIdentity;

use crate::statement::{ParsedStatement, StatementKind};

/// Inputs for one composition.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposeRequest<'a> {
    /// Second statement to merge into the base.
    pub other: Option<&'a ParsedStatement>,
    /// Ad hoc predicate strings ANDed onto the WHERE clause. Empty strings
    /// are dropped without inserting an operator.
    pub extra_predicates: &'a [String],
    /// Tables appended to the table list (deduplicated).
    pub extra_tables: &'a [TableIdentity],
    /// Rewrite tables referenced by both statements to a fresh alias in the
    /// base so the composition reads as a self-join.
    pub alias_collisions: bool,
}

/// Statement join engine.
///
/// Alias mappings accumulate across compositions and are replayed onto any
/// newly supplied predicates, so a predicate written against the original
/// table names stays correct after a collision rewrite.
#[derive(Debug, Default)]
pub struct StatementComposer {
    seq: u64,
    /// Original SQL name (lowercased) -> fresh alias.
    aliases: HashMap<String, String>,
    /// Precompiled table-finding patterns, keyed by lowercased name.
    patterns: HashMap<String, Regex>,
}

impl StatementComposer {
    pub fn new() -> StatementComposer {
        StatementComposer::default()
    }

    /// Compose `base` with the request's statement, predicates and tables,
    /// producing a new statement. The base is never mutated.
    pub fn compose(&mut self, base: &ParsedStatement, req: ComposeRequest) -> ParsedStatement {
        let mut tables = base.tables().to_vec();
        let mut columns = base.columns().to_vec();
        let mut pinned = base.pinned_values().clone();
        let mut where_clause = base.where_clause().map(str::to_string);
        let mut group_by = base.group_by().map(str::to_string);
        let mut having = base.having().map(str::to_string);
        let mut order_by = base.order_by().map(str::to_string);
        let mut distinct = base.is_distinct();
        let mut pinned_complete = base.pinned_complete();

        if req.alias_collisions {
            if let Some(other) = req.other {
                for table in tables.iter_mut() {
                    if !other.references_table(table) {
                        continue;
                    }
                    let original = table.clone();
                    let alias = self.fresh_alias(original.table());
                    let renamed = original.with_alias(&alias);

                    let old_name = original.sql_name().to_string();
                    for clause in [
                        &mut where_clause,
                        &mut group_by,
                        &mut having,
                        &mut order_by,
                    ] {
                        if let Some(text) = clause.as_deref() {
                            *clause = Some(self.rewrite(text, &old_name, &alias));
                        }
                    }
                    for col in columns.iter_mut() {
                        if col.table.same_table(&original) && col.table.alias() == original.alias()
                        {
                            col.table = renamed.clone();
                        }
                    }

                    self.aliases
                        .insert(old_name.to_ascii_lowercase(), alias.clone());
                    *table = renamed;
                }
            }
        }

        if let Some(other) = req.other {
            for table in other.tables() {
                push_table(&mut tables, table);
            }
            for col in other.columns() {
                let dup = columns.iter().any(|c| {
                    c.name.eq_ignore_ascii_case(&col.name)
                        && c.table.same_table(&col.table)
                        && c.table.alias() == col.table.alias()
                });
                if !dup {
                    columns.push(col.clone());
                }
            }
            // Propagate known column values; the base's pins win on conflict.
            for (col, lit) in other.pinned_values() {
                pinned.entry(col.clone()).or_insert_with(|| lit.clone());
            }

            where_clause = and_merge(where_clause, other.where_clause());
            having = and_merge(having, other.having());
            group_by = comma_merge(group_by, other.group_by());
            order_by = comma_merge(order_by, other.order_by());
            distinct = distinct || other.is_distinct();
            pinned_complete = pinned_complete && other.pinned_complete();
        }

        for table in req.extra_tables {
            push_table(&mut tables, table);
        }

        for predicate in req.extra_predicates {
            let predicate = predicate.trim();
            if predicate.is_empty() {
                continue;
            }
            let predicate = self.apply_aliases(predicate);
            where_clause = and_merge(where_clause, Some(&predicate));
            pinned_complete = false;
        }

        let correlated_where = where_clause.clone();
        ParsedStatement {
            kind: StatementKind::Select,
            distinct,
            tables,
            columns,
            pinned,
            pinned_complete,
            modified: Vec::new(),
            where_clause: where_clause.map(Into::into),
            correlated_where: correlated_where.map(Into::into),
            group_by: group_by.map(Into::into),
            having: having.map(Into::into),
            order_by: order_by.map(Into::into),
        }
    }

    /// Replay all accumulated alias mappings onto a predicate.
    pub fn apply_aliases(&mut self, predicate: &str) -> String {
        let mappings: Vec<(String, String)> = self
            .aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut out = predicate.to_string();
        for (name, alias) in mappings {
            out = self.rewrite(&out, &name, &alias);
        }
        out
    }

    fn fresh_alias(&mut self, table: &str) -> String {
        self.seq += 1;
        format!("{table}{}", self.seq)
    }

    fn rewrite(&mut self, text: &str, name: &str, alias: &str) -> String {
        self.table_pattern(name).replace_all(text, alias).into_owned()
    }

    fn table_pattern(&mut self, name: &str) -> &Regex {
        let key = name.to_ascii_lowercase();
        self.patterns.entry(key).or_insert_with(|| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
                .expect("escaped table name is a valid pattern")
        })
    }
}

fn push_table(tables: &mut Vec<TableIdentity>, table: &TableIdentity) {
    let dup = tables
        .iter()
        .any(|t| t.same_table(table) && t.alias() == table.alias());
    if !dup {
        tables.push(table.clone());
    }
}

/// AND-concatenate two clause sides, parenthesizing only when both are
/// non-empty.
fn and_merge(a: Option<String>, b: Option<&str>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("({a}) AND ({b})")),
        (Some(a), _) if !a.is_empty() => Some(a),
        (_, Some(b)) if !b.is_empty() => Some(b.to_string()),
        _ => None,
    }
}

/// Comma-concatenate two clause sides, dropping an empty side.
fn comma_merge(a: Option<String>, b: Option<&str>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => Some(format!("{a}, {b}")),
        (Some(a), _) if !a.is_empty() => Some(a),
        (_, Some(b)) if !b.is_empty() => Some(b.to_string()),
        _ => None,
    }
}
