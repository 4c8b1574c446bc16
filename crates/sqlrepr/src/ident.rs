//! Interned table identities.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Process-lifetime interning map for table identities.
///
/// Keyed by the normalized (catalog, schema, table) triple. Entries are
/// created lazily and never removed; cardinality is bounded by schema size.
static IDENTITIES: Lazy<scc::HashMap<IdentityKey, Arc<IdentityCore>>> =
    Lazy::new(scc::HashMap::new);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentityKey {
    catalog: String,
    schema: String,
    table: String,
}

#[derive(Debug)]
struct IdentityCore {
    catalog: Option<String>,
    schema: Option<String>,
    table: String,
}

/// Canonical identifier for a (catalog, schema, table) triple, optionally
/// carrying an alias for use within one statement.
///
/// The triple itself is interned; two identities referring to the same table
/// share the same core allocation regardless of alias. Equality is "fuzzy":
/// an absent catalog or schema matches anything, so a statement written
/// without fully-qualified names still matches metadata keyed by qualified
/// names. Aliases never participate in equality.
#[derive(Debug, Clone)]
pub struct TableIdentity {
    core: Arc<IdentityCore>,
    alias: Option<Arc<str>>,
}

impl TableIdentity {
    /// Get the interned identity for a table, creating it on first use.
    pub fn intern(catalog: Option<&str>, schema: Option<&str>, table: &str) -> TableIdentity {
        let key = IdentityKey {
            catalog: catalog.unwrap_or("").to_ascii_lowercase(),
            schema: schema.unwrap_or("").to_ascii_lowercase(),
            table: table.to_ascii_lowercase(),
        };

        if let Some(core) = IDENTITIES.read(&key, |_, v| v.clone()) {
            return TableIdentity { core, alias: None };
        }

        let core = Arc::new(IdentityCore {
            catalog: catalog.map(|s| s.to_string()),
            schema: schema.map(|s| s.to_string()),
            table: table.to_string(),
        });
        let core = IDENTITIES.entry(key).or_insert(core).get().clone();

        TableIdentity { core, alias: None }
    }

    /// Intern from a possibly dot-qualified name (`schema.table` or
    /// `catalog.schema.table`).
    pub fn from_qualified(name: &str) -> TableIdentity {
        let parts: Vec<&str> = name.split('.').collect();
        match parts.as_slice() {
            [table] => Self::intern(None, None, table),
            [schema, table] => Self::intern(None, Some(schema), table),
            [catalog, schema, table] => Self::intern(Some(catalog), Some(schema), table),
            // More than three parts; keep the last three.
            parts => {
                let n = parts.len();
                Self::intern(Some(parts[n - 3]), Some(parts[n - 2]), parts[n - 1])
            }
        }
    }

    /// Return a copy of this identity carrying the given alias.
    pub fn with_alias(&self, alias: &str) -> TableIdentity {
        TableIdentity {
            core: self.core.clone(),
            alias: Some(Arc::from(alias)),
        }
    }

    /// Return a copy with no alias.
    pub fn without_alias(&self) -> TableIdentity {
        TableIdentity {
            core: self.core.clone(),
            alias: None,
        }
    }

    pub fn catalog(&self) -> Option<&str> {
        self.core.catalog.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.core.schema.as_deref()
    }

    pub fn table(&self) -> &str {
        &self.core.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// True when both identities refer to the same interned triple.
    pub fn same_table(&self, other: &TableIdentity) -> bool {
        Arc::ptr_eq(&self.core, &other.core) || self.fuzzy_eq(other)
    }

    fn fuzzy_eq(&self, other: &TableIdentity) -> bool {
        fn part_matches(a: Option<&str>, b: Option<&str>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => a.eq_ignore_ascii_case(b),
                // Absent or empty on either side matches anything.
                _ => true,
            }
        }

        self.core.table.eq_ignore_ascii_case(&other.core.table)
            && part_matches(self.catalog(), other.catalog())
            && part_matches(self.schema(), other.schema())
    }

    /// The dot-qualified table name, without alias.
    pub fn qualified_name(&self) -> String {
        let mut out = String::new();
        if let Some(catalog) = self.catalog() {
            out.push_str(catalog);
            out.push('.');
        }
        if let Some(schema) = self.schema() {
            out.push_str(schema);
            out.push('.');
        }
        out.push_str(self.table());
        out
    }

    /// The name used to qualify columns referencing this table in a
    /// statement: the alias when one is set, the table name otherwise.
    pub fn sql_name(&self) -> &str {
        self.alias().unwrap_or_else(|| self.table())
    }

    /// The FROM-clause rendering: qualified name plus alias when set.
    pub fn sql_reference(&self) -> String {
        match self.alias() {
            Some(alias) => format!("{} {}", self.qualified_name(), alias),
            None => self.qualified_name(),
        }
    }
}

impl PartialEq for TableIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.same_table(other)
    }
}

impl Eq for TableIdentity {}

impl Hash for TableIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Only the table name can participate; fuzzy equality lets a
        // qualified and an unqualified identity compare equal.
        self.core.table.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_identity_is_shared() {
        let a = TableIdentity::intern(None, Some("app"), "customer");
        let b = TableIdentity::intern(None, Some("APP"), "CUSTOMER");
        assert!(Arc::ptr_eq(&a.core, &b.core));
    }

    #[test]
    fn fuzzy_equality() {
        let qualified = TableIdentity::intern(Some("main"), Some("app"), "customer");
        let bare = TableIdentity::intern(None, None, "customer");
        let other = TableIdentity::intern(None, None, "orders");

        assert_eq!(qualified, bare);
        assert_ne!(bare, other);

        let mismatched_schema = TableIdentity::intern(None, Some("audit"), "customer");
        assert_ne!(qualified, mismatched_schema);
    }

    #[test]
    fn alias_does_not_affect_equality() {
        let t = TableIdentity::intern(None, None, "customer");
        let aliased = t.with_alias("c");
        assert_eq!(t, aliased);
        assert_eq!(aliased.sql_name(), "c");
        assert_eq!(aliased.sql_reference(), "customer c");
    }

    #[test]
    fn qualified_parse() {
        let t = TableIdentity::from_qualified("app.customer");
        assert_eq!(t.schema(), Some("app"));
        assert_eq!(t.table(), "customer");
    }
}
