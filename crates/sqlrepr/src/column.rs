//! Column metadata.

use crate::ident::TableIdentity;

/// Native SQL type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Date,
    Timestamp,
}

impl SqlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Boolean => "boolean",
            SqlType::Int16 => "int16",
            SqlType::Int32 => "int32",
            SqlType::Int64 => "int64",
            SqlType::Float32 => "float32",
            SqlType::Float64 => "float64",
            SqlType::Utf8 => "utf8",
            SqlType::Date => "date",
            SqlType::Timestamp => "timestamp",
        }
    }
}

/// A column belonging to a resolved table.
///
/// Immutable after metadata resolution; instances are created once per table
/// and shared for the life of the process.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub table: TableIdentity,
    pub sql_type: SqlType,
    /// Declared size for character/binary types.
    pub size: Option<u32>,
    /// Declared precision for numeric types.
    pub precision: Option<u16>,
    /// Whether this column references the key of another table.
    pub foreign_key: bool,
}

impl TableColumn {
    pub fn new(table: TableIdentity, name: impl Into<String>, sql_type: SqlType) -> TableColumn {
        TableColumn {
            name: name.into(),
            table,
            sql_type,
            size: None,
            precision: None,
            foreign_key: false,
        }
    }

    pub fn with_foreign_key(mut self) -> TableColumn {
        self.foreign_key = true;
        self
    }

    /// Column reference qualified by the owning table's SQL name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table.sql_name(), self.name)
    }
}
