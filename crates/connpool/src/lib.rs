//! Bounded connection pool with idle tracking and reconnect-on-use.
//!
//! The database client itself lives behind the [`conn::DatabaseConnection`]
//! trait; the pool owns the physical connections and hands out leases that
//! transparently reconnect once when the underlying connection has gone
//! stale.

pub mod conn;
pub mod debug;
pub mod errors;
pub mod pool;
pub mod retry;
