//! Notification-consistent object cache.
//!
//! Caches keep row-derived objects in memory and stay consistent with the
//! database by replaying committed DML statements instead of re-querying:
//! a router parses each notification, finds every cache watching an
//! affected table, and either synthesizes the new row state from the
//! statement's pinned values or re-fetches with a correlated SELECT.

pub mod cache;
pub mod errors;
pub mod events;
pub mod key;
pub mod notification;
pub mod object;
pub mod router;
pub mod stats;
pub mod worker;
