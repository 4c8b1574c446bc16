//! Shared representation types for the data-access layer: interned table
//! identities, column metadata, typed SQL values and literal formatting.

pub mod column;
pub mod errors;
pub mod fmt;
pub mod ident;
pub mod resolve;
pub mod value;
