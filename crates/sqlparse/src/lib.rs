//! Hand-written DML statement parser, decomposer and composer.
//!
//! A statement is decomposed into a [`statement::ParsedStatement`]: operation
//! kind, involved tables, referenced columns, clause text and the literal
//! values the statement pins for individual columns. Decomposed statements
//! can be recombined with [`compose::StatementComposer`] to build a single
//! optimized query.

pub mod compose;
pub mod errors;
pub mod keywords;
pub mod parser;
pub mod statement;
pub mod tokens;
