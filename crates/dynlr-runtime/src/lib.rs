//! Runtime implementation for `dynlr` parse tables.
//!
//! The runtime holds the shared definitions of the table format, the
//! operator model used to declare operators at parse time, and the
//! backtracking parser that drives a table over a token stream.

pub mod definition;
pub mod operator;
pub mod parser;
