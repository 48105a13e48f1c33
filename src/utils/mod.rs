//! Shared utilities: retry combinator and decimal helpers.

pub mod decimal;
pub mod retry;
