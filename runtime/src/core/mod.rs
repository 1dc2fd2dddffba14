//! Deterministic, pure logic shared by the runtime.
//!
//! Core modules are free of side effects and shared state. They operate on
//! commands and strings and return values suitable for direct unit tests.

pub mod path_expr;
pub mod strategy;
