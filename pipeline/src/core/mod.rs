//! Deterministic, pure extraction logic.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! text and JSON values and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod enrich;
pub mod fence;
pub mod metadata;
pub mod payload;
pub mod scanner;
pub mod types;
