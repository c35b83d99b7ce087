//! I/O helpers for pipeline commands.

pub mod bundle;
pub mod config;
pub mod run_result;
pub mod store;
