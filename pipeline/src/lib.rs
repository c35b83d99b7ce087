//! Resilient extraction of structured payloads from free-form generator output,
//! plus the build-state model that consumes them.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic extraction (span scanning, fence handling,
//!   payload parsing, role classification, field enrichment, metadata assembly).
//!   No I/O, never fails; malformed input yields a failure value instead.
//! - **[`io`]**: Side-effecting operations (config, bundle and run loading,
//!   atomic JSON persistence).
//!
//! [`state`], [`error`], and [`stage`] define the build state, the error
//! taxonomy, and the stage runner. Orchestration modules ([`extract`], [`build`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod build;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod extract;
pub mod io;
pub mod logging;
pub mod stage;
pub mod state;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
