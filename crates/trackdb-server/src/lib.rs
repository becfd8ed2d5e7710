//! HTTP surface, reconciliation scheduler and report aggregation for trackdb.
//!
//! The binary in `main.rs` wires these together; the CLI reuses the
//! [`scheduler::Reconciler`], [`report`] and [`tracking`] modules directly.

pub mod api;
pub mod middleware;
pub mod report;
pub mod scheduler;
pub mod tracking;

#[cfg(test)]
pub(crate) mod testing;
