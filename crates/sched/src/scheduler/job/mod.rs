//! The per-job placement and recovery state machine.
//!
//! Split into focused submodules:
//! - `core`: SimpleJob struct, builder, pending bookkeeping, abort and accessors
//! - `placement`: offer handling, locality tiers and speculative relaunch
//! - `lifecycle`: status updates, finishes and losses

mod core;
mod lifecycle;
mod placement;

pub use self::core::{Job, SimpleJob, SimpleJobBuilder};
