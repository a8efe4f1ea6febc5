//! High-level, user-facing workflows.
//!
//! [`pipeline`] is the single entry point for a full migration-barrier
//! calculation; [`path`] is the per-hop workflow state machine it drives.
//! Both are safely restartable: every stage consults persisted state before
//! doing work, so completed work is never redone.

pub mod path;
pub mod pipeline;
