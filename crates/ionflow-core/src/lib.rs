//! # ionflow Core Library
//!
//! A library for computing symmetrically unique atomic migration pathways in
//! crystalline materials, estimating the energy barrier of each via a two-stage
//! nudged-elastic-band (NEB) optimization, and deriving a kinetic prefactor from
//! vibrational analysis.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   (`CrystalStructure`, `Lattice`), structure file I/O (POSCAR), and the
//!   simulation seam: trait contracts for the numerical collaborators (relaxer,
//!   path optimizer, vibrational analyzer, symmetry analyzer) together with
//!   compact built-in reference implementations.
//!
//! - **[`engine`]: The Logic Core.** The orchestration and checkpointing layer:
//!   the durable per-task status record, symmetry-based hop deduplication, the
//!   ordered multi-strategy retry runner, endpoint construction, supercell
//!   sizing, and the prefactor arithmetic.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing layer. It
//!   ties `engine` and `core` together into the resumable migration-path
//!   pipeline: one entry point for the whole calculation, and the per-hop
//!   workflow state machine it drives.

pub mod core;
pub mod engine;
pub mod workflows;
