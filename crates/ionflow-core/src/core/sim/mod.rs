//! The simulation seam: contracts for the numerical collaborators the
//! pipeline delegates to, plus built-in reference implementations.
//!
//! The orchestration layer treats everything behind these traits as opaque.
//! Any force-field backend can be plugged in by implementing [`Evaluator`];
//! the built-in Morse potential, FIRE/L-BFGS steppers, spring-tangent NEB,
//! finite-difference vibrational analysis and coordination-fingerprint
//! symmetry classifier exist so the binary is self-contained, not because
//! their numerics are part of the pipeline's contract.

pub mod fingerprint;
pub mod fire;
pub mod morse;
pub mod neb;
pub mod vibrations;

use crate::core::models::structure::CrystalStructure;
use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Energy/force evaluation failed: {0}")]
    Evaluation(String),

    #[error("Numerical failure in {context}: {message}")]
    Numerical {
        context: &'static str,
        message: String,
    },

    #[error("No mass known for species '{0}'")]
    UnknownSpecies(String),

    #[error("A path optimization needs at least two endpoint images, got {0}")]
    BandTooShort(usize),
}

/// Total energy (eV) and per-site cartesian forces (eV/A) for one configuration.
#[derive(Debug, Clone)]
pub struct EnergyForces {
    pub energy: f64,
    pub forces: Vec<Vector3<f64>>,
}

/// A force/energy backend attachable to any configuration.
pub trait Evaluator {
    fn evaluate(&self, structure: &CrystalStructure) -> Result<EnergyForces, SimError>;
}

/// Whether a relaxation may change the cell vectors or only site positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelaxMode {
    Bulk,
    FixedCell,
}

/// Outcome of a geometry relaxation. A non-converged outcome still carries
/// the best structure reached.
#[derive(Debug, Clone)]
pub struct Relaxation {
    pub converged: bool,
    pub structure: CrystalStructure,
}

pub trait Relaxer {
    fn relax(
        &self,
        structure: &CrystalStructure,
        mode: RelaxMode,
        max_steps: usize,
        fmax: f64,
    ) -> Result<Relaxation, SimError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Fire,
    Lbfgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TangentMethod {
    Improved,
    Plain,
}

/// One entry of an ordered fallback list: which stepper to drive the band
/// with, how to estimate the path tangent, and the convergence tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptSettings {
    pub optimizer: OptimizerKind,
    pub tangent: TangentMethod,
    pub fmax: f64,
}

/// Result of driving one band to convergence or step exhaustion.
#[derive(Debug, Clone)]
pub struct PathRun {
    pub converged: bool,
    pub steps_taken: usize,
    pub images: Vec<CrystalStructure>,
    pub energies: Vec<f64>,
}

/// Iterates an ordered band of configurations (fixed endpoints plus interior
/// images) toward the minimum energy path. `climb` biases the highest-energy
/// interior image uphill to localize the transition state.
pub trait PathOptimizer {
    fn optimize(
        &self,
        band: &[CrystalStructure],
        settings: &AttemptSettings,
        budget: usize,
        climb: bool,
    ) -> Result<PathRun, SimError>;
}

/// Vibrational analysis of a relaxed configuration.
///
/// Frequencies are returned in cm^-1, ordered by ascending eigenvalue, so
/// imaginary and near-zero modes come first. Only the real part of each mode
/// is reported; a purely imaginary mode contributes 0.0.
pub trait VibrationalAnalyzer {
    fn frequencies(&self, structure: &CrystalStructure) -> Result<Vec<f64>, SimError>;
}

/// Maps every site index to the index of a canonical representative of its
/// symmetry equivalence class.
pub trait SymmetryAnalyzer {
    fn equivalent_sites(&self, structure: &CrystalStructure) -> Result<Vec<usize>, SimError>;
}

/// The collaborator bundle threaded through the workflows.
#[derive(Clone, Copy)]
pub struct Simulators<'a> {
    pub relaxer: &'a dyn Relaxer,
    pub optimizer: &'a dyn PathOptimizer,
    pub vibrations: &'a dyn VibrationalAnalyzer,
    pub symmetry: &'a dyn SymmetryAnalyzer,
}
