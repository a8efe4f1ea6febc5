//! Built-in finite-difference vibrational analyzer.

use super::{Evaluator, SimError, VibrationalAnalyzer};
use crate::core::models::structure::CrystalStructure;
use nalgebra::DMatrix;
use phf::phf_map;
use tracing::debug;

// sqrt(eV / (amu * A^2)) expressed as a wavenumber, as used by ASE.
const EV_AMU_A2_TO_CM: f64 = 521.470_91;

static ATOMIC_MASSES: phf::Map<&'static str, f64> = phf_map! {
    "H" => 1.008, "He" => 4.0026, "Li" => 6.94, "Be" => 9.0122,
    "B" => 10.81, "C" => 12.011, "N" => 14.007, "O" => 15.999,
    "F" => 18.998, "Ne" => 20.180, "Na" => 22.990, "Mg" => 24.305,
    "Al" => 26.982, "Si" => 28.085, "P" => 30.974, "S" => 32.06,
    "Cl" => 35.45, "Ar" => 39.948, "K" => 39.098, "Ca" => 40.078,
    "Sc" => 44.956, "Ti" => 47.867, "V" => 50.942, "Cr" => 51.996,
    "Mn" => 54.938, "Fe" => 55.845, "Co" => 58.933, "Ni" => 58.693,
    "Cu" => 63.546, "Zn" => 65.38, "Ga" => 69.723, "Ge" => 72.630,
    "As" => 74.922, "Se" => 78.971, "Br" => 79.904, "Rb" => 85.468,
    "Sr" => 87.62, "Y" => 88.906, "Zr" => 91.224, "Nb" => 92.906,
    "Mo" => 95.95, "Ag" => 107.87, "Cd" => 112.41, "In" => 114.82,
    "Sn" => 118.71, "Sb" => 121.76, "Te" => 127.60, "I" => 126.90,
    "Cs" => 132.91, "Ba" => 137.33, "La" => 138.91, "W" => 183.84,
    "Pt" => 195.08, "Au" => 196.97, "Pb" => 207.2, "Bi" => 208.98,
};

pub fn atomic_mass(species: &str) -> Result<f64, SimError> {
    ATOMIC_MASSES
        .get(species)
        .copied()
        .ok_or_else(|| SimError::UnknownSpecies(species.to_string()))
}

/// Central-difference Hessian followed by a mass-weighted eigendecomposition.
///
/// Frequencies come back ordered by ascending eigenvalue; unstable modes
/// (negative eigenvalues, i.e. imaginary frequencies) contribute their real
/// part, which is zero.
#[derive(Debug, Clone)]
pub struct FiniteDiffVibrations<E: Evaluator> {
    evaluator: E,
    displacement: f64,
}

impl<E: Evaluator> FiniteDiffVibrations<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            displacement: 0.01,
        }
    }

    pub fn with_displacement(mut self, displacement: f64) -> Self {
        self.displacement = displacement;
        self
    }
}

impl<E: Evaluator> VibrationalAnalyzer for FiniteDiffVibrations<E> {
    fn frequencies(&self, structure: &CrystalStructure) -> Result<Vec<f64>, SimError> {
        let n = structure.num_sites();
        let dof = 3 * n;
        let masses: Vec<f64> = structure
            .sites()
            .iter()
            .map(|site| atomic_mass(&site.species))
            .collect::<Result<_, _>>()?;

        debug!(sites = n, displacement = self.displacement, "building Hessian");
        let mut hessian = DMatrix::zeros(dof, dof);
        for i in 0..n {
            let cart = structure.cartesian(i);
            for axis in 0..3 {
                let mut shift = cart;
                shift[axis] += self.displacement;
                let forward = self.displaced(structure, i, &shift)?;
                shift[axis] = cart[axis] - self.displacement;
                let backward = self.displaced(structure, i, &shift)?;

                for j in 0..n {
                    for b in 0..3 {
                        let derivative = (forward.forces[j][b] - backward.forces[j][b])
                            / (2.0 * self.displacement);
                        hessian[(3 * i + axis, 3 * j + b)] = -derivative;
                    }
                }
            }
        }

        // Symmetrize and mass-weight.
        let symmetric = (&hessian + hessian.transpose()) * 0.5;
        let weighted = DMatrix::from_fn(dof, dof, |p, q| {
            symmetric[(p, q)] / (masses[p / 3] * masses[q / 3]).sqrt()
        });

        let mut eigenvalues: Vec<f64> = weighted
            .symmetric_eigen()
            .eigenvalues
            .iter()
            .copied()
            .collect();
        eigenvalues.sort_by(f64::total_cmp);

        Ok(eigenvalues
            .into_iter()
            .map(|lambda| {
                if lambda > 0.0 {
                    EV_AMU_A2_TO_CM * lambda.sqrt()
                } else {
                    0.0
                }
            })
            .collect())
    }
}

impl<E: Evaluator> FiniteDiffVibrations<E> {
    fn displaced(
        &self,
        structure: &CrystalStructure,
        site: usize,
        cart: &nalgebra::Vector3<f64>,
    ) -> Result<super::EnergyForces, SimError> {
        let mut displaced = structure.clone();
        let frac = displaced.lattice().to_fractional(cart);
        displaced.set_frac(site, frac);
        self.evaluator.evaluate(&displaced)
    }
}
