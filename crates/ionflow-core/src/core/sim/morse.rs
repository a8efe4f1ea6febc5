//! Built-in Morse pair-potential evaluator.

use super::{EnergyForces, Evaluator, SimError};
use crate::core::models::structure::CrystalStructure;
use nalgebra::Vector3;

/// A species-agnostic Morse potential with a radial cutoff,
/// `V(r) = D (1 - exp(-a (r - r0)))^2 - D`, shifted so the well depth is `-D`.
#[derive(Debug, Clone, PartialEq)]
pub struct MorsePotential {
    pub well_depth: f64,
    pub stiffness: f64,
    pub equilibrium: f64,
    pub cutoff: f64,
}

impl Default for MorsePotential {
    fn default() -> Self {
        Self {
            well_depth: 0.5,
            stiffness: 1.5,
            equilibrium: 2.5,
            cutoff: 6.0,
        }
    }
}

impl MorsePotential {
    fn pair_energy(&self, r: f64) -> f64 {
        let x = 1.0 - (-self.stiffness * (r - self.equilibrium)).exp();
        self.well_depth * x * x - self.well_depth
    }

    fn pair_energy_derivative(&self, r: f64) -> f64 {
        let e = (-self.stiffness * (r - self.equilibrium)).exp();
        2.0 * self.well_depth * self.stiffness * e * (1.0 - e)
    }
}

impl Evaluator for MorsePotential {
    fn evaluate(&self, structure: &CrystalStructure) -> Result<EnergyForces, SimError> {
        let n = structure.num_sites();
        let mut energy = 0.0;
        let mut forces = vec![Vector3::zeros(); n];

        for i in 0..n {
            for neighbor in structure.neighbors_within(i, self.cutoff) {
                let r = neighbor.distance;
                // Each ordered pair is visited from both ends, so energy is
                // half-counted here; the force contribution is complete.
                energy += 0.5 * self.pair_energy(r);
                let unit = neighbor.offset / r;
                forces[i] += self.pair_energy_derivative(r) * unit;
            }
        }

        Ok(EnergyForces { energy, forces })
    }
}
