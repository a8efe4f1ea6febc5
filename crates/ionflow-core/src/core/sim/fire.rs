//! Built-in FIRE geometry relaxer.

use super::{Evaluator, RelaxMode, Relaxation, Relaxer, SimError};
use crate::core::models::structure::CrystalStructure;
use nalgebra::Vector3;
use tracing::debug;

const DT_START: f64 = 0.1;
const DT_MAX: f64 = 1.0;
const N_MIN: usize = 5;
const F_INC: f64 = 1.1;
const F_DEC: f64 = 0.5;
const ALPHA_START: f64 = 0.1;
const F_ALPHA: f64 = 0.99;
const MAX_MOVE: f64 = 0.2;

/// Fast Inertial Relaxation Engine over site positions.
///
/// `RelaxMode::Bulk` is accepted for contract compatibility but the built-in
/// implementation keeps the cell vectors fixed in both modes.
#[derive(Debug, Clone)]
pub struct FireRelaxer<E: Evaluator> {
    evaluator: E,
}

impl<E: Evaluator> FireRelaxer<E> {
    pub fn new(evaluator: E) -> Self {
        Self { evaluator }
    }
}

fn max_force_norm(forces: &[Vector3<f64>]) -> f64 {
    forces.iter().map(|f| f.norm()).fold(0.0, f64::max)
}

impl<E: Evaluator> Relaxer for FireRelaxer<E> {
    fn relax(
        &self,
        structure: &CrystalStructure,
        _mode: RelaxMode,
        max_steps: usize,
        fmax: f64,
    ) -> Result<Relaxation, SimError> {
        let n = structure.num_sites();
        let mut current = structure.clone();
        let mut positions: Vec<Vector3<f64>> = (0..n).map(|i| current.cartesian(i)).collect();
        let mut velocities = vec![Vector3::zeros(); n];
        let mut dt = DT_START;
        let mut alpha = ALPHA_START;
        let mut uphill_free_steps = 0usize;

        for step in 0..max_steps {
            let state = self.evaluator.evaluate(&current)?;
            let residual = max_force_norm(&state.forces);
            if residual <= fmax {
                debug!(step, residual, "FIRE converged");
                return Ok(Relaxation {
                    converged: true,
                    structure: current,
                });
            }

            let power: f64 = state
                .forces
                .iter()
                .zip(&velocities)
                .map(|(f, v)| f.dot(v))
                .sum();
            if power > 0.0 {
                uphill_free_steps += 1;
                if uphill_free_steps > N_MIN {
                    dt = (dt * F_INC).min(DT_MAX);
                    alpha *= F_ALPHA;
                }
                let v_norm: f64 = velocities.iter().map(|v| v.norm_squared()).sum::<f64>().sqrt();
                let f_norm: f64 = state
                    .forces
                    .iter()
                    .map(|f| f.norm_squared())
                    .sum::<f64>()
                    .sqrt();
                if f_norm > 0.0 {
                    for (v, f) in velocities.iter_mut().zip(&state.forces) {
                        *v = (1.0 - alpha) * *v + alpha * v_norm * f / f_norm;
                    }
                }
            } else {
                velocities.iter_mut().for_each(|v| *v = Vector3::zeros());
                dt *= F_DEC;
                alpha = ALPHA_START;
                uphill_free_steps = 0;
            }

            for ((position, velocity), force) in
                positions.iter_mut().zip(&mut velocities).zip(&state.forces)
            {
                *velocity += force * dt;
                let mut displacement = *velocity * dt;
                let norm = displacement.norm();
                if norm > MAX_MOVE {
                    displacement *= MAX_MOVE / norm;
                }
                *position += displacement;
            }
            for (i, position) in positions.iter().enumerate() {
                let frac = current.lattice().to_fractional(position);
                current.set_frac(i, frac);
            }
        }

        debug!(max_steps, "FIRE exhausted its step budget");
        Ok(Relaxation {
            converged: false,
            structure: current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Lattice, Site};
    use crate::core::sim::morse::MorsePotential;

    fn stretched_dimer() -> CrystalStructure {
        CrystalStructure::new(
            Lattice::cubic(30.0),
            vec![
                Site::new("Li", Vector3::new(0.0, 0.0, 0.0)),
                Site::new("Li", Vector3::new(3.2 / 30.0, 0.0, 0.0)),
            ],
        )
    }

    #[test]
    fn relaxes_dimer_to_equilibrium_separation() {
        let potential = MorsePotential::default();
        let relaxer = FireRelaxer::new(potential.clone());
        let result = relaxer
            .relax(&stretched_dimer(), RelaxMode::FixedCell, 2000, 1e-3)
            .unwrap();
        assert!(result.converged);
        assert!((result.structure.distance(0, 1) - potential.equilibrium).abs() < 0.01);
    }

    #[test]
    fn zero_step_budget_reports_non_convergence() {
        let relaxer = FireRelaxer::new(MorsePotential::default());
        let result = relaxer
            .relax(&stretched_dimer(), RelaxMode::FixedCell, 0, 1e-3)
            .unwrap();
        assert!(!result.converged);
    }
}
