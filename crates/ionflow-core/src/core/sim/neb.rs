//! Built-in nudged-elastic-band path optimizer with optional climbing image.

use super::{
    AttemptSettings, Evaluator, OptimizerKind, PathOptimizer, PathRun, SimError, TangentMethod,
};
use crate::core::models::structure::CrystalStructure;
use nalgebra::DVector;
use std::collections::VecDeque;
use tracing::debug;

const MAX_MOVE: f64 = 0.1;
const LBFGS_HISTORY: usize = 10;
const LBFGS_ALPHA: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct NebOptimizer<E: Evaluator> {
    evaluator: E,
    spring_constant: f64,
}

impl<E: Evaluator> NebOptimizer<E> {
    pub fn new(evaluator: E) -> Self {
        Self {
            evaluator,
            spring_constant: 0.1,
        }
    }

    pub fn with_spring_constant(mut self, spring_constant: f64) -> Self {
        self.spring_constant = spring_constant;
        self
    }
}

fn flatten(structure: &CrystalStructure) -> DVector<f64> {
    let n = structure.num_sites();
    DVector::from_fn(3 * n, |k, _| {
        let cart = structure.cartesian(k / 3);
        cart[k % 3]
    })
}

fn with_positions(template: &CrystalStructure, x: &DVector<f64>) -> CrystalStructure {
    let mut out = template.clone();
    for i in 0..out.num_sites() {
        let cart = nalgebra::Vector3::new(x[3 * i], x[3 * i + 1], x[3 * i + 2]);
        let frac = out.lattice().to_fractional(&cart);
        out.set_frac(i, frac);
    }
    out
}

fn max_per_site_norm(v: &DVector<f64>) -> f64 {
    v.as_slice()
        .chunks_exact(3)
        .map(|c| (c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt())
        .fold(0.0, f64::max)
}

/// Upwind tangent estimate of Henkelman & Jonsson, falling back to the
/// energy-weighted mix at extrema.
fn improved_tangent(
    forward: &DVector<f64>,
    backward: &DVector<f64>,
    e_prev: f64,
    e_here: f64,
    e_next: f64,
) -> DVector<f64> {
    let tangent = if e_next > e_here && e_here > e_prev {
        forward.clone()
    } else if e_next < e_here && e_here < e_prev {
        backward.clone()
    } else {
        let d_max = (e_next - e_here).abs().max((e_prev - e_here).abs());
        let d_min = (e_next - e_here).abs().min((e_prev - e_here).abs());
        if e_next > e_prev {
            forward * d_max + backward * d_min
        } else {
            forward * d_min + backward * d_max
        }
    };
    let norm = tangent.norm();
    if norm > 0.0 { tangent / norm } else { tangent }
}

fn plain_tangent(forward: &DVector<f64>, backward: &DVector<f64>) -> DVector<f64> {
    let tangent = forward + backward;
    let norm = tangent.norm();
    if norm > 0.0 { tangent / norm } else { tangent }
}

struct FireStepper {
    velocity: DVector<f64>,
    dt: f64,
    alpha: f64,
    uphill_free_steps: usize,
}

impl FireStepper {
    fn new(dof: usize) -> Self {
        Self {
            velocity: DVector::zeros(dof),
            dt: 0.1,
            alpha: 0.1,
            uphill_free_steps: 0,
        }
    }

    fn step(&mut self, x: &mut DVector<f64>, force: &DVector<f64>) {
        let power = force.dot(&self.velocity);
        if power > 0.0 {
            self.uphill_free_steps += 1;
            if self.uphill_free_steps > 5 {
                self.dt = (self.dt * 1.1).min(1.0);
                self.alpha *= 0.99;
            }
            let f_norm = force.norm();
            if f_norm > 0.0 {
                let v_norm = self.velocity.norm();
                self.velocity =
                    &self.velocity * (1.0 - self.alpha) + force * (self.alpha * v_norm / f_norm);
            }
        } else {
            self.velocity.fill(0.0);
            self.dt *= 0.5;
            self.alpha = 0.1;
            self.uphill_free_steps = 0;
        }
        self.velocity += force * self.dt;
        apply_clipped(x, &(&self.velocity * self.dt));
    }
}

struct LbfgsStepper {
    history: VecDeque<(DVector<f64>, DVector<f64>)>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl LbfgsStepper {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            previous: None,
        }
    }

    fn step(&mut self, x: &mut DVector<f64>, force: &DVector<f64>) {
        let gradient = -force;
        if let Some((prev_x, prev_g)) = self.previous.take() {
            let s = &*x - prev_x;
            let y = &gradient - prev_g;
            if s.dot(&y) > 1e-12 {
                self.history.push_back((s, y));
                if self.history.len() > LBFGS_HISTORY {
                    self.history.pop_front();
                }
            }
        }

        // Two-loop recursion.
        let mut q = gradient.clone();
        let mut alphas = Vec::with_capacity(self.history.len());
        for (s, y) in self.history.iter().rev() {
            let rho = 1.0 / y.dot(s);
            let a = rho * s.dot(&q);
            q -= y * a;
            alphas.push((a, rho));
        }
        let gamma = self
            .history
            .back()
            .map(|(s, y)| s.dot(y) / y.dot(y))
            .unwrap_or(LBFGS_ALPHA);
        let mut direction = q * gamma;
        for ((s, y), (a, rho)) in self.history.iter().zip(alphas.iter().rev()) {
            let beta = rho * y.dot(&direction);
            direction += s * (a - beta);
        }

        self.previous = Some((x.clone(), gradient));
        apply_clipped(x, &(-direction));
    }
}

fn apply_clipped(x: &mut DVector<f64>, displacement: &DVector<f64>) {
    let largest = max_per_site_norm(displacement);
    let scale = if largest > MAX_MOVE {
        MAX_MOVE / largest
    } else {
        1.0
    };
    *x += displacement * scale;
}

enum Stepper {
    Fire(FireStepper),
    Lbfgs(LbfgsStepper),
}

impl Stepper {
    fn step(&mut self, x: &mut DVector<f64>, force: &DVector<f64>) {
        match self {
            Stepper::Fire(s) => s.step(x, force),
            Stepper::Lbfgs(s) => s.step(x, force),
        }
    }
}

impl<E: Evaluator> PathOptimizer for NebOptimizer<E> {
    fn optimize(
        &self,
        band: &[CrystalStructure],
        settings: &AttemptSettings,
        budget: usize,
        climb: bool,
    ) -> Result<PathRun, SimError> {
        if band.len() < 3 {
            return Err(SimError::BandTooShort(band.len()));
        }
        let interior = band.len() - 2;
        let dof = 3 * band[0].num_sites();

        let first = self.evaluator.evaluate(&band[0])?;
        let last = self.evaluator.evaluate(&band[band.len() - 1])?;
        let x_first = flatten(&band[0]);
        let x_last = flatten(&band[band.len() - 1]);

        let mut images: Vec<DVector<f64>> = band[1..band.len() - 1].iter().map(flatten).collect();
        let mut energies = vec![0.0; interior];
        let mut stepper = match settings.optimizer {
            OptimizerKind::Fire => Stepper::Fire(FireStepper::new(interior * dof)),
            OptimizerKind::Lbfgs => Stepper::Lbfgs(LbfgsStepper::new()),
        };

        let mut steps_taken = 0;
        let mut converged = false;
        for step in 0..=budget {
            let mut true_forces = Vec::with_capacity(interior);
            for (k, x) in images.iter().enumerate() {
                let state = self.evaluator.evaluate(&with_positions(&band[k + 1], x))?;
                energies[k] = state.energy;
                let mut flat = DVector::zeros(dof);
                for (i, f) in state.forces.iter().enumerate() {
                    flat[3 * i] = f.x;
                    flat[3 * i + 1] = f.y;
                    flat[3 * i + 2] = f.z;
                }
                true_forces.push(flat);
            }

            let climbing_image = climb
                .then(|| {
                    energies
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                        .map(|(k, _)| k)
                })
                .flatten();

            let mut band_force = DVector::zeros(interior * dof);
            let mut residual: f64 = 0.0;
            for k in 0..interior {
                let prev = if k == 0 { &x_first } else { &images[k - 1] };
                let next = if k == interior - 1 {
                    &x_last
                } else {
                    &images[k + 1]
                };
                let e_prev = if k == 0 { first.energy } else { energies[k - 1] };
                let e_next = if k == interior - 1 {
                    last.energy
                } else {
                    energies[k + 1]
                };
                let forward = next - &images[k];
                let backward = &images[k] - prev;
                let tangent = match settings.tangent {
                    TangentMethod::Improved => {
                        improved_tangent(&forward, &backward, e_prev, energies[k], e_next)
                    }
                    TangentMethod::Plain => plain_tangent(&forward, &backward),
                };

                let parallel = true_forces[k].dot(&tangent);
                let force = if climbing_image == Some(k) {
                    &true_forces[k] - &tangent * (2.0 * parallel)
                } else {
                    let spring = self.spring_constant * (forward.norm() - backward.norm());
                    &true_forces[k] - &tangent * parallel + &tangent * spring
                };
                residual = residual.max(max_per_site_norm(&force));
                band_force.rows_mut(k * dof, dof).copy_from(&force);
            }

            if residual <= settings.fmax {
                converged = true;
                steps_taken = step;
                break;
            }
            if step == budget {
                steps_taken = budget;
                break;
            }

            let mut stacked = DVector::zeros(interior * dof);
            for (k, x) in images.iter().enumerate() {
                stacked.rows_mut(k * dof, dof).copy_from(x);
            }
            stepper.step(&mut stacked, &band_force);
            for (k, x) in images.iter_mut().enumerate() {
                x.copy_from(&stacked.rows(k * dof, dof).clone_owned());
            }
        }

        debug!(converged, steps_taken, "NEB run finished");

        let mut out_images = Vec::with_capacity(band.len());
        let mut out_energies = Vec::with_capacity(band.len());
        out_images.push(band[0].clone());
        out_energies.push(first.energy);
        for (k, x) in images.iter().enumerate() {
            out_images.push(with_positions(&band[k + 1], x));
            out_energies.push(energies[k]);
        }
        out_images.push(band[band.len() - 1].clone());
        out_energies.push(last.energy);

        Ok(PathRun {
            converged,
            steps_taken,
            images: out_images,
            energies: out_energies,
        })
    }
}
