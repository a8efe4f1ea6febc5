//! Ordered multi-strategy retry over path optimization attempts.

use crate::core::models::structure::CrystalStructure;
use crate::core::sim::{AttemptSettings, PathOptimizer, PathRun, SimError};
use tracing::{info, warn};

/// Result of walking an ordered list of optimizer configurations.
#[derive(Debug, Clone)]
pub enum FallbackOutcome {
    /// The first configuration that converged, with its measured step count
    /// and the converged band.
    Converged(PathRun),
    /// Every configuration was exhausted. The step count reported upstream is
    /// the full budget, a saturation sentinel rather than a measured count.
    Exhausted { budget: usize },
}

impl FallbackOutcome {
    pub fn steps_taken(&self) -> usize {
        match self {
            FallbackOutcome::Converged(run) => run.steps_taken,
            FallbackOutcome::Exhausted { budget } => *budget,
        }
    }

    pub fn converged(&self) -> bool {
        matches!(self, FallbackOutcome::Converged(_))
    }
}

/// Tries each configuration in order against the path optimizer until one
/// converges or the list is exhausted.
///
/// Every attempt starts from a fresh band supplied by `seed`; partial
/// progress from a failed configuration is discarded, never resumed. A
/// collaborator error aborts the remaining attempts and is surfaced to the
/// caller, which handles it at the stage boundary.
pub fn run_with_fallback(
    optimizer: &dyn PathOptimizer,
    attempts: &[AttemptSettings],
    budget: usize,
    climb: bool,
    mut seed: impl FnMut() -> Vec<CrystalStructure>,
) -> Result<FallbackOutcome, SimError> {
    for (index, settings) in attempts.iter().enumerate() {
        info!(
            attempt = index + 1,
            total = attempts.len(),
            optimizer = ?settings.optimizer,
            tangent = ?settings.tangent,
            fmax = settings.fmax,
            climb,
            "starting optimization attempt"
        );
        let band = seed();
        let run = optimizer.optimize(&band, settings, budget, climb)?;
        if run.converged {
            info!(steps = run.steps_taken, "optimization attempt converged");
            return Ok(FallbackOutcome::Converged(run));
        }
        info!("did not converge with this configuration");
    }
    warn!(budget, "no optimizer configuration converged within the step budget");
    Ok(FallbackOutcome::Exhausted { budget })
}
