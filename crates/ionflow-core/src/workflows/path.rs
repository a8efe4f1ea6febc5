//! The per-hop workflow state machine.
//!
//! One invocation drives a path task to its currently reachable stage
//! boundary: endpoint construction, the two independent endpoint relaxations,
//! the two-stage NEB optimization, barrier analysis, and the prefactor. The
//! state lives in the task directory's checkpoint record (plus the existence
//! of the endpoint files), so a re-run resumes at the right sub-stage and
//! stages that already completed are skipped with a log line.
//!
//! Failure semantics: collaborator failures and non-convergence are caught at
//! each stage boundary, logged, and leave the stage incomplete for a later
//! retry. Only host I/O problems (unreadable task directory, unwritable
//! checkpoint) abort the task, and the pipeline contains even those to the
//! one task.

use crate::core::io::poscar;
use crate::core::models::structure::CrystalStructure;
use crate::core::sim::{RelaxMode, Simulators};
use crate::engine::checkpoint::{self, StatusUpdate, TaskStatus};
use crate::engine::config::PipelineConfig;
use crate::engine::endpoints;
use crate::engine::error::EngineError;
use crate::engine::hops::HopCandidate;
use crate::engine::prefactor;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::retry::{FallbackOutcome, run_with_fallback};
use std::path::Path;
use tracing::{info, instrument, warn};

pub const INITIAL_POSCAR: &str = "POSCAR_initial";
pub const FINAL_POSCAR: &str = "POSCAR_final";
pub const OPTIMIZED_INITIAL_POSCAR: &str = "POSCAR_optimized_initial";
pub const OPTIMIZED_FINAL_POSCAR: &str = "POSCAR_optimized_final";
pub const SADDLE_POSCAR: &str = "POSCAR_saddle";
pub const INITIAL_VIB_SUMMARY: &str = "initial_vib.dat";
pub const SADDLE_VIB_SUMMARY: &str = "saddle_vib.dat";

/// Deterministic working-directory name for a path task: the 1-based task
/// index, the endpoint site indices, and the pre-relaxation hop distance.
pub fn directory_name(pristine: &CrystalStructure, hop: &HopCandidate, index: usize) -> String {
    format!(
        "NEB_path_{:03}_({}_to_{})_dist_{:.2}A",
        index,
        hop.origin,
        hop.destination,
        pristine.distance(hop.origin, hop.destination)
    )
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Drives one migration path to its currently reachable stage boundary and
/// returns the task's checkpoint record as persisted at the end of the pass.
#[instrument(skip_all, fields(path = index))]
pub fn process_path(
    pristine: &CrystalStructure,
    hop: &HopCandidate,
    index: usize,
    config: &PipelineConfig,
    sims: &Simulators,
    reporter: &ProgressReporter,
    work_root: &Path,
) -> Result<TaskStatus, EngineError> {
    let name = directory_name(pristine, hop, index);
    let dir = work_root.join(&name);
    std::fs::create_dir_all(&dir)?;
    info!(directory = %name, "managing migration path");

    let status = checkpoint::read(&dir)?;

    // Endpoint construction: the output file's existence is the completion
    // marker, there is no checkpoint flag for this stage.
    let initial_path = dir.join(INITIAL_POSCAR);
    if !initial_path.exists() {
        info!("creating initial unrelaxed endpoint");
        let endpoint = endpoints::initial_endpoint(pristine, hop.destination);
        poscar::write_to_path(&initial_path, &endpoint)?;
    }
    let final_path = dir.join(FINAL_POSCAR);
    if !final_path.exists() {
        info!("creating final unrelaxed endpoint");
        let endpoint = endpoints::final_endpoint(pristine, hop.origin, hop.destination);
        poscar::write_to_path(&final_path, &endpoint)?;
    }

    // Endpoint relaxations, independent of one another.
    if !status.initial_relax_complete {
        relax_endpoint(
            &dir,
            INITIAL_POSCAR,
            OPTIMIZED_INITIAL_POSCAR,
            StatusUpdate::InitialRelaxComplete(true),
            "initial",
            config,
            sims,
        )?;
    } else {
        reporter.report(Progress::StageSkip {
            stage: "initial endpoint relaxation",
        });
        info!("skipping initial relaxation (already complete)");
    }
    if !status.final_relax_complete {
        relax_endpoint(
            &dir,
            FINAL_POSCAR,
            OPTIMIZED_FINAL_POSCAR,
            StatusUpdate::FinalRelaxComplete(true),
            "final",
            config,
            sims,
        )?;
    } else {
        reporter.report(Progress::StageSkip {
            stage: "final endpoint relaxation",
        });
        info!("skipping final relaxation (already complete)");
    }

    // The optimization stages gate on both relaxations as persisted, not on
    // what happened within this invocation.
    let status = checkpoint::read(&dir)?;
    if status.initial_relax_complete && status.final_relax_complete {
        if status.neb_steps_taken == 0 && status.neb_climb_steps_taken == 0 {
            if let Err(error) = run_optimization_stages(&dir, config, sims) {
                warn!(%error, "NEB optimization failed; stage left incomplete");
            }
        } else {
            reporter.report(Progress::StageSkip {
                stage: "NEB optimization",
            });
            info!("skipping NEB optimization (already run)");
        }
    } else {
        reporter.report(Progress::StageSkip {
            stage: "NEB optimization",
        });
        info!("skipping NEB optimization (endpoints not ready)");
    }

    // Prefactor: chained after analysis but independently retryable, so a
    // vibrational failure on one run does not orphan the stage.
    let status = checkpoint::read(&dir)?;
    if status.neb_analysis_complete && !status.prefactor_complete {
        match compute_prefactor(&dir, sims) {
            Ok(thz) => {
                let rounded = round_to(thz, 4);
                checkpoint::update(&dir, StatusUpdate::PrefactorThz(rounded))?;
                checkpoint::update(&dir, StatusUpdate::PrefactorComplete(true))?;
                info!(prefactor_thz = rounded, "prefactor computed");
            }
            Err(error) => {
                warn!(%error, "prefactor calculation failed; will retry on a later run");
            }
        }
    } else if status.prefactor_complete {
        reporter.report(Progress::StageSkip { stage: "prefactor" });
        info!("skipping prefactor (already complete)");
    }

    checkpoint::read(&dir).map_err(Into::into)
}

/// One endpoint relaxation. Collaborator failure and non-convergence are
/// absorbed here with a warning; checkpoint and structure-file I/O errors
/// propagate.
fn relax_endpoint(
    dir: &Path,
    input: &str,
    output: &str,
    completion: StatusUpdate,
    endpoint: &'static str,
    config: &PipelineConfig,
    sims: &Simulators,
) -> Result<(), EngineError> {
    info!(endpoint, "starting fixed-cell endpoint relaxation");
    let structure = poscar::read_from_path(&dir.join(input))?;
    match sims.relaxer.relax(
        &structure,
        RelaxMode::FixedCell,
        config.relax_max_steps,
        config.relax_fmax,
    ) {
        Ok(relaxation) if relaxation.converged => {
            poscar::write_to_path(&dir.join(output), &relaxation.structure)?;
            checkpoint::update(dir, completion)?;
            info!(endpoint, file = output, "endpoint relaxation converged");
        }
        Ok(_) => {
            warn!(endpoint, "endpoint relaxation did not converge; stage stays retryable");
        }
        Err(error) => {
            warn!(endpoint, %error, "relaxation collaborator failed; stage stays retryable");
        }
    }
    Ok(())
}

/// Standard NEB, then the climbing-image refinement seeded from its final
/// band, then barrier analysis. Step counts are persisted unconditionally;
/// the analysis flag and barrier only on success.
fn run_optimization_stages(
    dir: &Path,
    config: &PipelineConfig,
    sims: &Simulators,
) -> Result<(), EngineError> {
    let initial = poscar::read_from_path(&dir.join(OPTIMIZED_INITIAL_POSCAR))?;
    let final_state = poscar::read_from_path(&dir.join(OPTIMIZED_FINAL_POSCAR))?;

    info!("setting up standard NEB");
    let standard = run_with_fallback(
        sims.optimizer,
        &config.standard_attempts,
        config.neb_max_steps,
        false,
        || endpoints::interpolate_band(&initial, &final_state, config.num_images),
    )?;
    checkpoint::update(dir, StatusUpdate::NebStepsTaken(standard.steps_taken() as u64))?;
    let FallbackOutcome::Converged(standard_run) = standard else {
        warn!(
            budget = config.neb_max_steps,
            "standard NEB did not converge with any configuration"
        );
        return Ok(());
    };

    info!("setting up climbing-image NEB");
    let seed_band = standard_run.images;
    let climb = run_with_fallback(
        sims.optimizer,
        &config.climb_attempts,
        config.neb_max_steps,
        true,
        || seed_band.clone(),
    )?;
    checkpoint::update(
        dir,
        StatusUpdate::NebClimbStepsTaken(climb.steps_taken() as u64),
    )?;
    let FallbackOutcome::Converged(climb_run) = climb else {
        warn!(
            budget = config.neb_max_steps,
            "climbing-image NEB did not converge with any configuration"
        );
        return Ok(());
    };

    let first = *climb_run
        .energies
        .first()
        .ok_or_else(|| EngineError::Internal("converged band has no images".into()))?;
    let (saddle_index, peak) = climb_run
        .energies
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| EngineError::Internal("converged band has no images".into()))?;
    let barrier = round_to(peak - first, 4);

    poscar::write_to_path(&dir.join(SADDLE_POSCAR), &climb_run.images[saddle_index])?;
    checkpoint::update(dir, StatusUpdate::NebBarrierEv(barrier))?;
    checkpoint::update(dir, StatusUpdate::NebAnalysisComplete(true))?;
    info!(
        barrier_ev = barrier,
        saddle_image = saddle_index,
        "CI-NEB analysis complete"
    );
    Ok(())
}

fn write_frequency_summary(path: &Path, frequencies: &[f64]) -> std::io::Result<()> {
    let mut body = String::from("# mode  frequency_cm^-1\n");
    for (i, f) in frequencies.iter().enumerate() {
        body.push_str(&format!("{i:>6}  {f:>14.6}\n"));
    }
    std::fs::write(path, body)
}

fn compute_prefactor(dir: &Path, sims: &Simulators) -> Result<f64, EngineError> {
    info!("calculating migration prefactor");
    let initial = poscar::read_from_path(&dir.join(OPTIMIZED_INITIAL_POSCAR))?;
    let saddle = poscar::read_from_path(&dir.join(SADDLE_POSCAR))?;

    let initial_freqs = sims.vibrations.frequencies(&initial)?;
    write_frequency_summary(&dir.join(INITIAL_VIB_SUMMARY), &initial_freqs)?;
    let saddle_freqs = sims.vibrations.frequencies(&saddle)?;
    write_frequency_summary(&dir.join(SADDLE_VIB_SUMMARY), &saddle_freqs)?;
    info!(
        initial_modes = initial_freqs.len(),
        saddle_modes = saddle_freqs.len(),
        "vibrational spectra computed"
    );

    Ok(prefactor::vineyard_prefactor(
        &initial_freqs,
        &saddle_freqs,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Lattice, Site};
    use crate::core::sim::{
        AttemptSettings, PathOptimizer, PathRun, Relaxation, Relaxer, SimError, SymmetryAnalyzer,
        VibrationalAnalyzer,
    };
    use nalgebra::Vector3;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct StubRelaxer {
        converged: bool,
        calls: Cell<usize>,
    }

    impl StubRelaxer {
        fn converging() -> Self {
            Self {
                converged: true,
                calls: Cell::new(0),
            }
        }
        fn failing() -> Self {
            Self {
                converged: false,
                calls: Cell::new(0),
            }
        }
    }

    impl Relaxer for StubRelaxer {
        fn relax(
            &self,
            structure: &CrystalStructure,
            _mode: RelaxMode,
            _max_steps: usize,
            _fmax: f64,
        ) -> Result<Relaxation, SimError> {
            self.calls.set(self.calls.get() + 1);
            Ok(Relaxation {
                converged: self.converged,
                structure: structure.clone(),
            })
        }
    }

    struct StubOptimizer {
        converged: bool,
        steps: usize,
        energies: Vec<f64>,
        calls: Cell<usize>,
    }

    impl StubOptimizer {
        fn converging() -> Self {
            Self {
                converged: true,
                steps: 42,
                energies: vec![0.0, 0.3, 0.8, 0.4, 0.1],
                calls: Cell::new(0),
            }
        }
        fn failing() -> Self {
            Self {
                converged: false,
                steps: 0,
                energies: Vec::new(),
                calls: Cell::new(0),
            }
        }
    }

    impl PathOptimizer for StubOptimizer {
        fn optimize(
            &self,
            band: &[CrystalStructure],
            _settings: &AttemptSettings,
            budget: usize,
            _climb: bool,
        ) -> Result<PathRun, SimError> {
            self.calls.set(self.calls.get() + 1);
            let energies = if self.energies.len() == band.len() {
                self.energies.clone()
            } else {
                vec![0.0; band.len()]
            };
            Ok(PathRun {
                converged: self.converged,
                steps_taken: if self.converged { self.steps } else { budget },
                images: band.to_vec(),
                energies,
            })
        }
    }

    struct StubVibrations {
        spectrum: Option<Vec<f64>>,
        calls: Cell<usize>,
    }

    impl StubVibrations {
        fn fixed() -> Self {
            Self {
                spectrum: Some(vec![0.0, 0.0, 0.0, 100.0, 200.0, 300.0]),
                calls: Cell::new(0),
            }
        }
        fn failing() -> Self {
            Self {
                spectrum: None,
                calls: Cell::new(0),
            }
        }
    }

    impl VibrationalAnalyzer for StubVibrations {
        fn frequencies(&self, _: &CrystalStructure) -> Result<Vec<f64>, SimError> {
            self.calls.set(self.calls.get() + 1);
            self.spectrum
                .clone()
                .ok_or_else(|| SimError::Evaluation("hessian build failed".into()))
        }
    }

    struct IdentitySymmetry;

    impl SymmetryAnalyzer for IdentitySymmetry {
        fn equivalent_sites(&self, s: &CrystalStructure) -> Result<Vec<usize>, SimError> {
            Ok((0..s.num_sites()).collect())
        }
    }

    fn pristine() -> CrystalStructure {
        CrystalStructure::new(
            Lattice::cubic(10.0),
            vec![
                Site::new("Li", Vector3::new(0.0, 0.0, 0.0)),
                Site::new("Li", Vector3::new(0.3, 0.0, 0.0)),
                Site::new("O", Vector3::new(0.5, 0.5, 0.5)),
            ],
        )
    }

    fn config() -> PipelineConfig {
        PipelineConfig::builder()
            .migrating_species("Li")
            .neb_max_steps(500)
            .build()
            .unwrap()
    }

    fn bundle<'a>(
        relaxer: &'a StubRelaxer,
        optimizer: &'a StubOptimizer,
        vibrations: &'a StubVibrations,
        symmetry: &'a IdentitySymmetry,
    ) -> Simulators<'a> {
        Simulators {
            relaxer,
            optimizer,
            vibrations,
            symmetry,
        }
    }

    const HOP: HopCandidate = HopCandidate {
        origin: 0,
        destination: 1,
    };

    #[test]
    fn directory_name_encodes_index_sites_and_distance() {
        let name = directory_name(&pristine(), &HOP, 4);
        assert_eq!(name, "NEB_path_004_(0_to_1)_dist_3.00A");
    }

    #[test]
    fn full_pass_completes_every_stage() {
        let work = tempdir().unwrap();
        let relaxer = StubRelaxer::converging();
        let optimizer = StubOptimizer::converging();
        let vibrations = StubVibrations::fixed();
        let symmetry = IdentitySymmetry;
        let sims = bundle(&relaxer, &optimizer, &vibrations, &symmetry);
        let reporter = ProgressReporter::new();

        let status =
            process_path(&pristine(), &HOP, 1, &config(), &sims, &reporter, work.path()).unwrap();

        assert!(status.initial_relax_complete);
        assert!(status.final_relax_complete);
        assert_eq!(status.neb_steps_taken, 42);
        assert_eq!(status.neb_climb_steps_taken, 42);
        assert!(status.neb_analysis_complete);
        assert_eq!(status.neb_barrier_ev, Some(0.8));
        assert!(status.prefactor_complete);
        let expected_thz = round_to(100.0 * prefactor::CM_INV_TO_THZ, 4);
        assert_eq!(status.prefactor_thz, Some(expected_thz));

        let dir = work.path().join(directory_name(&pristine(), &HOP, 1));
        for file in [
            INITIAL_POSCAR,
            FINAL_POSCAR,
            OPTIMIZED_INITIAL_POSCAR,
            OPTIMIZED_FINAL_POSCAR,
            SADDLE_POSCAR,
            INITIAL_VIB_SUMMARY,
            SADDLE_VIB_SUMMARY,
        ] {
            assert!(dir.join(file).exists(), "{file} missing");
        }
        // Endpoints have one vacancy each.
        let endpoint = poscar::read_from_path(&dir.join(INITIAL_POSCAR)).unwrap();
        assert_eq!(endpoint.num_sites(), 2);
    }

    #[test]
    fn completed_initial_relaxation_is_not_repeated() {
        let work = tempdir().unwrap();
        let dir = work.path().join(directory_name(&pristine(), &HOP, 1));
        std::fs::create_dir_all(&dir).unwrap();
        checkpoint::update(&dir, StatusUpdate::InitialRelaxComplete(true)).unwrap();

        let relaxer = StubRelaxer::converging();
        let optimizer = StubOptimizer::converging();
        let vibrations = StubVibrations::fixed();
        let symmetry = IdentitySymmetry;
        let sims = bundle(&relaxer, &optimizer, &vibrations, &symmetry);
        let reporter = ProgressReporter::new();

        let status =
            process_path(&pristine(), &HOP, 1, &config(), &sims, &reporter, work.path()).unwrap();

        // Only the final endpoint was relaxed in this pass.
        assert_eq!(relaxer.calls.get(), 1);
        assert!(status.final_relax_complete);
        // The initial optimized file never existed, so the NEB stage failed
        // and stayed incomplete rather than aborting the task.
        assert_eq!(status.neb_steps_taken, 0);
    }

    #[test]
    fn optimization_is_gated_on_both_relaxations() {
        let work = tempdir().unwrap();
        let relaxer = StubRelaxer::failing();
        let optimizer = StubOptimizer::converging();
        let vibrations = StubVibrations::fixed();
        let symmetry = IdentitySymmetry;
        let sims = bundle(&relaxer, &optimizer, &vibrations, &symmetry);
        let reporter = ProgressReporter::new();

        let status =
            process_path(&pristine(), &HOP, 1, &config(), &sims, &reporter, work.path()).unwrap();

        assert!(!status.initial_relax_complete);
        assert!(!status.final_relax_complete);
        assert_eq!(optimizer.calls.get(), 0);
        assert_eq!(status.neb_steps_taken, 0);
    }

    #[test]
    fn non_convergent_neb_saturates_steps_at_budget() {
        let work = tempdir().unwrap();
        let relaxer = StubRelaxer::converging();
        let optimizer = StubOptimizer::failing();
        let vibrations = StubVibrations::fixed();
        let symmetry = IdentitySymmetry;
        let sims = bundle(&relaxer, &optimizer, &vibrations, &symmetry);
        let reporter = ProgressReporter::new();
        let cfg = config();

        let status =
            process_path(&pristine(), &HOP, 1, &cfg, &sims, &reporter, work.path()).unwrap();

        assert_eq!(status.neb_steps_taken, cfg.neb_max_steps as u64);
        assert_eq!(status.neb_climb_steps_taken, 0);
        assert!(!status.neb_analysis_complete);
        assert_eq!(status.neb_barrier_ev, None);
        // Every standard-stage configuration was attempted, no climb attempts.
        assert_eq!(optimizer.calls.get(), cfg.standard_attempts.len());
    }

    #[test]
    fn ready_endpoints_with_zero_steps_run_neb_without_touching_relaxer() {
        let work = tempdir().unwrap();
        let dir = work.path().join(directory_name(&pristine(), &HOP, 1));
        std::fs::create_dir_all(&dir).unwrap();
        // Simulate a prior run that relaxed both endpoints.
        let initial = endpoints::initial_endpoint(&pristine(), HOP.destination);
        let final_state = endpoints::final_endpoint(&pristine(), HOP.origin, HOP.destination);
        poscar::write_to_path(&dir.join(INITIAL_POSCAR), &initial).unwrap();
        poscar::write_to_path(&dir.join(FINAL_POSCAR), &final_state).unwrap();
        poscar::write_to_path(&dir.join(OPTIMIZED_INITIAL_POSCAR), &initial).unwrap();
        poscar::write_to_path(&dir.join(OPTIMIZED_FINAL_POSCAR), &final_state).unwrap();
        checkpoint::update(&dir, StatusUpdate::InitialRelaxComplete(true)).unwrap();
        checkpoint::update(&dir, StatusUpdate::FinalRelaxComplete(true)).unwrap();

        let relaxer = StubRelaxer::converging();
        let optimizer = StubOptimizer::converging();
        let vibrations = StubVibrations::fixed();
        let symmetry = IdentitySymmetry;
        let sims = bundle(&relaxer, &optimizer, &vibrations, &symmetry);
        let reporter = ProgressReporter::new();

        let status =
            process_path(&pristine(), &HOP, 1, &config(), &sims, &reporter, work.path()).unwrap();

        assert_eq!(relaxer.calls.get(), 0);
        assert!(status.neb_steps_taken > 0);
        assert!(status.neb_analysis_complete);
    }

    #[test]
    fn nonzero_step_counters_block_rerunning_the_neb_stage() {
        let work = tempdir().unwrap();
        let dir = work.path().join(directory_name(&pristine(), &HOP, 1));
        std::fs::create_dir_all(&dir).unwrap();
        checkpoint::update(&dir, StatusUpdate::InitialRelaxComplete(true)).unwrap();
        checkpoint::update(&dir, StatusUpdate::FinalRelaxComplete(true)).unwrap();
        checkpoint::update(&dir, StatusUpdate::NebStepsTaken(10)).unwrap();
        checkpoint::update(&dir, StatusUpdate::NebClimbStepsTaken(5)).unwrap();
        checkpoint::update(&dir, StatusUpdate::NebBarrierEv(0.5)).unwrap();
        checkpoint::update(&dir, StatusUpdate::NebAnalysisComplete(true)).unwrap();
        checkpoint::update(&dir, StatusUpdate::PrefactorThz(3.0)).unwrap();
        checkpoint::update(&dir, StatusUpdate::PrefactorComplete(true)).unwrap();

        let relaxer = StubRelaxer::converging();
        let optimizer = StubOptimizer::converging();
        let vibrations = StubVibrations::fixed();
        let symmetry = IdentitySymmetry;
        let sims = bundle(&relaxer, &optimizer, &vibrations, &symmetry);
        let reporter = ProgressReporter::new();

        let status =
            process_path(&pristine(), &HOP, 1, &config(), &sims, &reporter, work.path()).unwrap();

        assert_eq!(optimizer.calls.get(), 0);
        assert_eq!(vibrations.calls.get(), 0);
        assert_eq!(status.neb_steps_taken, 10);
    }

    #[test]
    fn failed_prefactor_is_retried_on_a_later_pass() {
        let work = tempdir().unwrap();
        let relaxer = StubRelaxer::converging();
        let optimizer = StubOptimizer::converging();
        let broken = StubVibrations::failing();
        let symmetry = IdentitySymmetry;
        let reporter = ProgressReporter::new();

        let sims = bundle(&relaxer, &optimizer, &broken, &symmetry);
        let status =
            process_path(&pristine(), &HOP, 1, &config(), &sims, &reporter, work.path()).unwrap();
        assert!(status.neb_analysis_complete);
        assert!(!status.prefactor_complete);
        assert_eq!(status.prefactor_thz, None);

        // A later invocation with a healthy analyzer completes the stage
        // without re-running the NEB.
        let healthy = StubVibrations::fixed();
        let sims = bundle(&relaxer, &optimizer, &healthy, &symmetry);
        let status =
            process_path(&pristine(), &HOP, 1, &config(), &sims, &reporter, work.path()).unwrap();
        assert!(status.prefactor_complete);
        // Second pass skips the band stage because both step counters are nonzero.
        assert_eq!(optimizer.calls.get(), 2);
    }
}
