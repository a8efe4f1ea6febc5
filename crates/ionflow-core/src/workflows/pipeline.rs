//! The top-level migration-barrier pipeline.
//!
//! One invocation prepares the relaxed pristine supercell, enumerates the
//! symmetrically unique hops in it, and drives every hop's path task one pass
//! forward. Discovery failures (no migrating sites, no hops in range) abort
//! the run with a typed error; a failure inside one path task is logged and
//! recorded, and the loop moves on to the next task.

use crate::core::io::poscar;
use crate::core::models::structure::CrystalStructure;
use crate::core::sim::{RelaxMode, Simulators};
use crate::engine::checkpoint::TaskStatus;
use crate::engine::config::PipelineConfig;
use crate::engine::error::EngineError;
use crate::engine::hops::{self, HopCandidate};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::supercell;
use crate::workflows::path;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

pub const PRISTINE_SUPERCELL_FILENAME: &str = "POSCAR_supercell_pristine";

/// Outcome of one pass over a single path task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub hop: HopCandidate,
    pub directory: PathBuf,
    /// The task's checkpoint record after this pass, or `None` when the task
    /// failed before its record could be read back.
    pub status: Option<TaskStatus>,
}

/// What one pipeline pass touched, in task order.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub supercell_formula: String,
    pub tasks: Vec<TaskReport>,
}

impl PipelineSummary {
    /// Tasks whose barrier and prefactor are both on record.
    pub fn num_finished(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| {
                t.status
                    .as_ref()
                    .is_some_and(|s| s.neb_analysis_complete && s.prefactor_complete)
            })
            .count()
    }
}

/// Runs one full pipeline pass rooted at `work_root`.
///
/// Re-running with the same input and root resumes: the relaxed pristine
/// supercell is reused from disk when present, and each path task picks up
/// at its persisted stage.
#[instrument(skip_all, name = "migration_pipeline")]
pub fn run(
    input: &CrystalStructure,
    config: &PipelineConfig,
    sims: &Simulators,
    reporter: &ProgressReporter,
    work_root: &Path,
) -> Result<PipelineSummary, EngineError> {
    std::fs::create_dir_all(work_root)?;

    reporter.report(Progress::PhaseStart { name: "Preparation" });
    let pristine = prepare_pristine_supercell(input, config, sims, work_root)?;
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Discovery" });
    let hop_list = hops::find_unique_hops(&pristine, sims.symmetry, config)?;
    if hop_list.is_empty() {
        return Err(EngineError::NoMigrationPaths {
            max_distance: config.max_hop_distance,
        });
    }
    info!(paths = hop_list.len(), "unique migration paths identified");
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart { name: "Path tasks" });
    let total = hop_list.len();
    let mut tasks = Vec::with_capacity(total);
    for (i, hop) in hop_list.into_iter().enumerate() {
        let index = i + 1;
        let name = path::directory_name(&pristine, &hop, index);
        reporter.report(Progress::PathStart {
            index,
            total,
            name: name.clone(),
        });
        let status = match path::process_path(
            &pristine, &hop, index, config, sims, reporter, work_root,
        ) {
            Ok(status) => Some(status),
            Err(err) => {
                error!(path = %name, %err, "path task failed; continuing with the next path");
                None
            }
        };
        tasks.push(TaskReport {
            hop,
            directory: work_root.join(name),
            status,
        });
    }
    reporter.report(Progress::PhaseFinish);

    Ok(PipelineSummary {
        supercell_formula: pristine.formula(),
        tasks,
    })
}

/// Builds (or reloads) the relaxed pristine supercell all path tasks share.
///
/// First pass: relax the input cell with variable cell vectors, expand it to
/// the configured supercell, relax the supercell at fixed cell, and persist
/// the result. Later passes reload the persisted file so every task keeps
/// seeing the same reference structure. Relaxer errors here are fatal, since
/// nothing downstream can run without the pristine structure; mere
/// non-convergence is logged and the best structure reached is used.
fn prepare_pristine_supercell(
    input: &CrystalStructure,
    config: &PipelineConfig,
    sims: &Simulators,
    work_root: &Path,
) -> Result<CrystalStructure, EngineError> {
    let pristine_path = work_root.join(PRISTINE_SUPERCELL_FILENAME);
    if pristine_path.exists() {
        info!(file = PRISTINE_SUPERCELL_FILENAME, "reusing relaxed pristine supercell");
        return Ok(poscar::read_from_path(&pristine_path)?);
    }

    info!("relaxing input bulk cell");
    let bulk = sims.relaxer.relax(
        input,
        RelaxMode::Bulk,
        config.relax_max_steps,
        config.relax_fmax,
    )?;
    if !bulk.converged {
        warn!("bulk relaxation did not converge; continuing with best structure");
    }

    let supercell = supercell::build_supercell(&bulk.structure, &config.supercell);

    info!("relaxing pristine supercell at fixed cell");
    let relaxed = sims.relaxer.relax(
        &supercell,
        RelaxMode::FixedCell,
        config.relax_max_steps,
        config.relax_fmax,
    )?;
    if !relaxed.converged {
        warn!("supercell relaxation did not converge; continuing with best structure");
    }

    poscar::write_to_path(&pristine_path, &relaxed.structure)?;
    info!(
        file = PRISTINE_SUPERCELL_FILENAME,
        formula = %relaxed.structure.formula(),
        "pristine supercell persisted"
    );
    Ok(relaxed.structure)
}
