use crate::cli::Cli;
use crate::config;
use crate::error::{CliError, Result};
use crate::progress::CliProgressHandler;
use anyhow::anyhow;
use ionflow::core::io::poscar;
use ionflow::core::sim::Simulators;
use ionflow::core::sim::fingerprint::FingerprintSymmetry;
use ionflow::core::sim::fire::FireRelaxer;
use ionflow::core::sim::morse::MorsePotential;
use ionflow::core::sim::neb::NebOptimizer;
use ionflow::core::sim::vibrations::FiniteDiffVibrations;
use ionflow::engine::progress::ProgressReporter;
use ionflow::workflows::pipeline::{self, PipelineSummary};
use std::path::Path;
use tracing::info;

pub fn run(cli: Cli) -> Result<()> {
    let input = load_input(&cli)?;
    let config = config::build_pipeline_config()?;

    let relaxer = FireRelaxer::new(MorsePotential::default());
    let optimizer = NebOptimizer::new(MorsePotential::default());
    let vibrations = FiniteDiffVibrations::new(MorsePotential::default());
    let symmetry = FingerprintSymmetry::default();
    let sims = Simulators {
        relaxer: &relaxer,
        optimizer: &optimizer,
        vibrations: &vibrations,
        symmetry: &symmetry,
    };

    let handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(handler.get_callback());

    let summary = pipeline::run(&input, &config, &sims, &reporter, Path::new("."))?;
    drop(reporter);

    print_summary(&summary);
    Ok(())
}

fn load_input(cli: &Cli) -> Result<ionflow::core::models::CrystalStructure> {
    if !cli.input.exists() {
        return Err(CliError::InputNotFound(cli.input.clone()));
    }

    let input = poscar::read_from_path(&cli.input).map_err(|e| CliError::FileParsing {
        path: cli.input.clone(),
        source: anyhow!(e),
    })?;
    info!(
        file = %cli.input.display(),
        formula = %input.formula(),
        "input structure loaded"
    );
    Ok(input)
}

fn print_summary(summary: &PipelineSummary) {
    println!();
    println!("Supercell: {}", summary.supercell_formula);
    println!(
        "Paths: {} unique, {} finished",
        summary.tasks.len(),
        summary.num_finished()
    );
    for task in &summary.tasks {
        let dir = task
            .directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| task.directory.display().to_string());
        match &task.status {
            Some(status) => {
                let barrier = status
                    .neb_barrier_ev
                    .map(|b| format!("{b:.4} eV"))
                    .unwrap_or_else(|| "pending".to_string());
                let prefactor = status
                    .prefactor_thz
                    .map(|p| format!("{p:.4} THz"))
                    .unwrap_or_else(|| "pending".to_string());
                println!("  {dir}: barrier {barrier}, prefactor {prefactor}");
            }
            None => println!("  {dir}: failed (see log)"),
        }
    }
}
