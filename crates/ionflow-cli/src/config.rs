use crate::error::Result;
use anyhow::Context;
use ionflow::engine::config::{PipelineConfig, SupercellConfig};

/// Compiled-in settings of the standard pipeline run. These are deliberately
/// not command-line flags: a run is reproducible from the input structure and
/// the binary version alone.
pub struct DefaultsConfig {
    pub migrating_species: &'static str,
    pub max_hop_distance: f64,
    pub num_images: usize,
    pub neb_max_steps: usize,
    pub min_supercell_length: f64,
    pub max_supercell_atoms: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            migrating_species: "Li",
            max_hop_distance: 7.0,
            num_images: 3,
            neb_max_steps: 5000,
            min_supercell_length: 10.0,
            max_supercell_atoms: 1000,
        }
    }
}

/// Assembles the pipeline configuration from the compiled-in defaults.
pub fn build_pipeline_config() -> Result<PipelineConfig> {
    let defaults = DefaultsConfig::default();
    let config = PipelineConfig::builder()
        .migrating_species(defaults.migrating_species)
        .max_hop_distance(defaults.max_hop_distance)
        .num_images(defaults.num_images)
        .neb_max_steps(defaults.neb_max_steps)
        .supercell(SupercellConfig {
            min_length: defaults.min_supercell_length,
            max_atoms: defaults.max_supercell_atoms,
        })
        .build()
        .context("invalid pipeline configuration")?;
    Ok(config)
}
