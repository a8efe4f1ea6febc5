use crate::core::sim::{AttemptSettings, OptimizerKind, TangentMethod};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

/// Bounds used when expanding the relaxed primitive cell into a supercell
/// large enough for defect calculations.
#[derive(Debug, Clone, PartialEq)]
pub struct SupercellConfig {
    pub min_length: f64,
    pub max_atoms: usize,
}

impl Default for SupercellConfig {
    fn default() -> Self {
        Self {
            min_length: 10.0,
            max_atoms: 1000,
        }
    }
}

/// Everything the migration-path pipeline needs to know, passed explicitly
/// into the entry point so runs are parameterizable and testable.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Species symbol of the mobile ion, e.g. `Li`.
    pub migrating_species: String,
    /// Neighbor-search radius for candidate hops, in Angstroms.
    pub max_hop_distance: f64,
    /// Decimal places kept when rounding hop distances for deduplication.
    /// Two hops whose lengths agree at this precision and whose endpoints
    /// share equivalence classes are one mechanism by policy.
    pub distance_precision: u32,
    /// Number of interior images in each NEB band.
    pub num_images: usize,
    /// Step budget per optimization attempt.
    pub neb_max_steps: usize,
    /// Step budget for each endpoint relaxation.
    pub relax_max_steps: usize,
    /// Force tolerance for endpoint relaxations, in eV/A.
    pub relax_fmax: f64,
    pub supercell: SupercellConfig,
    /// Fallback list for the standard NEB stage, tried in order.
    pub standard_attempts: Vec<AttemptSettings>,
    /// Fallback list for the climbing-image stage; tighter tolerances.
    pub climb_attempts: Vec<AttemptSettings>,
}

fn attempt_ladder(fmax: f64) -> Vec<AttemptSettings> {
    vec![
        AttemptSettings {
            optimizer: OptimizerKind::Fire,
            tangent: TangentMethod::Improved,
            fmax,
        },
        AttemptSettings {
            optimizer: OptimizerKind::Fire,
            tangent: TangentMethod::Plain,
            fmax,
        },
        AttemptSettings {
            optimizer: OptimizerKind::Lbfgs,
            tangent: TangentMethod::Improved,
            fmax,
        },
        AttemptSettings {
            optimizer: OptimizerKind::Lbfgs,
            tangent: TangentMethod::Plain,
            fmax,
        },
    ]
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    migrating_species: Option<String>,
    max_hop_distance: Option<f64>,
    distance_precision: Option<u32>,
    num_images: Option<usize>,
    neb_max_steps: Option<usize>,
    relax_max_steps: Option<usize>,
    relax_fmax: Option<f64>,
    supercell: Option<SupercellConfig>,
    standard_attempts: Option<Vec<AttemptSettings>>,
    climb_attempts: Option<Vec<AttemptSettings>>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn migrating_species(mut self, species: impl Into<String>) -> Self {
        self.migrating_species = Some(species.into());
        self
    }
    pub fn max_hop_distance(mut self, distance: f64) -> Self {
        self.max_hop_distance = Some(distance);
        self
    }
    pub fn distance_precision(mut self, precision: u32) -> Self {
        self.distance_precision = Some(precision);
        self
    }
    pub fn num_images(mut self, images: usize) -> Self {
        self.num_images = Some(images);
        self
    }
    pub fn neb_max_steps(mut self, steps: usize) -> Self {
        self.neb_max_steps = Some(steps);
        self
    }
    pub fn relax_max_steps(mut self, steps: usize) -> Self {
        self.relax_max_steps = Some(steps);
        self
    }
    pub fn relax_fmax(mut self, fmax: f64) -> Self {
        self.relax_fmax = Some(fmax);
        self
    }
    pub fn supercell(mut self, supercell: SupercellConfig) -> Self {
        self.supercell = Some(supercell);
        self
    }
    pub fn standard_attempts(mut self, attempts: Vec<AttemptSettings>) -> Self {
        self.standard_attempts = Some(attempts);
        self
    }
    pub fn climb_attempts(mut self, attempts: Vec<AttemptSettings>) -> Self {
        self.climb_attempts = Some(attempts);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        Ok(PipelineConfig {
            migrating_species: self
                .migrating_species
                .ok_or(ConfigError::MissingParameter("migrating_species"))?,
            max_hop_distance: self.max_hop_distance.unwrap_or(7.0),
            distance_precision: self.distance_precision.unwrap_or(2),
            num_images: self.num_images.unwrap_or(3),
            neb_max_steps: self.neb_max_steps.unwrap_or(5000),
            relax_max_steps: self.relax_max_steps.unwrap_or(500),
            relax_fmax: self.relax_fmax.unwrap_or(0.001),
            supercell: self.supercell.unwrap_or_default(),
            standard_attempts: self.standard_attempts.unwrap_or_else(|| attempt_ladder(0.01)),
            climb_attempts: self.climb_attempts.unwrap_or_else(|| attempt_ladder(0.001)),
        })
    }
}
