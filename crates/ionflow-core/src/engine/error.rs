use crate::core::io::poscar::PoscarError;
use crate::core::sim::SimError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No sites of migrating species '{species}' found in the supercell")]
    NoMigratingSites { species: String },

    #[error("No symmetrically unique migration hops found within {max_distance} A")]
    NoMigrationPaths { max_distance: f64 },

    #[error("Simulation collaborator failed: {source}")]
    Simulation {
        #[from]
        source: SimError,
    },

    #[error("Structure file error: {source}")]
    Structure {
        #[from]
        source: PoscarError,
    },

    #[error(transparent)]
    Prefactor(#[from] crate::engine::prefactor::PrefactorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
