pub mod lattice;
pub mod structure;

pub use lattice::Lattice;
pub use structure::{CrystalStructure, Neighbor, Site};
