pub mod checkpoint;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod hops;
pub mod prefactor;
pub mod progress;
pub mod retry;
pub mod supercell;
