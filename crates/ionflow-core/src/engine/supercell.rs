//! Supercell sizing for defect calculations.

use crate::core::models::structure::CrystalStructure;
use crate::engine::config::SupercellConfig;
use tracing::info;

/// Smallest diagonal expansion whose cell edges all reach `min_length`,
/// trimmed back while it exceeds `max_atoms`.
///
/// Trimming removes one multiple at a time from the axis with the largest
/// multiple (highest axis index on ties), so the choice is deterministic.
pub fn choose_multiples(structure: &CrystalStructure, config: &SupercellConfig) -> [usize; 3] {
    let lengths = structure.lattice().lengths();
    let mut multiples = [0usize; 3];
    for (m, length) in multiples.iter_mut().zip(lengths.iter()) {
        *m = ((config.min_length / length).ceil() as usize).max(1);
    }

    let atoms = |m: &[usize; 3]| structure.num_sites() * m[0] * m[1] * m[2];
    while atoms(&multiples) > config.max_atoms {
        let largest = (0..3)
            .max_by_key(|&axis| multiples[axis])
            .unwrap_or(0);
        if multiples[largest] <= 1 {
            break;
        }
        multiples[largest] -= 1;
    }
    multiples
}

pub fn build_supercell(
    structure: &CrystalStructure,
    config: &SupercellConfig,
) -> CrystalStructure {
    let multiples = choose_multiples(structure, config);
    let supercell = structure.make_supercell(multiples);
    info!(
        multiples = ?multiples,
        formula = %supercell.formula(),
        atoms = supercell.num_sites(),
        "supercell created"
    );
    supercell
}
