//! Discovery and symmetry deduplication of candidate migration hops.

use crate::core::models::structure::CrystalStructure;
use crate::core::sim::SymmetryAnalyzer;
use crate::engine::config::PipelineConfig;
use crate::engine::error::EngineError;
use std::collections::HashSet;
use tracing::{debug, info};

/// One candidate migration hop: the migrating site and the neighboring site
/// whose vacancy it would move into. Indices refer to the pristine supercell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopCandidate {
    pub origin: usize,
    pub destination: usize,
}

/// Canonical identity of a migration mechanism: the sorted pair of symmetry
/// equivalence classes of the endpoints, plus the hop length rounded half-up
/// at the configured precision (stored scaled to an integer so the signature
/// is hashable).
///
/// The rounding is a deliberate tolerance, not a numerical artifact: hops
/// whose lengths agree at that precision between equivalent endpoint classes
/// are one mechanism by policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HopSignature {
    classes: (usize, usize),
    scaled_distance: i64,
}

impl HopSignature {
    pub fn new(class_a: usize, class_b: usize, distance: f64, precision: u32) -> Self {
        let classes = if class_a <= class_b {
            (class_a, class_b)
        } else {
            (class_b, class_a)
        };
        let scale = 10f64.powi(precision as i32);
        Self {
            classes,
            scaled_distance: (distance * scale).round() as i64,
        }
    }
}

/// Finds all symmetrically unique migration hops in a structure.
///
/// Traversal is deterministic: migrating-species origins in site-index order,
/// then neighbors in the order the radius search returns them. The first hop
/// seen for each signature is kept, so the orientation of the retained hop --
/// `(i, j)` versus `(j, i)` -- is decided by traversal order rather than any
/// canonical rule on the endpoints.
pub fn find_unique_hops(
    structure: &CrystalStructure,
    symmetry: &dyn SymmetryAnalyzer,
    config: &PipelineConfig,
) -> Result<Vec<HopCandidate>, EngineError> {
    let equivalent = symmetry.equivalent_sites(structure)?;

    let migrating: Vec<usize> = (0..structure.num_sites())
        .filter(|&i| structure.site(i).species == config.migrating_species)
        .collect();
    if migrating.is_empty() {
        return Err(EngineError::NoMigratingSites {
            species: config.migrating_species.clone(),
        });
    }
    debug!(
        count = migrating.len(),
        species = %config.migrating_species,
        "migrating sites found"
    );

    let mut seen: HashSet<HopSignature> = HashSet::new();
    let mut hops = Vec::new();

    for &origin in &migrating {
        for neighbor in structure.neighbors_within(origin, config.max_hop_distance) {
            if structure.site(neighbor.index).species != config.migrating_species {
                continue;
            }
            let signature = HopSignature::new(
                equivalent[origin],
                equivalent[neighbor.index],
                neighbor.distance,
                config.distance_precision,
            );
            if seen.insert(signature) {
                hops.push(HopCandidate {
                    origin,
                    destination: neighbor.index,
                });
            }
        }
    }

    info!(unique = hops.len(), "hop deduplication finished");
    Ok(hops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Lattice, Site};
    use crate::core::sim::SimError;
    use nalgebra::Vector3;

    /// Symmetry stub returning a fixed site-to-representative mapping.
    struct StubSymmetry(Vec<usize>);

    impl SymmetryAnalyzer for StubSymmetry {
        fn equivalent_sites(&self, _: &CrystalStructure) -> Result<Vec<usize>, SimError> {
            Ok(self.0.clone())
        }
    }

    fn config(species: &str, max_distance: f64, precision: u32) -> PipelineConfig {
        PipelineConfig::builder()
            .migrating_species(species)
            .max_hop_distance(max_distance)
            .distance_precision(precision)
            .build()
            .unwrap()
    }

    fn li_row(positions: &[f64]) -> CrystalStructure {
        CrystalStructure::new(
            Lattice::cubic(20.0),
            positions
                .iter()
                .map(|&x| Site::new("Li", Vector3::new(x / 20.0, 0.0, 0.0)))
                .collect(),
        )
    }

    #[test]
    fn signature_sorts_class_pair_and_rounds_half_up() {
        assert_eq!(
            HopSignature::new(5, 2, 3.004, 2),
            HopSignature::new(2, 5, 2.995, 2)
        );
        assert_ne!(
            HopSignature::new(2, 5, 3.004, 2),
            HopSignature::new(2, 5, 3.006, 2)
        );
    }

    #[test]
    fn no_migrating_sites_is_a_typed_error() {
        let structure = li_row(&[0.0, 3.0]);
        let result = find_unique_hops(
            &structure,
            &StubSymmetry(vec![0, 0]),
            &config("Na", 7.0, 2),
        );
        assert!(matches!(
            result,
            Err(EngineError::NoMigratingSites { species }) if species == "Na"
        ));
    }

    #[test]
    fn reverse_orientation_is_rejected_as_duplicate() {
        // Two equivalent sites 3 A apart: (0,1) and (1,0) share a signature,
        // so only the first-traversed orientation survives.
        let structure = li_row(&[0.0, 3.0]);
        let hops = find_unique_hops(
            &structure,
            &StubSymmetry(vec![0, 0]),
            &config("Li", 4.0, 2),
        )
        .unwrap();
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].origin, 0);
        assert_eq!(hops[0].destination, 1);
    }

    #[test]
    fn hops_agreeing_at_rounding_precision_collapse_to_one() {
        // Distances 3.00 and 3.0049 both round to 3.00 at two decimals; with
        // equal class pairs they are one mechanism.
        let structure = li_row(&[0.0, 3.0, 10.0, 13.0049]);
        let hops = find_unique_hops(
            &structure,
            &StubSymmetry(vec![0, 0, 0, 0]),
            &config("Li", 4.0, 2),
        )
        .unwrap();
        assert_eq!(hops.len(), 1);
    }

    #[test]
    fn distinct_classes_keep_both_hops() {
        let structure = li_row(&[0.0, 3.0, 10.0, 13.0]);
        let hops = find_unique_hops(
            &structure,
            &StubSymmetry(vec![0, 0, 2, 0]),
            &config("Li", 4.0, 2),
        )
        .unwrap();
        // (0,1) has classes (0,0); (2,3) has classes (0,2).
        assert_eq!(hops.len(), 2);
    }

    #[test]
    fn non_migrating_neighbors_are_ignored() {
        let structure = CrystalStructure::new(
            Lattice::cubic(20.0),
            vec![
                Site::new("Li", Vector3::new(0.0, 0.0, 0.0)),
                Site::new("O", Vector3::new(0.15, 0.0, 0.0)),
                Site::new("Li", Vector3::new(0.3, 0.0, 0.0)),
            ],
        );
        let hops = find_unique_hops(
            &structure,
            &StubSymmetry(vec![0, 1, 0]),
            &config("Li", 7.0, 2),
        )
        .unwrap();
        assert!(hops.iter().all(|h| h.destination != 1));
    }

    #[test]
    fn traversal_is_deterministic() {
        let structure = li_row(&[0.0, 3.0, 6.0, 9.5]);
        let stub = StubSymmetry(vec![0, 1, 2, 3]);
        let c = config("Li", 7.0, 2);
        let first = find_unique_hops(&structure, &stub, &c).unwrap();
        let second = find_unique_hops(&structure, &stub, &c).unwrap();
        assert_eq!(first, second);
    }
}
