//! Construction of hop endpoint configurations and NEB seed bands.

use crate::core::models::structure::CrystalStructure;

/// The initial endpoint: the pristine structure with a vacancy at the hop
/// destination. The migrating site stays where it is.
pub fn initial_endpoint(pristine: &CrystalStructure, destination: usize) -> CrystalStructure {
    let mut structure = pristine.clone();
    structure.remove_site(destination);
    structure
}

/// The final endpoint: the vacancy structure with the migrating site
/// relocated onto the destination's coordinates.
///
/// Removing the destination site shifts every later index down by one, so
/// the migrating site's index is adjusted when it followed the destination.
pub fn final_endpoint(
    pristine: &CrystalStructure,
    origin: usize,
    destination: usize,
) -> CrystalStructure {
    let mut structure = pristine.clone();
    let target = pristine.site(destination).frac;
    structure.remove_site(destination);
    let migrated = if origin > destination {
        origin - 1
    } else {
        origin
    };
    structure.set_frac(migrated, target);
    structure
}

/// Linear interpolation between two endpoint configurations, site by site
/// with minimum-image displacements, yielding `num_interior + 2` images
/// including the endpoints.
pub fn interpolate_band(
    initial: &CrystalStructure,
    final_state: &CrystalStructure,
    num_interior: usize,
) -> Vec<CrystalStructure> {
    let lattice = initial.lattice();
    let deltas: Vec<_> = initial
        .sites()
        .iter()
        .zip(final_state.sites())
        .map(|(a, b)| lattice.minimum_image(&(b.frac - a.frac)))
        .collect();

    let mut band = Vec::with_capacity(num_interior + 2);
    band.push(initial.clone());
    for k in 1..=num_interior {
        let t = k as f64 / (num_interior + 1) as f64;
        let mut image = initial.clone();
        for (i, delta) in deltas.iter().enumerate() {
            image.set_frac(i, initial.site(i).frac + delta * t);
        }
        band.push(image);
    }
    band.push(final_state.clone());
    band
}
