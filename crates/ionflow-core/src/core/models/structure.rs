use super::lattice::Lattice;
use nalgebra::Vector3;
use std::collections::BTreeMap;

/// One atomic site: a species symbol and a fractional coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub species: String,
    pub frac: Vector3<f64>,
}

impl Site {
    pub fn new(species: impl Into<String>, frac: Vector3<f64>) -> Self {
        Self {
            species: species.into(),
            frac,
        }
    }
}

/// A neighbor found by a radius search: the index of the neighboring site,
/// the cartesian offset from the query site to that periodic image, and the
/// corresponding distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub offset: Vector3<f64>,
    pub distance: f64,
}

/// A periodic crystal structure: a lattice plus an ordered list of sites.
///
/// Site order is significant throughout the pipeline; hops, working-directory
/// names and checkpoint records are all keyed by site index, so operations on
/// a structure never reorder the surviving sites.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalStructure {
    lattice: Lattice,
    sites: Vec<Site>,
}

// Distances below this are treated as the site coinciding with itself.
const SELF_IMAGE_TOLERANCE: f64 = 1e-8;

impl CrystalStructure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    pub fn site(&self, index: usize) -> &Site {
        &self.sites[index]
    }

    pub fn cartesian(&self, index: usize) -> Vector3<f64> {
        self.lattice.to_cartesian(&self.sites[index].frac)
    }

    pub fn set_frac(&mut self, index: usize, frac: Vector3<f64>) {
        self.sites[index].frac = frac;
    }

    pub fn remove_site(&mut self, index: usize) {
        self.sites.remove(index);
    }

    /// Minimum-image distance between two sites, in Angstroms.
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        let delta = self.sites[j].frac - self.sites[i].frac;
        self.lattice
            .to_cartesian(&self.lattice.minimum_image(&delta))
            .norm()
    }

    /// All periodic images of all sites within `radius` of site `i`, excluding
    /// the site's own zero-translation image.
    ///
    /// The returned order is deterministic: neighbors are enumerated by site
    /// index first, then by lattice translation in lexicographic order. The
    /// hop search relies on this order being stable across runs.
    pub fn neighbors_within(&self, i: usize, radius: f64) -> Vec<Neighbor> {
        let widths = self.lattice.perpendicular_widths();
        let reach: Vec<i64> = widths
            .iter()
            .map(|w| (radius / w).ceil() as i64 + 1)
            .collect();
        let origin = self.sites[i].frac;

        let mut found = Vec::new();
        for (j, site) in self.sites.iter().enumerate() {
            let base = site.frac - origin;
            for na in -reach[0]..=reach[0] {
                for nb in -reach[1]..=reach[1] {
                    for nc in -reach[2]..=reach[2] {
                        let shift = Vector3::new(na as f64, nb as f64, nc as f64);
                        let offset = self.lattice.to_cartesian(&(base + shift));
                        let distance = offset.norm();
                        if distance <= radius && !(j == i && distance < SELF_IMAGE_TOLERANCE) {
                            found.push(Neighbor {
                                index: j,
                                offset,
                                distance,
                            });
                        }
                    }
                }
            }
        }
        found
    }

    /// Expands the structure by integer multiples along each lattice vector.
    ///
    /// Sites are ordered original-site-major so that runs of equal species in
    /// the parent stay contiguous in the supercell.
    pub fn make_supercell(&self, multiples: [usize; 3]) -> CrystalStructure {
        let [na, nb, nc] = multiples;
        let scale = Vector3::new(na as f64, nb as f64, nc as f64);
        let mut sites = Vec::with_capacity(self.sites.len() * na * nb * nc);
        for site in &self.sites {
            for ia in 0..na {
                for ib in 0..nb {
                    for ic in 0..nc {
                        let shift = Vector3::new(ia as f64, ib as f64, ic as f64);
                        let frac = (site.frac + shift).component_div(&scale);
                        sites.push(Site::new(site.species.clone(), frac));
                    }
                }
            }
        }
        CrystalStructure {
            lattice: self.lattice.scaled(multiples),
            sites,
        }
    }

    /// Chemical formula with species in alphabetical order, e.g. `Li8 O4 Ti4`.
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for site in &self.sites {
            *counts.entry(site.species.as_str()).or_insert(0) += 1;
        }
        counts
            .iter()
            .map(|(species, count)| format!("{species}{count}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
