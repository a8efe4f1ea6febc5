use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LatticeError {
    #[error("Lattice matrix is singular and cannot describe a periodic cell")]
    Singular,
}

/// A periodic cell described by three row vectors (a, b, c) in Angstroms.
///
/// The inverse of the transposed matrix is precomputed so that conversions
/// between fractional and cartesian coordinates never fail after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    matrix: Matrix3<f64>,
    inv_transpose: Matrix3<f64>,
}

impl Lattice {
    pub fn new(matrix: Matrix3<f64>) -> Result<Self, LatticeError> {
        let inv_transpose = matrix
            .transpose()
            .try_inverse()
            .ok_or(LatticeError::Singular)?;
        Ok(Self {
            matrix,
            inv_transpose,
        })
    }

    /// Convenience constructor for a cubic cell of edge length `a`.
    pub fn cubic(a: f64) -> Self {
        Self {
            matrix: Matrix3::from_diagonal(&Vector3::new(a, a, a)),
            inv_transpose: Matrix3::from_diagonal(&Vector3::new(1.0 / a, 1.0 / a, 1.0 / a)),
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn row(&self, i: usize) -> Vector3<f64> {
        self.matrix.row(i).transpose()
    }

    pub fn lengths(&self) -> [f64; 3] {
        [self.row(0).norm(), self.row(1).norm(), self.row(2).norm()]
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Perpendicular width of the cell along each lattice direction, i.e. the
    /// spacing between the pair of cell faces not containing that vector.
    /// This bounds how many periodic images a radius search must visit.
    pub fn perpendicular_widths(&self) -> [f64; 3] {
        let (a, b, c) = (self.row(0), self.row(1), self.row(2));
        let volume = self.volume();
        [
            volume / b.cross(&c).norm(),
            volume / c.cross(&a).norm(),
            volume / a.cross(&b).norm(),
        ]
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.matrix.transpose() * frac
    }

    pub fn to_fractional(&self, cart: &Vector3<f64>) -> Vector3<f64> {
        self.inv_transpose * cart
    }

    /// Wraps a fractional displacement into the minimum-image convention,
    /// component-wise into [-0.5, 0.5).
    pub fn minimum_image(&self, frac_delta: &Vector3<f64>) -> Vector3<f64> {
        frac_delta.map(|d| d - d.round())
    }

    /// A new lattice with each row vector scaled by a positive integer
    /// multiple.
    ///
    /// # Panics
    ///
    /// Panics if any multiple is zero, since a zero multiple collapses the
    /// cell onto a plane.
    pub fn scaled(&self, multiples: [usize; 3]) -> Self {
        assert!(
            multiples.iter().all(|&m| m > 0),
            "cell multiples must be positive, got {multiples:?}"
        );
        let mut matrix = self.matrix;
        let mut inv_transpose = self.inv_transpose;
        for (i, &m) in multiples.iter().enumerate() {
            matrix.set_row(i, &(self.matrix.row(i) * m as f64));
            // Scaling row i of the cell divides row i of the inverse
            // transpose by the same factor, so no re-inversion is needed.
            inv_transpose.set_row(i, &(self.inv_transpose.row(i) / m as f64));
        }
        Self {
            matrix,
            inv_transpose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cubic_round_trips_coordinates() {
        let lattice = Lattice::cubic(4.0);
        let frac = Vector3::new(0.25, 0.5, 0.75);
        let cart = lattice.to_cartesian(&frac);
        assert!((cart - Vector3::new(1.0, 2.0, 3.0)).norm() < 1e-12);
        assert!((lattice.to_fractional(&cart) - frac).norm() < 1e-12);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let matrix = Matrix3::from_row_slice(&[1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(Lattice::new(matrix), Err(LatticeError::Singular));
    }

    #[test]
    fn minimum_image_wraps_into_half_open_cell() {
        let lattice = Lattice::cubic(10.0);
        let wrapped = lattice.minimum_image(&Vector3::new(0.9, -0.7, 0.4));
        assert!((wrapped - Vector3::new(-0.1, 0.3, 0.4)).norm() < 1e-12);
    }

    #[test]
    fn perpendicular_widths_of_cubic_cell_equal_edge_length() {
        let widths = Lattice::cubic(6.0).perpendicular_widths();
        for w in widths {
            assert!((w - 6.0).abs() < 1e-12);
        }
    }

    #[test]
    fn scaled_lattice_multiplies_rows() {
        let lattice = Lattice::cubic(3.0).scaled([2, 1, 3]);
        let lengths = lattice.lengths();
        assert!((lengths[0] - 6.0).abs() < 1e-12);
        assert!((lengths[1] - 3.0).abs() < 1e-12);
        assert!((lengths[2] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn scaled_lattice_round_trips_coordinates() {
        // A sheared cell, so the inverse update is exercised off-diagonal.
        let matrix = Matrix3::from_row_slice(&[4.0, 0.0, 0.0, 1.0, 4.0, 0.0, 0.0, 1.0, 4.0]);
        let lattice = Lattice::new(matrix).unwrap().scaled([2, 3, 1]);
        let frac = Vector3::new(0.2, 0.7, 0.4);
        let cart = lattice.to_cartesian(&frac);
        assert!((lattice.to_fractional(&cart) - frac).norm() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "cell multiples must be positive")]
    fn zero_multiple_is_rejected() {
        let _ = Lattice::cubic(3.0).scaled([2, 0, 1]);
    }
}
