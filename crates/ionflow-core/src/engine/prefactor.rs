//! Vineyard prefactor arithmetic over vibrational spectra.

use thiserror::Error;

/// Wavenumber to frequency: cm^-1 expressed in THz.
pub const CM_INV_TO_THZ: f64 = 0.029_979_245_8;

// Frequency lists arrive ordered by ascending eigenvalue. The first three
// entries of each spectrum are taken to be the translational zero modes; the
// saddle spectrum carries one additional imaginary reaction-coordinate mode,
// so its first genuine entry is index 4 in the positional pairing below.
const SKIPPED_MODES: usize = 4;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PrefactorError {
    #[error(
        "Too few vibrational modes for a prefactor: {initial} initial, {saddle} saddle (need more than {SKIPPED_MODES})"
    )]
    TooFewModes { initial: usize, saddle: usize },

    #[error("Saddle mode {index} is not positive ({value} cm^-1); spectrum is degenerate")]
    DegenerateSaddleMode { index: usize, value: f64 },
}

/// Vineyard estimate of the attempt frequency, in THz.
///
/// Discards the lattice zero modes of both spectra and the saddle's reaction
/// mode, then scales the lowest surviving initial-state frequency by the
/// ratio of the remaining initial and saddle frequencies, pairwise.
pub fn vineyard_prefactor(initial: &[f64], saddle: &[f64]) -> Result<f64, PrefactorError> {
    if initial.len() <= SKIPPED_MODES || saddle.len() <= SKIPPED_MODES {
        return Err(PrefactorError::TooFewModes {
            initial: initial.len(),
            saddle: saddle.len(),
        });
    }

    let mut prefactor_cm = initial[SKIPPED_MODES - 1];
    for (offset, (i, s)) in initial[SKIPPED_MODES..]
        .iter()
        .zip(&saddle[SKIPPED_MODES..])
        .enumerate()
    {
        if *s <= 0.0 {
            return Err(PrefactorError::DegenerateSaddleMode {
                index: SKIPPED_MODES + offset,
                value: *s,
            });
        }
        prefactor_cm *= i / s;
    }

    Ok(prefactor_cm * CM_INV_TO_THZ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_spectra_reduce_to_the_lead_frequency() {
        let spectrum = [0.0, 0.0, 0.0, 100.0, 200.0, 300.0];
        let thz = vineyard_prefactor(&spectrum, &spectrum).unwrap();
        assert!((thz - 100.0 * CM_INV_TO_THZ).abs() < 1e-12);
    }

    #[test]
    fn softer_saddle_modes_raise_the_prefactor() {
        let initial = [0.0, 0.0, 0.0, 100.0, 200.0, 400.0];
        let saddle = [0.0, 0.0, 0.0, 0.0, 100.0, 400.0];
        // 100 * (200/100) * (400/400) = 200 cm^-1.
        let thz = vineyard_prefactor(&initial, &saddle).unwrap();
        assert!((thz - 200.0 * CM_INV_TO_THZ).abs() < 1e-12);
    }

    #[test]
    fn surplus_initial_modes_are_ignored_by_the_pairing() {
        // Pairing stops at the shorter spectrum, matching the positional
        // zip over the two lists.
        let initial = [0.0, 0.0, 0.0, 100.0, 200.0, 300.0, 999.0];
        let saddle = [0.0, 0.0, 0.0, 50.0, 200.0, 300.0];
        let thz = vineyard_prefactor(&initial, &saddle).unwrap();
        assert!((thz - 100.0 * CM_INV_TO_THZ).abs() < 1e-12);
    }

    #[test]
    fn short_spectra_are_rejected() {
        assert!(matches!(
            vineyard_prefactor(&[0.0, 0.0, 0.0, 100.0], &[0.0; 6]),
            Err(PrefactorError::TooFewModes { .. })
        ));
    }

    #[test]
    fn zero_saddle_mode_is_rejected() {
        let initial = [0.0, 0.0, 0.0, 100.0, 200.0];
        let saddle = [0.0, 0.0, 0.0, 50.0, 0.0];
        assert!(matches!(
            vineyard_prefactor(&initial, &saddle),
            Err(PrefactorError::DegenerateSaddleMode { index: 4, .. })
        ));
    }
}
