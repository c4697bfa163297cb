//! Test utilities for beamline development.
//!
//! Provides a reference beam, seeded particle bunches, tolerance
//! assertions for phase-space arrays, and small lattice fixtures in
//! [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use beamline_core::{BeamReference, Matrix6, PhaseSpace, Tensor3, Vector6};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Reference beam used throughout the test suites: `beta = 0.6`,
/// `gamma = 1.25`.
pub fn standard_beam() -> BeamReference {
    match BeamReference::new(0.6, 1.25) {
        Ok(beam) => beam,
        Err(e) => panic!("standard beam rejected: {e}"),
    }
}

/// `n` particles drawn uniformly from `[-scale, scale]` in every
/// coordinate, reproducible for a given `seed`.
pub fn random_bunch(n: usize, seed: u64, scale: f64) -> PhaseSpace {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    PhaseSpace::from_fn(n, |_, _| scale * (2.0 * rng.random::<f64>() - 1.0))
}

/// Largest absolute element-wise difference.
pub fn max_abs_diff(a: &PhaseSpace, b: &PhaseSpace) -> f64 {
    assert_eq!(a.ncols(), b.ncols(), "particle counts differ");
    (a - b).amax()
}

/// Panic unless `|a - b| <= atol + rtol * |b|` element-wise.
pub fn assert_allclose(a: &PhaseSpace, b: &PhaseSpace, rtol: f64, atol: f64) {
    assert_eq!(a.ncols(), b.ncols(), "particle counts differ");
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let tol = atol + rtol * y.abs();
        assert!(
            (x - y).abs() <= tol,
            "entry {i}: {x} vs {y} exceeds tolerance {tol}"
        );
    }
}

/// [`assert_allclose`] for 6x6 matrices.
pub fn assert_matrix_close(a: &Matrix6, b: &Matrix6, rtol: f64, atol: f64) {
    for i in 0..6 {
        for j in 0..6 {
            let (x, y) = (a[(i, j)], b[(i, j)]);
            let tol = atol + rtol * y.abs();
            assert!(
                (x - y).abs() <= tol,
                "R[{i},{j}]: {x} vs {y} exceeds tolerance {tol}"
            );
        }
    }
}

/// [`assert_allclose`] for 6-vectors.
pub fn assert_vector_close(a: &Vector6, b: &Vector6, rtol: f64, atol: f64) {
    for i in 0..6 {
        let tol = atol + rtol * b[i].abs();
        assert!(
            (a[i] - b[i]).abs() <= tol,
            "d[{i}]: {} vs {} exceeds tolerance {tol}",
            a[i],
            b[i]
        );
    }
}

/// [`assert_allclose`] for second-order coefficients.
pub fn assert_tensor_close(a: &Tensor3, b: &Tensor3, rtol: f64, atol: f64) {
    for i in 0..6 {
        for j in 0..6 {
            for k in 0..6 {
                let (x, y) = (a[(i, j, k)], b[(i, j, k)]);
                let tol = atol + rtol * y.abs();
                assert!(
                    (x - y).abs() <= tol,
                    "T[{i},{j},{k}]: {x} vs {y} exceeds tolerance {tol}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bunch_is_reproducible() {
        let a = random_bunch(8, 7, 1e-3);
        let b = random_bunch(8, 7, 1e-3);
        assert_eq!(a, b);
        assert!(a.amax() <= 1e-3);
        assert_ne!(a, random_bunch(8, 8, 1e-3));
    }

    #[test]
    #[should_panic(expected = "exceeds tolerance")]
    fn allclose_rejects_large_difference() {
        let a = PhaseSpace::zeros(1);
        let b = PhaseSpace::from_element(1, 1.0);
        assert_allclose(&a, &b, 1e-6, 1e-9);
    }
}
