//! Phase-space and transfer-map types.
//!
//! Coordinates are ordered `(x, px, y, py, t, pt)`. A bunch of `N`
//! particles is a [`PhaseSpace`] matrix with one particle per column.
//! A second-order map acts as `x_out = d + R x + T(x, x)` where
//! `T(x, x)_i = sum_jk T[i, j, k] x_j x_k`.

use std::ops::{Add, AddAssign, Index, IndexMut};

/// A single 6-D phase-space vector or zeroth-order map term.
pub type Vector6 = nalgebra::Vector6<f64>;

/// A 6×6 first-order map term.
pub type Matrix6 = nalgebra::Matrix6<f64>;

/// Coordinates of a bunch, shape `(6, N)`.
pub type PhaseSpace = nalgebra::Matrix6xX<f64>;

/// Transverse positions `(x, y)` of a bunch, shape `(2, N)`.
pub type Transverse = nalgebra::Matrix2xX<f64>;

// ── Tensor3 ────────────────────────────────────────────────────────

/// 6×6×6 second-order coefficients.
///
/// Stored as six 6×6 slices so that slice `i` is the quadratic form
/// contributing to output coordinate `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor3 {
    slices: [Matrix6; 6],
}

impl Tensor3 {
    /// All-zero tensor.
    pub fn zeros() -> Self {
        Self {
            slices: [Matrix6::zeros(); 6],
        }
    }

    /// Build from the six output slices.
    pub fn from_slices(slices: [Matrix6; 6]) -> Self {
        Self { slices }
    }

    /// Quadratic form for output coordinate `i`.
    pub fn slice(&self, i: usize) -> &Matrix6 {
        &self.slices[i]
    }

    /// Mutable quadratic form for output coordinate `i`.
    pub fn slice_mut(&mut self, i: usize) -> &mut Matrix6 {
        &mut self.slices[i]
    }

    /// Set `T[i, j, k]` and `T[i, k, j]` to `value`.
    pub fn set_pair(&mut self, i: usize, j: usize, k: usize, value: f64) {
        self.slices[i][(j, k)] = value;
        self.slices[i][(k, j)] = value;
    }

    /// Whether every coefficient is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.slices.iter().all(|s| s.iter().all(|&v| v == 0.0))
    }

    /// `q_i = v^T T_i v`.
    pub fn quadratic(&self, v: &Vector6) -> Vector6 {
        Vector6::from_fn(|i, _| v.dot(&(self.slices[i] * v)))
    }

    /// Apply the quadratic form to every particle column.
    pub fn apply(&self, x: &PhaseSpace) -> PhaseSpace {
        let mut out = PhaseSpace::zeros(x.ncols());
        for (c, col) in x.column_iter().enumerate() {
            let v: Vector6 = col.into_owned();
            out.set_column(c, &self.quadratic(&v));
        }
        out
    }

    /// Contract the last index with `v`: `M[i, k] = sum_l T[i, k, l] v_l`.
    pub fn contract_last(&self, v: &Vector6) -> Matrix6 {
        let mut m = Matrix6::zeros();
        for (i, slice) in self.slices.iter().enumerate() {
            let w = slice * v;
            for k in 0..6 {
                m[(i, k)] = w[k];
            }
        }
        m
    }

    /// Left multiplication by a linear map: `out_i = sum_l r[i, l] T_l`.
    pub fn left_mul(&self, r: &Matrix6) -> Tensor3 {
        let mut out = Tensor3::zeros();
        for i in 0..6 {
            for l in 0..6 {
                let coeff = r[(i, l)];
                if coeff != 0.0 {
                    out.slices[i] += self.slices[l] * coeff;
                }
            }
        }
        out
    }

    /// Substitute a linear map into both quadratic arguments:
    /// `out_i = r^T T_i r`.
    pub fn congruence(&self, r: &Matrix6) -> Tensor3 {
        let rt = r.transpose();
        Tensor3 {
            slices: std::array::from_fn(|i| rt * self.slices[i] * r),
        }
    }
}

impl Default for Tensor3 {
    fn default() -> Self {
        Self::zeros()
    }
}

impl Index<(usize, usize, usize)> for Tensor3 {
    type Output = f64;

    fn index(&self, (i, j, k): (usize, usize, usize)) -> &f64 {
        &self.slices[i][(j, k)]
    }
}

impl IndexMut<(usize, usize, usize)> for Tensor3 {
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut f64 {
        &mut self.slices[i][(j, k)]
    }
}

impl Add for Tensor3 {
    type Output = Tensor3;

    fn add(mut self, rhs: Tensor3) -> Tensor3 {
        self += rhs;
        self
    }
}

impl AddAssign for Tensor3 {
    fn add_assign(&mut self, rhs: Tensor3) {
        for (a, b) in self.slices.iter_mut().zip(rhs.slices.iter()) {
            *a += b;
        }
    }
}

// ── TransferMap ────────────────────────────────────────────────────

/// The complete map of a single element.
///
/// `t` is `None` when the element is configured for first order.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferMap {
    /// Zeroth-order kick.
    pub d: Vector6,
    /// First-order matrix.
    pub r: Matrix6,
    /// Second-order coefficients.
    pub t: Option<Tensor3>,
}

impl TransferMap {
    /// The identity map, with a zero `T` at second order.
    pub fn identity(with_second_order: bool) -> Self {
        Self {
            d: Vector6::zeros(),
            r: Matrix6::identity(),
            t: with_second_order.then(Tensor3::zeros),
        }
    }

    /// `d + R x` for every particle column.
    pub fn linear(&self, x: &PhaseSpace) -> PhaseSpace {
        affine(&self.d, &self.r, x)
    }

    /// `d + R x + T(x, x)`, or `None` if the map has no `T`.
    pub fn second_order(&self, x: &PhaseSpace) -> Option<PhaseSpace> {
        let t = self.t.as_ref()?;
        Some(self.linear(x) + t.apply(x))
    }
}

/// `d + R x` with `d` broadcast across columns.
pub fn affine(d: &Vector6, r: &Matrix6, x: &PhaseSpace) -> PhaseSpace {
    let mut out = r * x;
    for mut col in out.column_iter_mut() {
        col += d;
    }
    out
}

// ── TruncatedMap ───────────────────────────────────────────────────

/// A composed map truncated at a coefficient index.
///
/// Coefficients above the requested index are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct TruncatedMap {
    /// Zeroth-order term (closed orbit).
    pub d: Vector6,
    /// First-order matrix, present for index >= 1.
    pub r: Option<Matrix6>,
    /// Second-order coefficients, present for index >= 2.
    pub t: Option<Tensor3>,
}

impl TruncatedMap {
    /// Starting map for a composition that keeps coefficients up to
    /// `index`, with optional explicit initial coefficients.
    pub fn initial(
        index: usize,
        d0: Option<Vector6>,
        r0: Option<Matrix6>,
        t0: Option<Tensor3>,
    ) -> Self {
        Self {
            d: d0.unwrap_or_else(Vector6::zeros),
            r: (index >= 1).then(|| r0.unwrap_or_else(Matrix6::identity)),
            t: (index >= 2).then(|| t0.unwrap_or_else(Tensor3::zeros)),
        }
    }

    /// Complete map, treating a missing `R` as the identity.
    pub fn into_transfer_map(self) -> TransferMap {
        TransferMap {
            d: self.d,
            r: self.r.unwrap_or_else(Matrix6::identity),
            t: self.t,
        }
    }
}

impl From<TransferMap> for TruncatedMap {
    fn from(m: TransferMap) -> Self {
        Self {
            d: m.d,
            r: Some(m.r),
            t: m.t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tensor() -> Tensor3 {
        let mut t = Tensor3::zeros();
        t.set_pair(0, 1, 5, -0.5);
        t[(4, 1, 1)] = 2.0;
        t
    }

    #[test]
    fn set_pair_is_symmetric() {
        let t = sample_tensor();
        assert_eq!(t[(0, 1, 5)], -0.5);
        assert_eq!(t[(0, 5, 1)], -0.5);
    }

    #[test]
    fn quadratic_matches_manual_sum() {
        let t = sample_tensor();
        let v = Vector6::new(0.0, 0.1, 0.0, 0.0, 0.0, 0.2);
        let q = t.quadratic(&v);
        assert!((q[0] - 2.0 * -0.5 * 0.1 * 0.2).abs() < 1e-15);
        assert!((q[4] - 2.0 * 0.01).abs() < 1e-15);
    }

    #[test]
    fn apply_matches_quadratic_per_column() {
        let t = sample_tensor();
        let x = PhaseSpace::from_fn(3, |i, j| 0.01 * (i + 2 * j) as f64);
        let out = t.apply(&x);
        for c in 0..3 {
            let v: Vector6 = x.column(c).into_owned();
            assert_eq!(out.column(c).into_owned(), t.quadratic(&v));
        }
    }

    #[test]
    fn congruence_with_identity_is_noop() {
        let t = sample_tensor();
        assert_eq!(t.congruence(&Matrix6::identity()), t);
        assert_eq!(t.left_mul(&Matrix6::identity()), t);
    }

    #[test]
    fn contract_last_rows_are_slice_products() {
        let t = sample_tensor();
        let v = Vector6::new(0.0, 1.0, 0.0, 0.0, 0.0, 3.0);
        let m = t.contract_last(&v);
        assert_eq!(m[(0, 1)], -1.5);
        assert_eq!(m[(0, 5)], -0.5);
        assert_eq!(m[(4, 1)], 2.0);
    }

    #[test]
    fn affine_broadcasts_offset() {
        let d = Vector6::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        let x = PhaseSpace::zeros(4);
        let out = affine(&d, &Matrix6::identity(), &x);
        assert!(out.row(0).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn initial_map_truncates_above_index() {
        let m = TruncatedMap::initial(0, None, None, None);
        assert!(m.r.is_none() && m.t.is_none());
        let m = TruncatedMap::initial(2, None, None, None);
        assert_eq!(m.r, Some(Matrix6::identity()));
        assert!(m.t.as_ref().is_some_and(Tensor3::is_zero));
    }
}
