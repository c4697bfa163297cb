//! Map contraction, closed-orbit feed-down and symplectification.
//!
//! These are the algebraic building blocks used to chain element maps
//! along a beamline. A running [`TruncatedMap`] `x` is contracted with
//! the next element map `y` to give the map of both in sequence,
//! expanded about the closed orbit `x.d`.

use crate::config::MapOrder;
use crate::error::MapError;
use crate::map::{Matrix6, TransferMap, TruncatedMap};

/// Options shared by every contraction step of one composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContractOptions {
    /// Expansion order used for feed-down and `d`.
    pub order: MapOrder,
    /// Highest coefficient index kept in the result.
    pub index: usize,
    /// Project the fed-down `R` back onto the symplectic group.
    pub symplectify: bool,
}

/// Canonical symplectic form: block diagonal `[[0, 1], [-1, 0]]` three times.
pub fn symplectic_form() -> Matrix6 {
    let mut s = Matrix6::zeros();
    for b in 0..3 {
        s[(2 * b, 2 * b + 1)] = 1.0;
        s[(2 * b + 1, 2 * b)] = -1.0;
    }
    s
}

/// Project `r` onto the symplectic group via its Cayley transform.
///
/// `V = (I - R)(I + R)^-1`, `SW = (S V^T S + V) / 2`,
/// `R' = (I - SW)(I + SW)^-1`. Already symplectic matrices are returned
/// unchanged up to rounding.
pub fn symplectify(r: &Matrix6) -> Result<Matrix6, MapError> {
    let i = Matrix6::identity();
    let s = symplectic_form();
    let inv = (i + r).try_inverse().ok_or(MapError::Singular)?;
    let v = (i - r) * inv;
    let w = (s * v.transpose() * s + v) * 0.5;
    let inv = (i + w).try_inverse().ok_or(MapError::Singular)?;
    Ok((i - w) * inv)
}

/// Symplecticity defect `|R^T S R - S|_max`.
pub fn symplectic_defect(r: &Matrix6) -> f64 {
    let s = symplectic_form();
    (r.transpose() * s * r - s).amax()
}

/// Re-express `y` about the closed orbit `x.d`.
///
/// At second order the feed-down `R += 2 sum_l T[i, k, l] d_l` is
/// added, then `R` is symplectified if requested. `d` and `T` are kept.
pub fn update_reference(
    x: &TruncatedMap,
    y: &TransferMap,
    order: MapOrder,
    symplectify_r: bool,
) -> Result<TransferMap, MapError> {
    let mut r = y.r;
    if order == MapOrder::Second {
        if let Some(t) = &y.t {
            r += t.contract_last(&x.d) * 2.0;
        }
        if symplectify_r {
            r = symplectify(&r)?;
        }
    }
    Ok(TransferMap {
        d: y.d,
        r,
        t: y.t.clone(),
    })
}

/// Contract the running map `x` with the element map `y`.
///
/// `d' = y.d + y.R x.d (+ y.T(x.d, x.d))`; for index >= 1
/// `R' = R_upd x.R`; for index >= 2 `T' = R_upd x.T + y.T(x.R, x.R)`,
/// where `R_upd` is `y.R` after [`update_reference`]. Coefficients
/// missing from `x` stay missing in the result.
pub fn contract(
    x: &TruncatedMap,
    y: &TransferMap,
    opts: ContractOptions,
) -> Result<TruncatedMap, MapError> {
    let mut d = y.d + y.r * x.d;
    let mut r = None;
    let mut t = None;
    let updated = if opts.index >= 1 {
        let updated = update_reference(x, y, opts.order, opts.symplectify)?;
        r = x.r.map(|xr| updated.r * xr);
        Some(updated)
    } else {
        None
    };
    if opts.order == MapOrder::Second {
        if let Some(yt) = &y.t {
            d += yt.quadratic(&x.d);
        }
        if opts.index >= 2 {
            if let (Some(updated), Some(xr), Some(xt)) = (&updated, &x.r, &x.t) {
                let carried = xt.left_mul(&updated.r);
                t = Some(match &y.t {
                    Some(yt) => carried + yt.congruence(xr),
                    None => carried,
                });
            }
        }
    }
    Ok(TruncatedMap { d, r, t })
}

/// Element-local step used by `local` composition: `d` from contraction
/// at index 0, `R` and `T` of `y` re-expressed about `x.d`.
pub fn localize(
    x: &TruncatedMap,
    y: &TransferMap,
    order: MapOrder,
    symplectify_r: bool,
) -> Result<TruncatedMap, MapError> {
    let stepped = contract(
        x,
        y,
        ContractOptions {
            order,
            index: 0,
            symplectify: symplectify_r,
        },
    )?;
    let updated = update_reference(x, y, order, symplectify_r)?;
    Ok(TruncatedMap {
        d: stepped.d,
        r: Some(updated.r),
        t: updated.t,
    })
}
