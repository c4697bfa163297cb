//! Transfer-map composition along a segment.
//!
//! Three modes share one contraction kernel:
//!
//! | Mode | Result |
//! |------|--------|
//! | [`MapMethod::Accumulate`] | map from the segment entrance to each element exit |
//! | [`MapMethod::Reduce`] | the single map of the whole segment |
//! | [`MapMethod::Local`] | each element's own map about the running closed orbit |
//!
//! Nested segments and thin elements are reduced into one map starting
//! from the running orbit. Alignment errors contribute their entrance
//! map, their target, then their exit map; when unfolded each of these
//! is reported separately.

use std::fmt;
use std::str::FromStr;

use beamline_core::{
    contract, localize, ContractOptions, MapError, MapOrder, Matrix6, Tensor3, TransferMap,
    TruncatedMap, Vector6,
};
use tracing::trace;

use crate::lattice::LatticeElement;
use crate::segment::Segment;

/// Composition mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MapMethod {
    /// Running product up to each element.
    Accumulate,
    /// Product of the whole segment.
    Reduce,
    /// Element-local maps about the closed orbit.
    Local,
}

impl MapMethod {
    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accumulate => "accumulate",
            Self::Reduce => "reduce",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for MapMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapMethod {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accumulate" => Ok(Self::Accumulate),
            "reduce" => Ok(Self::Reduce),
            "local" => Ok(Self::Local),
            other => Err(MapError::UnknownMethod {
                method: other.to_string(),
            }),
        }
    }
}

/// Options for [`Segment::compute_transfer_maps`].
#[derive(Clone, Debug, PartialEq)]
pub struct MapOptions {
    /// Expansion order of the contraction.
    pub order: MapOrder,
    /// Highest coefficient kept; defaults to the order.
    pub index: Option<usize>,
    /// Symplectify fed-down matrices.
    pub symplectify: bool,
    /// Report alignment entrance and exit maps separately.
    pub unfold_alignment_errors: bool,
    /// Closed orbit at the segment entrance.
    pub d0: Option<Vector6>,
    /// Initial first-order coefficients.
    pub r0: Option<Matrix6>,
    /// Initial second-order coefficients.
    pub t0: Option<Tensor3>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            order: MapOrder::Second,
            index: None,
            symplectify: true,
            unfold_alignment_errors: false,
            d0: None,
            r0: None,
            t0: None,
        }
    }
}

/// Options for [`Segment::transfer_maps`].
#[derive(Clone, Debug, PartialEq)]
pub struct TransferMapsOptions {
    /// Expansion order of the contraction.
    pub order: MapOrder,
    /// Coefficients to report; defaults to every index up to the order.
    pub indices: Option<Vec<usize>>,
    /// Symplectify fed-down matrices.
    pub symplectify: bool,
    /// Attach element labels; ignored for [`MapMethod::Reduce`].
    pub labels: bool,
    /// Report alignment entrance and exit maps separately.
    pub unfold_alignment_errors: bool,
    /// Closed orbit at the segment entrance.
    pub d0: Option<Vector6>,
    /// Initial first-order coefficients.
    pub r0: Option<Matrix6>,
    /// Initial second-order coefficients.
    pub t0: Option<Tensor3>,
}

impl Default for TransferMapsOptions {
    fn default() -> Self {
        Self {
            order: MapOrder::Second,
            indices: None,
            symplectify: true,
            labels: false,
            unfold_alignment_errors: false,
            d0: None,
            r0: None,
            t0: None,
        }
    }
}

/// A map with only the requested coefficients, optionally labelled.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelledMap {
    /// Label of the element the map belongs to.
    pub label: Option<String>,
    /// Zeroth order, if requested.
    pub d: Option<Vector6>,
    /// First order, if requested.
    pub r: Option<Matrix6>,
    /// Second order, if requested.
    pub t: Option<Tensor3>,
}

struct Composer {
    method: MapMethod,
    order: MapOrder,
    index: usize,
    symplectify: bool,
    unfold: bool,
}

impl Composer {
    fn process(&self, x: &TruncatedMap, y: &TransferMap) -> Result<TruncatedMap, MapError> {
        match self.method {
            MapMethod::Local => localize(x, y, self.order, self.symplectify),
            MapMethod::Accumulate | MapMethod::Reduce => contract(
                x,
                y,
                ContractOptions {
                    order: self.order,
                    index: self.index,
                    symplectify: self.symplectify,
                },
            ),
        }
    }

    /// Maps produced by one element starting from `x`; the last one is
    /// the new running map.
    fn handle(
        &self,
        x: &TruncatedMap,
        y: &LatticeElement,
        out: &mut Vec<TruncatedMap>,
    ) -> Result<TruncatedMap, MapError> {
        trace!(method = %self.method, label = ?y.label(), "composing element");
        let next = match y {
            LatticeElement::Alignment(a) => {
                let entered = self.process(x, a.transfer_map_enter())?;
                if self.unfold {
                    out.push(entered.clone());
                }
                let mut inner = Vec::new();
                let through = self.handle(&entered, a.target(), &mut inner)?;
                if self.unfold {
                    out.extend(inner);
                }
                self.process(&through, a.transfer_map_exit())?
            }
            LatticeElement::Element(e) => self.process(x, e.transfer_map()?)?,
            LatticeElement::Compound(c) => self.process(x, &c.transfer_map()?)?,
            LatticeElement::Segment(s) => self.nested(x, s)?,
            LatticeElement::Thin(t) => self.nested(x, t.slices())?,
        };
        out.push(next.clone());
        Ok(next)
    }

    fn nested(&self, x: &TruncatedMap, segment: &Segment) -> Result<TruncatedMap, MapError> {
        let local = self.method == MapMethod::Local;
        let opts = MapOptions {
            order: self.order,
            index: Some(self.index),
            symplectify: self.symplectify,
            unfold_alignment_errors: false,
            d0: Some(x.d),
            r0: if local { None } else { x.r },
            t0: if local { None } else { x.t.clone() },
        };
        segment.reduce_transfer_map(&opts)
    }
}

impl Segment {
    /// Compose element maps according to `method`.
    ///
    /// Accumulate and local give one map per element (more when
    /// alignment errors are unfolded); reduce gives exactly one.
    pub fn compute_transfer_maps(
        &self,
        method: MapMethod,
        opts: &MapOptions,
    ) -> Result<Vec<TruncatedMap>, MapError> {
        let (last, mut out) = self.compose(method, opts)?;
        if method == MapMethod::Reduce {
            out.push(last);
        }
        Ok(out)
    }

    /// The map of the whole segment; the initial map if it is empty.
    pub fn reduce_transfer_map(&self, opts: &MapOptions) -> Result<TruncatedMap, MapError> {
        self.compose(MapMethod::Reduce, opts).map(|(last, _)| last)
    }

    /// Final running map, plus every intermediate one unless reducing.
    fn compose(
        &self,
        method: MapMethod,
        opts: &MapOptions,
    ) -> Result<(TruncatedMap, Vec<TruncatedMap>), MapError> {
        let order = opts.order.as_usize();
        let index = opts.index.unwrap_or(order);
        if index > order {
            return Err(MapError::IndexAboveOrder { index, order });
        }
        let composer = Composer {
            method,
            order: opts.order,
            index,
            symplectify: opts.symplectify,
            unfold: opts.unfold_alignment_errors,
        };
        let mut x = TruncatedMap::initial(index, opts.d0, opts.r0, opts.t0.clone());
        let mut out = Vec::new();
        for element in self.iter() {
            let mut stream = Vec::new();
            x = composer.handle(&x, element, &mut stream)?;
            if method != MapMethod::Reduce {
                out.extend(stream);
            }
        }
        Ok((x, out))
    }

    /// Compose maps and keep only the requested coefficients.
    ///
    /// With unfolded alignment errors, an element wrapped in `k` layers
    /// contributes `2k + 1` maps, each carrying the element's label.
    pub fn transfer_maps(
        &self,
        method: MapMethod,
        opts: &TransferMapsOptions,
    ) -> Result<Vec<LabelledMap>, MapError> {
        let order = opts.order.as_usize();
        let indices = opts
            .indices
            .clone()
            .unwrap_or_else(|| (0..=order).collect());
        let max = indices.iter().copied().max().unwrap_or(0);
        if max > order {
            return Err(MapError::IndexAboveOrder { index: max, order });
        }
        let maps = self.compute_transfer_maps(
            method,
            &MapOptions {
                order: opts.order,
                index: Some(max),
                symplectify: opts.symplectify,
                unfold_alignment_errors: opts.unfold_alignment_errors,
                d0: opts.d0,
                r0: opts.r0,
                t0: opts.t0.clone(),
            },
        )?;

        let labels: Vec<Option<String>> = if opts.labels && method != MapMethod::Reduce {
            self.iter()
                .flat_map(|e| {
                    let repeat = match e {
                        LatticeElement::Alignment(a) if opts.unfold_alignment_errors => {
                            2 * a.layers().len() + 1
                        }
                        _ => 1,
                    };
                    std::iter::repeat_n(e.label().map(str::to_owned), repeat)
                })
                .collect()
        } else {
            vec![None; maps.len()]
        };

        Ok(maps
            .into_iter()
            .zip(labels)
            .map(|(m, label)| LabelledMap {
                label,
                d: indices.contains(&0).then_some(m.d),
                r: if indices.contains(&1) { m.r } else { None },
                t: if indices.contains(&2) { m.t } else { None },
            })
            .collect())
    }
}
