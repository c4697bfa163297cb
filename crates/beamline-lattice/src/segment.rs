//! Ordered sequences of lattice elements.
//!
//! A [`Segment`] owns its elements and provides selection, relabelling,
//! slicing, flattening and drift merging. Tracking lives in
//! [`tracking`](crate::tracking) and map composition in
//! [`transfer`](crate::transfer).

use std::collections::HashMap;

use beamline_core::{
    ElementError, ElementId, LabelError, PhaseSpace, SelectionError, SlicingStyle, TrackingError,
    TrackingMethod,
};
use tracing::debug;

use crate::element::Element;
use crate::kind::{DriftFlavor, ElementKind};
use crate::lattice::LatticeElement;
use crate::selector::{Criteria, Selector};

/// Result of [`Segment::get`].
#[derive(Debug)]
pub enum Selection<'a> {
    /// A single element.
    One(&'a LatticeElement),
    /// Every matching element, possibly none.
    Many(Vec<&'a LatticeElement>),
    /// A sub-segment of copies.
    Range(Segment),
}

impl<'a> Selection<'a> {
    /// The selected elements as a list.
    pub fn into_vec(self) -> Vec<&'a LatticeElement> {
        match self {
            Self::One(e) => vec![e],
            Self::Many(v) => v,
            Self::Range(_) => Vec::new(),
        }
    }
}

/// A sequence of lattice elements.
#[derive(Clone, Debug)]
pub struct Segment {
    id: ElementId,
    label: Option<String>,
    elements: Vec<LatticeElement>,
}

impl Segment {
    /// An unlabelled segment.
    pub fn new(elements: Vec<LatticeElement>) -> Self {
        Self {
            id: ElementId::next(),
            label: None,
            elements,
        }
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Instance identifier.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Replace the label.
    pub fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    /// Elements in beam order.
    pub fn elements(&self) -> &[LatticeElement] {
        &self.elements
    }

    /// Mutable elements.
    pub fn elements_mut(&mut self) -> &mut Vec<LatticeElement> {
        &mut self.elements
    }

    /// Number of direct elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the segment has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate direct elements.
    pub fn iter(&self) -> std::slice::Iter<'_, LatticeElement> {
        self.elements.iter()
    }

    /// Append an element.
    pub fn push(&mut self, element: impl Into<LatticeElement>) {
        self.elements.push(element.into());
    }

    /// Sum of element lengths.
    pub fn length(&self) -> f64 {
        self.elements.iter().map(LatticeElement::length).sum()
    }

    // ── Selection ──────────────────────────────────────────────────

    /// Select elements.
    ///
    /// An index, an instance or an occurrence gives one element. An
    /// exact label gives one element when exactly one matches and all
    /// matches otherwise. Globs, patterns and types give all matches.
    /// A range gives a sub-segment.
    pub fn get(&self, selector: &Selector) -> Result<Selection<'_>, SelectionError> {
        match selector {
            Selector::Index(_) | Selector::Instance(_) => {
                Ok(Selection::One(&self.elements[self.index_of(selector)?]))
            }
            Selector::Label(_) if !selector.is_glob() => {
                let matches = self.matching(selector)?;
                if let [i] = matches.as_slice() {
                    Ok(Selection::One(&self.elements[*i]))
                } else {
                    Ok(Selection::Many(
                        matches.into_iter().map(|i| &self.elements[i]).collect(),
                    ))
                }
            }
            Selector::Label(_) | Selector::Pattern(_) | Selector::Kind(_) => Ok(Selection::Many(
                self.matching(selector)?
                    .into_iter()
                    .map(|i| &self.elements[i])
                    .collect(),
            )),
            Selector::Occurrence(inner, n) => match self.get(inner)? {
                Selection::Many(list) => {
                    list.get(*n)
                        .copied()
                        .map(Selection::One)
                        .ok_or_else(|| SelectionError::OutOfRange {
                            selector: selector.to_string(),
                            index: *n as isize,
                            len: list.len(),
                        })
                }
                Selection::One(e) if *n == 0 => Ok(Selection::One(e)),
                Selection::One(_) => Err(SelectionError::OutOfRange {
                    selector: selector.to_string(),
                    index: *n as isize,
                    len: 1,
                }),
                Selection::Range(_) => Err(SelectionError::IllegalMatcher {
                    selector: selector.to_string(),
                }),
            },
            Selector::Range(start, stop) => {
                let (a, b) = self.bounds(start.as_deref(), stop.as_deref())?;
                Ok(Selection::Range(Segment::new(self.elements[a..b].to_vec())))
            }
        }
    }

    /// Every element `selector` picks, in order.
    pub fn select(&self, selector: &Selector) -> Result<Vec<&LatticeElement>, SelectionError> {
        Ok(self
            .positions(selector)?
            .into_iter()
            .map(|i| &self.elements[i])
            .collect())
    }

    /// Position of the single element `selector` picks.
    ///
    /// Fails with [`SelectionError::NoMatch`] if nothing matches and
    /// with [`SelectionError::Ambiguous`] if several elements match
    /// and no occurrence was given.
    pub fn index_of(&self, selector: &Selector) -> Result<usize, SelectionError> {
        match selector {
            Selector::Index(i) => self.normalize_index(selector, *i),
            Selector::Range(..) => Err(SelectionError::IllegalMatcher {
                selector: selector.to_string(),
            }),
            Selector::Occurrence(inner, n) => {
                let matches = self.matching(inner)?;
                if matches.is_empty() {
                    return Err(SelectionError::NoMatch {
                        selector: inner.to_string(),
                    });
                }
                matches
                    .get(*n)
                    .copied()
                    .ok_or_else(|| SelectionError::OutOfRange {
                        selector: selector.to_string(),
                        index: *n as isize,
                        len: matches.len(),
                    })
            }
            _ => {
                let matches = self.matching(selector)?;
                match matches.as_slice() {
                    [] => Err(SelectionError::NoMatch {
                        selector: selector.to_string(),
                    }),
                    [i] => Ok(*i),
                    many => Err(SelectionError::Ambiguous {
                        selector: selector.to_string(),
                        count: many.len(),
                    }),
                }
            }
        }
    }

    /// Positions of every element `selector` picks.
    fn positions(&self, selector: &Selector) -> Result<Vec<usize>, SelectionError> {
        match selector {
            Selector::Index(_) | Selector::Occurrence(..) | Selector::Instance(_) => {
                Ok(vec![self.index_of(selector)?])
            }
            Selector::Range(start, stop) => {
                let (a, b) = self.bounds(start.as_deref(), stop.as_deref())?;
                Ok((a..b).collect())
            }
            _ => self.matching(selector),
        }
    }

    fn matching(&self, selector: &Selector) -> Result<Vec<usize>, SelectionError> {
        let mut out = Vec::new();
        for (i, e) in self.elements.iter().enumerate() {
            if selector.matches(e)? {
                out.push(i);
            }
        }
        Ok(out)
    }

    fn normalize_index(&self, selector: &Selector, i: isize) -> Result<usize, SelectionError> {
        let len = self.elements.len();
        let pos = if i < 0 { len as isize + i } else { i };
        if pos < 0 || pos as usize >= len {
            return Err(SelectionError::OutOfRange {
                selector: selector.to_string(),
                index: i,
                len,
            });
        }
        Ok(pos as usize)
    }

    /// Half-open `[start, stop)` for a range selector.
    fn bounds(
        &self,
        start: Option<&Selector>,
        stop: Option<&Selector>,
    ) -> Result<(usize, usize), SelectionError> {
        let len = self.elements.len();
        let clamp = |i: isize| -> usize {
            if i < 0 {
                (len as isize + i).max(0) as usize
            } else {
                (i as usize).min(len)
            }
        };
        let a = match start {
            None => 0,
            Some(Selector::Index(i)) => clamp(*i),
            Some(s) => self.index_of(s)?,
        };
        let b = match stop {
            None => len,
            Some(Selector::Index(i)) => clamp(*i),
            Some(s) => self.index_of(s)? + 1,
        };
        Ok((a, b.max(a)))
    }

    // ── Editing ────────────────────────────────────────────────────

    /// Replace every selected element with a copy of `element`.
    /// Returns the number replaced.
    pub fn set(
        &mut self,
        selector: &Selector,
        element: impl Into<LatticeElement>,
    ) -> Result<usize, SelectionError> {
        let positions = self.positions(selector)?;
        if positions.is_empty() {
            return Err(SelectionError::NoMatch {
                selector: selector.to_string(),
            });
        }
        let element = element.into();
        for &i in &positions {
            self.elements[i] = element.clone();
        }
        Ok(positions.len())
    }

    /// Replace every selected element with a drift of equal length
    /// carrying its beam, label and configuration. Returns the number
    /// replaced.
    pub fn delete(&mut self, selector: &Selector) -> Result<usize, ElementError> {
        let positions = self.positions(selector)?;
        for &i in &positions {
            let old = &self.elements[i];
            let drift = Element::drift(old.length())
                .maybe_beam(old.beam().copied())
                .config(old.config().copied().unwrap_or_default())
                .maybe_label(old.label().map(str::to_owned))
                .build()?;
            self.elements[i] = drift.into();
        }
        Ok(positions.len())
    }

    /// Make every label unique, in place.
    ///
    /// Unlabelled elements become `e{i}` with `i` the one-based
    /// position. A label seen `k` times before becomes `{label}_{k+1}`.
    /// Fails if that augmented label was itself seen already.
    pub fn apply_unique_labels(&mut self) -> Result<(), LabelError> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (i, element) in self.elements.iter_mut().enumerate() {
            let mut label = element
                .label()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("e{}", i + 1));
            if let Some(count) = seen.get_mut(&label) {
                *count += 1;
                label = format!("{label}_{count}");
                if seen.contains_key(&label) {
                    return Err(LabelError::Collision { label });
                }
            }
            *seen.entry(label.clone()).or_insert(0) += 1;
            element.set_label(Some(label));
        }
        Ok(())
    }

    /// Refresh every element's cached map.
    pub fn update_transfer_maps(&mut self) -> Result<(), ElementError> {
        for e in &mut self.elements {
            e.update_transfer_map()?;
        }
        Ok(())
    }

    // ── Transformations ────────────────────────────────────────────

    /// Thin representation of every element.
    ///
    /// `n` gives the slice count per element; elements matching no
    /// rule stay thick. `style` falls back to each element's configured
    /// style.
    pub fn makethin(
        &self,
        n: &Criteria<usize>,
        style: &Criteria<SlicingStyle>,
    ) -> Result<Segment, ElementError> {
        let mut out = Vec::with_capacity(self.elements.len());
        for e in &self.elements {
            let slices = match n.find(e)? {
                Some(&k) => k,
                None => {
                    debug!(label = ?e.label(), "no slice count matched, element remains thick");
                    0
                }
            };
            if slices > 0 {
                out.push(e.makethin(slices, style.find(e)?.copied())?);
            } else {
                out.push(e.clone());
            }
        }
        Ok(Segment {
            id: ElementId::next(),
            label: self.label.clone(),
            elements: out,
        })
    }

    /// Every element with nested segments and thin elements expanded.
    /// Compound elements are kept whole.
    pub fn flatten(&self) -> Vec<&LatticeElement> {
        let mut out = Vec::new();
        flatten_into(&self.elements, &mut out);
        out
    }

    /// [`flatten`](Self::flatten) as a new segment.
    pub fn flat(&self) -> Segment {
        Segment::new(self.flatten().into_iter().cloned().collect())
    }

    /// Merge runs of consecutive plain drifts, joining labels with `_`.
    pub fn squeeze(&self) -> Result<Segment, ElementError> {
        self.squeeze_with(|labels| {
            let present: Vec<&str> = labels.iter().flatten().copied().collect();
            (!present.is_empty()).then(|| present.join("_"))
        })
    }

    /// Merge runs of consecutive plain drifts into one of their summed
    /// length, labelled by `labeler`. The merged drift takes the first
    /// drift's beam and configuration. Single drifts are kept as is.
    pub fn squeeze_with(
        &self,
        labeler: impl Fn(&[Option<&str>]) -> Option<String>,
    ) -> Result<Segment, ElementError> {
        let mut out = Vec::with_capacity(self.elements.len());
        let mut run: Vec<&Element> = Vec::new();
        for e in &self.elements {
            match e {
                LatticeElement::Element(el)
                    if matches!(el.kind(), ElementKind::Drift(DriftFlavor::Plain)) =>
                {
                    run.push(el);
                }
                other => {
                    flush_drifts(&mut run, &labeler, &mut out)?;
                    out.push(other.clone());
                }
            }
        }
        flush_drifts(&mut run, &labeler, &mut out)?;
        Ok(Segment {
            id: ElementId::next(),
            label: self.label.clone(),
            elements: out,
        })
    }

    /// Track through every element with one built-in method, without
    /// aperture checks.
    pub fn track_each(
        &self,
        method: TrackingMethod,
        x: &PhaseSpace,
    ) -> Result<PhaseSpace, TrackingError> {
        let mut x = x.clone();
        for e in &self.elements {
            x = e.track(method, &x)?;
        }
        Ok(x)
    }
}

fn flatten_into<'a>(elements: &'a [LatticeElement], out: &mut Vec<&'a LatticeElement>) {
    for e in elements {
        match e {
            LatticeElement::Segment(s) => flatten_into(s.elements(), out),
            LatticeElement::Thin(t) => flatten_into(t.slices().elements(), out),
            other => out.push(other),
        }
    }
}

fn flush_drifts(
    run: &mut Vec<&Element>,
    labeler: &impl Fn(&[Option<&str>]) -> Option<String>,
    out: &mut Vec<LatticeElement>,
) -> Result<(), ElementError> {
    match run.as_slice() {
        [] => {}
        [single] => out.push((*single).clone().into()),
        [first, ..] => {
            let labels: Vec<Option<&str>> = run.iter().map(|d| d.label()).collect();
            let merged = Element::drift(run.iter().map(|d| d.length()).sum())
                .maybe_beam(first.beam().copied())
                .config(*first.config())
                .maybe_label(labeler(&labels))
                .build()?;
            out.push(merged.into());
        }
    }
    run.clear();
    Ok(())
}

impl FromIterator<LatticeElement> for Segment {
    fn from_iter<I: IntoIterator<Item = LatticeElement>>(iter: I) -> Self {
        Segment::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Segment {
    type Item = &'a LatticeElement;
    type IntoIter = std::slice::Iter<'a, LatticeElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::ElementType;
    use beamline_core::BeamReference;

    fn beam() -> BeamReference {
        BeamReference::new(0.6, 1.25).unwrap()
    }

    fn drift(l: f64, label: Option<&str>) -> LatticeElement {
        Element::drift(l)
            .beam(beam())
            .maybe_label(label.map(str::to_owned))
            .build()
            .unwrap()
            .into()
    }

    fn quad(label: &str) -> LatticeElement {
        Element::quadrupole(0.1, 1.0)
            .beam(beam())
            .label(label)
            .build()
            .unwrap()
            .into()
    }

    fn labels(s: &Segment) -> Vec<Option<String>> {
        s.iter().map(|e| e.label().map(str::to_owned)).collect()
    }

    fn sample() -> Segment {
        Segment::new(vec![
            drift(1.0, Some("d1")),
            quad("qf"),
            drift(2.0, Some("d2")),
            quad("qd"),
            drift(1.0, Some("d1")),
        ])
    }

    #[test]
    fn unique_labels_for_unlabelled() {
        let mut s = Segment::new(vec![drift(1.0, None), drift(1.0, None)]);
        s.apply_unique_labels().unwrap();
        assert_eq!(labels(&s), vec![Some("e1".into()), Some("e2".into())]);
    }

    #[test]
    fn unique_labels_for_repeats() {
        let mut s = Segment::new(vec![drift(1.0, Some("a")), drift(1.0, Some("a"))]);
        s.apply_unique_labels().unwrap();
        assert_eq!(labels(&s), vec![Some("a".into()), Some("a_2".into())]);
    }

    #[test]
    fn unique_labels_collision() {
        let mut s = Segment::new(vec![
            drift(1.0, Some("a")),
            drift(1.0, Some("a_2")),
            drift(1.0, Some("a")),
        ]);
        assert_eq!(
            s.apply_unique_labels().unwrap_err(),
            LabelError::Collision {
                label: "a_2".into()
            }
        );
    }

    #[test]
    fn get_by_index() {
        let s = sample();
        let Selection::One(e) = s.get(&Selector::Index(-1)).unwrap() else {
            panic!("expected one");
        };
        assert_eq!(e.label(), Some("d1"));
        assert!(matches!(
            s.get(&Selector::Index(5)),
            Err(SelectionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn get_by_label() {
        let s = sample();
        assert!(matches!(s.get(&"qf".into()).unwrap(), Selection::One(_)));
        let Selection::Many(ds) = s.get(&"d1".into()).unwrap() else {
            panic!("expected many");
        };
        assert_eq!(ds.len(), 2);
        let Selection::Many(qs) = s.get(&"q*".into()).unwrap() else {
            panic!("expected many");
        };
        assert_eq!(qs.len(), 2);
        // a glob with exactly one match is still many
        assert!(matches!(s.get(&"qf*".into()).unwrap(), Selection::Many(v) if v.len() == 1));
    }

    #[test]
    fn get_by_kind_and_occurrence() {
        let s = sample();
        let Selection::One(e) = s
            .get(&Selector::Kind(ElementType::Quadrupole).nth(1))
            .unwrap()
        else {
            panic!("expected one");
        };
        assert_eq!(e.label(), Some("qd"));
        assert!(s.get(&Selector::from("qf").nth(0)).is_ok());
        assert!(matches!(
            s.get(&Selector::from("qf").nth(1)),
            Err(SelectionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn index_of_errors() {
        let s = sample();
        assert_eq!(s.index_of(&"qd".into()).unwrap(), 3);
        assert_eq!(s.index_of(&Selector::from("d1").nth(1)).unwrap(), 4);
        assert!(matches!(
            s.index_of(&"d1".into()),
            Err(SelectionError::Ambiguous { count: 2, .. })
        ));
        assert!(matches!(
            s.index_of(&"nope".into()),
            Err(SelectionError::NoMatch { .. })
        ));
    }

    #[test]
    fn range_selection() {
        let s = sample();
        let Selection::Range(sub) = s
            .get(&Selector::range(Some("qf".into()), Some("qd".into())))
            .unwrap()
        else {
            panic!("expected range");
        };
        assert_eq!(labels(&sub), vec![Some("qf".into()), Some("d2".into()), Some("qd".into())]);
        let Selection::Range(sub) = s
            .get(&Selector::range(Some(Selector::Index(1)), Some(Selector::Index(3))))
            .unwrap()
        else {
            panic!("expected range");
        };
        assert_eq!(sub.len(), 2);
        let Selection::Range(sub) = s
            .get(&Selector::range(Some(Selector::Index(-2)), None))
            .unwrap()
        else {
            panic!("expected range");
        };
        assert_eq!(sub.len(), 2);
    }

    #[test]
    fn set_replaces_every_match() {
        let mut s = sample();
        let marker = Element::marker().label("m").build().unwrap();
        assert_eq!(s.set(&"d1".into(), marker).unwrap(), 2);
        assert_eq!(s.elements()[0].label(), Some("m"));
        assert_eq!(s.elements()[4].label(), Some("m"));
    }

    #[test]
    fn delete_preserves_length() {
        let mut s = sample();
        let before = s.length();
        assert_eq!(s.delete(&Selector::Kind(ElementType::Quadrupole)).unwrap(), 2);
        assert_eq!(s.length(), before);
        assert!(s.iter().all(LatticeElement::is_drift));
        assert_eq!(s.elements()[1].label(), Some("qf"));
    }

    #[test]
    fn flatten_expands_nested() {
        let inner = Segment::new(vec![quad("q1"), drift(1.0, Some("d"))]);
        let thin = match quad("q2").makethin(2, None).unwrap() {
            LatticeElement::Thin(t) => t,
            _ => unreachable!(),
        };
        let s = Segment::new(vec![inner.into(), thin.into(), drift(1.0, Some("end"))]);
        let flat = s.flat();
        assert_eq!(flat.len(), 2 + 5 + 1);
        assert!((flat.length() - s.length()).abs() < 1e-12);
    }

    #[test]
    fn squeeze_merges_drift_runs() {
        let s = Segment::new(vec![
            drift(1.0, Some("a")),
            drift(2.0, Some("b")),
            quad("q"),
            drift(0.5, Some("c")),
            drift(0.5, None),
            drift(0.5, Some("e")),
        ]);
        let sq = s.squeeze().unwrap();
        assert_eq!(
            labels(&sq),
            vec![Some("a_b".into()), Some("q".into()), Some("c_e".into())]
        );
        assert_eq!(sq.elements()[0].length(), 3.0);
        assert!((sq.length() - s.length()).abs() < 1e-12);
    }

    #[test]
    fn squeeze_keeps_single_drifts_and_monitors() {
        let m: LatticeElement = Element::monitor(1.0).beam(beam()).label("m").build().unwrap().into();
        let s = Segment::new(vec![drift(1.0, Some("a")), m, drift(1.0, Some("b"))]);
        let sq = s.squeeze().unwrap();
        assert_eq!(sq.len(), 3);
        assert_eq!(sq.elements()[0].id(), s.elements()[0].id());
    }

    #[test]
    fn makethin_with_criteria() {
        let s = sample();
        let thin = s
            .makethin(
                &Criteria::new().rule("qf", 4),
                &Criteria::uniform(SlicingStyle::Simple),
            )
            .unwrap();
        assert!(matches!(thin.elements()[1], LatticeElement::Thin(_)));
        assert!(matches!(thin.elements()[3], LatticeElement::Element(_)));
        assert!((thin.length() - s.length()).abs() < 1e-12);
    }
}
