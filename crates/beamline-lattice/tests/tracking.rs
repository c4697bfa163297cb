//! End-to-end tracking through segments.

use std::sync::Arc;

use beamline_core::{PhaseSpace, TrackingError, TrackingMethod};
use beamline_lattice::tracking::CustomMethod;
use beamline_lattice::{
    Aperture, Criteria, Element, LatticeElement, LossRecord, MapOptions, Method, Observe, RecLoss,
    Segment, Selector, TrackOptions,
};
use beamline_test_utils::fixtures::{bend_cell, fodo_cell, fodo_ring};
use beamline_test_utils::{assert_allclose, random_bunch, standard_beam};

fn drift(label: &str, aperture: Option<Aperture>) -> LatticeElement {
    Element::drift(1.0)
        .beam(standard_beam())
        .label(label)
        .maybe_aperture(aperture)
        .build()
        .unwrap()
        .into()
}

fn single(x: f64) -> PhaseSpace {
    let mut p = PhaseSpace::zeros(1);
    p[(0, 0)] = x;
    p
}

#[test]
fn all_particles_lost_history_has_empty_bunches() {
    let s = Segment::new(vec![
        drift("d1", None),
        drift("d2", Some(Aperture::circle(1e-6))),
        drift("d3", None),
    ]);
    let out = s
        .forward(
            &single(1e-3),
            &TrackOptions {
                aperture: true,
                observe: Observe::All,
                ..TrackOptions::new(TrackingMethod::Linear)
            },
        )
        .unwrap();
    let history = out.history.unwrap();
    let shapes: Vec<_> = history.values().map(|x| x.shape()).collect();
    assert_eq!(shapes, vec![(6, 1), (6, 0), (6, 0)]);
    assert_eq!(out.x.ncols(), 0);
}

#[test]
fn particle_on_aperture_boundary_survives() {
    let s = Segment::new(vec![drift("d", Some(Aperture::circle(1e-3)))]);
    let out = s
        .forward(
            &single(1e-3),
            &TrackOptions {
                aperture: true,
                ..TrackOptions::new(TrackingMethod::Exact)
            },
        )
        .unwrap();
    assert_eq!(out.x.ncols(), 1);
}

#[test]
fn recorded_losses_per_element_and_summed() {
    let s = Segment::new(vec![
        drift("wide", Some(Aperture::circle(1.0))),
        drift("narrow", Some(Aperture::circle(1e-6))),
    ]);
    let x = random_bunch(10, 3, 1e-3);

    let per = s
        .forward(
            &x,
            &TrackOptions {
                recloss: RecLoss::All,
                ..TrackOptions::new(TrackingMethod::Linear)
            },
        )
        .unwrap();
    let Some(LossRecord::PerElement(record)) = per.loss else {
        panic!("expected per-element losses");
    };
    assert_eq!(record.keys().collect::<Vec<_>>(), vec!["wide", "narrow"]);
    assert!(record["wide"].iter().all(|l| *l == 0.0));
    assert_eq!(record["narrow"].len(), 10);
    assert!(record["narrow"].iter().all(|l| *l > 0.0));

    let summed = s
        .forward(
            &x,
            &TrackOptions {
                recloss: RecLoss::Sum,
                ..TrackOptions::new(TrackingMethod::Linear)
            },
        )
        .unwrap();
    let Some(LossRecord::Sum(total)) = summed.loss else {
        panic!("expected summed loss");
    };
    let expected: f64 = record["narrow"].iter().sum();
    assert!((total - expected).abs() <= 1e-12 * expected.abs());
    assert_eq!(summed.x.ncols(), 0);
}

#[test]
fn loss_function_is_applied_before_recording() {
    let s = Segment::new(vec![drift("narrow", Some(Aperture::circle(1e-6)))]);
    let out = s
        .forward(
            &random_bunch(4, 1, 1e-3),
            &TrackOptions {
                recloss: RecLoss::Selected(vec![Selector::from("narrow")]),
                loss_func: Some(Arc::new(|l: &[f64]| -> Vec<f64> { vec![1.0; l.len()] })),
                ..TrackOptions::new(TrackingMethod::Linear)
            },
        )
        .unwrap();
    let Some(LossRecord::PerElement(record)) = out.loss else {
        panic!("expected per-element losses");
    };
    assert_eq!(record["narrow"], vec![1.0; 4]);
}

#[test]
fn observed_history_follows_selectors() {
    let ring = fodo_ring(2).unwrap();
    let out = ring
        .forward(
            &random_bunch(5, 9, 1e-4),
            &TrackOptions {
                observe: Observe::Selected(vec![Selector::from("qf*")]),
                ..TrackOptions::new(TrackingMethod::Linear)
            },
        )
        .unwrap();
    let history = out.history.unwrap();
    assert_eq!(history.keys().collect::<Vec<_>>(), vec!["qf", "qf_2"]);
}

#[test]
fn custom_method_is_used_for_matching_elements() {
    let cell = fodo_cell().unwrap();
    let identity: CustomMethod = Arc::new(
        |_: &LatticeElement, x: &PhaseSpace| -> Result<PhaseSpace, TrackingError> { Ok(x.clone()) },
    );
    let criteria = Criteria::new()
        .rule("q*", Method::Custom(identity))
        .default_value(Method::Named(TrackingMethod::Linear));
    let x = random_bunch(6, 11, 1e-4);
    let out = cell.forward(&x, &TrackOptions::with_criteria(criteria)).unwrap();

    let drifts = Segment::new(vec![cell.elements()[1].clone(), cell.elements()[3].clone()]);
    let expected = drifts.exact(&x).unwrap();
    assert_allclose(&out.x, &expected, 1e-12, 1e-18);
}

#[test]
fn no_matching_method_is_an_error() {
    let cell = fodo_cell().unwrap();
    let criteria = Criteria::new().rule("q*", Method::Named(TrackingMethod::Linear));
    let err = cell
        .forward(
            &random_bunch(2, 0, 1e-4),
            &TrackOptions {
                exact_drift: false,
                ..TrackOptions::with_criteria(criteria)
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        TrackingError::NoMethod {
            label: Some("d1".into())
        }
    );
}

#[test]
fn compound_bend_tracks_like_its_map() {
    let cell = bend_cell(0.05).unwrap();
    let x = random_bunch(8, 5, 1e-4);
    let tracked = cell
        .forward(
            &x,
            &TrackOptions {
                exact_drift: false,
                ..TrackOptions::new(TrackingMethod::Linear)
            },
        )
        .unwrap()
        .x;
    let map = cell
        .reduce_transfer_map(&MapOptions {
            symplectify: false,
            ..MapOptions::default()
        })
        .unwrap()
        .into_transfer_map();
    assert_allclose(&tracked, &map.linear(&x), 1e-10, 1e-16);
}

#[test]
fn thin_lattice_tracks_close_to_thick() {
    let cell = fodo_cell().unwrap();
    let thin = cell.makethin(&Criteria::uniform(16), &Criteria::new()).unwrap();
    let x = random_bunch(8, 21, 1e-4);
    let thick = cell.linear(&x).unwrap();
    let sliced = thin.linear(&x).unwrap();
    assert_allclose(&sliced, &thick, 0.0, 1e-6);
}
