//! Closed-form transfer-map coefficients of each element kind.

use beamline_core::{BeamReference, ElementError, MapOrder, Matrix6, Tensor3, TransferMap, Vector6};

use crate::kind::{Dipedge, ElementKind, Quadrupole, SBendBody, Sextupole};

/// Compute `(d, R, T)` for an element of length `l`.
///
/// `T` is `None` at first order. Kinds that need the reference beam fail
/// with [`ElementError::MissingBeam`] when `beam` is `None`.
pub(crate) fn compute_map(
    kind: &ElementKind,
    l: f64,
    beam: Option<&BeamReference>,
    order: MapOrder,
) -> Result<TransferMap, ElementError> {
    let second = order == MapOrder::Second;
    let mut map = match kind {
        ElementKind::Marker => TransferMap::identity(second),
        ElementKind::Drift(_) => drift_or_identity(kind, l, beam, second)?,
        ElementKind::Kicker(k) => {
            let mut map = drift_or_identity(kind, l, beam, second)?;
            map.d[1] = k.hkick.value + k.dkh.value;
            map.d[3] = k.vkick.value + k.dkv.value;
            map
        }
        ElementKind::Quadrupole(q) => quadrupole(q, l, require_beam(kind, beam)?)?,
        ElementKind::ThinQuadrupole(q) => {
            let k1l = q.k1l.value + q.dk1l.value;
            let mut map = TransferMap::identity(second);
            map.r[(1, 0)] = -k1l;
            map.r[(3, 2)] = k1l;
            map
        }
        ElementKind::Sextupole(s) => sextupole(s, l, require_beam(kind, beam)?),
        ElementKind::ThinSextupole(s) => {
            let k2l = s.k2l.value + s.dk2l.value;
            let mut map = TransferMap::identity(true);
            if let Some(t) = map.t.as_mut() {
                t[(1, 0, 0)] = -k2l / 2.0;
                t[(1, 2, 2)] = k2l / 2.0;
                t.set_pair(3, 0, 2, k2l / 2.0);
            }
            map
        }
        ElementKind::SBendBody(b) => sbend_body(b, l, require_beam(kind, beam)?, second)?,
        ElementKind::Dipedge(e) => dipedge(e),
    };
    if !second {
        map.t = None;
    }
    Ok(map)
}

fn require_beam<'a>(
    kind: &ElementKind,
    beam: Option<&'a BeamReference>,
) -> Result<&'a BeamReference, ElementError> {
    beam.ok_or(ElementError::MissingBeam { kind: kind.name() })
}

fn drift_or_identity(
    kind: &ElementKind,
    l: f64,
    beam: Option<&BeamReference>,
    second: bool,
) -> Result<TransferMap, ElementError> {
    if l > 0.0 {
        Ok(drift(l, require_beam(kind, beam)?))
    } else {
        Ok(TransferMap::identity(second))
    }
}

/// Drift map of length `l`; always carries `T`.
pub(crate) fn drift(l: f64, beam: &BeamReference) -> TransferMap {
    let beta = beam.beta();
    let bg2 = beam.beta_gamma_sq();
    let mut r = Matrix6::identity();
    r[(0, 1)] = l;
    r[(2, 3)] = l;
    r[(4, 5)] = l / bg2;
    let mut t = Tensor3::zeros();
    t.set_pair(0, 1, 5, -0.5 * l / beta);
    t.set_pair(2, 3, 5, -0.5 * l / beta);
    t[(4, 1, 1)] = -0.5 * l / beta;
    t[(4, 3, 3)] = -0.5 * l / beta;
    t[(4, 5, 5)] = -1.5 * l / beta / bg2;
    TransferMap {
        d: Vector6::zeros(),
        r,
        t: Some(t),
    }
}

fn quadrupole(q: &Quadrupole, l: f64, beam: &BeamReference) -> Result<TransferMap, ElementError> {
    let k1 = q.k1.plus(q.dk1);
    if k1.value == 0.0 {
        if k1.variable {
            return Err(ElementError::ZeroGradient);
        }
        return Ok(drift(l, beam));
    }
    let k1 = k1.value;
    let beta = beam.beta();
    let bg2 = beam.beta_gamma_sq();

    let w = k1.abs().sqrt();
    let (mut cx, mut sx) = ((w * l).cos(), (w * l).sin() / w);
    let (mut cy, mut sy) = ((w * l).cosh(), (w * l).sinh() / w);
    if k1 < 0.0 {
        std::mem::swap(&mut cx, &mut cy);
        std::mem::swap(&mut sx, &mut sy);
    }

    let mut r = Matrix6::identity();
    r[(0, 0)] = cx;
    r[(0, 1)] = sx;
    r[(1, 0)] = -k1 * sx;
    r[(1, 1)] = cx;
    r[(2, 2)] = cy;
    r[(2, 3)] = sy;
    r[(3, 2)] = k1 * sy;
    r[(3, 3)] = cy;
    r[(4, 5)] = l / bg2;

    let f = 0.25 / beta;
    let c005 = k1 * l * sx * f;
    let c225 = -k1 * l * sy * f;
    let mut t = Tensor3::zeros();
    t.set_pair(0, 0, 5, c005);
    t.set_pair(0, 1, 5, -(sx + l * cx) * f);
    t.set_pair(1, 0, 5, -k1 * (sx - l * cx) * f);
    t.set_pair(1, 1, 5, c005);
    t.set_pair(2, 2, 5, c225);
    t.set_pair(2, 3, 5, -(sy + l * cy) * f);
    t.set_pair(3, 2, 5, k1 * (sy - l * cy) * f);
    t.set_pair(3, 3, 5, c225);
    t[(4, 0, 0)] = -k1 * (l - sx * cx) * f;
    t.set_pair(4, 0, 1, k1 * sx * sx * f);
    t[(4, 1, 1)] = -(l + sx * cx) * f;
    t[(4, 2, 2)] = k1 * (l - sy * cy) * f;
    t.set_pair(4, 2, 3, -k1 * sy * sy * f);
    t[(4, 3, 3)] = -(l + sy * cy) * f;
    t[(4, 5, 5)] = -1.5 * l / beta / bg2;

    Ok(TransferMap {
        d: Vector6::zeros(),
        r,
        t: Some(t),
    })
}

fn sextupole(s: &Sextupole, l: f64, beam: &BeamReference) -> TransferMap {
    let mut map = drift(l, beam);
    let k2l = (s.k2.value + s.dk2.value) * l;
    let c1 = k2l / 2.0;
    let c2 = c1 * l / 2.0;
    let c3 = c2 * l / 3.0;
    let c4 = c3 * l / 4.0;
    if let Some(t) = map.t.as_mut() {
        t[(0, 0, 0)] = -c2;
        t.set_pair(0, 0, 1, -c3);
        t[(0, 1, 1)] = -2.0 * c4;
        t[(0, 2, 2)] = c2;
        t.set_pair(0, 2, 3, c3);
        t[(0, 3, 3)] = 2.0 * c4;

        t[(1, 0, 0)] = -c1;
        t.set_pair(1, 0, 1, -c2);
        t[(1, 1, 1)] = -2.0 * c3;
        t[(1, 2, 2)] = c1;
        t.set_pair(1, 2, 3, c2);
        t[(1, 3, 3)] = 2.0 * c3;

        t.set_pair(2, 0, 2, c2);
        t.set_pair(2, 0, 3, c3);
        t.set_pair(2, 1, 2, c3);
        t.set_pair(2, 1, 3, 2.0 * c4);

        t.set_pair(3, 0, 2, c1);
        t.set_pair(3, 0, 3, c2);
        t.set_pair(3, 1, 2, c2);
        t.set_pair(3, 1, 3, 2.0 * c3);
    }
    map
}

fn sbend_body(
    b: &SBendBody,
    l: f64,
    beam: &BeamReference,
    second: bool,
) -> Result<TransferMap, ElementError> {
    let angle = b.angle.value;
    let dh = b.dk0.value;
    let beta = beam.beta();
    let bg2 = beam.beta_gamma_sq();

    if angle == 0.0 {
        let mut map = drift(l, beam);
        if dh != 0.0 {
            map.d[0] = -0.5 * dh * l * l;
            map.d[1] = -dh * l;
            if second {
                map.d[4] -= dh * dh * l.powi(3) / 6.0 / beta;
                map.r[(0, 5)] += 0.5 * dh * l * l / beta;
                map.r[(4, 1)] += 0.5 * dh * l * l / beta;
            }
        }
        return Ok(map);
    }
    if l <= 0.0 {
        return Err(ElementError::ZeroLengthBend { angle });
    }

    let k0 = angle / l;
    let (sx, cx) = angle.sin_cos();

    let mut r = Matrix6::identity();
    r[(0, 0)] = cx;
    r[(0, 1)] = sx / k0;
    r[(0, 5)] = (1.0 - cx) / (k0 * beta);
    r[(1, 0)] = -k0 * sx;
    r[(1, 1)] = cx;
    r[(1, 5)] = sx / beta;
    r[(2, 3)] = l;
    r[(4, 0)] = -sx / beta;
    r[(4, 1)] = (cx - 1.0) / (k0 * beta);
    r[(4, 5)] = l / bg2 - (k0 * l - sx) / (k0 * beta * beta);

    let mut t = Tensor3::zeros();
    t[(0, 0, 0)] = -0.5 * k0 * sx * sx;
    t.set_pair(0, 0, 1, 0.5 * cx * sx);
    t.set_pair(0, 0, 5, 0.5 * sx * sx / beta);
    t[(0, 1, 1)] = 0.5 * cx * (1.0 - cx) / k0;
    t.set_pair(0, 1, 5, -0.5 * sx * cx / k0 / beta);
    t[(0, 3, 3)] = -0.5 * (1.0 - cx) / k0;
    t[(0, 5, 5)] = -0.5 * sx * sx / k0 / beta / beta - 0.5 * (1.0 - cx) / k0 / bg2;
    t[(1, 1, 1)] = -0.5 * sx;
    t[(1, 3, 3)] = -0.5 * sx;
    t[(1, 5, 5)] = -0.5 * sx / bg2;
    t.set_pair(2, 0, 3, 0.5 * sx);
    t.set_pair(2, 1, 3, 0.5 * (1.0 - cx) / k0);
    t.set_pair(2, 3, 5, -0.5 * sx / k0 / beta);
    t.set_pair(4, 0, 5, 0.5 * sx / bg2);
    t[(4, 1, 1)] = -0.5 * sx / beta / k0;
    t.set_pair(4, 1, 5, 0.5 * (1.0 - cx) / k0 / bg2);
    t[(4, 3, 3)] = -0.5 * sx / k0 / beta;
    t[(4, 5, 5)] = -1.5 * sx / k0 / bg2 / beta;

    let mut d = Vector6::zeros();
    if dh != 0.0 {
        let chord = sx / k0 - l;
        d[0] = -dh * (1.0 - cx) / (k0 * k0);
        d[1] = -dh * sx / k0;
        d[4] = -dh * chord / k0 / beta;
        if second {
            d[0] += 0.5 * dh * dh * (1.0 - cx).powi(2) / k0.powi(3);
            d[4] += dh * dh * chord / (k0 * k0) / beta;
            r[(0, 0)] -= dh * sx * sx / k0;
            r[(0, 1)] -= dh * sx * (1.0 - cx) / (k0 * k0);
            r[(0, 5)] += dh * (cx - cx * cx) / (k0 * k0) / beta;
            r[(1, 0)] -= dh * sx;
            r[(4, 1)] += dh * (1.0 - cx) / (k0 * k0) / beta;
            r[(4, 5)] -= dh * chord / k0;
            r[(2, 3)] += dh * chord / k0;
        }
    }

    Ok(TransferMap { d, r, t: Some(t) })
}

fn dipedge(e: &Dipedge) -> TransferMap {
    let Dipedge {
        h,
        e1,
        fint,
        hgap,
        he,
        entrance,
    } = *e;
    let (sin_e1, cos_e1) = e1.sin_cos();
    let tan_e1 = e1.tan();
    let mut r = Matrix6::identity();
    r[(1, 0)] = h * tan_e1;
    r[(3, 2)] = -h * (e1 - 2.0 * hgap * h * fint * (1.0 + sin_e1 * sin_e1) / cos_e1).tan();

    let sign = if entrance { 1.0 } else { -1.0 };
    let t000 = -sign * 0.5 * h * tan_e1 * tan_e1;
    let t022 = sign * 0.5 * h / (cos_e1 * cos_e1);
    let t100 = 0.5 * h * he / cos_e1.powi(3);
    let t122 = sign * 0.5 * h * h * tan_e1.powi(3) - t100;

    let mut t = Tensor3::zeros();
    t[(0, 0, 0)] = t000;
    t[(0, 2, 2)] = t022;
    t[(1, 0, 0)] = t100;
    t.set_pair(1, 0, 1, -t000);
    t[(1, 2, 2)] = t122;
    t.set_pair(1, 2, 3, t000);
    t.set_pair(2, 0, 2, -t000);
    t.set_pair(3, 0, 2, -t100);
    t.set_pair(3, 0, 3, t000);
    t.set_pair(3, 1, 2, -t022);

    let fringe = 0.5 * h * h * tan_e1 / (cos_e1 * cos_e1);
    if entrance {
        t[(1, 2, 2)] += fringe;
    } else {
        t[(1, 0, 0)] -= 0.5 * h * h * tan_e1.powi(3);
        t[(3, 0, 2)] += fringe;
        t[(3, 2, 0)] += fringe;
    }

    TransferMap {
        d: Vector6::zeros(),
        r,
        t: Some(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{DriftFlavor, Kicker, ThinQuadrupole};
    use beamline_core::{symplectic_defect, Parameter};

    fn beam() -> BeamReference {
        BeamReference::new(0.6, 1.25).unwrap()
    }

    fn map(kind: ElementKind, l: f64) -> TransferMap {
        compute_map(&kind, l, Some(&beam()), MapOrder::Second).unwrap()
    }

    fn quad(k1: f64) -> ElementKind {
        ElementKind::Quadrupole(Quadrupole {
            k1: k1.into(),
            dk1: Parameter::default(),
        })
    }

    #[test]
    fn drift_coefficients() {
        let m = map(ElementKind::Drift(DriftFlavor::Plain), 2.0);
        assert_eq!(m.r[(0, 1)], 2.0);
        assert!((m.r[(4, 5)] - 2.0 / 0.5625).abs() < 1e-12);
        let t = m.t.unwrap();
        assert!((t[(0, 5, 1)] + 1.0 / 0.6).abs() < 1e-12);
        assert!((t[(4, 5, 5)] + 3.0 / 0.6 / 0.5625).abs() < 1e-12);
    }

    #[test]
    fn first_order_drops_tensor() {
        let m = compute_map(
            &ElementKind::Drift(DriftFlavor::Plain),
            1.0,
            Some(&beam()),
            MapOrder::First,
        )
        .unwrap();
        assert!(m.t.is_none());
    }

    #[test]
    fn zero_length_elements_are_identity() {
        let kinds = [
            ElementKind::Marker,
            ElementKind::Drift(DriftFlavor::Monitor),
            ElementKind::Kicker(Kicker::default()),
            quad(0.3),
            ElementKind::ThinQuadrupole(ThinQuadrupole::default()),
            ElementKind::Sextupole(Sextupole {
                k2: 2.0.into(),
                dk2: Parameter::default(),
            }),
            ElementKind::SBendBody(SBendBody::default()),
            ElementKind::Dipedge(Dipedge::default()),
        ];
        for kind in kinds {
            let m = map(kind, 0.0);
            assert_eq!(m.d, Vector6::zeros(), "{}", kind.name());
            assert!((m.r - Matrix6::identity()).amax() < 1e-12, "{}", kind.name());
        }
    }

    #[test]
    fn zero_strength_equals_drift() {
        let d = map(ElementKind::Drift(DriftFlavor::Plain), 1.5);
        for kind in [
            quad(0.0),
            ElementKind::Sextupole(Sextupole::default()),
            ElementKind::SBendBody(SBendBody::default()),
        ] {
            let m = map(kind, 1.5);
            assert_eq!(m.r, d.r, "{}", kind.name());
            assert_eq!(m.t, d.t, "{}", kind.name());
        }
    }

    #[test]
    fn variable_zero_gradient_is_rejected() {
        let kind = ElementKind::Quadrupole(Quadrupole {
            k1: Parameter::variable(0.0),
            dk1: Parameter::default(),
        });
        assert_eq!(
            compute_map(&kind, 1.0, Some(&beam()), MapOrder::Second),
            Err(ElementError::ZeroGradient)
        );
    }

    #[test]
    fn quadrupole_focusing_and_defocusing() {
        let m = map(quad(0.25), 1.0);
        assert!((m.r[(0, 0)] - 0.5f64.cos()).abs() < 1e-12);
        assert!((m.r[(2, 2)] - 0.5f64.cosh()).abs() < 1e-12);
        let m = map(quad(-0.25), 1.0);
        assert!((m.r[(0, 0)] - 0.5f64.cosh()).abs() < 1e-12);
        assert!((m.r[(3, 2)] + 0.25 * 0.5f64.sin() / 0.5).abs() < 1e-12);
    }

    #[test]
    fn element_matrices_are_symplectic() {
        let kinds = [
            (ElementKind::Drift(DriftFlavor::Plain), 1.0),
            (quad(0.7), 0.4),
            (quad(-1.1), 0.4),
            (
                ElementKind::ThinQuadrupole(ThinQuadrupole {
                    k1l: 0.3.into(),
                    dk1l: Parameter::default(),
                }),
                0.0,
            ),
            (
                ElementKind::SBendBody(SBendBody {
                    angle: 0.1.into(),
                    dk0: Parameter::default(),
                }),
                2.0,
            ),
            (
                ElementKind::Dipedge(Dipedge {
                    h: 0.05,
                    e1: 0.02,
                    ..Default::default()
                }),
                0.0,
            ),
        ];
        for (kind, l) in kinds {
            let m = map(kind, l);
            assert!(symplectic_defect(&m.r) < 1e-12, "{}", kind.name());
        }
    }

    #[test]
    fn bend_requires_length() {
        let kind = ElementKind::SBendBody(SBendBody {
            angle: 0.1.into(),
            dk0: Parameter::default(),
        });
        assert_eq!(
            compute_map(&kind, 0.0, Some(&beam()), MapOrder::Second),
            Err(ElementError::ZeroLengthBend { angle: 0.1 })
        );
    }

    #[test]
    fn bend_field_error_without_angle_kicks() {
        let kind = ElementKind::SBendBody(SBendBody {
            angle: 0.0.into(),
            dk0: 0.01.into(),
        });
        let m = map(kind, 2.0);
        assert!((m.d[0] + 0.5 * 0.01 * 4.0).abs() < 1e-15);
        assert!((m.d[1] + 0.02).abs() < 1e-15);
        assert!((m.r[(0, 5)] - 0.5 * 0.01 * 4.0 / 0.6).abs() < 1e-15);
    }

    #[test]
    fn kicker_sets_kicks_including_errors() {
        let kind = ElementKind::Kicker(Kicker {
            hkick: 1e-3.into(),
            dkh: 1e-4.into(),
            vkick: (-2e-3).into(),
            ..Default::default()
        });
        let m = map(kind, 0.0);
        assert!((m.d[1] - 1.1e-3).abs() < 1e-15);
        assert!((m.d[3] + 2e-3).abs() < 1e-15);
    }

    #[test]
    fn missing_beam_reported() {
        assert_eq!(
            compute_map(&quad(0.1), 1.0, None, MapOrder::Second),
            Err(ElementError::MissingBeam { kind: "Quadrupole" })
        );
        assert!(compute_map(
            &ElementKind::Drift(DriftFlavor::Plain),
            0.0,
            None,
            MapOrder::Second
        )
        .is_ok());
    }
}
