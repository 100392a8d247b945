use crate::{
    EntityId,
    datatypes::inputs::*,
    id::Id,
    vector::V,
};
use std::f64::consts::PI;

/// Public names and target signatures of each constraint kind.
mod kind;

pub use kind::ConstraintKind;

/// Below this length, a vector is treated as having no direction,
/// so residuals which divide by it have no usable gradient.
pub(crate) const DEGENERATE_LENGTH: f64 = 1e-9;

/// A constraint resolved against the registry, ready to be evaluated.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ConstraintEntry {
    /// The constraint itself.
    pub constraint: Constraint,
    /// The constraint's ID in the registry.
    pub id: EntityId,
}

/// Each geometric constraint we support, with every primitive
/// dereferenced down to parameter IDs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Constraint {
    /// These two points should be a given distance apart.
    Distance(DatumPoint, DatumPoint, DatumDistance),
    /// These two points must coincide.
    PointsCoincident(DatumPoint, DatumPoint),
    /// These two points have the same Y value.
    Horizontal(DatumPoint, DatumPoint),
    /// These two points have the same X value.
    Vertical(DatumPoint, DatumPoint),
    /// The second point is this far to the right of the first.
    HorizontalDistance(DatumPoint, DatumPoint, DatumDistance),
    /// The second point is this far above the first.
    VerticalDistance(DatumPoint, DatumPoint, DatumDistance),
    /// Cross product of the two directions is zero.
    Parallel(DatumLineSegment, DatumLineSegment),
    /// Dot product of the two directions is zero.
    Perpendicular(DatumLineSegment, DatumLineSegment),
    /// These lines should be the same length.
    LinesEqualLength(DatumLineSegment, DatumLineSegment),
    /// Counter-clockwise angle from the first line to the second, in radians.
    LinesAtAngle(DatumLineSegment, DatumLineSegment, DatumDistance),
    /// The point's X component has this value.
    CoordinateX(DatumPoint, DatumDistance),
    /// The point's Y component has this value.
    CoordinateY(DatumPoint, DatumDistance),
    /// The point lies on the (infinite extension of the) line.
    PointOnLine(DatumPoint, DatumLineSegment),
    /// Signed perpendicular distance from the line, positive on the left of p0 -> p1.
    PointLineDistance(DatumPoint, DatumLineSegment, DatumDistance),
    /// The given point should be the midpoint along the given line.
    Midpoint(DatumLineSegment, DatumPoint),
    /// These two points should be symmetric across the given line.
    Symmetric(DatumLineSegment, DatumPoint, DatumPoint),
    /// The point lies on the circle's perimeter.
    PointOnCircle(DatumPoint, DatumCircle),
    /// The circle's radius has this value.
    CircleRadius(DatumCircle, DatumDistance),
    /// Both circles have the same radius.
    EqualRadius(DatumCircle, DatumCircle),
    /// This line must be tangent to the circle, on whichever side
    /// of the line the center currently is.
    LineTangentToCircle(DatumLineSegment, DatumCircle),
    /// Both ends of the arc are this far from its center.
    ArcRadius(DatumCircularArc, DatumDistance),
    /// The arc's start and end are equidistant from its center.
    Arc(DatumCircularArc),
}

/// Describes one value in one row of the Jacobian matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct JacobianVar {
    /// Which parameter are we talking about?
    /// Corresponds to one column in the row (if the parameter is free).
    pub id: Id,
    /// What value is its partial derivative?
    pub partial_derivative: f64,
}

impl JacobianVar {
    #[inline(always)]
    fn new(id: Id, partial_derivative: f64) -> Self {
        Self {
            id,
            partial_derivative,
        }
    }
}

#[inline(always)]
fn scalar(values: &[f64], d: &DatumDistance) -> f64 {
    values[d.id as usize]
}

#[inline(always)]
fn point(values: &[f64], p: &DatumPoint) -> V {
    V::new(values[p.id_x() as usize], values[p.id_y() as usize])
}

#[inline(always)]
fn line(values: &[f64], l: &DatumLineSegment) -> (V, V) {
    (point(values, &l.p0), point(values, &l.p1))
}

impl Constraint {
    /// For each row of the Jacobian matrix, which parameters are involved in them?
    /// Fixed parameters are listed too; the layout drops them.
    pub(crate) fn nonzeroes(&self, row0: &mut Vec<Id>, row1: &mut Vec<Id>) {
        match self {
            Constraint::Distance(p0, p1, d) => {
                row0.extend(p0.all_variables());
                row0.extend(p1.all_variables());
                row0.push(d.id);
            }
            Constraint::PointsCoincident(p0, p1) => {
                row0.extend([p0.id_x(), p1.id_x()]);
                row1.extend([p0.id_y(), p1.id_y()]);
            }
            Constraint::Horizontal(p0, p1) => row0.extend([p0.id_y(), p1.id_y()]),
            Constraint::Vertical(p0, p1) => row0.extend([p0.id_x(), p1.id_x()]),
            Constraint::HorizontalDistance(p0, p1, d) => {
                row0.extend([p0.id_x(), p1.id_x(), d.id]);
            }
            Constraint::VerticalDistance(p0, p1, d) => {
                row0.extend([p0.id_y(), p1.id_y(), d.id]);
            }
            Constraint::Parallel(line0, line1)
            | Constraint::Perpendicular(line0, line1)
            | Constraint::LinesEqualLength(line0, line1) => {
                row0.extend(line0.all_variables());
                row0.extend(line1.all_variables());
            }
            Constraint::LinesAtAngle(line0, line1, angle) => {
                row0.extend(line0.all_variables());
                row0.extend(line1.all_variables());
                row0.push(angle.id);
            }
            Constraint::CoordinateX(p, v) => row0.extend([p.id_x(), v.id]),
            Constraint::CoordinateY(p, v) => row0.extend([p.id_y(), v.id]),
            Constraint::PointOnLine(p, line) => {
                row0.extend(p.all_variables());
                row0.extend(line.all_variables());
            }
            Constraint::PointLineDistance(p, line, d) => {
                row0.extend(p.all_variables());
                row0.extend(line.all_variables());
                row0.push(d.id);
            }
            Constraint::Midpoint(line, p) => {
                row0.extend([line.p0.id_x(), line.p1.id_x(), p.id_x()]);
                row1.extend([line.p0.id_y(), line.p1.id_y(), p.id_y()]);
            }
            Constraint::Symmetric(line, a, b) => {
                for row in [row0, row1] {
                    row.extend(line.all_variables());
                    row.extend(a.all_variables());
                    row.extend(b.all_variables());
                }
            }
            Constraint::PointOnCircle(p, circle) => {
                row0.extend(p.all_variables());
                row0.extend(circle.all_variables());
            }
            Constraint::CircleRadius(circle, r) => row0.extend([circle.radius.id, r.id]),
            Constraint::EqualRadius(c0, c1) => row0.extend([c0.radius.id, c1.radius.id]),
            Constraint::LineTangentToCircle(line, circle) => {
                row0.extend(line.all_variables());
                row0.extend(circle.all_variables());
            }
            Constraint::ArcRadius(arc, r) => {
                row0.extend(arc.center.all_variables());
                row0.extend(arc.start.all_variables());
                row0.push(r.id);
                row1.extend(arc.center.all_variables());
                row1.extend(arc.end.all_variables());
                row1.push(r.id);
            }
            Constraint::Arc(arc) => row0.extend(arc.all_variables()),
        }
    }

    /// How close is this constraint to being satisfied?
    /// For performance reasons (avoiding allocations), this doesn't return a `Vec<f64>`,
    /// instead it writes each residual into one of the given outputs.
    /// Most constraints have a single residual, some have two (e.g. one per axis).
    ///
    /// `values` holds every parameter, fixed or free, indexed by [`Id`].
    pub(crate) fn residual(
        &self,
        values: &[f64],
        residual0: &mut f64,
        residual1: &mut f64,
        degenerate: &mut bool,
    ) {
        match self {
            Constraint::Distance(p0, p1, d) => {
                let actual_distance = point(values, p0).euclidean_distance(point(values, p1));
                *residual0 = actual_distance - scalar(values, d);
            }
            Constraint::PointsCoincident(p0, p1) => {
                let (a, b) = (point(values, p0), point(values, p1));
                *residual0 = b.x - a.x;
                *residual1 = b.y - a.y;
            }
            Constraint::Horizontal(p0, p1) => {
                *residual0 = point(values, p1).y - point(values, p0).y;
            }
            Constraint::Vertical(p0, p1) => {
                *residual0 = point(values, p1).x - point(values, p0).x;
            }
            Constraint::HorizontalDistance(p0, p1, d) => {
                *residual0 = point(values, p1).x - point(values, p0).x - scalar(values, d);
            }
            Constraint::VerticalDistance(p0, p1, d) => {
                *residual0 = point(values, p1).y - point(values, p0).y - scalar(values, d);
            }
            Constraint::Parallel(line0, line1) => {
                let (u, w) = directions(values, line0, line1);
                *residual0 = u.cross_2d(&w);
            }
            Constraint::Perpendicular(line0, line1) => {
                let (u, w) = directions(values, line0, line1);
                *residual0 = u.dot(&w);
            }
            Constraint::LinesEqualLength(line0, line1) => {
                let (u, w) = directions(values, line0, line1);
                *residual0 = u.magnitude() - w.magnitude();
            }
            Constraint::LinesAtAngle(line0, line1, expected_angle) => {
                let (u, w) = directions(values, line0, line1);
                if u.magnitude() < DEGENERATE_LENGTH || w.magnitude() < DEGENERATE_LENGTH {
                    // A zero-length line has no angle, so there's nothing to measure.
                    *residual0 = 0.0;
                    *degenerate = true;
                    return;
                }
                // Current angle using atan2.
                let current_angle = libm::atan2(u.cross_2d(&w), u.dot(&w));
                *residual0 = wrap_angle_delta(current_angle - scalar(values, expected_angle));
            }
            Constraint::CoordinateX(p, v) => {
                *residual0 = point(values, p).x - scalar(values, v);
            }
            Constraint::CoordinateY(p, v) => {
                *residual0 = point(values, p).y - scalar(values, v);
            }
            Constraint::PointOnLine(p, l) => {
                let (p0, p1) = line(values, l);
                *residual0 = (p1 - p0).cross_2d(&(point(values, p) - p0));
            }
            Constraint::PointLineDistance(p, l, d) => {
                let (p0, p1) = line(values, l);
                let Some(sd) = signed_distance_to_line(point(values, p), p0, p1) else {
                    *residual0 = 0.0;
                    *degenerate = true;
                    return;
                };
                *residual0 = sd.distance - scalar(values, d);
            }
            Constraint::Midpoint(l, p) => {
                let (p0, p1) = line(values, l);
                let a = point(values, p);
                // Equation:
                //   ax = (px + qx)/2,
                // ∴ ax - px/2 - qx/2 = 0
                let mid = p0.midpoint(p1);
                *residual0 = a.x - mid.x;
                *residual1 = a.y - mid.y;
            }
            Constraint::Symmetric(l, a, b) => {
                let (p0, p1) = line(values, l);
                let (a, b) = (point(values, a), point(values, b));
                let u = p1 - p0;
                // The midpoint of AB lies on the line...
                *residual0 = u.cross_2d(&(a.midpoint(b) - p0));
                // ...and AB is perpendicular to it.
                *residual1 = u.dot(&(b - a));
            }
            Constraint::PointOnCircle(p, circle) => {
                let distance = point(values, p).euclidean_distance(point(values, &circle.center));
                *residual0 = distance - scalar(values, &circle.radius);
            }
            Constraint::CircleRadius(circle, r) => {
                *residual0 = scalar(values, &circle.radius) - scalar(values, r);
            }
            Constraint::EqualRadius(c0, c1) => {
                *residual0 = scalar(values, &c0.radius) - scalar(values, &c1.radius);
            }
            Constraint::LineTangentToCircle(l, circle) => {
                let (p0, p1) = line(values, l);
                let center = point(values, &circle.center);
                let Some(sd) = signed_distance_to_line(center, p0, p1) else {
                    // If line has no length, then the residual is 0, regardless of anything else.
                    *residual0 = 0.0;
                    *degenerate = true;
                    return;
                };
                *residual0 = sd.distance.abs() - scalar(values, &circle.radius);
            }
            Constraint::ArcRadius(arc, r) => {
                let center = point(values, &arc.center);
                let radius = scalar(values, r);
                *residual0 = center.euclidean_distance(point(values, &arc.start)) - radius;
                *residual1 = center.euclidean_distance(point(values, &arc.end)) - radius;
            }
            Constraint::Arc(arc) => {
                let center = point(values, &arc.center);
                // For numerical stability and simpler derivatives, we compare the squared
                // distances. The residual is zero if the distances are equal.
                let dist0_sq = (point(values, &arc.start) - center).magnitude_squared();
                let dist1_sq = (point(values, &arc.end) - center).magnitude_squared();
                *residual0 = dist0_sq - dist1_sq;
            }
        }
    }

    /// How many equations does this constraint correspond to?
    /// Each equation is a residual function (a measure of error)
    pub(crate) fn residual_dim(&self) -> usize {
        match self {
            Constraint::PointsCoincident(..)
            | Constraint::Midpoint(..)
            | Constraint::Symmetric(..)
            | Constraint::ArcRadius(..) => 2,
            Constraint::Distance(..)
            | Constraint::Horizontal(..)
            | Constraint::Vertical(..)
            | Constraint::HorizontalDistance(..)
            | Constraint::VerticalDistance(..)
            | Constraint::Parallel(..)
            | Constraint::Perpendicular(..)
            | Constraint::LinesEqualLength(..)
            | Constraint::LinesAtAngle(..)
            | Constraint::CoordinateX(..)
            | Constraint::CoordinateY(..)
            | Constraint::PointOnLine(..)
            | Constraint::PointLineDistance(..)
            | Constraint::PointOnCircle(..)
            | Constraint::CircleRadius(..)
            | Constraint::EqualRadius(..)
            | Constraint::LineTangentToCircle(..)
            | Constraint::Arc(..) => 1,
        }
    }

    /// Used to construct part of a Jacobian matrix.
    /// For performance reasons (avoiding allocations), this doesn't return a
    /// `Vec<JacobianVar>` for each Jacobian row, instead takes the output rows as
    /// mutable arguments and writes out all nonzero partial derivatives for each row to
    /// one of them.
    ///
    /// If a row's gradient is undefined (degenerate geometry) `degenerate` is set.
    /// Distances and lengths then get a made-up direction so the solver can
    /// move away from the degenerate spot. Every other row is left empty,
    /// contributing nothing this iteration.
    pub(crate) fn jacobian_rows(
        &self,
        values: &[f64],
        row0: &mut Vec<JacobianVar>,
        row1: &mut Vec<JacobianVar>,
        degenerate: &mut bool,
    ) {
        match self {
            Constraint::Distance(p0, p1, d) => {
                // Residual: R = sqrt((x1-x0)**2 + (y1-y0)**2) - d
                // ∂R/∂x0 = -(x1 - x0) / dist, ∂R/∂x1 = (x1 - x0) / dist, etc.
                // ∂R/∂d = -1
                *degenerate |= !push_distance_partials(values, p0, p1, row0);
                row0.push(JacobianVar::new(d.id, -1.0));
            }
            Constraint::PointsCoincident(p0, p1) => {
                // R0 = x1 - x0, R1 = y1 - y0.
                row0.extend([
                    JacobianVar::new(p0.id_x(), -1.0),
                    JacobianVar::new(p1.id_x(), 1.0),
                ]);
                row1.extend([
                    JacobianVar::new(p0.id_y(), -1.0),
                    JacobianVar::new(p1.id_y(), 1.0),
                ]);
            }
            Constraint::Horizontal(p0, p1) => {
                // Residual: R = y1 - y0
                row0.extend([
                    JacobianVar::new(p0.id_y(), -1.0),
                    JacobianVar::new(p1.id_y(), 1.0),
                ]);
            }
            Constraint::Vertical(p0, p1) => {
                // Residual: R = x1 - x0
                row0.extend([
                    JacobianVar::new(p0.id_x(), -1.0),
                    JacobianVar::new(p1.id_x(), 1.0),
                ]);
            }
            Constraint::HorizontalDistance(p0, p1, d) => {
                // Residual: R = x1 - x0 - d
                row0.extend([
                    JacobianVar::new(p0.id_x(), -1.0),
                    JacobianVar::new(p1.id_x(), 1.0),
                    JacobianVar::new(d.id, -1.0),
                ]);
            }
            Constraint::VerticalDistance(p0, p1, d) => {
                // Residual: R = y1 - y0 - d
                row0.extend([
                    JacobianVar::new(p0.id_y(), -1.0),
                    JacobianVar::new(p1.id_y(), 1.0),
                    JacobianVar::new(d.id, -1.0),
                ]);
            }
            Constraint::Parallel(line0, line1) => {
                // Residual: R = ux*wy - uy*wx
                // where u = line0.p1 - line0.p0 and w = line1.p1 - line1.p0.
                let (u, w) = directions(values, line0, line1);
                let pds = PartialDerivatives4Points {
                    x0: -w.y,
                    y0: w.x,
                    x1: w.y,
                    y1: -w.x,
                    x2: u.y,
                    y2: -u.x,
                    x3: -u.y,
                    y3: u.x,
                };
                row0.extend(pds.jvars(line0, line1));
            }
            Constraint::Perpendicular(line0, line1) => {
                // Residual: R = ux*wx + uy*wy
                let (u, w) = directions(values, line0, line1);
                let pds = PartialDerivatives4Points {
                    x0: -w.x,
                    y0: -w.y,
                    x1: w.x,
                    y1: w.y,
                    x2: -u.x,
                    y2: -u.y,
                    x3: u.x,
                    y3: u.y,
                };
                row0.extend(pds.jvars(line0, line1));
            }
            Constraint::LinesEqualLength(line0, line1) => {
                // Residual: R = |u| - |w|
                let (u, w) = directions(values, line0, line1);
                // A zero-length line gets a made-up direction, like coincident points do.
                let (u, found0) = unit_or_x(u);
                let (w, found1) = unit_or_x(w);
                *degenerate |= !(found0 && found1);
                let pds = PartialDerivatives4Points {
                    x0: -u.x,
                    y0: -u.y,
                    x1: u.x,
                    y1: u.y,
                    x2: w.x,
                    y2: w.y,
                    x3: -w.x,
                    y3: -w.y,
                };
                row0.extend(pds.jvars(line0, line1));
            }
            Constraint::LinesAtAngle(line0, line1, angle) => {
                // Residual: R = atan2(u×w, u·w) - α
                // which is the direction of w minus the direction of u, so
                // ∂R/∂ux = uy/|u|², ∂R/∂uy = -ux/|u|²,
                // ∂R/∂wx = -wy/|w|², ∂R/∂wy = wx/|w|².
                let (u, w) = directions(values, line0, line1);
                let (mag0_squared, mag1_squared) = (u.magnitude_squared(), w.magnitude_squared());
                if u.magnitude() < DEGENERATE_LENGTH || w.magnitude() < DEGENERATE_LENGTH {
                    *degenerate = true;
                    return;
                }
                let pds = PartialDerivatives4Points {
                    x0: -u.y / mag0_squared,
                    y0: u.x / mag0_squared,
                    x1: u.y / mag0_squared,
                    y1: -u.x / mag0_squared,
                    x2: w.y / mag1_squared,
                    y2: -w.x / mag1_squared,
                    x3: -w.y / mag1_squared,
                    y3: w.x / mag1_squared,
                };
                row0.extend(pds.jvars(line0, line1));
                row0.push(JacobianVar::new(angle.id, -1.0));
            }
            Constraint::CoordinateX(p, v) => {
                row0.extend([
                    JacobianVar::new(p.id_x(), 1.0),
                    JacobianVar::new(v.id, -1.0),
                ]);
            }
            Constraint::CoordinateY(p, v) => {
                row0.extend([
                    JacobianVar::new(p.id_y(), 1.0),
                    JacobianVar::new(v.id, -1.0),
                ]);
            }
            Constraint::PointOnLine(p, l) => {
                // Residual: R = (p1 - p0) × (a - p0)
                let (p0, p1) = line(values, l);
                let a = point(values, p);
                let pds = cross_partials(a, p0, p1);
                row0.extend(point_line_jvars(p, l, pds));
            }
            Constraint::PointLineDistance(p, l, d) => {
                let (p0, p1) = line(values, l);
                let Some(sd) = signed_distance_to_line(point(values, p), p0, p1) else {
                    *degenerate = true;
                    return;
                };
                row0.extend(point_line_jvars(p, l, sd.partials));
                row0.push(JacobianVar::new(d.id, -1.0));
            }
            Constraint::Midpoint(line, point) => {
                // Equation:
                // (note that a = the midpoint)
                //   ax - px/2 - qx/2 = 0
                //
                // This has partial derivatives:
                //   ∂R/∂ ax =  1
                //   ∂R/∂ px = -0.5
                //   ∂R/∂ qx = -0.5
                row0.extend([
                    JacobianVar::new(point.id_x(), 1.0),
                    JacobianVar::new(line.p0.id_x(), -0.5),
                    JacobianVar::new(line.p1.id_x(), -0.5),
                ]);
                row1.extend([
                    JacobianVar::new(point.id_y(), 1.0),
                    JacobianVar::new(line.p0.id_y(), -0.5),
                    JacobianVar::new(line.p1.id_y(), -0.5),
                ]);
            }
            Constraint::Symmetric(l, a_datum, b_datum) => {
                let (p0, p1) = line(values, l);
                let (a, b) = (point(values, a_datum), point(values, b_datum));
                let u = p1 - p0;
                // Row 0 is "midpoint M of AB is on the line", i.e. u × (M - p0),
                // and M moves half as fast as either A or B.
                let [_, _, p0x, p0y, p1x, p1y] = cross_partials(a.midpoint(b), p0, p1);
                row0.extend([
                    JacobianVar::new(l.p0.id_x(), p0x),
                    JacobianVar::new(l.p0.id_y(), p0y),
                    JacobianVar::new(l.p1.id_x(), p1x),
                    JacobianVar::new(l.p1.id_y(), p1y),
                    JacobianVar::new(a_datum.id_x(), -u.y / 2.0),
                    JacobianVar::new(a_datum.id_y(), u.x / 2.0),
                    JacobianVar::new(b_datum.id_x(), -u.y / 2.0),
                    JacobianVar::new(b_datum.id_y(), u.x / 2.0),
                ]);
                // Row 1 is u · (B - A).
                let ab = b - a;
                row1.extend([
                    JacobianVar::new(l.p0.id_x(), -ab.x),
                    JacobianVar::new(l.p0.id_y(), -ab.y),
                    JacobianVar::new(l.p1.id_x(), ab.x),
                    JacobianVar::new(l.p1.id_y(), ab.y),
                    JacobianVar::new(a_datum.id_x(), -u.x),
                    JacobianVar::new(a_datum.id_y(), -u.y),
                    JacobianVar::new(b_datum.id_x(), u.x),
                    JacobianVar::new(b_datum.id_y(), u.y),
                ]);
            }
            Constraint::PointOnCircle(p, circle) => {
                // Residual: R = |a - c| - r
                *degenerate |= !push_distance_partials(values, &circle.center, p, row0);
                row0.push(JacobianVar::new(circle.radius.id, -1.0));
            }
            Constraint::CircleRadius(circle, r) => {
                row0.extend([
                    JacobianVar::new(circle.radius.id, 1.0),
                    JacobianVar::new(r.id, -1.0),
                ]);
            }
            Constraint::EqualRadius(c0, c1) => {
                row0.extend([
                    JacobianVar::new(c0.radius.id, 1.0),
                    JacobianVar::new(c1.radius.id, -1.0),
                ]);
            }
            Constraint::LineTangentToCircle(l, circle) => {
                // Residual: R = |signed distance from center to line| - r
                let (p0, p1) = line(values, l);
                let center = point(values, &circle.center);
                let Some(sd) = signed_distance_to_line(center, p0, p1) else {
                    *degenerate = true;
                    return;
                };
                let sign = if sd.distance >= 0.0 { 1.0 } else { -1.0 };
                let partials = sd.partials.map(|pd| pd * sign);
                row0.extend(point_line_jvars(&circle.center, l, partials));
                row0.push(JacobianVar::new(circle.radius.id, -1.0));
            }
            Constraint::ArcRadius(arc, r) => {
                // This is really just equivalent to 2 constraints,
                // distance(center, start) and distance(center, end).
                *degenerate |= !push_distance_partials(values, &arc.center, &arc.start, row0);
                row0.push(JacobianVar::new(r.id, -1.0));
                *degenerate |= !push_distance_partials(values, &arc.center, &arc.end, row1);
                row1.push(JacobianVar::new(r.id, -1.0));
            }
            Constraint::Arc(arc) => {
                // Residual: R = (x_start-xc)²+(y_start-yc)² - (x_end-xc)²-(y_end-yc)²
                // ∂R/∂x_start = 2*(x_start-xc)
                // ∂R/∂x_end = -2*(x_end-xc)
                // ∂R/∂xc = 2*(x_end-x_start)
                // and likewise for y.
                let start = point(values, &arc.start);
                let end = point(values, &arc.end);
                let center = point(values, &arc.center);
                row0.extend([
                    JacobianVar::new(arc.start.id_x(), (start.x - center.x) * 2.0),
                    JacobianVar::new(arc.start.id_y(), (start.y - center.y) * 2.0),
                    JacobianVar::new(arc.end.id_x(), (end.x - center.x) * -2.0),
                    JacobianVar::new(arc.end.id_y(), (end.y - center.y) * -2.0),
                    JacobianVar::new(arc.center.id_x(), (end.x - start.x) * 2.0),
                    JacobianVar::new(arc.center.id_y(), (end.y - start.y) * 2.0),
                ]);
            }
        }
    }

    /// Human-readable constraint name, useful for debugging.
    #[mutants::skip]
    pub fn constraint_kind(&self) -> &'static str {
        match self {
            Constraint::Distance(..) => "Distance",
            Constraint::PointsCoincident(..) => "PointsCoincident",
            Constraint::Horizontal(..) => "Horizontal",
            Constraint::Vertical(..) => "Vertical",
            Constraint::HorizontalDistance(..) => "HorizontalDistance",
            Constraint::VerticalDistance(..) => "VerticalDistance",
            Constraint::Parallel(..) => "Parallel",
            Constraint::Perpendicular(..) => "Perpendicular",
            Constraint::LinesEqualLength(..) => "LinesEqualLength",
            Constraint::LinesAtAngle(..) => "LinesAtAngle",
            Constraint::CoordinateX(..) => "CoordinateX",
            Constraint::CoordinateY(..) => "CoordinateY",
            Constraint::PointOnLine(..) => "PointOnLine",
            Constraint::PointLineDistance(..) => "PointLineDistance",
            Constraint::Midpoint(..) => "Midpoint",
            Constraint::Symmetric(..) => "Symmetric",
            Constraint::PointOnCircle(..) => "PointOnCircle",
            Constraint::CircleRadius(..) => "CircleRadius",
            Constraint::EqualRadius(..) => "EqualRadius",
            Constraint::LineTangentToCircle(..) => "LineTangentToCircle",
            Constraint::ArcRadius(..) => "ArcRadius",
            Constraint::Arc(..) => "Arc",
        }
    }
}

/// Direction vectors of both lines, each from p0 to p1.
fn directions(values: &[f64], line0: &DatumLineSegment, line1: &DatumLineSegment) -> (V, V) {
    let (a0, a1) = line(values, line0);
    let (b0, b1) = line(values, line1);
    (a1 - a0, b1 - b0)
}

/// Pushes ∂|p1 - p0|/∂ for each component of both points.
///
/// Coincident points have no gradient, since every direction increases the
/// distance equally. Then this pretends p1 lies along +x from p0, so the
/// solver can still pull them apart, and returns false.
fn push_distance_partials(
    values: &[f64],
    p0: &DatumPoint,
    p1: &DatumPoint,
    row: &mut Vec<JacobianVar>,
) -> bool {
    let (unit, found) = unit_or_x(point(values, p1) - point(values, p0));
    row.extend([
        JacobianVar::new(p0.id_x(), -unit.x),
        JacobianVar::new(p0.id_y(), -unit.y),
        JacobianVar::new(p1.id_x(), unit.x),
        JacobianVar::new(p1.id_y(), unit.y),
    ]);
    found
}

/// `v` scaled to length 1, and true. If it's too short to have a direction,
/// +x and false.
fn unit_or_x(v: V) -> (V, bool) {
    let len = v.magnitude();
    if len < DEGENERATE_LENGTH {
        (V::new(1.0, 0.0), false)
    } else {
        (V::new(v.x / len, v.y / len), true)
    }
}

/// Partial derivatives of `C = (p1 - p0) × (a - p0)`, in the order
/// `[ax, ay, p0x, p0y, p1x, p1y]`.
fn cross_partials(a: V, p0: V, p1: V) -> [f64; 6] {
    let u = p1 - p0;
    [
        -u.y,
        u.x,
        p1.y - a.y,
        a.x - p1.x,
        a.y - p0.y,
        p0.x - a.x,
    ]
}

struct SignedDistance {
    distance: f64,
    /// Same order as [`cross_partials`].
    partials: [f64; 6],
}

/// Signed perpendicular distance from `a` to the line through p0 and p1,
/// positive when `a` is on the left of p0 -> p1.
/// None if the line has no length.
fn signed_distance_to_line(a: V, p0: V, p1: V) -> Option<SignedDistance> {
    // distance = C / L, where
    //   C = (p1 - p0) × (a - p0)
    //   L = |p1 - p0|
    // so ∂distance = ∂C / L - C ∂L / L².
    let u = p1 - p0;
    let len = u.magnitude();
    if len < DEGENERATE_LENGTH {
        return None;
    }
    let cross = u.cross_2d(&(a - p0));
    let dc = cross_partials(a, p0, p1);
    let dl = [0.0, 0.0, -u.x / len, -u.y / len, u.x / len, u.y / len];
    let len_sq = len * len;
    let mut partials = [0.0; 6];
    for (pd, (dc, dl)) in partials.iter_mut().zip(dc.into_iter().zip(dl)) {
        *pd = dc / len - cross * dl / len_sq;
    }
    Some(SignedDistance {
        distance: cross / len,
        partials,
    })
}

fn point_line_jvars(p: &DatumPoint, l: &DatumLineSegment, pds: [f64; 6]) -> [JacobianVar; 6] {
    let [ax, ay, p0x, p0y, p1x, p1y] = pds;
    [
        JacobianVar::new(p.id_x(), ax),
        JacobianVar::new(p.id_y(), ay),
        JacobianVar::new(l.p0.id_x(), p0x),
        JacobianVar::new(l.p0.id_y(), p0y),
        JacobianVar::new(l.p1.id_x(), p1x),
        JacobianVar::new(l.p1.id_y(), p1y),
    ]
}

/// Partial derivatives for all 4 points that exist
/// in a pair of line segments.
#[derive(Debug)]
struct PartialDerivatives4Points {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    x3: f64,
    y3: f64,
}

impl PartialDerivatives4Points {
    fn jvars(&self, line0: &DatumLineSegment, line1: &DatumLineSegment) -> [JacobianVar; 8] {
        [
            JacobianVar::new(line0.p0.id_x(), self.x0),
            JacobianVar::new(line0.p0.id_y(), self.y0),
            JacobianVar::new(line0.p1.id_x(), self.x1),
            JacobianVar::new(line0.p1.id_y(), self.y1),
            JacobianVar::new(line1.p0.id_x(), self.x2),
            JacobianVar::new(line1.p0.id_y(), self.y2),
            JacobianVar::new(line1.p1.id_x(), self.x3),
            JacobianVar::new(line1.p1.id_y(), self.y3),
        ]
    }
}

fn wrap_angle_delta(delta: f64) -> f64 {
    if delta > -PI && delta <= PI {
        // If inside our interval, return unchanged.
        delta
    } else {
        // Wrap; see: https://stackoverflow.com/a/11181951
        let (sin, cos) = libm::sincos(delta);
        libm::atan2(sin, cos)
    }
}
