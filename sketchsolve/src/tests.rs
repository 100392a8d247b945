use super::*;
use crate::datatypes::outputs::Point;


#[track_caller]
pub(crate) fn assert_nearly_eq(actual: f64, expected: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff < EPSILON,
        "expected {expected} but got {actual}, which is {diff} away"
    );
}

#[track_caller]
fn assert_points_eq(actual: Point, expected: Point) {
    assert_nearly_eq(actual.x, expected.x);
    assert_nearly_eq(actual.y, expected.y);
}

fn distance(sketch: &Sketch, a: PointRef, b: PointRef) -> f64 {
    let a = sketch.point_position(a.id()).unwrap();
    let b = sketch.point_position(b.id()).unwrap();
    a.euclidean_distance(b)
}

#[test]
fn no_constraints_means_no_movement() {
    let mut sketch = Sketch::new();
    let p = sketch.add_point(1.5, -2.0, false);
    let q = sketch.add_point(3.0, 4.0, false);
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert_eq!(report.iterations(), 0);
    assert_eq!(sketch.point_position(p.id()).unwrap(), Point { x: 1.5, y: -2.0 });
    assert_eq!(sketch.point_position(q.id()).unwrap(), Point { x: 3.0, y: 4.0 });
    assert_eq!(sketch.dof(), Some(4));
}

#[test]
fn already_satisfied_distance() {
    let mut sketch = Sketch::new();
    let p1 = sketch.add_point(0.0, 0.0, true);
    let p2 = sketch.add_point(3.0, 4.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p1.id(), p2.id()], Some(5.0))
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert_eq!(report.iterations(), 0);
    assert_eq!(sketch.point_position(p2.id()).unwrap(), Point { x: 3.0, y: 4.0 });
}

#[test]
fn perturbed_distance() {
    let mut sketch = Sketch::new();
    let p1 = sketch.add_point(0.0, 0.0, true);
    let p2 = sketch.add_point(3.0, 4.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p1.id(), p2.id()], Some(5.0))
        .unwrap();
    sketch.move_point(p2.id(), 10.0, 10.0).unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert!((distance(&sketch, p1, p2) - 5.0).abs() < 1e-6);
    assert_eq!(sketch.point_position(p1.id()).unwrap(), Point { x: 0.0, y: 0.0 });
    assert_eq!(report.degrees_of_freedom(), 1);
}

#[test]
fn gauss_newton_solves_it_too() {
    let mut sketch = Sketch::new();
    let p1 = sketch.add_point(0.0, 0.0, true);
    let p2 = sketch.add_point(10.0, 10.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p1.id(), p2.id()], Some(5.0))
        .unwrap();
    let config = Config::default().with_algorithm(Algorithm::GaussNewton);
    let report = sketch.solve(&config).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert!((distance(&sketch, p1, p2) - 5.0).abs() < 1e-6);
}

#[test]
fn horizontal_and_vertical() {
    let mut sketch = Sketch::new();
    let origin = sketch.add_point(1.0, 2.0, true);
    let right = sketch.add_point(5.0, 7.0, false);
    let up = sketch.add_point(-3.0, 6.0, false);
    sketch
        .constrain(ConstraintKind::Horizontal, &[origin.id(), right.id()], None)
        .unwrap();
    let line = sketch.add_line(origin, up).unwrap();
    sketch
        .constrain(ConstraintKind::Vertical, &[line.id()], None)
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert!(report.is_acceptable());
    assert_nearly_eq(sketch.point_position(right.id()).unwrap().y, 2.0);
    assert_nearly_eq(sketch.point_position(up.id()).unwrap().x, 1.0);
    assert_eq!(report.degrees_of_freedom(), 2);
}

/// A 4x3 rectangle with its bottom-left corner pinned.
#[test]
fn rectangle() {
    let mut sketch = Sketch::new();
    let p0 = sketch.add_point(1.0, 1.0, true);
    let p1 = sketch.add_point(4.5, 1.5, false);
    let p2 = sketch.add_point(4.0, 3.5, false);
    let p3 = sketch.add_point(1.5, 3.0, false);
    let bottom = sketch.add_line(p0, p1).unwrap();
    let right = sketch.add_line(p1, p2).unwrap();
    let top = sketch.add_line(p2, p3).unwrap();
    let left = sketch.add_line(p3, p0).unwrap();
    for line in [bottom, top] {
        sketch.constrain(ConstraintKind::Horizontal, &[line.id()], None).unwrap();
    }
    for line in [left, right] {
        sketch.constrain(ConstraintKind::Vertical, &[line.id()], None).unwrap();
    }
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p0.id(), p1.id()], Some(4.0))
        .unwrap();
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p0.id(), p3.id()], Some(3.0))
        .unwrap();

    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert_eq!(report.degrees_of_freedom(), 0);
    assert!(!report.has_redundant());
    assert_points_eq(sketch.point_position(p1.id()).unwrap(), Point { x: 5.0, y: 1.0 });
    assert_points_eq(sketch.point_position(p2.id()).unwrap(), Point { x: 5.0, y: 4.0 });
    assert_points_eq(sketch.point_position(p3.id()).unwrap(), Point { x: 1.0, y: 4.0 });
}

fn triangle(ab: f64, bc: f64, ca: f64) -> (Sketch, [PointRef; 3]) {
    let mut sketch = Sketch::new();
    let a = sketch.add_point(0.0, 0.0, true);
    let b = sketch.add_point(3.5, 0.5, false);
    let c = sketch.add_point(0.5, 3.5, false);
    for (from, to, d) in [(a, b, ab), (b, c, bc), (c, a, ca)] {
        sketch
            .constrain(ConstraintKind::P2pDistance, &[from.id(), to.id()], Some(d))
            .unwrap();
    }
    (sketch, [a, b, c])
}

#[test]
fn valid_triangle() {
    let (mut sketch, [a, b, c]) = triangle(3.0, 5.0, 4.0);
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert!(!report.has_conflicting());
    assert!(!sketch.has_conflicting());
    assert!((distance(&sketch, a, b) - 3.0).abs() < 1e-5);
    assert!((distance(&sketch, b, c) - 5.0).abs() < 1e-5);
    assert!((distance(&sketch, c, a) - 4.0).abs() < 1e-5);
    // Spinning around a.
    assert_eq!(report.degrees_of_freedom(), 1);
}

#[test]
fn impossible_triangle() {
    let (mut sketch, _) = triangle(1.0, 1.0, 5.0);
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::MaxIterationsReached);
    assert!(!report.is_acceptable());
    assert!(report.has_conflicting());
    assert!(sketch.has_conflicting());
    // Fixed point stays put no matter what.
    assert_eq!(
        sketch.point_position(EntityId(0)).unwrap(),
        Point { x: 0.0, y: 0.0 }
    );
}

#[test]
fn fully_fixed_and_wrong_is_not_acceptable() {
    let mut sketch = Sketch::new();
    let p = sketch.add_point(0.0, 0.0, true);
    let q = sketch.add_point(3.0, 4.0, true);
    let too_far = sketch
        .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(50.0))
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::NoFreeParameters);
    assert_nearly_eq(report.residual_norm(), 45.0);
    assert!(!report.is_acceptable());
    assert_eq!(report.conflicting(), &[too_far.id()]);
}

#[test]
fn coincident_start_still_solves() {
    let mut sketch = Sketch::new();
    let p = sketch.add_point(0.0, 0.0, true);
    let q = sketch.add_point(0.0, 0.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(5.0))
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert!(report.is_acceptable());
    assert!(!report.has_conflicting());
    assert!((distance(&sketch, p, q) - 5.0).abs() < 1e-6);
    // Not degenerate any more, so nothing to warn about.
    assert!(report.warnings().is_empty());
}

#[test]
fn coincident_circle_point_still_solves() {
    let mut sketch = Sketch::new();
    let center = sketch.add_point(1.0, 1.0, true);
    let circle = sketch.add_circle(center, 2.0, true).unwrap();
    let p = sketch.add_point(1.0, 1.0, false);
    sketch
        .constrain(ConstraintKind::PointOnCircle, &[p.id(), circle.id()], None)
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert!((distance(&sketch, center, p) - 2.0).abs() < 1e-6);
}

#[test]
fn conflict_is_pinned_on_the_culprit() {
    let mut sketch = Sketch::new();
    let p = sketch.add_point(0.0, 0.0, true);
    let q = sketch.add_point(2.0, 1.0, false);
    let r = sketch.add_point(7.0, 7.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(2.0))
        .unwrap();
    let horizontal = sketch
        .constrain(ConstraintKind::Horizontal, &[p.id(), q.id()], None)
        .unwrap();
    sketch.constrain(ConstraintKind::CoordinateX, &[r.id()], Some(1.0)).unwrap();
    // q can't be level with p and also at y = 1.
    let bad = sketch.constrain(ConstraintKind::CoordinateY, &[q.id()], Some(1.0)).unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert!(!report.is_acceptable());
    // Dropping the distance doesn't help, and r is unrelated.
    assert_eq!(report.conflicting(), &[horizontal.id(), bad.id()]);
    assert_nearly_eq(sketch.point_position(r.id()).unwrap().x, 1.0);
}

#[test]
fn degrees_of_freedom_and_redundancy() {
    let mut sketch = Sketch::new();
    let p = sketch.add_point(0.0, 0.0, false);
    let q = sketch.add_point(3.0, 4.0, false);
    assert_eq!(sketch.analyze().unwrap().degrees_of_freedom(), 4);
    assert_eq!(sketch.dof(), Some(4));

    sketch
        .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(5.0))
        .unwrap();
    assert_eq!(sketch.dof(), None);
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.degrees_of_freedom(), 3);
    assert!(!sketch.has_redundant());

    let duplicate = sketch
        .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(5.0))
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert_eq!(report.degrees_of_freedom(), 3);
    assert_eq!(report.redundant(), &[duplicate.id()]);
    assert!(sketch.has_redundant());
    assert!(!sketch.has_conflicting());
}

#[test]
fn second_solve_changes_nothing() {
    let (mut sketch, _) = triangle(3.0, 5.0, 4.0);
    sketch.solve(&Config::default()).unwrap();
    let first = sketch.read_back();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.iterations(), 0);
    assert_eq!(sketch.read_back(), first);
}

#[test]
fn circles_and_tangents() {
    let mut sketch = Sketch::new();
    let center = sketch.add_point(0.0, 0.0, true);
    let circle = sketch.add_circle(center, 2.0, true).unwrap();
    let a = sketch.add_point(-5.0, 3.0, false);
    let b = sketch.add_point(5.0, 3.5, false);
    let line = sketch.add_line(a, b).unwrap();
    sketch.constrain(ConstraintKind::Horizontal, &[line.id()], None).unwrap();
    sketch
        .constrain(ConstraintKind::Tangent, &[line.id(), circle.id()], None)
        .unwrap();
    let on_circle = sketch.add_point(1.0, 1.0, false);
    sketch
        .constrain(ConstraintKind::PointOnCircle, &[on_circle.id(), circle.id()], None)
        .unwrap();

    let report = sketch.solve(&Config::default()).unwrap();
    assert!(report.is_acceptable());
    let a = sketch.point_position(a.id()).unwrap();
    let b = sketch.point_position(b.id()).unwrap();
    assert_nearly_eq(a.y, b.y);
    assert_nearly_eq(a.y.abs(), 2.0);
    let on_circle = sketch.point_position(on_circle.id()).unwrap();
    assert_nearly_eq(on_circle.euclidean_distance(Point::default()), 2.0);
}

#[test]
fn driven_radius_is_solved_for() {
    let mut sketch = Sketch::new();
    let center = sketch.add_point(1.0, 1.0, true);
    let circle = sketch.add_circle(center, 10.0, false).unwrap();
    let rim = sketch.add_point(4.0, 5.0, true);
    sketch
        .constrain(ConstraintKind::PointOnCircle, &[rim.id(), circle.id()], None)
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert_nearly_eq(sketch.params().get(circle.radius_param()), 5.0);
    assert_eq!(report.degrees_of_freedom(), 0);
}

#[test]
fn arcs_keep_their_ends_on_the_circle() {
    let mut sketch = Sketch::new();
    let center = sketch.add_point(0.0, 0.0, true);
    let start = sketch.add_point(2.0, 0.0, true);
    let end = sketch.add_point(0.0, 3.0, false);
    let arc = sketch.add_arc(center, start, end).unwrap();
    sketch
        .constrain(ConstraintKind::ArcEquidistant, &[arc.id()], None)
        .unwrap();
    sketch.constrain(ConstraintKind::CoordinateX, &[end.id()], Some(0.0)).unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert!(report.is_acceptable());
    assert_points_eq(sketch.point_position(end.id()).unwrap(), Point { x: 0.0, y: 2.0 });
}

#[test]
fn angle_between_lines() {
    let mut sketch = Sketch::new();
    let o = sketch.add_point(0.0, 0.0, true);
    let x = sketch.add_point(1.0, 0.0, true);
    let p = sketch.add_point(2.0, 0.5, false);
    let base = sketch.add_line(o, x).unwrap();
    let arm = sketch.add_line(o, p).unwrap();
    sketch
        .constrain(
            ConstraintKind::Angle,
            &[base.id(), arm.id()],
            Some(std::f64::consts::FRAC_PI_4),
        )
        .unwrap();
    sketch
        .constrain(ConstraintKind::P2pDistance, &[o.id(), p.id()], Some(2f64.sqrt()))
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert_points_eq(sketch.point_position(p.id()).unwrap(), Point { x: 1.0, y: 1.0 });
}

#[test]
fn suggests_perpendicular_instead_of_right_angle() {
    let mut sketch = Sketch::new();
    let o = sketch.add_point(0.0, 0.0, true);
    let x = sketch.add_point(1.0, 0.0, true);
    let p = sketch.add_point(0.5, 2.0, false);
    let base = sketch.add_line(o, x).unwrap();
    let arm = sketch.add_line(o, p).unwrap();
    let c = sketch
        .constrain(
            ConstraintKind::Angle,
            &[base.id(), arm.id()],
            Some(std::f64::consts::FRAC_PI_2),
        )
        .unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert!(report.is_acceptable());
    assert_eq!(
        report.warnings(),
        &[Warning {
            about_constraint: Some(c.id()),
            content: WarningContent::ShouldBePerpendicular(std::f64::consts::FRAC_PI_2),
        }]
    );
}

#[test]
fn removed_target_fails_the_next_solve() {
    let mut sketch = Sketch::new();
    let p = sketch.add_point(0.0, 0.0, true);
    let q = sketch.add_point(1.0, 1.0, false);
    let c = sketch
        .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(5.0))
        .unwrap();
    sketch.remove(q.id()).unwrap();
    let err = sketch.solve(&Config::default()).unwrap_err();
    match err {
        Error::InvalidConstraintTarget {
            constraint,
            kind,
            problem,
        } => {
            assert_eq!(constraint, c.id());
            assert_eq!(kind, ConstraintKind::P2pDistance);
            assert_eq!(problem, TargetProblem::Missing(q.id()));
        }
        other => panic!("wrong error: {other}"),
    }
    // Removing the constraint too makes the sketch solvable again.
    sketch.remove(c.id()).unwrap();
    assert!(sketch.solve(&Config::default()).is_ok());
    assert!(matches!(sketch.remove(c.id()), Err(Error::NotFound(_))));
}

#[test]
fn constraints_check_their_targets() {
    let mut sketch = Sketch::new();
    let p = sketch.add_point(0.0, 0.0, false);
    let q = sketch.add_point(1.0, 1.0, false);
    let line = sketch.add_line(p, q).unwrap();
    let err = sketch
        .constrain(ConstraintKind::Parallel, &[line.id(), p.id()], None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidConstraintTarget {
            problem: TargetProblem::WrongType {
                expected: EntityType::Line,
                found: EntityType::Point,
                ..
            },
            ..
        }
    ));
    let err = sketch
        .constrain(ConstraintKind::P2pDistance, &[p.id()], Some(1.0))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidConstraintTarget {
            problem: TargetProblem::WrongArity { expected: 2, found: 1 },
            ..
        }
    ));
    // Nothing half-built was left behind.
    assert_eq!(sketch.get_primitives().len(), 3);
}

#[test]
fn cancel_leaves_values_alone() {
    let mut sketch = Sketch::new();
    let p1 = sketch.add_point(0.0, 0.0, true);
    let p2 = sketch.add_point(10.0, 10.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p1.id(), p2.id()], Some(5.0))
        .unwrap();
    let mut calls = 0;
    let report = sketch
        .solve_cb(&Config::default(), |_stats| {
            calls += 1;
            Control::Cancel
        })
        .unwrap();
    assert_eq!(calls, 1);
    assert_eq!(report.status(), SolveStatus::Cancelled);
    assert!(!report.is_acceptable());
    assert_eq!(sketch.point_position(p2.id()).unwrap(), Point { x: 10.0, y: 10.0 });
}

#[test]
fn cancel_mid_solve_keeps_the_last_accepted_step() {
    let mut sketch = Sketch::new();
    let p1 = sketch.add_point(0.0, 0.0, true);
    let p2 = sketch.add_point(10.0, 10.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p1.id(), p2.id()], Some(5.0))
        .unwrap();
    let mut seen = None;
    let report = sketch
        .solve_cb(&Config::default(), |stats| {
            if stats.iter == 2 {
                seen = Some(stats.residual);
                Control::Cancel
            } else {
                Control::Continue
            }
        })
        .unwrap();
    let seen = seen.expect("should have been cancelled at iteration 2");
    assert_eq!(report.status(), SolveStatus::Cancelled);
    assert_eq!(report.iterations(), 2);
    // Two steps were taken and kept...
    assert_ne!(sketch.point_position(p2.id()).unwrap(), Point { x: 10.0, y: 10.0 });
    assert!(seen > 0.0);
    // ...and the stored values are exactly the iterate the callback saw.
    assert_eq!(report.residual_norm(), seen);
    assert_nearly_eq((distance(&sketch, p1, p2) - 5.0).abs(), seen);
    assert_eq!(sketch.point_position(p1.id()).unwrap(), Point { x: 0.0, y: 0.0 });
}

#[test]
fn callback_sees_every_iteration() {
    let mut sketch = Sketch::new();
    let p1 = sketch.add_point(0.0, 0.0, true);
    let p2 = sketch.add_point(10.0, 10.0, false);
    sketch
        .constrain(ConstraintKind::P2pDistance, &[p1.id(), p2.id()], Some(5.0))
        .unwrap();
    let mut residuals = Vec::new();
    let report = sketch
        .solve_cb(&Config::default(), |stats| {
            residuals.push(stats.residual);
            Control::Continue
        })
        .unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    // Convergence is checked before the callback runs.
    assert_eq!(residuals.len(), report.iterations());
    assert!(residuals.windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn sketches_solve_on_separate_threads() {
    let mut sketches: Vec<_> = (1..=4)
        .map(|i| {
            let d = f64::from(i);
            let mut sketch = Sketch::new();
            let p = sketch.add_point(0.0, 0.0, true);
            let q = sketch.add_point(1.0, 2.0, false);
            sketch
                .constrain(ConstraintKind::P2pDistance, &[p.id(), q.id()], Some(d))
                .unwrap();
            (sketch, p, q, d)
        })
        .collect();
    std::thread::scope(|s| {
        for (sketch, ..) in &mut sketches {
            s.spawn(move || sketch.solve(&Config::default()).unwrap());
        }
    });
    for (sketch, p, q, d) in &sketches {
        assert!((distance(sketch, *p, *q) - d).abs() < 1e-6);
    }
}

#[test]
fn load_solve_read_back() {
    let records = vec![
        PrimitiveRecord::Point {
            id: EntityId(0),
            x: 0.0,
            y: 0.0,
            fixed: true,
        },
        PrimitiveRecord::Point {
            id: EntityId(1),
            x: 10.0,
            y: 10.0,
            fixed: false,
        },
        PrimitiveRecord::Constraint {
            id: EntityId(2),
            kind: ConstraintKind::P2pDistance,
            targets: vec![EntityId(0), EntityId(1)],
            value: Some(5.0),
        },
    ];
    let mut sketch = load(&records).unwrap();
    let report = sketch.solve(&Config::default()).unwrap();
    assert_eq!(report.status(), SolveStatus::Converged);
    assert_eq!(sketch.dof(), Some(1));
    assert!(!sketch.has_conflicting());
    assert!(!sketch.has_redundant());

    let back = sketch.read_back();
    assert_eq!(back.len(), records.len());
    assert_eq!(back[0], records[0]);
    assert_eq!(back[2], records[2]);
    let PrimitiveRecord::Point { x, y, fixed, .. } = back[1] else {
        panic!("expected a point, got {:?}", back[1]);
    };
    assert!(!fixed);
    assert!((x.hypot(y) - 5.0).abs() < 1e-6);
}

#[test]
fn every_kind_is_reachable_by_name() {
    for kind in ConstraintKind::ALL {
        assert_eq!(ConstraintKind::from_name(kind.name()), Some(kind));
        assert!(!kind.signatures().is_empty());
    }
    assert_eq!(ConstraintKind::from_name("teleport"), None);
}
