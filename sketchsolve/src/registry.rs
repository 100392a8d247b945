//! Maps stable [`EntityId`]s to primitives and the constraints between them.

use indexmap::IndexMap;

use crate::{
    ConstraintKind, EntityId, Error, Id, ParameterStore, TargetProblem,
    constraints::{Constraint, ConstraintEntry},
    datatypes::inputs::{
        DatumCircle, DatumCircularArc, DatumDistance, DatumLineSegment, DatumPoint,
    },
    id::IdGenerator,
};

/// What sort of thing an [`EntityId`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum EntityType {
    /// A point.
    Point,
    /// A line segment.
    Line,
    /// A circle.
    Circle,
    /// A circular arc.
    Arc,
    /// A constraint between other entities.
    Constraint,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityType::Point => "point",
            EntityType::Line => "line",
            EntityType::Circle => "circle",
            EntityType::Arc => "arc",
            EntityType::Constraint => "constraint",
        })
    }
}

/// A geometric entity. Holds only references: parameter IDs for its own
/// scalars, entity IDs for the points it is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    /// A point, made of two parameters.
    Point {
        /// Parameter holding the X coordinate.
        x: Id,
        /// Parameter holding the Y coordinate.
        y: Id,
    },
    /// A line segment between two points.
    Line {
        /// Point the line starts at.
        p1: EntityId,
        /// Point the line ends at.
        p2: EntityId,
    },
    /// A circle around a point.
    Circle {
        /// Point at the circle's center.
        center: EntityId,
        /// Parameter holding the radius.
        radius: Id,
    },
    /// A circular arc, counter-clockwise from start to end.
    Arc {
        /// Point at the arc's center.
        center: EntityId,
        /// Point the arc starts at.
        start: EntityId,
        /// Point the arc ends at.
        end: EntityId,
    },
}

impl Primitive {
    /// What sort of primitive this is.
    pub fn entity_type(&self) -> EntityType {
        match self {
            Primitive::Point { .. } => EntityType::Point,
            Primitive::Line { .. } => EntityType::Line,
            Primitive::Circle { .. } => EntityType::Circle,
            Primitive::Arc { .. } => EntityType::Arc,
        }
    }
}

/// A constraint as the caller described it. Immutable once added.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintRecord {
    pub(crate) kind: ConstraintKind,
    pub(crate) targets: Vec<EntityId>,
    pub(crate) aux: Vec<Id>,
}

impl ConstraintRecord {
    /// Which kind of constraint.
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// The primitives it constrains, in the order the kind expects.
    pub fn targets(&self) -> &[EntityId] {
        &self.targets
    }

    /// Its auxiliary parameters (target distance, angle...).
    pub fn aux(&self) -> &[Id] {
        &self.aux
    }
}

/// Anything stored in the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    /// A point, line, circle or arc.
    Primitive(Primitive),
    /// A constraint, as it was added.
    Constraint(ConstraintRecord),
}

impl Entry {
    /// What sort of entity this is.
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entry::Primitive(p) => p.entity_type(),
            Entry::Constraint(_) => EntityType::Constraint,
        }
    }
}

/// Handle to a point in a [`Registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PointRef {
    pub(crate) id: EntityId,
    pub(crate) x: Id,
    pub(crate) y: Id,
}

impl PointRef {
    /// This point's ID in the registry.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Parameter holding the X coordinate.
    pub fn x_param(&self) -> Id {
        self.x
    }

    /// Parameter holding the Y coordinate.
    pub fn y_param(&self) -> Id {
        self.y
    }
}

/// Handle to a line in a [`Registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineRef {
    pub(crate) id: EntityId,
}

/// Handle to a circle in a [`Registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CircleRef {
    pub(crate) id: EntityId,
    pub(crate) radius: Id,
}

impl CircleRef {
    /// Parameter holding the radius.
    pub fn radius_param(&self) -> Id {
        self.radius
    }
}

/// Handle to an arc in a [`Registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArcRef {
    pub(crate) id: EntityId,
}

/// Handle to a constraint in a [`Registry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConstraintRef {
    pub(crate) id: EntityId,
}

macro_rules! entity_ref {
    ($($t:ty),*) => {
        $(
            impl $t {
                /// ID of the referenced entity.
                pub fn id(&self) -> EntityId {
                    self.id
                }
            }

            impl From<$t> for EntityId {
                fn from(r: $t) -> EntityId {
                    r.id
                }
            }
        )*
    };
}

entity_ref!(LineRef, CircleRef, ArcRef, ConstraintRef);

impl From<PointRef> for EntityId {
    fn from(r: PointRef) -> EntityId {
        r.id
    }
}

/// A target after dereferencing, ready to build a [`Constraint`] from.
#[derive(Clone, Copy)]
enum Resolved {
    Point(DatumPoint),
    Line(DatumLineSegment),
    Circle(DatumCircle),
    Arc(DatumCircularArc),
}

/// Stores every primitive and constraint of a sketch, in insertion order.
///
/// The registry never owns coordinates. Points allocate their parameters
/// in a [`ParameterStore`] and everything else refers to points.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<EntityId, Entry>,
    ids: IdGenerator,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate two parameters and register a point over them.
    pub fn add_point(&mut self, params: &mut ParameterStore, x: f64, y: f64, fixed: bool) -> PointRef {
        let id = self.fresh_id();
        self.push_point(params, id, x, y, fixed)
    }

    /// Register a point under a chosen ID.
    pub(crate) fn insert_point(
        &mut self,
        params: &mut ParameterStore,
        id: EntityId,
        x: f64,
        y: f64,
        fixed: bool,
    ) -> Result<PointRef, Error> {
        if self.entries.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        Ok(self.push_point(params, id, x, y, fixed))
    }

    fn push_point(
        &mut self,
        params: &mut ParameterStore,
        id: EntityId,
        x: f64,
        y: f64,
        fixed: bool,
    ) -> PointRef {
        let push = |params: &mut ParameterStore, v| {
            if fixed {
                params.push_fixed(v)
            } else {
                params.push(v)
            }
        };
        let (x, y) = (push(params, x), push(params, y));
        self.ids.claim(id);
        self.entries.insert(id, Entry::Primitive(Primitive::Point { x, y }));
        PointRef { id, x, y }
    }

    /// Register a line between two existing points.
    pub fn add_line(&mut self, p1: PointRef, p2: PointRef) -> Result<LineRef, Error> {
        let id = self.fresh_id();
        self.insert_primitive(id, Primitive::Line { p1: p1.id, p2: p2.id })?;
        Ok(LineRef { id })
    }

    /// Allocate a radius parameter and register a circle around an existing point.
    pub fn add_circle(
        &mut self,
        params: &mut ParameterStore,
        center: PointRef,
        radius: f64,
        fixed_radius: bool,
    ) -> Result<CircleRef, Error> {
        let id = self.fresh_id();
        self.require_point(id, center.id)?;
        let radius = if fixed_radius {
            params.push_fixed(radius)
        } else {
            params.push(radius)
        };
        self.insert_primitive(
            id,
            Primitive::Circle {
                center: center.id,
                radius,
            },
        )?;
        Ok(CircleRef { id, radius })
    }

    /// Register an arc over three existing points.
    pub fn add_arc(&mut self, center: PointRef, start: PointRef, end: PointRef) -> Result<ArcRef, Error> {
        let id = self.fresh_id();
        self.insert_primitive(
            id,
            Primitive::Arc {
                center: center.id,
                start: start.id,
                end: end.id,
            },
        )?;
        Ok(ArcRef { id })
    }

    /// Insert a non-point primitive under a chosen ID.
    /// Every point it refers to must already be registered.
    pub(crate) fn insert_primitive(&mut self, id: EntityId, primitive: Primitive) -> Result<(), Error> {
        if self.entries.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        match primitive {
            Primitive::Point { .. } => {}
            Primitive::Line { p1, p2 } => {
                self.require_point(id, p1)?;
                self.require_point(id, p2)?;
            }
            Primitive::Circle { center, .. } => self.require_point(id, center)?,
            Primitive::Arc { center, start, end } => {
                for p in [center, start, end] {
                    self.require_point(id, p)?;
                }
            }
        }
        self.ids.claim(id);
        self.entries.insert(id, Entry::Primitive(primitive));
        Ok(())
    }

    fn require_point(&self, referenced_by: EntityId, point: EntityId) -> Result<(), Error> {
        match self.entries.get(&point) {
            Some(Entry::Primitive(Primitive::Point { .. })) => Ok(()),
            _ => Err(Error::UnknownPrimitive {
                referenced_by,
                missing: point,
            }),
        }
    }

    /// Register a constraint, after checking its targets exist and have the
    /// types and counts `kind` requires.
    pub fn add_constraint(
        &mut self,
        params: &ParameterStore,
        kind: ConstraintKind,
        targets: &[EntityId],
        aux: &[Id],
    ) -> Result<ConstraintRef, Error> {
        let id = self.fresh_id();
        self.insert_constraint(params, id, kind, targets, aux)?;
        Ok(ConstraintRef { id })
    }

    pub(crate) fn insert_constraint(
        &mut self,
        params: &ParameterStore,
        id: EntityId,
        kind: ConstraintKind,
        targets: &[EntityId],
        aux: &[Id],
    ) -> Result<(), Error> {
        if self.entries.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.resolve(params, kind, targets, aux)
            .map_err(|problem| Error::InvalidConstraintTarget {
                constraint: id,
                kind,
                problem,
            })?;
        self.ids.claim(id);
        self.entries.insert(
            id,
            Entry::Constraint(ConstraintRecord {
                kind,
                targets: targets.to_vec(),
                aux: aux.to_vec(),
            }),
        );
        Ok(())
    }

    /// Delete a record. Anything still referring to it will fail to build
    /// until it is removed too. Parameters are never reclaimed.
    pub fn remove(&mut self, id: EntityId) -> Result<Entry, Error> {
        self.entries.shift_remove(&id).ok_or(Error::NotFound(id))
    }

    /// The ID the next `add_*` call will use.
    pub(crate) fn peek_id(&self) -> EntityId {
        self.ids.peek().unwrap_or_else(|| self.lowest_unused_id())
    }

    /// The next ID in sequence. Once a record claims `u32::MAX` the sequence
    /// is over, and the lowest ID not in use is handed out instead.
    fn fresh_id(&mut self) -> EntityId {
        self.ids.next_id().unwrap_or_else(|| self.lowest_unused_id())
    }

    fn lowest_unused_id(&self) -> EntityId {
        (0..=u32::MAX)
            .map(EntityId)
            .find(|id| !self.entries.contains_key(id))
            // Every ID taken means 2^32 entries, which won't fit in memory anyway.
            .unwrap_or(EntityId(u32::MAX))
    }

    /// Look up one record.
    pub fn get(&self, id: EntityId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// Every record, in insertion order.
    pub fn get_primitives(&self) -> impl ExactSizeIterator<Item = (EntityId, &Entry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Number of records (primitives and constraints).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything. Callers should clear the parameter store too.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids = IdGenerator::default();
    }

    pub(crate) fn point(&self, id: EntityId) -> Result<DatumPoint, TargetProblem> {
        match self.entries.get(&id) {
            Some(Entry::Primitive(Primitive::Point { x, y })) => Ok(DatumPoint::new_xy(*x, *y)),
            Some(other) => Err(TargetProblem::WrongType {
                id,
                expected: EntityType::Point,
                found: other.entity_type(),
            }),
            None => Err(TargetProblem::Missing(id)),
        }
    }

    fn resolve_target(&self, id: EntityId, expected: EntityType) -> Result<Resolved, TargetProblem> {
        let entry = self.entries.get(&id).ok_or(TargetProblem::Missing(id))?;
        let Entry::Primitive(primitive) = entry else {
            return Err(TargetProblem::WrongType {
                id,
                expected,
                found: EntityType::Constraint,
            });
        };
        if primitive.entity_type() != expected {
            return Err(TargetProblem::WrongType {
                id,
                expected,
                found: primitive.entity_type(),
            });
        }
        Ok(match *primitive {
            Primitive::Point { x, y } => Resolved::Point(DatumPoint::new_xy(x, y)),
            Primitive::Line { p1, p2 } => {
                Resolved::Line(DatumLineSegment::new(self.point(p1)?, self.point(p2)?))
            }
            Primitive::Circle { center, radius } => Resolved::Circle(DatumCircle {
                center: self.point(center)?,
                radius: DatumDistance::new(radius),
            }),
            Primitive::Arc { center, start, end } => Resolved::Arc(DatumCircularArc {
                center: self.point(center)?,
                start: self.point(start)?,
                end: self.point(end)?,
            }),
        })
    }

    /// Turn a constraint's targets into the numeric form the solver evaluates.
    pub(crate) fn resolve(
        &self,
        params: &ParameterStore,
        kind: ConstraintKind,
        targets: &[EntityId],
        aux: &[Id],
    ) -> Result<Constraint, TargetProblem> {
        let signatures = kind.signatures();
        let wrong_arity = TargetProblem::WrongArity {
            expected: signatures.first().map_or(0, |s| s.len()),
            found: targets.len(),
        };
        let signature = signatures
            .iter()
            .find(|s| s.len() == targets.len())
            .ok_or(wrong_arity)?;
        if aux.len() != kind.aux_arity() {
            return Err(TargetProblem::WrongAuxArity {
                expected: kind.aux_arity(),
                found: aux.len(),
            });
        }
        if let Some(&unknown) = aux.iter().find(|&&a| !params.contains(a)) {
            return Err(TargetProblem::UnknownParameter(unknown));
        }
        let resolved = targets
            .iter()
            .zip(signature.iter())
            .map(|(&id, &expected)| self.resolve_target(id, expected))
            .collect::<Result<Vec<_>, _>>()?;
        let scalar = aux.first().copied().map(DatumDistance::new);

        use ConstraintKind as K;
        use Resolved as R;
        let constraint = match (kind, resolved.as_slice(), scalar) {
            (K::P2pDistance, [R::Point(a), R::Point(b)], Some(d)) => Constraint::Distance(*a, *b, d),
            (K::P2pCoincident, [R::Point(a), R::Point(b)], _) => Constraint::PointsCoincident(*a, *b),
            (K::Horizontal, [R::Point(a), R::Point(b)], _) => Constraint::Horizontal(*a, *b),
            (K::Horizontal, [R::Line(l)], _) => Constraint::Horizontal(l.p0, l.p1),
            (K::Vertical, [R::Point(a), R::Point(b)], _) => Constraint::Vertical(*a, *b),
            (K::Vertical, [R::Line(l)], _) => Constraint::Vertical(l.p0, l.p1),
            (K::HorizontalDistance, [R::Point(a), R::Point(b)], Some(d)) => {
                Constraint::HorizontalDistance(*a, *b, d)
            }
            (K::VerticalDistance, [R::Point(a), R::Point(b)], Some(d)) => {
                Constraint::VerticalDistance(*a, *b, d)
            }
            (K::Parallel, [R::Line(l0), R::Line(l1)], _) => Constraint::Parallel(*l0, *l1),
            (K::Perpendicular, [R::Line(l0), R::Line(l1)], _) => Constraint::Perpendicular(*l0, *l1),
            (K::EqualLength, [R::Line(l0), R::Line(l1)], _) => Constraint::LinesEqualLength(*l0, *l1),
            (K::Angle, [R::Line(l0), R::Line(l1)], Some(theta)) => {
                Constraint::LinesAtAngle(*l0, *l1, theta)
            }
            (K::CoordinateX, [R::Point(p)], Some(v)) => Constraint::CoordinateX(*p, v),
            (K::CoordinateY, [R::Point(p)], Some(v)) => Constraint::CoordinateY(*p, v),
            (K::PointOnLine, [R::Point(p), R::Line(l)], _) => Constraint::PointOnLine(*p, *l),
            (K::PointLineDistance, [R::Point(p), R::Line(l)], Some(d)) => {
                Constraint::PointLineDistance(*p, *l, d)
            }
            (K::Midpoint, [R::Point(p), R::Line(l)], _) => Constraint::Midpoint(*l, *p),
            (K::Symmetric, [R::Point(a), R::Point(b), R::Line(l)], _) => {
                Constraint::Symmetric(*l, *a, *b)
            }
            (K::PointOnCircle, [R::Point(p), R::Circle(c)], _) => Constraint::PointOnCircle(*p, *c),
            (K::Radius, [R::Circle(c)], Some(r)) => Constraint::CircleRadius(*c, r),
            (K::EqualRadius, [R::Circle(c0), R::Circle(c1)], _) => Constraint::EqualRadius(*c0, *c1),
            (K::Tangent, [R::Line(l), R::Circle(c)], _) => Constraint::LineTangentToCircle(*l, *c),
            (K::ArcRadius, [R::Arc(a)], Some(r)) => Constraint::ArcRadius(*a, r),
            (K::ArcEquidistant, [R::Arc(a)], _) => Constraint::Arc(*a),
            _ => return Err(wrong_arity),
        };

        // Points might have been built over a different (or cleared) store.
        let (mut row0, mut row1) = (Vec::new(), Vec::new());
        constraint.nonzeroes(&mut row0, &mut row1);
        if let Some(&unknown) = row0.iter().chain(&row1).find(|&&id| !params.contains(id)) {
            return Err(TargetProblem::UnknownParameter(unknown));
        }
        Ok(constraint)
    }

    /// Resolve every live constraint, in insertion order.
    /// Fails on the first one whose targets have since been removed.
    pub(crate) fn constraints(&self, params: &ParameterStore) -> Result<Vec<ConstraintEntry>, Error> {
        self.entries
            .iter()
            .filter_map(|(&id, entry)| match entry {
                Entry::Constraint(c) => Some((id, c)),
                Entry::Primitive(_) => None,
            })
            .map(|(id, c)| {
                self.resolve(params, c.kind, &c.targets, &c.aux)
                    .map(|constraint| ConstraintEntry { constraint, id })
                    .map_err(|problem| Error::InvalidConstraintTarget {
                        constraint: id,
                        kind: c.kind,
                        problem,
                    })
            })
            .collect()
    }

    /// Every non-fixed parameter that belongs to a live primitive or is used
    /// by a live constraint, sorted by ID.
    pub(crate) fn free_parameters(
        &self,
        params: &ParameterStore,
        constraints: &[ConstraintEntry],
    ) -> Vec<Id> {
        let mut ids = Vec::new();
        for entry in self.entries.values() {
            match entry {
                Entry::Primitive(Primitive::Point { x, y }) => ids.extend([*x, *y]),
                Entry::Primitive(Primitive::Circle { radius, .. }) => ids.push(*radius),
                _ => {}
            }
        }
        let mut scratch = Vec::new();
        for c in constraints {
            c.constraint.nonzeroes(&mut ids, &mut scratch);
            ids.append(&mut scratch);
        }
        ids.retain(|&id| params.contains(id) && !params.is_fixed(id));
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_points() -> (ParameterStore, Registry, PointRef, PointRef) {
        let mut params = ParameterStore::new();
        let mut registry = Registry::new();
        let p = registry.add_point(&mut params, 0.0, 0.0, true);
        let q = registry.add_point(&mut params, 3.0, 4.0, false);
        (params, registry, p, q)
    }

    #[test]
    fn ids_stay_unique_after_the_largest_is_taken() {
        let mut params = ParameterStore::new();
        let mut registry = Registry::new();
        let last = EntityId(u32::MAX);
        registry.insert_point(&mut params, last, 1.0, 2.0, false).unwrap();
        let p = registry.add_point(&mut params, 3.0, 4.0, false);
        let q = registry.add_point(&mut params, 5.0, 6.0, false);
        assert_eq!((p.id(), q.id()), (EntityId(0), EntityId(1)));
        assert_eq!(registry.len(), 3);
        // The original is still there, untouched.
        let Some(Entry::Primitive(Primitive::Point { x, .. })) = registry.get(last) else {
            panic!("point {last} went missing");
        };
        assert_eq!(params.get(*x), 1.0);
    }

    #[test]
    fn points_allocate_parameters() {
        let (params, _, p, q) = two_points();
        assert_eq!((p.x_param(), p.y_param()), (0, 1));
        assert_eq!((q.x_param(), q.y_param()), (2, 3));
        assert!(params.is_fixed(0) && params.is_fixed(1));
        assert!(!params.is_fixed(2) && !params.is_fixed(3));
    }

    #[test]
    fn distance_needs_two_points_and_a_value() {
        let (mut params, mut registry, p, q) = two_points();
        let d = params.push_fixed(5.0);
        let line = registry.add_line(p, q).unwrap();

        let wrong_type = registry
            .add_constraint(&params, ConstraintKind::P2pDistance, &[p.id(), line.id()], &[d])
            .unwrap_err();
        assert!(matches!(
            wrong_type,
            Error::InvalidConstraintTarget {
                kind: ConstraintKind::P2pDistance,
                problem: TargetProblem::WrongType {
                    expected: EntityType::Point,
                    found: EntityType::Line,
                    ..
                },
                ..
            }
        ));

        let no_aux = registry
            .add_constraint(&params, ConstraintKind::P2pDistance, &[p.id(), q.id()], &[])
            .unwrap_err();
        assert!(matches!(
            no_aux,
            Error::InvalidConstraintTarget {
                problem: TargetProblem::WrongAuxArity {
                    expected: 1,
                    found: 0
                },
                ..
            }
        ));

        let three = registry
            .add_constraint(&params, ConstraintKind::P2pDistance, &[p.id(), q.id(), q.id()], &[d])
            .unwrap_err();
        assert!(matches!(
            three,
            Error::InvalidConstraintTarget {
                problem: TargetProblem::WrongArity {
                    expected: 2,
                    found: 3
                },
                ..
            }
        ));

        let bad_param = registry
            .add_constraint(&params, ConstraintKind::P2pDistance, &[p.id(), q.id()], &[99])
            .unwrap_err();
        assert!(matches!(
            bad_param,
            Error::InvalidConstraintTarget {
                problem: TargetProblem::UnknownParameter(99),
                ..
            }
        ));

        // Rejected constraints leave nothing behind.
        assert_eq!(registry.len(), 3);
        registry
            .add_constraint(&params, ConstraintKind::P2pDistance, &[p.id(), q.id()], &[d])
            .unwrap();
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn horizontal_accepts_points_or_line() {
        let (params, mut registry, p, q) = two_points();
        let line = registry.add_line(p, q).unwrap();
        registry
            .add_constraint(&params, ConstraintKind::Horizontal, &[p.id(), q.id()], &[])
            .unwrap();
        registry
            .add_constraint(&params, ConstraintKind::Horizontal, &[line.id()], &[])
            .unwrap();
        let built = registry.constraints(&params).unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(built[0].constraint, built[1].constraint);
    }

    #[test]
    fn removed_target_fails_at_build_time() {
        let (params, mut registry, p, q) = two_points();
        let line = registry.add_line(p, q).unwrap();
        let c = registry
            .add_constraint(&params, ConstraintKind::Vertical, &[line.id()], &[])
            .unwrap();
        registry.remove(q.id()).unwrap();
        let err = registry.constraints(&params).unwrap_err();
        match err {
            Error::InvalidConstraintTarget {
                constraint,
                problem,
                ..
            } => {
                assert_eq!(constraint, c.id());
                assert_eq!(problem, TargetProblem::Missing(q.id()));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(registry.remove(q.id()), Err(Error::NotFound(_))));
    }

    #[test]
    fn lines_need_existing_points() {
        let (_, mut registry, p, q) = two_points();
        registry.remove(p.id()).unwrap();
        let err = registry.add_line(p, q).unwrap_err();
        assert!(matches!(err, Error::UnknownPrimitive { missing, .. } if missing == p.id()));
    }

    #[test]
    fn insertion_order_survives_removal() {
        let (mut params, mut registry, p, q) = two_points();
        let r = registry.add_point(&mut params, 1.0, 1.0, false);
        registry.remove(q.id()).unwrap();
        let ids: Vec<_> = registry.get_primitives().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![p.id(), r.id()]);
    }

    #[test]
    fn free_parameters_skip_fixed_and_removed() {
        let (mut params, mut registry, p, q) = two_points();
        let d = params.push(5.0);
        let unused = params.push(1.0);
        registry
            .add_constraint(&params, ConstraintKind::P2pDistance, &[p.id(), q.id()], &[d])
            .unwrap();
        let constraints = registry.constraints(&params).unwrap();
        let free = registry.free_parameters(&params, &constraints);
        assert_eq!(free, vec![q.x_param(), q.y_param(), d]);
        assert!(!free.contains(&unused));
    }
}
