//! Flat, self-describing records: the format sketches are loaded from and read back as.
use crate::{
    ConstraintKind, EntityId, Error, Sketch, TargetProblem,
    registry::{Entry, Primitive},
};

/// One primitive or constraint of a sketch, with its values inline.
///
/// Records refer to each other by [`EntityId`]. A sketch can be loaded from
/// records in any order, as long as IDs are unique and every reference resolves.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum PrimitiveRecord {
    /// A point. Fixed points are never moved by the solver.
    Point {
        /// This record's ID.
        id: EntityId,
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
        /// If set, the solver never moves this point.
        fixed: bool,
    },
    /// A line segment between two points.
    Line {
        /// This record's ID.
        id: EntityId,
        /// Point the line starts at.
        p1: EntityId,
        /// Point the line ends at.
        p2: EntityId,
    },
    /// A circle around a point.
    Circle {
        /// This record's ID.
        id: EntityId,
        /// Point at the circle's center.
        center: EntityId,
        /// Radius, which the solver may change unless `fixed_radius` is set.
        radius: f64,
        /// If set, the solver never changes the radius.
        fixed_radius: bool,
    },
    /// A circular arc, counter-clockwise from start to end.
    Arc {
        /// This record's ID.
        id: EntityId,
        /// Point at the arc's center.
        center: EntityId,
        /// Point the arc starts at.
        start: EntityId,
        /// Point the arc ends at.
        end: EntityId,
    },
    /// A constraint between other records.
    Constraint {
        /// This record's ID.
        id: EntityId,
        /// Which kind of constraint.
        kind: ConstraintKind,
        /// Points, lines, circles or arcs, in the order `kind` expects.
        targets: Vec<EntityId>,
        /// Target distance, angle (radians), coordinate or radius,
        /// for kinds which take one. Loaded as a fixed parameter.
        value: Option<f64>,
    },
}

impl PrimitiveRecord {
    /// This record's own ID.
    pub fn id(&self) -> EntityId {
        match self {
            PrimitiveRecord::Point { id, .. }
            | PrimitiveRecord::Line { id, .. }
            | PrimitiveRecord::Circle { id, .. }
            | PrimitiveRecord::Arc { id, .. }
            | PrimitiveRecord::Constraint { id, .. } => *id,
        }
    }

    /// The record's type tag: `point`, `line`, `circle`, `arc`,
    /// or the constraint kind's name.
    pub fn record_type(&self) -> &'static str {
        match self {
            PrimitiveRecord::Point { .. } => "point",
            PrimitiveRecord::Line { .. } => "line",
            PrimitiveRecord::Circle { .. } => "circle",
            PrimitiveRecord::Arc { .. } => "arc",
            PrimitiveRecord::Constraint { kind, .. } => kind.name(),
        }
    }
}

/// Build a sketch from records. See [`Sketch::load`].
pub fn load(records: &[PrimitiveRecord]) -> Result<Sketch, Error> {
    Sketch::load(records)
}

impl Sketch {
    /// Build a sketch from records, keeping their IDs.
    ///
    /// Points go in first, then the primitives built on them, then constraints,
    /// so records may appear in any order. Insertion order within each pass
    /// follows the input, and that's the order redundancy is judged in.
    pub fn load(records: &[PrimitiveRecord]) -> Result<Sketch, Error> {
        let mut sketch = Sketch::new();
        let Sketch {
            params, registry, ..
        } = &mut sketch;

        for record in records {
            if let PrimitiveRecord::Point { id, x, y, fixed } = *record {
                registry.insert_point(params, id, x, y, fixed)?;
            }
        }
        for record in records {
            match *record {
                PrimitiveRecord::Line { id, p1, p2 } => {
                    registry.insert_primitive(id, Primitive::Line { p1, p2 })?;
                }
                PrimitiveRecord::Circle {
                    id,
                    center,
                    radius,
                    fixed_radius,
                } => {
                    // Check before allocating, so a bad record leaves no stray parameter.
                    if registry.get(id).is_some() {
                        return Err(Error::DuplicateId(id));
                    }
                    let radius = if fixed_radius {
                        params.push_fixed(radius)
                    } else {
                        params.push(radius)
                    };
                    registry.insert_primitive(id, Primitive::Circle { center, radius })?;
                }
                PrimitiveRecord::Arc {
                    id,
                    center,
                    start,
                    end,
                } => {
                    registry.insert_primitive(id, Primitive::Arc { center, start, end })?;
                }
                PrimitiveRecord::Point { .. } | PrimitiveRecord::Constraint { .. } => {}
            }
        }
        for record in records {
            let PrimitiveRecord::Constraint {
                id,
                kind,
                ref targets,
                value,
            } = *record
            else {
                continue;
            };
            let given = usize::from(value.is_some());
            if given != kind.aux_arity() {
                return Err(Error::InvalidConstraintTarget {
                    constraint: id,
                    kind,
                    problem: TargetProblem::WrongAuxArity {
                        expected: kind.aux_arity(),
                        found: given,
                    },
                });
            }
            let aux: Vec<_> = value.map(|v| params.push_fixed(v)).into_iter().collect();
            registry.insert_constraint(params, id, kind, targets, &aux)?;
        }
        Ok(sketch)
    }

    /// Every record in insertion order, with current (solved) values filled in.
    pub fn read_back(&self) -> Vec<PrimitiveRecord> {
        let params = &self.params;
        self.registry
            .get_primitives()
            .map(|(id, entry)| match entry {
                Entry::Primitive(Primitive::Point { x, y }) => PrimitiveRecord::Point {
                    id,
                    x: params.get(*x),
                    y: params.get(*y),
                    fixed: params.is_fixed(*x) && params.is_fixed(*y),
                },
                Entry::Primitive(Primitive::Line { p1, p2 }) => PrimitiveRecord::Line {
                    id,
                    p1: *p1,
                    p2: *p2,
                },
                Entry::Primitive(Primitive::Circle { center, radius }) => PrimitiveRecord::Circle {
                    id,
                    center: *center,
                    radius: params.get(*radius),
                    fixed_radius: params.is_fixed(*radius),
                },
                Entry::Primitive(Primitive::Arc { center, start, end }) => PrimitiveRecord::Arc {
                    id,
                    center: *center,
                    start: *start,
                    end: *end,
                },
                Entry::Constraint(c) => PrimitiveRecord::Constraint {
                    id,
                    kind: c.kind(),
                    targets: c.targets().to_vec(),
                    value: c.aux().first().map(|&a| params.get(a)),
                },
            })
            .collect()
    }
}
