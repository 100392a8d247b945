//! The caller-owned session: one sketch's parameters and registry.
use log::debug;

use crate::{
    Config, ConstraintKind, Diagnostics, EntityId, Error, Id, ParameterStore, Registry,
    SolveReport, SolveStatus, TargetProblem,
    analysis,
    datatypes::outputs::Point,
    registry::{ArcRef, CircleRef, ConstraintRef, Entry, LineRef, PointRef},
    solver::{Control, IterationStats, Model, levenberg_marquardt::SolveRun, squared_norm},
};

/// A 2D sketch: primitives, the constraints between them, and the parameters
/// they're all built from.
///
/// Sketches are independent of each other, so separate sketches can be solved
/// on separate threads. A single sketch needs `&mut` to solve.
#[derive(Debug, Clone, Default)]
pub struct Sketch {
    pub(crate) params: ParameterStore,
    pub(crate) registry: Registry,
    /// Results of the last solve or analysis, dropped whenever the sketch changes.
    last: Option<LastAnalysis>,
}

#[derive(Debug, Clone)]
struct LastAnalysis {
    diagnostics: Diagnostics,
    conflicting: Vec<EntityId>,
}

impl Sketch {
    /// An empty sketch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every parameter's current value and fixedness.
    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    /// Every primitive and constraint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn changed(&mut self) {
        self.last = None;
    }

    /// Add a point. Fixed points are never moved by the solver.
    pub fn add_point(&mut self, x: f64, y: f64, fixed: bool) -> PointRef {
        self.changed();
        self.registry.add_point(&mut self.params, x, y, fixed)
    }

    /// Add a line between two points.
    pub fn add_line(&mut self, p1: PointRef, p2: PointRef) -> Result<LineRef, Error> {
        self.changed();
        self.registry.add_line(p1, p2)
    }

    /// Add a circle. A fixed radius is never changed by the solver.
    pub fn add_circle(&mut self, center: PointRef, radius: f64, fixed_radius: bool) -> Result<CircleRef, Error> {
        self.changed();
        self.registry.add_circle(&mut self.params, center, radius, fixed_radius)
    }

    /// Add an arc, counter-clockwise from `start` to `end`.
    pub fn add_arc(&mut self, center: PointRef, start: PointRef, end: PointRef) -> Result<ArcRef, Error> {
        self.changed();
        self.registry.add_arc(center, start, end)
    }

    /// Add a standalone parameter, e.g. to share one dimension between
    /// several constraints, or to let the solver find a dimension.
    pub fn add_parameter(&mut self, value: f64, fixed: bool) -> Id {
        self.changed();
        if fixed {
            self.params.push_fixed(value)
        } else {
            self.params.push(value)
        }
    }

    /// Add a constraint over existing primitives and parameters.
    pub fn add_constraint(
        &mut self,
        kind: ConstraintKind,
        targets: &[EntityId],
        aux: &[Id],
    ) -> Result<ConstraintRef, Error> {
        self.changed();
        self.registry.add_constraint(&self.params, kind, targets, aux)
    }

    /// Add a constraint, creating a fixed parameter for its value if it takes one.
    pub fn constrain(
        &mut self,
        kind: ConstraintKind,
        targets: &[EntityId],
        value: Option<f64>,
    ) -> Result<ConstraintRef, Error> {
        let given = usize::from(value.is_some());
        if given != kind.aux_arity() {
            // Nothing has an ID yet, so blame the ID it would have got.
            return Err(Error::InvalidConstraintTarget {
                constraint: self.registry.peek_id(),
                kind,
                problem: TargetProblem::WrongAuxArity {
                    expected: kind.aux_arity(),
                    found: given,
                },
            });
        }
        let aux: Vec<Id> = value.map(|v| self.params.push_fixed(v)).into_iter().collect();
        self.add_constraint(kind, targets, &aux)
    }

    /// Delete a primitive or constraint.
    /// Constraints which referred to a removed primitive make the next solve fail.
    pub fn remove(&mut self, id: EntityId) -> Result<Entry, Error> {
        self.changed();
        self.registry.remove(id)
    }

    /// Every record, in insertion order.
    pub fn get_primitives(&self) -> impl ExactSizeIterator<Item = (EntityId, &Entry)> {
        self.registry.get_primitives()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.changed();
        self.registry.clear();
        self.params.clear();
    }

    /// Current position of a point.
    pub fn point_position(&self, id: EntityId) -> Result<Point, Error> {
        let p = self.registry.point(id).map_err(|_| Error::NotFound(id))?;
        Ok(Point {
            x: self.params.get(p.id_x()),
            y: self.params.get(p.id_y()),
        })
    }

    /// Move a free point, e.g. while the user drags it.
    pub fn move_point(&mut self, id: EntityId, x: f64, y: f64) -> Result<(), Error> {
        let p = self.registry.point(id).map_err(|_| Error::NotFound(id))?;
        for param in [p.id_x(), p.id_y()] {
            if self.params.is_fixed(param) {
                return Err(Error::FixedParameter(param));
            }
        }
        self.changed();
        self.params.set(p.id_x(), x);
        self.params.set(p.id_y(), y);
        Ok(())
    }

    /// Change a free parameter's value.
    pub fn set_parameter(&mut self, id: Id, value: f64) -> Result<(), Error> {
        if !self.params.contains(id) {
            return Err(Error::UnknownParameter(id));
        }
        if self.params.is_fixed(id) {
            return Err(Error::FixedParameter(id));
        }
        self.changed();
        self.params.set(id, value);
        Ok(())
    }

    /// Let the solver change this parameter, or stop it from doing so.
    pub fn set_fixed(&mut self, id: Id, fixed: bool) -> Result<(), Error> {
        if !self.params.contains(id) {
            return Err(Error::UnknownParameter(id));
        }
        self.changed();
        if fixed {
            self.params.mark_fixed(id);
        } else {
            self.params.mark_free(id);
        }
        Ok(())
    }

    /// Solve the sketch, writing the solved values back into its parameters.
    pub fn solve(&mut self, config: &Config) -> Result<SolveReport, Error> {
        self.solve_cb(config, |_| Control::Continue)
    }

    /// Like [`Sketch::solve`], but calls `on_iter` at the top of every iteration.
    /// Returning [`Control::Cancel`] stops the solve, leaving the parameters
    /// at the last fully accepted iterate.
    pub fn solve_cb<F>(&mut self, config: &Config, on_iter: F) -> Result<SolveReport, Error>
    where
        F: FnMut(&IterationStats) -> Control,
    {
        // Fails before anything moves if a constraint lost its target.
        let constraints = self.registry.constraints(&self.params)?;
        let free = self.registry.free_parameters(&self.params, &constraints);
        let mut values = self.params.values().to_vec();
        let mut model = Model::new(&constraints, &free, values.len())?;

        let run = if constraints.is_empty() {
            SolveRun {
                status: SolveStatus::Converged,
                iterations: 0,
                residual_norm: 0.0,
                singular_iterations: 0,
            }
        } else if free.is_empty() {
            let mut residual = vec![0.0; model.layout().num_residuals()];
            model.residual(&values, &mut residual);
            SolveRun {
                status: SolveStatus::NoFreeParameters,
                iterations: 0,
                residual_norm: squared_norm(&residual).sqrt(),
                singular_iterations: 0,
            }
        } else {
            model.solve_lm(&mut values, config, on_iter)?
        };

        for &id in &free {
            self.params.set(id, values[id as usize]);
        }

        let needs_isolation = matches!(
            run.status,
            SolveStatus::MaxIterationsReached | SolveStatus::NoFreeParameters
        ) && !(run.residual_norm <= config.secondary_tolerance);
        let conflicting = if config.analyze_conflicts && needs_isolation {
            analysis::find_conflicts(&constraints, &free, &values, config)?
        } else {
            Vec::new()
        };
        let diagnostics = analysis::diagnose(&mut model, &values, &self.params, &conflicting)?;
        debug!(
            "{:?}: {} degrees of freedom, {} conflicting, {} redundant",
            run.status,
            diagnostics.degrees_of_freedom,
            conflicting.len(),
            diagnostics.redundant.len()
        );

        self.last = Some(LastAnalysis {
            diagnostics: diagnostics.clone(),
            conflicting: conflicting.clone(),
        });
        Ok(SolveReport {
            status: run.status,
            iterations: run.iterations,
            residual_norm: run.residual_norm,
            singular_iterations: run.singular_iterations,
            secondary_tolerance: config.secondary_tolerance,
            conflicting,
            diagnostics,
        })
    }

    /// Rank analysis at the current values, without solving.
    /// Conflicts can only be found by solving, so this doesn't look for them.
    pub fn analyze(&mut self) -> Result<Diagnostics, Error> {
        let constraints = self.registry.constraints(&self.params)?;
        let free = self.registry.free_parameters(&self.params, &constraints);
        let mut model = Model::new(&constraints, &free, self.params.len())?;
        let diagnostics = analysis::diagnose(&mut model, self.params.values(), &self.params, &[])?;
        self.last = Some(LastAnalysis {
            diagnostics: diagnostics.clone(),
            conflicting: Vec::new(),
        });
        Ok(diagnostics)
    }

    /// Degrees of freedom found by the last solve or analysis.
    /// None if the sketch changed since.
    pub fn dof(&self) -> Option<usize> {
        self.last.as_ref().map(|last| last.diagnostics.degrees_of_freedom)
    }

    /// Did the last solve find conflicting constraints?
    pub fn has_conflicting(&self) -> bool {
        self.last.as_ref().is_some_and(|last| !last.conflicting.is_empty())
    }

    /// Did the last solve or analysis find redundant constraints?
    pub fn has_redundant(&self) -> bool {
        self.last
            .as_ref()
            .is_some_and(|last| !last.diagnostics.redundant.is_empty())
    }
}
