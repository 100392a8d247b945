use faer::{
    Col, ColRef, Mat,
    sparse::{Pair, SparseColMatRef, SymbolicSparseColMat},
};
use log::trace;

use crate::{Error, constraints::ConstraintEntry, constraints::JacobianVar, id::Id};

pub(crate) mod find_dof;
pub(crate) mod levenberg_marquardt;
pub(crate) mod linalg;

pub use levenberg_marquardt::{Control, IterationStats};

// Roughly. Most constraints will only involve roughly 4 variables.
// May as well round up to the nearest power of 2.
const NONZEROES_PER_ROW: usize = 8;

/// Which iteration the solver runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum Algorithm {
    /// Damped least squares, adapting the damping after every step.
    #[default]
    LevenbergMarquardt,
    /// Undamped steps. Damping is only used to recover from a singular
    /// system or a failed line search, and dropped after the next good step.
    GaussNewton,
}

/// Options for a solve.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub struct Config {
    /// Which iteration to run.
    pub algorithm: Algorithm,
    /// Give up after this many iterations.
    pub max_iterations: usize,
    /// Converged once the residual's L2 norm is at most this...
    pub convergence_tolerance: f64,
    /// ...and the last applied update's largest component is at most this.
    pub step_tolerance: f64,
    /// A solve which ran out of iterations still counts as acceptable
    /// if its residual norm is at most this.
    pub secondary_tolerance: f64,
    /// Starting damping λ for Levenberg-Marquardt.
    pub initial_damping: f64,
    /// How many times the line search halves a step before giving up on it.
    pub max_line_search_halvings: usize,
    /// After a failed solve, look for the constraints responsible.
    /// This re-solves the sketch once per suspect constraint.
    pub analyze_conflicts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            max_iterations: 250,
            convergence_tolerance: 1e-6,
            step_tolerance: 1e-6,
            secondary_tolerance: 1e-5,
            initial_damping: 1e-2,
            max_line_search_halvings: 8,
            analyze_conflicts: true,
        }
    }
}

impl Config {
    /// Use a different iteration.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Change the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Change the residual tolerance.
    pub fn with_convergence_tolerance(mut self, convergence_tolerance: f64) -> Self {
        self.convergence_tolerance = convergence_tolerance;
        self
    }

    /// Change the step tolerance.
    pub fn with_step_tolerance(mut self, step_tolerance: f64) -> Self {
        self.step_tolerance = step_tolerance;
        self
    }

    /// Change the looser tolerance that makes an unconverged solve acceptable.
    pub fn with_secondary_tolerance(mut self, secondary_tolerance: f64) -> Self {
        self.secondary_tolerance = secondary_tolerance;
        self
    }

    /// Change the starting damping.
    pub fn with_initial_damping(mut self, initial_damping: f64) -> Self {
        self.initial_damping = initial_damping;
        self
    }

    /// Change how many times the line search may halve a step.
    pub fn with_max_line_search_halvings(mut self, max_line_search_halvings: usize) -> Self {
        self.max_line_search_halvings = max_line_search_halvings;
        self
    }

    /// Turn conflict isolation on or off.
    pub fn with_analyze_conflicts(mut self, analyze_conflicts: bool) -> Self {
        self.analyze_conflicts = analyze_conflicts;
        self
    }
}

/// Maps parameters to matrix columns.
pub(crate) struct Layout {
    /// Equivalent to number of rows in the matrix being solved.
    total_num_residuals: usize,
    /// One free parameter per column of the matrix.
    free: Vec<Id>,
    /// Column of each parameter, indexed by its ID. None for parameters that
    /// aren't being solved for (fixed, or belonging to nothing).
    columns: Vec<Option<usize>>,
}

impl Layout {
    fn new(free: &[Id], total_num_residuals: usize, num_params: usize) -> Self {
        let mut columns = vec![None; num_params];
        for (col, &id) in free.iter().enumerate() {
            if let Some(slot) = columns.get_mut(id as usize) {
                *slot = Some(col);
            }
        }
        Self {
            total_num_residuals,
            free: free.to_vec(),
            columns,
        }
    }

    /// Which column is this parameter, if it's free?
    pub fn index_of(&self, var: Id) -> Option<usize> {
        self.columns.get(var as usize).copied().flatten()
    }

    pub fn num_variables(&self) -> usize {
        self.free.len()
    }

    pub fn num_residuals(&self) -> usize {
        self.total_num_residuals
    }

    /// Parameter ID of each column.
    pub fn free(&self) -> &[Id] {
        &self.free
    }
}

/// A Jacobian cache.
/// Stores the Jacobian so we don't constantly reallocate it.
pub(crate) struct Jc {
    /// The symbolic structure of the matrix (i.e. which cells are non-zero).
    /// This way the matrix's structure is only allocated once, and reused
    /// between different Jacobian calculations.
    sym: SymbolicSparseColMat<usize>,
    /// The values which belong in that symbolic matrix, sorted in column-major order.
    /// Must be column-major because faer expects that.
    vals: Vec<f64>,
}

/// One constraint system, ready to be evaluated over and over.
pub(crate) struct Model<'c> {
    layout: Layout,
    jc: Jc,
    constraints: &'c [ConstraintEntry],
    /// First row of each constraint.
    row_offsets: Vec<usize>,
    /// Which constraints had their gradient skipped in the last Jacobian refresh.
    degenerate: Vec<bool>,
    row0_scratch: Vec<JacobianVar>,
    row1_scratch: Vec<JacobianVar>,
}

impl<'c> Model<'c> {
    /// `free` lists the parameters to solve for, `num_params` is the size of
    /// the parameter store the values will come from.
    pub fn new(constraints: &'c [ConstraintEntry], free: &[Id], num_params: usize) -> Result<Self, Error> {
        /*
        Firstly, find the size of the relevant matrices.
        Each constraint yields 1 or more residual function f.
        The overall Jacobian is a matrix where
            each row is one of the residual functions.
            each column is a free parameter
            each cell represents the partial derivative of that column's variable,
            in that row's equation.
        Fixed parameters get no column at all, but their values still feed the residuals.
        */
        let mut row_offsets = Vec::with_capacity(constraints.len());
        let mut num_rows = 0;
        for c in constraints {
            row_offsets.push(num_rows);
            num_rows += c.constraint.residual_dim();
        }
        let layout = Layout::new(free, num_rows, num_params);
        let num_cols = layout.num_variables();

        // Generate the Jacobian matrix structure.
        let mut nonzero_cells: Vec<Pair<usize, usize>> = Vec::with_capacity(NONZEROES_PER_ROW * num_rows);
        let mut row0 = Vec::with_capacity(NONZEROES_PER_ROW);
        let mut row1 = Vec::with_capacity(NONZEROES_PER_ROW);
        for (c, &row_num) in constraints.iter().zip(&row_offsets) {
            row0.clear();
            row1.clear();
            c.constraint.nonzeroes(&mut row0, &mut row1);
            for (offset, row) in [&row0, &row1].into_iter().enumerate() {
                for col in row.iter().filter_map(|&var| layout.index_of(var)) {
                    nonzero_cells.push(Pair {
                        row: row_num + offset,
                        col,
                    });
                }
            }
        }

        // Create symbolic structure; this will automatically deduplicate and sort.
        let (sym, _) = SymbolicSparseColMat::try_new_from_indices(num_rows, num_cols, &nonzero_cells)?;

        Ok(Self {
            layout,
            jc: Jc {
                vals: vec![0.0; sym.compute_nnz()],
                sym,
            },
            constraints,
            row_offsets,
            degenerate: vec![false; constraints.len()],
            row0_scratch: Vec::with_capacity(NONZEROES_PER_ROW),
            row1_scratch: Vec::with_capacity(NONZEROES_PER_ROW),
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn constraints(&self) -> &'c [ConstraintEntry] {
        self.constraints
    }

    /// Rows belonging to the constraint at this index.
    pub fn rows_of(&self, constraint_index: usize) -> std::ops::Range<usize> {
        let start = self.row_offsets[constraint_index];
        start..start + self.constraints[constraint_index].constraint.residual_dim()
    }

    /// Did this constraint's gradient get skipped in the last refresh?
    pub fn is_degenerate(&self, constraint_index: usize) -> bool {
        self.degenerate[constraint_index]
    }

    /// Compute the residual F, figuring out how close the problem is to being solved.
    /// `values` is every parameter in the store, indexed by [`Id`].
    pub fn residual(&self, values: &[f64], out: &mut [f64]) {
        let mut degenerate = false;
        for (c, &row_num) in self.constraints.iter().zip(&self.row_offsets) {
            let mut residual0 = 0.0;
            let mut residual1 = 0.0;
            c.constraint
                .residual(values, &mut residual0, &mut residual1, &mut degenerate);
            out[row_num] = residual0;
            if c.constraint.residual_dim() == 2 {
                out[row_num + 1] = residual1;
            }
        }
    }

    /// Update the values of the cached sparse Jacobian.
    pub fn refresh_jacobian(&mut self, values: &[f64]) {
        // To enable per-variable partial derivative accumulation (i.e. local to global
        // Jacobian assembly), we need to zero out the Jacobian values first.
        self.jc.vals.fill(0.0);

        for (i, c) in self.constraints.iter().enumerate() {
            let row_num = self.row_offsets[i];
            self.row0_scratch.clear();
            self.row1_scratch.clear();
            let mut degenerate = false;
            c.constraint.jacobian_rows(
                values,
                &mut self.row0_scratch,
                &mut self.row1_scratch,
                &mut degenerate,
            );
            self.degenerate[i] = degenerate;
            if degenerate {
                trace!("{} constraint {} has no gradient here", c.constraint.constraint_kind(), c.id);
            }

            let rows = [(row_num, &self.row0_scratch), (row_num + 1, &self.row1_scratch)];
            for (row, jacobian_vars) in rows {
                for jacobian_var in jacobian_vars.iter() {
                    // Fixed parameters have no column.
                    let Some(col) = self.layout.index_of(jacobian_var.id) else {
                        continue;
                    };

                    // Find where this (row, col) entry should go in the sparse structure.
                    let mut col_range = self.jc.sym.col_range(col);
                    let row_indices = self.jc.sym.row_idx();
                    if let Some(idx) = col_range.find(|idx| row_indices[*idx] == row) {
                        // Found the right position; accumulate the partials.
                        self.jc.vals[idx] += jacobian_var.partial_derivative;
                    }
                }
            }
        }
    }

    /// The Jacobian as of the last refresh.
    pub fn jacobian(&self) -> SparseColMatRef<'_, usize, f64> {
        SparseColMatRef::new(self.jc.sym.as_ref(), &self.jc.vals)
    }

    /// Build `JᵀJ` and `Jᵀr` from the last refreshed Jacobian.
    /// `JᵀJ` comes back dense, ready for damping and factorizing.
    pub fn normal_equations(&self, residual: &[f64]) -> Result<(Mat<f64>, Col<f64>), Error> {
        let j = self.jacobian();
        // Jᵀ is a row-major view, and the sparse product wants column-major on both sides.
        let jtj = j.transpose().to_col_major()? * j;
        let jtr = j.transpose() * ColRef::from_slice(residual);
        Ok((jtj.to_dense(), jtr))
    }
}

/// Sum of squares.
pub(crate) fn squared_norm(residual: &[f64]) -> f64 {
    residual.iter().map(|r| r * r).sum()
}
