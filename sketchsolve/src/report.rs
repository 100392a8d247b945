use crate::{EntityId, Id, Warning};

/// How a solve ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum SolveStatus {
    /// Every residual is within tolerance and the iterate stopped moving.
    Converged,
    /// Nothing could move, so nothing was done. Residuals were still evaluated.
    NoFreeParameters,
    /// Ran out of iterations (or damping saturated) before converging.
    /// Check [`SolveReport::is_acceptable`] before discarding the result.
    MaxIterationsReached,
    /// The caller asked to stop.
    Cancelled,
}

/// Rank analysis of a sketch at its current parameter values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub(crate) degrees_of_freedom: usize,
    pub(crate) underconstrained: Vec<Id>,
    pub(crate) redundant: Vec<EntityId>,
    pub(crate) warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Free parameters minus the number of independent equations.
    pub fn degrees_of_freedom(&self) -> usize {
        self.degrees_of_freedom
    }

    /// Free parameters which can still move without changing any residual.
    pub fn underconstrained(&self) -> &[Id] {
        &self.underconstrained
    }

    /// Constraints which only repeat what earlier constraints already say.
    pub fn redundant(&self) -> &[EntityId] {
        &self.redundant
    }

    /// Anything suspicious about the problem definition or the final geometry.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }
}

/// Everything a caller might want to know after [`crate::Sketch::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub(crate) status: SolveStatus,
    pub(crate) iterations: usize,
    pub(crate) residual_norm: f64,
    pub(crate) singular_iterations: usize,
    pub(crate) secondary_tolerance: f64,
    pub(crate) conflicting: Vec<EntityId>,
    pub(crate) diagnostics: Diagnostics,
}

impl SolveReport {
    /// How the solve ended.
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// How many iterations ran. Zero if the sketch was already solved.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// L2 norm of every residual at the final values.
    pub fn residual_norm(&self) -> f64 {
        self.residual_norm
    }

    /// How many iterations hit a singular system and had to raise the damping.
    pub fn singular_iterations(&self) -> usize {
        self.singular_iterations
    }

    /// Free parameters minus the number of independent equations.
    pub fn degrees_of_freedom(&self) -> usize {
        self.diagnostics.degrees_of_freedom
    }

    /// Constraints which can't be satisfied together with the rest.
    pub fn conflicting(&self) -> &[EntityId] {
        &self.conflicting
    }

    /// Constraints which only repeat what earlier constraints already say.
    pub fn redundant(&self) -> &[EntityId] {
        &self.diagnostics.redundant
    }

    /// Free parameters which can still move without changing any residual.
    pub fn underconstrained(&self) -> &[Id] {
        &self.diagnostics.underconstrained
    }

    /// Anything suspicious about the problem definition or the final geometry.
    pub fn warnings(&self) -> &[Warning] {
        &self.diagnostics.warnings
    }

    /// The rank analysis at the final values.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Is the result usable? True if converged, or if the solve stopped
    /// (out of iterations, or with nothing free to move) with the residual
    /// inside the secondary tolerance.
    pub fn is_acceptable(&self) -> bool {
        match self.status {
            SolveStatus::Converged => true,
            SolveStatus::MaxIterationsReached | SolveStatus::NoFreeParameters => {
                self.residual_norm <= self.secondary_tolerance
            }
            SolveStatus::Cancelled => false,
        }
    }

    /// Were any constraints found to conflict?
    pub fn has_conflicting(&self) -> bool {
        !self.conflicting.is_empty()
    }

    /// Were any constraints found to be redundant?
    pub fn has_redundant(&self) -> bool {
        !self.diagnostics.redundant.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: SolveStatus, residual_norm: f64) -> SolveReport {
        SolveReport {
            status,
            iterations: 3,
            residual_norm,
            singular_iterations: 0,
            secondary_tolerance: 1e-5,
            conflicting: Vec::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    #[test]
    fn acceptable() {
        assert!(report(SolveStatus::Converged, 0.0).is_acceptable());
        assert!(report(SolveStatus::MaxIterationsReached, 5e-6).is_acceptable());
        assert!(!report(SolveStatus::MaxIterationsReached, 1e-3).is_acceptable());
        assert!(!report(SolveStatus::Cancelled, 0.0).is_acceptable());
        assert!(report(SolveStatus::NoFreeParameters, 0.0).is_acceptable());
        // Nothing could move, and the constraints still aren't met.
        assert!(!report(SolveStatus::NoFreeParameters, 45.0).is_acceptable());
    }

    #[test]
    fn flags_follow_lists() {
        let mut r = report(SolveStatus::MaxIterationsReached, 1.0);
        assert!(!r.has_conflicting());
        assert!(!r.has_redundant());
        r.conflicting.push(EntityId(3));
        r.diagnostics.redundant.push(EntityId(4));
        assert!(r.has_conflicting());
        assert!(r.has_redundant());
    }
}
