use faer::{
    linalg::svd::SvdError,
    sparse::{CreationError, FaerError},
};

use crate::{ConstraintKind, EntityId, EntityType, Id};

/// Errors that could occur while building or analysing a sketch.
///
/// A solve that fails to converge is not an error, see [`crate::SolveStatus`].
#[derive(thiserror::Error, Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum Error {
    /// A constraint references something it can't be applied to.
    #[error("Constraint {constraint} ({kind}) has an invalid target: {problem}")]
    InvalidConstraintTarget {
        /// The constraint that was rejected.
        constraint: EntityId,
        /// What kind of constraint it is.
        kind: ConstraintKind,
        /// What exactly was wrong with it.
        problem: TargetProblem,
    },
    /// A line, circle or arc references a point that doesn't exist.
    #[error("{referenced_by} refers to point {missing} but it was never defined")]
    UnknownPrimitive {
        /// The primitive holding the dangling reference.
        referenced_by: EntityId,
        /// The point it was looking for.
        missing: EntityId,
    },
    /// Two records were given the same ID.
    #[error("ID {0} is used more than once")]
    DuplicateId(EntityId),
    /// ID was not found.
    #[error("ID {0} not found")]
    NotFound(EntityId),
    /// No parameter has this ID.
    #[error("Parameter {0} not found")]
    UnknownParameter(Id),
    /// Tried to change a parameter which is fixed.
    #[error("Parameter {0} is fixed and cannot be changed")]
    FixedParameter(Id),
    /// Faer: could not create a matrix.
    #[error("Could not create matrix: {error}")]
    FaerMatrix {
        /// Underlying error.
        #[from]
        error: CreationError,
    },
    /// Faer: general error.
    #[error("Something went wrong in faer: {error}")]
    Faer {
        /// Underlying error.
        #[from]
        error: FaerError,
    },
    /// Faer: could not decompose Jacobian.
    #[error("Something went wrong doing SVD in faer")]
    FaerSvd(SvdError),
}

/// Why a constraint's targets were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum TargetProblem {
    /// This target doesn't exist (never added, or removed since).
    Missing(EntityId),
    /// This target exists but is the wrong sort of thing.
    WrongType {
        /// The offending target.
        id: EntityId,
        /// What the constraint needed in this position.
        expected: EntityType,
        /// What was actually there.
        found: EntityType,
    },
    /// Wrong number of targets.
    WrongArity {
        /// How many targets this kind takes.
        expected: usize,
        /// How many were given.
        found: usize,
    },
    /// Wrong number of auxiliary parameters (target distance, angle etc).
    WrongAuxArity {
        /// How many auxiliary parameters this kind takes.
        expected: usize,
        /// How many were given.
        found: usize,
    },
    /// An auxiliary parameter isn't in the parameter store.
    UnknownParameter(Id),
}

impl std::fmt::Display for TargetProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetProblem::Missing(id) => write!(f, "{id} does not exist"),
            TargetProblem::WrongType {
                id,
                expected,
                found,
            } => write!(f, "{id} is a {found} but a {expected} was expected"),
            TargetProblem::WrongArity { expected, found } => {
                write!(f, "expected {expected} targets, got {found}")
            }
            TargetProblem::WrongAuxArity { expected, found } => {
                write!(f, "expected {expected} parameters, got {found}")
            }
            TargetProblem::UnknownParameter(id) => write!(f, "parameter {id} does not exist"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_culprit() {
        let err = Error::InvalidConstraintTarget {
            constraint: EntityId(4),
            kind: ConstraintKind::Parallel,
            problem: TargetProblem::WrongType {
                id: EntityId(2),
                expected: EntityType::Line,
                found: EntityType::Point,
            },
        };
        assert_eq!(
            err.to_string(),
            "Constraint #4 (parallel) has an invalid target: #2 is a point but a line was expected"
        );
    }
}
