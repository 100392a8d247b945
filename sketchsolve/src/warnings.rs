use crate::{EntityId, ParameterStore, constraints::Constraint, constraints::ConstraintEntry};

/// Something that might be wrong with a sketch, but didn't stop it being solved.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    /// Which constraint this is about, if any.
    pub about_constraint: Option<EntityId>,
    /// What's wrong.
    pub content: WarningContent,
}

/// The different things a [`Warning`] can say.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum WarningContent {
    /// The constraint's gradient couldn't be computed, because points which
    /// define a direction are on top of each other.
    Degenerate,
    /// An angle constraint (radians) which is really a parallel constraint.
    ShouldBeParallel(f64),
    /// An angle constraint (radians) which is really a perpendicular constraint.
    ShouldBePerpendicular(f64),
}

/// Look for fixed angles which would be better expressed as another kind of constraint.
pub(crate) fn lint(constraints: &[ConstraintEntry], params: &ParameterStore) -> Vec<Warning> {
    let mut warnings = Vec::default();
    for entry in constraints {
        let Constraint::LinesAtAngle(_, _, angle) = entry.constraint else {
            continue;
        };
        // Driven angles are outputs, so there's nothing to suggest.
        if !params.is_fixed(angle.id) {
            continue;
        }
        let theta = params.get(angle.id);
        let degrees = theta.to_degrees();
        if nearly_eq(degrees, 0.0) || nearly_eq(degrees.abs(), 360.0) || nearly_eq(degrees.abs(), 180.0) {
            warnings.push(Warning {
                about_constraint: Some(entry.id),
                content: WarningContent::ShouldBeParallel(theta),
            });
        } else if nearly_eq(degrees.abs(), 90.0) || nearly_eq(degrees.abs(), 270.0) {
            warnings.push(Warning {
                about_constraint: Some(entry.id),
                content: WarningContent::ShouldBePerpendicular(theta),
            });
        }
    }
    warnings
}

impl std::fmt::Display for WarningContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningContent::Degenerate => write!(
                f,
                "This geometry is degenerate, meaning two points are so close together that they practically overlap. This is probably unintentional, you probably should place your initial guesses further apart or choose different constraints."
            ),
            WarningContent::ShouldBeParallel(angle) => {
                write!(
                    f,
                    "Instead of constraining to {}°, constrain to parallel",
                    angle.to_degrees()
                )
            }
            WarningContent::ShouldBePerpendicular(angle) => {
                write!(
                    f,
                    "Instead of constraining to {}°, constrain to perpendicular",
                    angle.to_degrees()
                )
            }
        }
    }
}

fn nearly_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < crate::EPSILON
}
