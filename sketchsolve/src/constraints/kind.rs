use crate::EntityType::{self, Arc, Circle, Line, Point};

/// Every kind of constraint a caller can add.
///
/// Each kind documents its targets (in order) and its auxiliary parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum ConstraintKind {
    /// Two points, one distance.
    P2pDistance,
    /// Two points.
    P2pCoincident,
    /// Two points, or one line.
    Horizontal,
    /// Two points, or one line.
    Vertical,
    /// Two points, one signed distance along X.
    HorizontalDistance,
    /// Two points, one signed distance along Y.
    VerticalDistance,
    /// Two lines.
    Parallel,
    /// Two lines.
    Perpendicular,
    /// Two lines.
    EqualLength,
    /// Two lines, one angle in radians (counter-clockwise from the first line).
    Angle,
    /// One point, one value.
    CoordinateX,
    /// One point, one value.
    CoordinateY,
    /// One point, one line.
    PointOnLine,
    /// One point, one line, one signed distance.
    PointLineDistance,
    /// One point, one line.
    Midpoint,
    /// Two points, one line (the mirror).
    Symmetric,
    /// One point, one circle.
    PointOnCircle,
    /// One circle, one radius.
    Radius,
    /// Two circles.
    EqualRadius,
    /// One line, one circle.
    Tangent,
    /// One arc, one radius.
    ArcRadius,
    /// One arc.
    ArcEquidistant,
}

impl ConstraintKind {
    /// Every kind, in declaration order.
    pub const ALL: [ConstraintKind; 22] = [
        Self::P2pDistance,
        Self::P2pCoincident,
        Self::Horizontal,
        Self::Vertical,
        Self::HorizontalDistance,
        Self::VerticalDistance,
        Self::Parallel,
        Self::Perpendicular,
        Self::EqualLength,
        Self::Angle,
        Self::CoordinateX,
        Self::CoordinateY,
        Self::PointOnLine,
        Self::PointLineDistance,
        Self::Midpoint,
        Self::Symmetric,
        Self::PointOnCircle,
        Self::Radius,
        Self::EqualRadius,
        Self::Tangent,
        Self::ArcRadius,
        Self::ArcEquidistant,
    ];

    /// The snake_case discriminator used in [`crate::PrimitiveRecord`]s.
    pub fn name(self) -> &'static str {
        match self {
            Self::P2pDistance => "p2p_distance",
            Self::P2pCoincident => "p2p_coincident",
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::HorizontalDistance => "horizontal_distance",
            Self::VerticalDistance => "vertical_distance",
            Self::Parallel => "parallel",
            Self::Perpendicular => "perpendicular",
            Self::EqualLength => "equal_length",
            Self::Angle => "angle",
            Self::CoordinateX => "coordinate_x",
            Self::CoordinateY => "coordinate_y",
            Self::PointOnLine => "point_on_line",
            Self::PointLineDistance => "point_line_distance",
            Self::Midpoint => "midpoint",
            Self::Symmetric => "symmetric",
            Self::PointOnCircle => "point_on_circle",
            Self::Radius => "radius",
            Self::EqualRadius => "equal_radius",
            Self::Tangent => "tangent",
            Self::ArcRadius => "arc_radius",
            Self::ArcEquidistant => "arc_equidistant",
        }
    }

    /// Inverse of [`ConstraintKind::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Acceptable target lists. Most kinds have exactly one.
    pub fn signatures(self) -> &'static [&'static [EntityType]] {
        match self {
            Self::P2pDistance
            | Self::P2pCoincident
            | Self::HorizontalDistance
            | Self::VerticalDistance => &[&[Point, Point]],
            Self::Horizontal | Self::Vertical => &[&[Point, Point], &[Line]],
            Self::Parallel | Self::Perpendicular | Self::EqualLength | Self::Angle => {
                &[&[Line, Line]]
            }
            Self::CoordinateX | Self::CoordinateY => &[&[Point]],
            Self::PointOnLine | Self::PointLineDistance | Self::Midpoint => &[&[Point, Line]],
            Self::Symmetric => &[&[Point, Point, Line]],
            Self::PointOnCircle => &[&[Point, Circle]],
            Self::Radius => &[&[Circle]],
            Self::EqualRadius => &[&[Circle, Circle]],
            Self::Tangent => &[&[Line, Circle]],
            Self::ArcRadius | Self::ArcEquidistant => &[&[Arc]],
        }
    }

    /// How many auxiliary parameters (target distance, angle, value) this kind takes.
    pub fn aux_arity(self) -> usize {
        match self {
            Self::P2pDistance
            | Self::HorizontalDistance
            | Self::VerticalDistance
            | Self::Angle
            | Self::CoordinateX
            | Self::CoordinateY
            | Self::PointLineDistance
            | Self::Radius
            | Self::ArcRadius => 1,
            Self::P2pCoincident
            | Self::Horizontal
            | Self::Vertical
            | Self::Parallel
            | Self::Perpendicular
            | Self::EqualLength
            | Self::PointOnLine
            | Self::Midpoint
            | Self::Symmetric
            | Self::PointOnCircle
            | Self::EqualRadius
            | Self::Tangent
            | Self::ArcEquidistant => 0,
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in ConstraintKind::ALL {
            assert_eq!(ConstraintKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ConstraintKind::from_name("p2p_distance"), Some(ConstraintKind::P2pDistance));
        assert_eq!(ConstraintKind::from_name("colinear"), None);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = ConstraintKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ConstraintKind::ALL.len());
    }
}
