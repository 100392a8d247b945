//! Dense factorizations for the damped normal equations and for row independence.
use faer::{Col, Mat, MatRef, linalg::svd::SvdError, prelude::Solve};

/// A pivot smaller than this (relative to the matrix's largest entry)
/// means the system is singular, or close enough that the step would be garbage.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Singular values below this (relative to the largest) don't count towards rank.
pub(crate) const RANK_TOLERANCE: f64 = 1e-8;

/// The system couldn't be solved because a pivot vanished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Singular {
    /// Column of the first pivot below tolerance.
    pub column: usize,
}

/// Solve `a · x = b` with faer's partially pivoted LU.
///
/// Faer happily divides by a tiny pivot, so U's diagonal is checked first
/// and a near-singular system is rejected instead.
pub(crate) fn solve_lu(a: MatRef<'_, f64>, b: &Col<f64>) -> Result<Col<f64>, Singular> {
    debug_assert_eq!(a.nrows(), a.ncols());
    debug_assert_eq!(a.nrows(), b.nrows());
    if a.nrows() == 0 {
        return Ok(Col::zeros(0));
    }

    let scale = a.norm_max();
    if !scale.is_finite() {
        return Err(Singular { column: 0 });
    }
    let threshold = PIVOT_TOLERANCE * scale;

    let lu = a.partial_piv_lu();
    // NaN pivots fail this too.
    if let Some(column) = lu
        .U()
        .diagonal()
        .column_vector()
        .iter()
        .position(|u| !(u.abs() > threshold))
    {
        return Err(Singular { column });
    }
    Ok(lu.solve(b))
}

/// Indices of the rows which add nothing to the rows before them,
/// i.e. where the rank of `rows[..=i]` equals the rank of `rows[..i]`.
/// Zero rows are never independent.
///
/// Prefix rank is monotone, so instead of one decomposition per row this
/// bisects: a range whose rank grows by its length has no dependent rows,
/// and a range whose rank doesn't grow at all is entirely dependent.
pub(crate) fn dependent_rows(rows: MatRef<'_, f64>) -> Result<Vec<usize>, SvdError> {
    let total = rows.nrows();
    if total == 0 {
        return Ok(Vec::new());
    }
    let singular_values = rows.singular_values()?;
    let largest = singular_values.first().copied().unwrap_or(0.0);
    if !(largest > 0.0) {
        return Ok((0..total).collect());
    }
    // One absolute threshold for every prefix, so prefix ranks can't shrink.
    let tolerance = RANK_TOLERANCE * largest;
    let full_rank = singular_values.iter().filter(|&&s| s > tolerance).count();

    let mut dependent = Vec::new();
    bisect(rows, tolerance, (0, 0), (total, full_rank), &mut dependent)?;
    Ok(dependent)
}

/// `lo` and `hi` are (prefix length, rank of that prefix).
fn bisect(
    rows: MatRef<'_, f64>,
    tolerance: f64,
    lo: (usize, usize),
    hi: (usize, usize),
    dependent: &mut Vec<usize>,
) -> Result<(), SvdError> {
    let (start, rank_start) = lo;
    let (end, rank_end) = hi;
    let gained = rank_end.saturating_sub(rank_start);
    if gained >= end - start {
        return Ok(());
    }
    if gained == 0 {
        dependent.extend(start..end);
        return Ok(());
    }
    let mid = start + (end - start) / 2;
    let rank_mid = prefix_rank(rows, mid, tolerance)?;
    bisect(rows, tolerance, lo, (mid, rank_mid), dependent)?;
    bisect(rows, tolerance, (mid, rank_mid), hi, dependent)
}

fn prefix_rank(rows: MatRef<'_, f64>, len: usize, tolerance: f64) -> Result<usize, SvdError> {
    if len == 0 {
        return Ok(0);
    }
    let singular_values = rows.subrows(0, len).singular_values()?;
    Ok(singular_values.iter().filter(|&&s| s > tolerance).count())
}

/// Copy of `mat` with `damping` added along the diagonal.
pub(crate) fn damped(mut mat: Mat<f64>, damping: f64) -> Mat<f64> {
    for i in 0..mat.nrows().min(mat.ncols()) {
        mat[(i, i)] += damping;
    }
    mat
}
