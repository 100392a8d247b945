//! Finding degrees of freedom and assessing which variables are underconstrained.
use crate::{
    Error, Id,
    solver::{Model, linalg::RANK_TOLERANCE},
};

/// Rank analysis of the Jacobian at one point in parameter space.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct FreedomAnalysis {
    /// Number of independent equations.
    pub rank: usize,
    /// Free parameters minus rank.
    pub degrees_of_freedom: usize,
    /// Free parameters which can still move without changing any residual.
    pub underconstrained: Vec<Id>,
}

impl Model<'_> {
    /// Call [`Model::refresh_jacobian`] first.
    pub(crate) fn freedom_analysis(&self) -> Result<FreedomAnalysis, Error> {
        let nvars = self.layout().num_variables();
        if nvars == 0 {
            return Ok(FreedomAnalysis::default());
        }
        if self.layout().num_residuals() == 0 {
            // Nothing constrains anything.
            return Ok(FreedomAnalysis {
                rank: 0,
                degrees_of_freedom: nvars,
                underconstrained: self.layout().free().to_vec(),
            });
        }

        // First step is to compute the SVD.
        // For now, we'll just use a dense SVD algorithm.
        // This is VERY SLOW for large matrices.
        let j_dense = self.jacobian().to_dense();
        debug_assert_eq!(nvars, j_dense.ncols(), "Jacobian was malformed");

        // SVD decomposes `J` into `J = UΣVᵀ`.
        let svd = j_dense.svd().map_err(Error::FaerSvd)?;
        let sigma_diags = svd.S();

        // These are the 'singular values'.
        let sigma_col = sigma_diags.column_vector();

        // The system is underconstrained if there's too many singular values
        // close to 0. How close to 0? The tolerance should be derived from
        // the largest singular value.
        let largest_singular_value = sigma_col.iter().copied().fold(0.0, libm::fmax);
        let rank = if largest_singular_value > 0.0 {
            let tolerance = RANK_TOLERANCE * largest_singular_value;
            sigma_col.iter().filter(|&&s| s > tolerance).count()
        } else {
            0
        };

        // The degrees of freedom = nvars - rank;
        // If the Jacobian DOESN'T change along one direction, that implies the direction
        // doesn't affect the residual at all. That's basically exactly what a degree of freedom means.
        let degrees_of_freedom = nvars - rank;

        // Compute participation norm for each variable.
        // If a variable's participation is basically zero, then it's constrained.
        // If it's nonzero, then it moves in some DOF and is unconstrained.
        let v = svd.V();
        let participation: Vec<_> = (0..nvars)
            .map(|j| {
                let mut sum_sq = 0.0;
                for k in rank..nvars {
                    // V[j, k] is the component of variable j for the k-th DOF.
                    let v_jk = v.get(j, k);
                    sum_sq += v_jk * v_jk;
                }
                sum_sq.sqrt()
            })
            .collect();
        let max_participation = participation.iter().copied().fold(0.0, libm::fmax);

        // Relative threshold to classify variables; also guard with an absolute floor tied to
        // numerical noise so tiny leakage from near-null directions doesn't mark a variable.
        let noise_floor = 10.0 * libm::sqrt(nvars as f64) * f64::EPSILON;
        let var_tol = libm::fmax(1e-3 * max_participation, noise_floor);

        let underconstrained = self
            .layout()
            .free()
            .iter()
            .zip(&participation)
            .filter(|&(_, &p)| p > var_tol)
            .map(|(&id, _)| id)
            .collect();

        Ok(FreedomAnalysis {
            rank,
            degrees_of_freedom,
            underconstrained,
        })
    }
}
