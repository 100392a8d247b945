use log::{debug, trace};

use super::{Algorithm, Model, linalg, squared_norm};
use crate::{Config, Error, SolveStatus};

/// Past this, damping has squashed every step to nothing.
const MAX_DAMPING: f64 = 1e12;
/// Levenberg-Marquardt never lets damping drop below this, so that
/// directions the constraints don't pin down stay well conditioned.
const MIN_DAMPING: f64 = 1e-6;
/// How damping changes after a singular system or a failed line search.
const DAMPING_GROWTH: f64 = 10.0;

/// Progress report, passed to the callback at the top of each iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationStats {
    /// How many iterations have completed.
    pub iter: usize,
    /// L2 norm of the residual at the current iterate.
    pub residual: f64,
    /// Current damping λ.
    pub damping: f64,
}

/// Whether the solve should keep going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Keep iterating.
    Continue,
    /// Stop, leaving the parameters at the last accepted iterate.
    Cancel,
}

/// What happened during one call to [`Model::solve_lm`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct SolveRun {
    pub status: SolveStatus,
    pub iterations: usize,
    pub residual_norm: f64,
    pub singular_iterations: usize,
}

impl Model<'_> {
    /// Runs damped Gauss-Newton iterations until convergence, cancellation
    /// or the iteration budget runs out.
    ///
    /// `values` holds every parameter (fixed ones too), indexed by ID.
    /// Only free parameters are ever written, and only with fully accepted steps.
    /// Only faer itself failing (e.g. out of memory) is an error.
    #[inline(never)]
    pub(crate) fn solve_lm<F>(
        &mut self,
        values: &mut [f64],
        config: &Config,
        mut on_iter: F,
    ) -> Result<SolveRun, Error>
    where
        F: FnMut(&IterationStats) -> Control,
    {
        let m = self.layout().num_residuals();
        let n = self.layout().num_variables();
        let free = self.layout().free().to_vec();

        let mut residual = vec![0.0; m];
        let mut trial_residual = vec![0.0; m];
        let mut trial = values.to_vec();
        self.residual(values, &mut residual);
        let mut error = squared_norm(&residual);

        let mut damping = match config.algorithm {
            Algorithm::LevenbergMarquardt => config.initial_damping.max(MIN_DAMPING),
            Algorithm::GaussNewton => 0.0,
        };
        // Largest component of the last step actually applied.
        // Nothing has moved yet, so a system that starts out solved converges immediately.
        let mut last_step = 0.0;
        let mut iterations = 0;
        let mut singular_iterations = 0;

        debug!("Solving {m} residuals over {n} free parameters with {:?}", config.algorithm);

        let status = loop {
            let residual_norm = error.sqrt();
            if residual_norm <= config.convergence_tolerance && last_step <= config.step_tolerance {
                break SolveStatus::Converged;
            }
            if iterations >= config.max_iterations {
                break SolveStatus::MaxIterationsReached;
            }
            let stats = IterationStats {
                iter: iterations,
                residual: residual_norm,
                damping,
            };
            if on_iter(&stats) == Control::Cancel {
                debug!("Solve cancelled after {iterations} iterations");
                break SolveStatus::Cancelled;
            }
            iterations += 1;

            // Assemble and solve the damped normal equations:
            //   (JᵀJ + λI) Δ = -Jᵀr
            self.refresh_jacobian(values);
            let (jtj, jtr) = self.normal_equations(&residual)?;
            let a = linalg::damped(jtj, damping);
            let delta = match linalg::solve_lu(a.as_ref(), &-jtr) {
                Ok(delta) => delta,
                Err(singular) => {
                    singular_iterations += 1;
                    damping = grow(damping, config);
                    last_step = 0.0;
                    debug!(
                        "Singular system at column {} in iteration {iterations}, raising damping to {damping:e}",
                        singular.column
                    );
                    if damping > MAX_DAMPING {
                        break SolveStatus::MaxIterationsReached;
                    }
                    continue;
                }
            };

            // Line search: Δ, Δ/2, Δ/4...
            // Take the first (i.e. largest) step which improves the error.
            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..=config.max_line_search_halvings {
                trial.copy_from_slice(values);
                for (&id, d) in free.iter().zip(delta.iter()) {
                    trial[id as usize] += scale * d;
                }
                self.residual(&trial, &mut trial_residual);
                let trial_error = squared_norm(&trial_residual);
                if trial_error < error {
                    accepted = Some(trial_error);
                    break;
                }
                scale *= 0.5;
            }

            let Some(new_error) = accepted else {
                // No step helped, so don't move, and try a more cautious direction next time.
                damping = grow(damping, config);
                last_step = 0.0;
                trace!("iteration {iterations}: line search failed, damping {damping:e}");
                if damping > MAX_DAMPING {
                    debug!("Damping saturated after {iterations} iterations");
                    break SolveStatus::MaxIterationsReached;
                }
                continue;
            };

            for &id in &free {
                values[id as usize] = trial[id as usize];
            }
            std::mem::swap(&mut residual, &mut trial_residual);
            last_step = delta.iter().map(|d| (scale * d).abs()).fold(0.0, libm::fmax);
            damping = match config.algorithm {
                Algorithm::LevenbergMarquardt if new_error < 0.5 * error => {
                    (damping * 0.5).max(MIN_DAMPING)
                }
                Algorithm::LevenbergMarquardt => (damping * 2.0).min(MAX_DAMPING),
                Algorithm::GaussNewton => 0.0,
            };
            error = new_error;
            trace!(
                "iteration {iterations}: residual {:e}, step {last_step:e} (scale {scale}), damping {damping:e}",
                error.sqrt()
            );
        };

        let residual_norm = error.sqrt();
        debug!("Solve finished: {status:?} after {iterations} iterations, residual {residual_norm:e}");
        Ok(SolveRun {
            status,
            iterations,
            residual_norm,
            singular_iterations,
        })
    }
}

fn grow(damping: f64, config: &Config) -> f64 {
    if damping > 0.0 {
        damping * DAMPING_GROWTH
    } else {
        config.initial_damping.max(MIN_DAMPING)
    }
}
