//! Working out what's wrong with a sketch: freedoms, redundancy and conflicts.
use std::collections::{HashMap, HashSet};

use faer::Mat;
use log::debug;

use crate::{
    Config, Diagnostics, EntityId, Error, Id, ParameterStore,
    constraints::ConstraintEntry,
    solver::{Algorithm, Control, Model, linalg, squared_norm},
    warnings::{Warning, WarningContent, lint},
};

/// Rank analysis of the sketch at `values`.
///
/// Constraints listed in `conflicting` are left out of the redundancy check,
/// so that they don't make consistent constraints look like repeats.
pub(crate) fn diagnose(
    model: &mut Model<'_>,
    values: &[f64],
    params: &ParameterStore,
    conflicting: &[EntityId],
) -> Result<Diagnostics, Error> {
    model.refresh_jacobian(values);
    let freedom = model.freedom_analysis()?;
    debug!(
        "Jacobian has rank {} over {} free parameters",
        freedom.rank,
        model.layout().num_variables()
    );

    let constraints = model.constraints();
    let mut warnings = lint(constraints, params);
    warnings.extend(
        constraints
            .iter()
            .enumerate()
            .filter(|&(i, _)| model.is_degenerate(i))
            .map(|(_, c)| Warning {
                about_constraint: Some(c.id),
                content: WarningContent::Degenerate,
            }),
    );

    let redundant = find_redundant(model, conflicting)?;
    Ok(Diagnostics {
        degrees_of_freedom: freedom.degrees_of_freedom,
        underconstrained: freedom.underconstrained,
        redundant,
        warnings,
    })
}

/// Walk the constraints in insertion order, and report each one with
/// a Jacobian row that depends on rows already seen.
/// Call [`Model::refresh_jacobian`] first.
fn find_redundant(model: &Model<'_>, conflicting: &[EntityId]) -> Result<Vec<EntityId>, Error> {
    let j = model.jacobian().to_dense();
    // Degenerate rows say nothing about the geometry, so they neither
    // count as repeats nor make later rows look like repeats.
    let mut owners = Vec::new();
    let mut rows = Vec::new();
    for (i, c) in model.constraints().iter().enumerate() {
        if conflicting.contains(&c.id) || model.is_degenerate(i) {
            continue;
        }
        for r in model.rows_of(i) {
            owners.push(c.id);
            rows.push(r);
        }
    }
    let stacked = Mat::from_fn(rows.len(), j.ncols(), |i, col| j[(rows[i], col)]);
    let dependent = linalg::dependent_rows(stacked.as_ref()).map_err(Error::FaerSvd)?;

    let mut redundant: Vec<EntityId> = Vec::new();
    for &row in &dependent {
        // A constraint's rows are adjacent, so this dedups.
        if redundant.last() != Some(&owners[row]) {
            redundant.push(owners[row]);
        }
    }
    debug!(
        "{} of {} rows add nothing, {} redundant constraints",
        dependent.len(),
        rows.len(),
        redundant.len()
    );
    Ok(redundant)
}

/// Norm of each constraint's own residuals.
fn residual_per_constraint(model: &Model<'_>, values: &[f64]) -> Vec<f64> {
    let mut residual = vec![0.0; model.layout().num_residuals()];
    model.residual(values, &mut residual);
    (0..model.constraints().len())
        .map(|i| {
            model.rows_of(i)
                .map(|r| residual[r] * residual[r])
                .sum::<f64>()
                .sqrt()
        })
        .collect()
}

/// Find the constraints which stop the sketch converging.
///
/// A constraint conflicts if the others converge without it, starting from
/// `values`. Only constraints which share free parameters (directly or via
/// other constraints) with a violated one are tried. If removing any single
/// one isn't enough, every violated constraint is reported instead.
///
/// Constraints which are degenerate at `values` are never blamed: their
/// residual says nothing about whether the others can be met.
pub(crate) fn find_conflicts(
    constraints: &[ConstraintEntry],
    free: &[Id],
    values: &[f64],
    config: &Config,
) -> Result<Vec<EntityId>, Error> {
    let mut model = Model::new(constraints, free, values.len())?;
    model.refresh_jacobian(values);
    let threshold = config.secondary_tolerance;
    let violated: Vec<usize> = residual_per_constraint(&model, values)
        .into_iter()
        .enumerate()
        // NaN counts as violated.
        .filter(|&(i, r)| !(r <= threshold) && !model.is_degenerate(i))
        .map(|(i, _)| i)
        .collect();
    if violated.is_empty() {
        return Ok(Vec::new());
    }

    let candidates = connected_to(constraints, free, &violated);
    debug!(
        "Isolating conflicts: {} violated constraints, {} candidates",
        violated.len(),
        candidates.len()
    );

    let sub_config = Config {
        algorithm: Algorithm::LevenbergMarquardt,
        analyze_conflicts: false,
        ..*config
    };
    let mut conflicting = Vec::new();
    let mut rest = Vec::with_capacity(constraints.len());
    for candidate in candidates.into_iter().filter(|&i| !model.is_degenerate(i)) {
        rest.clear();
        rest.extend(
            constraints
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != candidate)
                .map(|(_, c)| *c),
        );
        let mut trial = values.to_vec();
        let residual_norm = if rest.is_empty() {
            0.0
        } else {
            let mut without = Model::new(&rest, free, values.len())?;
            if free.is_empty() {
                let mut residual = vec![0.0; without.layout().num_residuals()];
                without.residual(&trial, &mut residual);
                squared_norm(&residual).sqrt()
            } else {
                without
                    .solve_lm(&mut trial, &sub_config, |_| Control::Continue)?
                    .residual_norm
            }
        };
        if residual_norm <= threshold {
            conflicting.push(constraints[candidate].id);
        }
    }

    if conflicting.is_empty() {
        debug!("No single constraint explains the conflict, reporting every violated one");
        conflicting = violated.into_iter().map(|i| constraints[i].id).collect();
    }
    Ok(conflicting)
}

/// Indices of every constraint reachable from `seeds` by hopping between
/// constraints that share a free parameter. Sorted.
fn connected_to(constraints: &[ConstraintEntry], free: &[Id], seeds: &[usize]) -> Vec<usize> {
    let free: HashSet<Id> = free.iter().copied().collect();
    let mut params_of = Vec::with_capacity(constraints.len());
    let mut constraints_of: HashMap<Id, Vec<usize>> = HashMap::new();
    let (mut row0, mut row1) = (Vec::new(), Vec::new());
    for (i, c) in constraints.iter().enumerate() {
        row0.clear();
        row1.clear();
        c.constraint.nonzeroes(&mut row0, &mut row1);
        let mut ids: Vec<Id> = row0.iter().chain(&row1).copied().filter(|id| free.contains(id)).collect();
        ids.sort_unstable();
        ids.dedup();
        for &id in &ids {
            constraints_of.entry(id).or_default().push(i);
        }
        params_of.push(ids);
    }

    let mut seen = vec![false; constraints.len()];
    let mut stack: Vec<usize> = seeds.to_vec();
    while let Some(i) = stack.pop() {
        if std::mem::replace(&mut seen[i], true) {
            continue;
        }
        for id in &params_of[i] {
            stack.extend(constraints_of[id].iter().copied().filter(|&j| !seen[j]));
        }
    }
    seen.iter()
        .enumerate()
        .filter(|&(_, &s)| s)
        .map(|(i, _)| i)
        .collect()
}
