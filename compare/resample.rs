//! The resampled classifier comparator.
//!
//! Given training data, a set of candidate model specifications and a
//! resampling plan, [`compare`] produces the distribution of held-out-fold
//! accuracy across `folds x repeats` resamples for every candidate, and
//! [`select_best`] picks the winner by mean accuracy.
//!
//! Fold fits are independent of one another (each reads its own training
//! subset and produces its own [`FoldResult`]), so they run in parallel on
//! the rayon pool and are joined and reordered afterwards; results are
//! bit-identical to a sequential run. All randomness comes from the caller's
//! generator: fold assignments are drawn serially before any fitting starts,
//! so a fixed generator state reproduces the comparison exactly.

use crate::data::Dataset;
use crate::glm::{self, FitConfig};
use crate::metrics;
use crate::model::{DesignMatrix, ModelSpec, SpecError};
use ndarray::Axis;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use thiserror::Error;

/// How the training data is resampled: `folds` disjoint folds per repeat,
/// `repeats` independent fold assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplingPlan {
    folds: usize,
    repeats: usize,
}

impl ResamplingPlan {
    pub fn new(folds: usize, repeats: usize) -> Result<Self, ComparisonError> {
        if folds < 2 {
            return Err(ComparisonError::TooFewFolds(folds));
        }
        if repeats < 1 {
            return Err(ComparisonError::NoRepeats);
        }
        Ok(Self { folds, repeats })
    }

    pub fn folds(&self) -> usize {
        self.folds
    }

    pub fn repeats(&self) -> usize {
        self.repeats
    }
}

/// One (repeat, fold) pair's held-out accuracy for one specification.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldResult {
    pub repeat: usize,
    pub fold: usize,
    pub metric: f64,
}

/// All fold results for one specification, with their mean.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecComparison {
    pub spec: ModelSpec,
    pub fold_results: Vec<FoldResult>,
    pub mean_metric: f64,
}

/// The outcome of [`compare`]: one entry per candidate, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub comparisons: Vec<SpecComparison>,
}

#[derive(Error, Debug)]
pub enum ComparisonError {
    #[error("a resampling plan needs at least two folds, got {0}")]
    TooFewFolds(usize),
    #[error("a resampling plan needs at least one repeat")]
    NoRepeats,
    #[error("cannot cut {n_rows} training rows into {folds} non-empty folds")]
    TooFewRows { n_rows: usize, folds: usize },
    #[error("no candidate specifications were supplied")]
    NoCandidates,
    #[error("invalid specification '{spec}': {source}")]
    InvalidSpecification {
        spec: String,
        #[source]
        source: SpecError,
    },
    #[error("insufficient data to fit '{spec}' ({context}): {detail}")]
    InsufficientData {
        spec: String,
        context: String,
        detail: String,
    },
}

/// Cuts `0..n_rows` into near-equal disjoint folds by a seeded shuffle.
///
/// Fold sizes differ by at most one; together the folds cover every index
/// exactly once. Each fold is returned sorted.
pub fn fold_assignments(n_rows: usize, folds: usize, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..n_rows).collect();
    indices.shuffle(rng);

    let base = n_rows / folds;
    let remainder = n_rows % folds;
    let mut assignments = Vec::with_capacity(folds);
    let mut start = 0;
    for fold in 0..folds {
        let size = base + usize::from(fold < remainder);
        let mut fold_rows = indices[start..start + size].to_vec();
        fold_rows.sort_unstable();
        assignments.push(fold_rows);
        start += size;
    }
    assignments
}

/// Compares candidate specifications by repeated v-fold cross-validation.
///
/// For every repeat the training data is cut into fresh folds; every spec is
/// fit on the union of the other folds and scored by accuracy on the
/// held-out fold. Every spec therefore receives exactly
/// `plan.folds() * plan.repeats()` fold results. A degenerate fold fit
/// aborts the whole comparison; skipping folds would bias the mean metric.
pub fn compare(
    train: &Dataset,
    specs: &[ModelSpec],
    plan: &ResamplingPlan,
    fit_config: &FitConfig,
    rng: &mut StdRng,
) -> Result<ComparisonResult, ComparisonError> {
    if specs.is_empty() {
        return Err(ComparisonError::NoCandidates);
    }
    let n_rows = train.n_rows();
    if n_rows < plan.folds() {
        return Err(ComparisonError::TooFewRows {
            n_rows,
            folds: plan.folds(),
        });
    }

    let designs: Vec<DesignMatrix> = specs
        .iter()
        .map(|spec| {
            DesignMatrix::classification(train, spec).map_err(|source| {
                ComparisonError::InvalidSpecification {
                    spec: spec.to_string(),
                    source,
                }
            })
        })
        .collect::<Result<_, _>>()?;

    // All randomness is spent here, before any (parallelizable) fitting.
    let mut slots = Vec::with_capacity(plan.repeats() * plan.folds());
    for repeat in 0..plan.repeats() {
        let folds = fold_assignments(n_rows, plan.folds(), rng);
        for (fold, held_rows) in folds.iter().enumerate() {
            let mut fit_rows: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != fold)
                .flat_map(|(_, rows)| rows.iter().copied())
                .collect();
            fit_rows.sort_unstable();
            slots.push((repeat, fold, fit_rows, held_rows.clone()));
        }
    }

    let jobs: Vec<(usize, &(usize, usize, Vec<usize>, Vec<usize>))> = (0..specs.len())
        .flat_map(|spec_idx| slots.iter().map(move |slot| (spec_idx, slot)))
        .collect();

    let fold_metrics: Vec<(usize, FoldResult)> = jobs
        .into_par_iter()
        .map(|(spec_idx, slot)| {
            let (repeat, fold, fit_rows, held_rows) = slot;
            let context = format!("repeat {}, fold {}", repeat + 1, fold + 1);
            let metric = fold_accuracy(
                &designs[spec_idx],
                fit_rows,
                held_rows,
                fit_config,
            )
            .map_err(|detail| ComparisonError::InsufficientData {
                spec: specs[spec_idx].to_string(),
                context,
                detail,
            })?;
            Ok((
                spec_idx,
                FoldResult {
                    repeat: *repeat,
                    fold: *fold,
                    metric,
                },
            ))
        })
        .collect::<Result<_, ComparisonError>>()?;

    let per_spec = slots.len();
    let comparisons = specs
        .iter()
        .enumerate()
        .map(|(spec_idx, spec)| {
            let fold_results: Vec<FoldResult> = fold_metrics
                [spec_idx * per_spec..(spec_idx + 1) * per_spec]
                .iter()
                .map(|(_, result)| result.clone())
                .collect();
            let mean_metric =
                fold_results.iter().map(|r| r.metric).sum::<f64>() / fold_results.len() as f64;
            log::info!(
                "{}: mean accuracy {:.4} over {} fold fits",
                spec,
                mean_metric,
                fold_results.len()
            );
            SpecComparison {
                spec: spec.clone(),
                fold_results,
                mean_metric,
            }
        })
        .collect();

    Ok(ComparisonResult { comparisons })
}

/// Fits one spec on `fit_rows` and scores accuracy on `held_rows`.
///
/// The error string names what made the fold degenerate.
fn fold_accuracy(
    design: &DesignMatrix,
    fit_rows: &[usize],
    held_rows: &[usize],
    fit_config: &FitConfig,
) -> Result<f64, String> {
    let x_fit = design.x.select(Axis(0), fit_rows);
    let y_fit = design.y.select(Axis(0), fit_rows);

    for (j, name) in design.column_names.iter().enumerate().skip(1) {
        let column = x_fit.column(j);
        let first = column[0];
        if column.iter().all(|&v| v == first) {
            return Err(format!(
                "design column '{name}' is constant within the training subset"
            ));
        }
    }

    let fitted =
        glm::fit(x_fit.view(), y_fit.view(), fit_config).map_err(|e| e.to_string())?;

    let x_held = design.x.select(Axis(0), held_rows);
    let y_held = design.y.select(Axis(0), held_rows);
    let labels = fitted.classify(x_held.view());
    Ok(metrics::accuracy(labels.view(), y_held.view()))
}

/// Returns the comparison entry with the highest mean metric.
///
/// Ties are broken deterministically: the spec with fewer terms wins, and if
/// that still ties, the one supplied first.
pub fn select_best(comparison: &ComparisonResult) -> Result<&SpecComparison, ComparisonError> {
    let mut entries = comparison.comparisons.iter();
    let mut best = entries.next().ok_or(ComparisonError::NoCandidates)?;
    for candidate in entries {
        let better = candidate.mean_metric > best.mean_metric
            || (candidate.mean_metric == best.mean_metric
                && candidate.spec.n_terms() < best.spec.n_terms());
        if better {
            best = candidate;
        }
    }
    Ok(best)
}
