//! Generalized linear model fitting by iteratively reweighted least squares.
//!
//! This is the only module that does numerical fitting; everything else in
//! the crate is orchestration around it. Two links are supported: `Logit`
//! for two-category outcomes and `Identity` for ordinary least squares
//! (which converges in a single reweighting step). An optional L2 ridge
//! penalty on the non-intercept coefficients covers the penalized fits.
//!
//! The normal equations `(X'WX + ridge I) b = X'Wz` are solved by an
//! in-module Cholesky factorization; the systems here are tiny (a handful
//! of design columns), so no external linear-algebra backend is pulled in.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The link connecting the linear predictor to the mean response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFunction {
    /// The logit link, for two-category outcomes (logistic regression).
    Logit,
    /// The identity link, for continuous outcomes (ordinary least squares).
    Identity,
}

/// Tuning knobs for one fit.
#[derive(Debug, Clone, Copy)]
pub struct FitConfig {
    pub link: LinkFunction,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// L2 penalty added to the normal equations for every non-intercept
    /// coefficient. Zero means an unpenalized fit.
    pub ridge: f64,
}

impl FitConfig {
    pub fn new(link: LinkFunction) -> Self {
        Self {
            link,
            max_iterations: 50,
            tolerance: 1e-8,
            ridge: 0.0,
        }
    }
}

/// A converged fit: coefficients plus the quantities callers report.
#[derive(Debug, Clone)]
pub struct FittedGlm {
    pub link: LinkFunction,
    pub coefficients: Array1<f64>,
    pub deviance: f64,
    pub iterations: usize,
}

#[derive(Error, Debug)]
pub enum GlmError {
    #[error("design matrix has {rows_x} rows but the outcome has {rows_y}")]
    DimensionMismatch { rows_x: usize, rows_y: usize },
    #[error(
        "the normal equations are singular; a design column is constant or collinear within this data subset"
    )]
    SingularSystem,
    #[error("the fit did not converge within {max_iterations} iterations (last change {last_change:.3e})")]
    DidNotConverge {
        max_iterations: usize,
        last_change: f64,
    },
}

impl FittedGlm {
    pub fn linear_predictor(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients)
    }

    /// Mean response: probabilities under `Logit`, fitted values under
    /// `Identity`.
    pub fn predict_mean(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let eta = self.linear_predictor(x);
        match self.link {
            LinkFunction::Logit => eta.mapv(|e| sigmoid(e.clamp(-700.0, 700.0))),
            LinkFunction::Identity => eta,
        }
    }

    /// Hard 0/1 labels at the 0.5 probability threshold.
    pub fn classify(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.predict_mean(x)
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })
    }
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// Fits one GLM by IRLS.
pub fn fit(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    config: &FitConfig,
) -> Result<FittedGlm, GlmError> {
    if x.nrows() != y.len() {
        return Err(GlmError::DimensionMismatch {
            rows_x: x.nrows(),
            rows_y: y.len(),
        });
    }

    let mut beta: Array1<f64> = Array1::zeros(x.ncols());
    let mut last_deviance = f64::INFINITY;
    let mut last_change = f64::INFINITY;

    for iter in 1..=config.max_iterations {
        let eta = x.dot(&beta);
        let (mu, weights, z) = update_glm_vectors(y, &eta, config.link);

        if !eta.iter().all(|v| v.is_finite()) || !mu.iter().all(|v| v.is_finite()) {
            log::error!("non-finite linear predictor at iteration {iter}");
            return Err(GlmError::DidNotConverge {
                max_iterations: config.max_iterations,
                last_change: f64::NAN,
            });
        }

        let x_t_w = &x.t() * &weights;
        let mut hessian = x_t_w.dot(&x);
        for j in 0..hessian.nrows() {
            // Intercept (column 0) stays unpenalized; the tiny jitter keeps
            // well-posed systems numerically stable.
            let penalty = if j == 0 { 0.0 } else { config.ridge };
            hessian[[j, j]] += penalty + 1e-10;
        }
        let rhs = x_t_w.dot(&z);
        beta = solve_spd(hessian, rhs)?;

        if !beta.iter().all(|v| v.is_finite()) {
            log::error!("non-finite coefficients at iteration {iter}");
            return Err(GlmError::DidNotConverge {
                max_iterations: config.max_iterations,
                last_change: f64::NAN,
            });
        }

        let deviance = calculate_deviance(y, &mu, config.link);
        last_change = if last_deviance.is_infinite() {
            f64::INFINITY
        } else {
            (last_deviance - deviance).abs()
        };

        if last_change < config.tolerance {
            let final_eta = x.dot(&beta);
            let (final_mu, _, _) = update_glm_vectors(y, &final_eta, config.link);
            return Ok(FittedGlm {
                link: config.link,
                coefficients: beta,
                deviance: calculate_deviance(y, &final_mu, config.link),
                iterations: iter,
            });
        }
        last_deviance = deviance;
    }

    Err(GlmError::DidNotConverge {
        max_iterations: config.max_iterations,
        last_change,
    })
}

/// One reweighting step: mean, working weights, working response.
fn update_glm_vectors(
    y: ArrayView1<f64>,
    eta: &Array1<f64>,
    link: LinkFunction,
) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    const MIN_WEIGHT: f64 = 1e-6;

    match link {
        LinkFunction::Logit => {
            let eta_clamped = eta.mapv(|e| e.clamp(-700.0, 700.0));
            let mu = eta_clamped.mapv(sigmoid);
            let weights = (&mu * &mu.mapv(|m| 1.0 - m)).mapv(|v| v.max(MIN_WEIGHT));
            let residual = &y.to_owned() - &mu;
            let z_adj = (&residual / &weights).mapv(|v| v.clamp(-1e6, 1e6));
            let z = &eta_clamped + &z_adj;
            (mu, weights, z)
        }
        LinkFunction::Identity => {
            let mu = eta.clone();
            let weights = Array1::ones(y.len());
            let z = y.to_owned();
            (mu, weights, z)
        }
    }
}

/// Deviance of the current mean: binomial deviance under `Logit`, residual
/// sum of squares under `Identity`.
fn calculate_deviance(y: ArrayView1<f64>, mu: &Array1<f64>, link: LinkFunction) -> f64 {
    const EPS: f64 = 1e-9;
    match link {
        LinkFunction::Logit => {
            let total = ndarray::Zip::from(y).and(mu).fold(0.0, |acc, &yi, &mui| {
                let mui_c = mui.clamp(EPS, 1.0 - EPS);
                let term1 = if yi > EPS { yi * (yi / mui_c).ln() } else { 0.0 };
                let term2 = if yi < 1.0 - EPS {
                    (1.0 - yi) * ((1.0 - yi) / (1.0 - mui_c)).ln()
                } else {
                    0.0
                };
                acc + term1 + term2
            });
            2.0 * total
        }
        LinkFunction::Identity => (&y.view() - mu).mapv(|v| v.powi(2)).sum(),
    }
}

/// Solves `a x = b` for symmetric positive-definite `a` by Cholesky
/// factorization with forward and back substitution.
fn solve_spd(mut a: Array2<f64>, b: Array1<f64>) -> Result<Array1<f64>, GlmError> {
    let p = a.nrows();
    let max_diag = (0..p).fold(0.0f64, |m, j| m.max(a[[j, j]].abs()));
    let tol = 1e-12 * max_diag.max(1.0);

    for j in 0..p {
        let mut d = a[[j, j]];
        for k in 0..j {
            d -= a[[j, k]] * a[[j, k]];
        }
        if d <= tol {
            return Err(GlmError::SingularSystem);
        }
        let d = d.sqrt();
        a[[j, j]] = d;
        for i in (j + 1)..p {
            let mut s = a[[i, j]];
            for k in 0..j {
                s -= a[[i, k]] * a[[j, k]];
            }
            a[[i, j]] = s / d;
        }
    }

    let mut solution = b;
    for i in 0..p {
        let mut s = solution[i];
        for k in 0..i {
            s -= a[[i, k]] * solution[k];
        }
        solution[i] = s / a[[i, i]];
    }
    for i in (0..p).rev() {
        let mut s = solution[i];
        for k in (i + 1)..p {
            s -= a[[k, i]] * solution[k];
        }
        solution[i] = s / a[[i, i]];
    }
    Ok(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn design_with_intercept(values: &[f64]) -> Array2<f64> {
        let n = values.len();
        let mut x = Array2::ones((n, 2));
        for (i, &v) in values.iter().enumerate() {
            x[[i, 1]] = v;
        }
        x
    }

    #[test]
    fn identity_link_recovers_exact_line() {
        let x = design_with_intercept(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let y = array![1.0, 3.0, 5.0, 7.0, 9.0]; // y = 1 + 2x
        let fitted = fit(x.view(), y.view(), &FitConfig::new(LinkFunction::Identity)).unwrap();

        assert_abs_diff_eq!(fitted.coefficients[0], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fitted.coefficients[1], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fitted.deviance, 0.0, epsilon = 1e-6);
        assert!(fitted.iterations <= 3);
    }

    #[test]
    fn ridge_shrinks_the_slope() {
        let x = design_with_intercept(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let y = array![1.0, 3.0, 5.0, 7.0, 9.0];
        let plain = fit(x.view(), y.view(), &FitConfig::new(LinkFunction::Identity)).unwrap();
        let mut config = FitConfig::new(LinkFunction::Identity);
        config.ridge = 100.0;
        let shrunk = fit(x.view(), y.view(), &config).unwrap();

        assert!(shrunk.coefficients[1].abs() < plain.coefficients[1].abs());
        assert!(shrunk.coefficients[1] > 0.0);
    }

    #[test]
    fn logit_link_separates_noisy_classes() {
        let values: Vec<f64> = (0..20).map(|i| i as f64 - 9.5).collect();
        let x = design_with_intercept(&values);
        // Mostly threshold-at-zero labels with two flips so the classes overlap.
        let y: Array1<f64> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let label = if v > 0.0 { 1.0 } else { 0.0 };
                if i == 8 || i == 11 { 1.0 - label } else { label }
            })
            .collect();

        let fitted = fit(x.view(), y.view(), &FitConfig::new(LinkFunction::Logit)).unwrap();
        assert!(fitted.coefficients[1] > 0.0);

        let probabilities = fitted.predict_mean(x.view());
        assert!(probabilities.iter().all(|&p| p > 0.0 && p < 1.0));

        let labels = fitted.classify(x.view());
        let correct = labels
            .iter()
            .zip(y.iter())
            .filter(|(a, b)| a == b)
            .count();
        assert!(correct >= 16, "expected >= 16 correct, got {correct}");
    }

    #[test]
    fn collinear_design_is_singular() {
        let values = [0.0, 1.0, 2.0, 3.0];
        let n = values.len();
        let mut x = Array2::ones((n, 3));
        for (i, &v) in values.iter().enumerate() {
            x[[i, 1]] = v;
            x[[i, 2]] = v; // exact copy of column 1
        }
        let y = array![0.0, 1.0, 2.0, 3.0];
        let err = fit(x.view(), y.view(), &FitConfig::new(LinkFunction::Identity)).unwrap_err();
        assert!(matches!(err, GlmError::SingularSystem));
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let x = design_with_intercept(&[0.0, 1.0]);
        let y = array![0.0, 1.0, 2.0];
        let err = fit(x.view(), y.view(), &FitConfig::new(LinkFunction::Identity)).unwrap_err();
        assert!(matches!(err, GlmError::DimensionMismatch { .. }));
    }
}
