//! Model specifications and design-matrix construction.
//!
//! A [`ModelSpec`] names an outcome column and the explanatory terms of one
//! candidate model, using the `Outcome ~ A + B + A:B` formula notation. This
//! module turns a spec plus a [`Dataset`] into the numeric design matrix the
//! fitting routines consume:
//!
//! - an intercept column first;
//! - numeric terms enter as-is;
//! - a categorical term with k levels expands to k-1 indicator columns, the
//!   first level in the sorted table being the reference;
//! - an interaction contributes the elementwise products of the two sides'
//!   expansions.

use crate::data::{ColumnValues, Dataset};
use ndarray::{Array1, Array2};
use std::fmt;
use thiserror::Error;

/// One explanatory term of a model formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Main(String),
    Interaction(String, String),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Main(name) => write!(f, "{name}"),
            Term::Interaction(a, b) => write!(f, "{a}:{b}"),
        }
    }
}

/// One candidate model: an outcome column plus explanatory terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub outcome: String,
    pub terms: Vec<Term>,
}

/// Validation and parse failures for model specifications.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("malformed formula '{formula}': {reason}")]
    MalformedFormula {
        formula: String,
        reason: &'static str,
    },
    #[error("the formula references column '{0}', which is not in the data")]
    UnknownColumn(String),
    #[error("the outcome column '{0}' also appears as a predictor")]
    OutcomeAsPredictor(String),
    #[error(
        "the outcome column '{column}' is not binary: found {found}. Classification requires exactly two outcome categories."
    )]
    NonBinaryOutcome { column: String, found: String },
    #[error("the outcome column '{0}' is categorical; a numeric outcome is required here")]
    NonNumericOutcome(String),
    #[error("the formula has no explanatory terms")]
    EmptyTerms,
    #[error("the term '{0}' appears more than once in the formula")]
    DuplicateTerm(String),
}

impl ModelSpec {
    /// Parses `"Outcome ~ A + B + A:B"`.
    ///
    /// Column existence is checked later, against a concrete dataset; this
    /// only validates the shape of the formula.
    pub fn parse(formula: &str) -> Result<Self, SpecError> {
        let malformed = |reason| SpecError::MalformedFormula {
            formula: formula.to_string(),
            reason,
        };

        let mut sides = formula.splitn(2, '~');
        let outcome = sides.next().unwrap_or("").trim();
        let rhs = sides.next().ok_or_else(|| malformed("expected '~'"))?.trim();
        if outcome.is_empty() {
            return Err(malformed("empty outcome before '~'"));
        }
        if outcome.contains('+') || outcome.contains(':') {
            return Err(malformed("the outcome must be a single column name"));
        }
        if rhs.is_empty() {
            return Err(SpecError::EmptyTerms);
        }
        if rhs.contains('~') {
            return Err(malformed("a formula has exactly one '~'"));
        }

        let mut terms = Vec::new();
        for raw in rhs.split('+') {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(malformed("empty term between '+' signs"));
            }
            let term = if raw.contains(':') {
                let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
                if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                    return Err(malformed("an interaction must join exactly two columns"));
                }
                Term::Interaction(parts[0].to_string(), parts[1].to_string())
            } else {
                Term::Main(raw.to_string())
            };
            if terms.contains(&term) {
                return Err(SpecError::DuplicateTerm(term.to_string()));
            }
            terms.push(term);
        }

        Ok(Self {
            outcome: outcome.to_string(),
            terms,
        })
    }

    /// The right-hand side of the formula, for reporting.
    pub fn label(&self) -> String {
        self.terms
            .iter()
            .map(Term::to_string)
            .collect::<Vec<_>>()
            .join(" + ")
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    fn validate_against(&self, data: &Dataset) -> Result<(), SpecError> {
        if self.terms.is_empty() {
            return Err(SpecError::EmptyTerms);
        }
        if data.column(&self.outcome).is_none() {
            return Err(SpecError::UnknownColumn(self.outcome.clone()));
        }
        for term in &self.terms {
            let (first, second) = match term {
                Term::Main(a) => (a, None),
                Term::Interaction(a, b) => (a, Some(b)),
            };
            for name in std::iter::once(first).chain(second) {
                if data.column(name).is_none() {
                    return Err(SpecError::UnknownColumn(name.clone()));
                }
                if *name == self.outcome {
                    return Err(SpecError::OutcomeAsPredictor(self.outcome.clone()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ~ {}", self.outcome, self.label())
    }
}

/// A spec materialized against a dataset: intercept-first predictor matrix,
/// outcome vector, and the name of every design column.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub column_names: Vec<String>,
}

impl DesignMatrix {
    /// Builds the design for a classification fit; the outcome is encoded
    /// as 0/1 and must have exactly two categories.
    pub fn classification(data: &Dataset, spec: &ModelSpec) -> Result<Self, SpecError> {
        spec.validate_against(data)?;
        let y = binary_outcome(data, &spec.outcome)?;
        let (x, column_names) = build_predictors(data, spec);
        Ok(Self { x, y, column_names })
    }

    /// Builds the design for a regression fit; the outcome is taken as-is
    /// and must be numeric.
    pub fn regression(data: &Dataset, spec: &ModelSpec) -> Result<Self, SpecError> {
        spec.validate_against(data)?;
        let column = data
            .column(&spec.outcome)
            .ok_or_else(|| SpecError::UnknownColumn(spec.outcome.clone()))?;
        let y = match &column.values {
            ColumnValues::Numeric(values) => values.clone(),
            ColumnValues::Categorical(_) => {
                return Err(SpecError::NonNumericOutcome(spec.outcome.clone()));
            }
        };
        let (x, column_names) = build_predictors(data, spec);
        Ok(Self { x, y, column_names })
    }
}

/// Encodes a two-category outcome column as 0.0/1.0.
///
/// A numeric column already coded 0/1 passes through unchanged (even when a
/// small subset happens to carry only one of the two labels); any other
/// numeric column must have exactly two distinct values, the smaller mapping
/// to 0. A categorical column must have exactly two levels; level order
/// decides the coding.
pub fn binary_outcome(data: &Dataset, name: &str) -> Result<Array1<f64>, SpecError> {
    let column = data
        .column(name)
        .ok_or_else(|| SpecError::UnknownColumn(name.to_string()))?;
    match &column.values {
        ColumnValues::Numeric(values) => {
            if values.iter().all(|&v| v == 0.0 || v == 1.0) {
                return Ok(values.clone());
            }
            let mut distinct: Vec<f64> = Vec::new();
            for &v in values {
                if !distinct.iter().any(|&d| d == v) {
                    distinct.push(v);
                }
                if distinct.len() > 2 {
                    return Err(SpecError::NonBinaryOutcome {
                        column: name.to_string(),
                        found: "more than two distinct values".to_string(),
                    });
                }
            }
            if distinct.len() != 2 {
                return Err(SpecError::NonBinaryOutcome {
                    column: name.to_string(),
                    found: format!("{} distinct value(s)", distinct.len()),
                });
            }
            let hi = distinct[0].max(distinct[1]);
            Ok(values.mapv(|v| if v == hi { 1.0 } else { 0.0 }))
        }
        ColumnValues::Categorical(cat) => {
            if cat.levels.len() != 2 {
                return Err(SpecError::NonBinaryOutcome {
                    column: name.to_string(),
                    found: format!("{} levels", cat.levels.len()),
                });
            }
            Ok(cat.codes.iter().map(|&c| c as f64).collect())
        }
    }
}

/// Expands one variable into its design columns.
fn expand_variable(data: &Dataset, name: &str) -> Vec<(String, Array1<f64>)> {
    // validate_against has already established the column exists.
    let column = match data.column(name) {
        Some(column) => column,
        None => return Vec::new(),
    };
    match &column.values {
        ColumnValues::Numeric(values) => vec![(name.to_string(), values.clone())],
        ColumnValues::Categorical(cat) => cat
            .levels
            .iter()
            .enumerate()
            .skip(1)
            .map(|(code, level)| {
                let indicator = cat
                    .codes
                    .iter()
                    .map(|&c| if c as usize == code { 1.0 } else { 0.0 })
                    .collect();
                (format!("{name}{level}"), indicator)
            })
            .collect(),
    }
}

fn build_predictors(data: &Dataset, spec: &ModelSpec) -> (Array2<f64>, Vec<String>) {
    let n = data.n_rows();
    let mut columns: Vec<(String, Array1<f64>)> = vec![("(Intercept)".to_string(), Array1::ones(n))];

    for term in &spec.terms {
        match term {
            Term::Main(name) => columns.extend(expand_variable(data, name)),
            Term::Interaction(a, b) => {
                let left = expand_variable(data, a);
                let right = expand_variable(data, b);
                for (la, ca) in &left {
                    for (lb, cb) in &right {
                        columns.push((format!("{la}:{lb}"), ca * cb));
                    }
                }
            }
        }
    }

    let mut x = Array2::zeros((n, columns.len()));
    let mut column_names = Vec::with_capacity(columns.len());
    for (j, (label, values)) in columns.into_iter().enumerate() {
        x.column_mut(j).assign(&values);
        column_names.push(label);
    }
    (x, column_names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use approx::assert_abs_diff_eq;

    fn toy_data() -> Dataset {
        Dataset::new(vec![
            Column::numeric("Age", vec![40.0, 49.0, 37.0, 54.0]),
            Column::numeric("MaxHR", vec![172.0, 156.0, 98.0, 122.0]),
            Column::categorical("ExerciseAngina", &["N", "N", "Y", "Y"]),
            Column::numeric("HeartDisease", vec![0.0, 1.0, 0.0, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn parses_mains_and_interactions() {
        let spec = ModelSpec::parse("HeartDisease ~ Age + MaxHR + Age:MaxHR").unwrap();
        assert_eq!(spec.outcome, "HeartDisease");
        assert_eq!(
            spec.terms,
            vec![
                Term::Main("Age".to_string()),
                Term::Main("MaxHR".to_string()),
                Term::Interaction("Age".to_string(), "MaxHR".to_string()),
            ]
        );
        assert_eq!(spec.label(), "Age + MaxHR + Age:MaxHR");
        assert_eq!(spec.n_terms(), 3);
        assert_eq!(spec.to_string(), "HeartDisease ~ Age + MaxHR + Age:MaxHR");
    }

    #[test]
    fn rejects_malformed_formulas() {
        assert!(matches!(
            ModelSpec::parse("HeartDisease Age"),
            Err(SpecError::MalformedFormula { .. })
        ));
        assert!(matches!(
            ModelSpec::parse("~ Age"),
            Err(SpecError::MalformedFormula { .. })
        ));
        assert!(matches!(
            ModelSpec::parse("HeartDisease ~"),
            Err(SpecError::EmptyTerms)
        ));
        assert!(matches!(
            ModelSpec::parse("HeartDisease ~ Age + "),
            Err(SpecError::MalformedFormula { .. })
        ));
        assert!(matches!(
            ModelSpec::parse("HeartDisease ~ Age:MaxHR:Sex"),
            Err(SpecError::MalformedFormula { .. })
        ));
        assert!(matches!(
            ModelSpec::parse("HeartDisease ~ Age + Age"),
            Err(SpecError::DuplicateTerm(_))
        ));
    }

    #[test]
    fn classification_design_has_intercept_and_dummies() {
        let data = toy_data();
        let spec = ModelSpec::parse("HeartDisease ~ Age + ExerciseAngina").unwrap();
        let design = DesignMatrix::classification(&data, &spec).unwrap();

        assert_eq!(
            design.column_names,
            vec!["(Intercept)", "Age", "ExerciseAnginaY"]
        );
        assert_eq!(design.x.shape(), &[4, 3]);
        assert_abs_diff_eq!(design.x[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(design.x[[2, 1]], 37.0, epsilon = 1e-12);
        assert_abs_diff_eq!(design.x[[1, 2]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(design.x[[2, 2]], 1.0, epsilon = 1e-12);
        assert_eq!(design.y.to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn interaction_columns_are_products() {
        let data = toy_data();
        let spec = ModelSpec::parse("HeartDisease ~ Age:ExerciseAngina").unwrap();
        let design = DesignMatrix::classification(&data, &spec).unwrap();

        assert_eq!(
            design.column_names,
            vec!["(Intercept)", "Age:ExerciseAnginaY"]
        );
        assert_abs_diff_eq!(design.x[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(design.x[[2, 1]], 37.0, epsilon = 1e-12);
        assert_abs_diff_eq!(design.x[[3, 1]], 54.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_columns_rejected() {
        let data = toy_data();
        let spec = ModelSpec::parse("HeartDisease ~ Age + Cholesterol").unwrap();
        let err = DesignMatrix::classification(&data, &spec).unwrap_err();
        assert!(matches!(err, SpecError::UnknownColumn(name) if name == "Cholesterol"));
    }

    #[test]
    fn outcome_as_predictor_rejected() {
        let data = toy_data();
        let spec = ModelSpec::parse("HeartDisease ~ HeartDisease").unwrap();
        let err = DesignMatrix::classification(&data, &spec).unwrap_err();
        assert!(matches!(err, SpecError::OutcomeAsPredictor(_)));
    }

    #[test]
    fn non_binary_outcome_rejected() {
        let data = toy_data();
        let spec = ModelSpec::parse("Age ~ MaxHR").unwrap();
        let err = DesignMatrix::classification(&data, &spec).unwrap_err();
        assert!(matches!(err, SpecError::NonBinaryOutcome { .. }));
    }

    #[test]
    fn binary_outcome_encodes_nonstandard_values() {
        let data = Dataset::new(vec![
            Column::numeric("status", vec![2.0, 5.0, 2.0]),
            Column::categorical("angina", &["N", "Y", "N"]),
        ])
        .unwrap();
        let encoded = binary_outcome(&data, "status").unwrap();
        assert_eq!(encoded.to_vec(), vec![0.0, 1.0, 0.0]);
        let encoded = binary_outcome(&data, "angina").unwrap();
        assert_eq!(encoded.to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn zero_one_outcome_passes_through_even_with_one_class_present() {
        let data = Dataset::new(vec![Column::numeric("y", vec![1.0, 1.0, 1.0])]).unwrap();
        let encoded = binary_outcome(&data, "y").unwrap();
        assert_eq!(encoded.to_vec(), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn regression_design_requires_numeric_outcome() {
        let data = toy_data();
        let spec = ModelSpec::parse("MaxHR ~ Age").unwrap();
        let design = DesignMatrix::regression(&data, &spec).unwrap();
        assert_eq!(design.y.to_vec(), vec![172.0, 156.0, 98.0, 122.0]);

        let spec = ModelSpec::parse("ExerciseAngina ~ Age").unwrap();
        let err = DesignMatrix::regression(&data, &spec).unwrap_err();
        assert!(matches!(err, SpecError::NonNumericOutcome(_)));
    }
}
