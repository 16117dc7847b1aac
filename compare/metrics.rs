//! Classification metrics and the held-out confusion matrix.
//!
//! Which outcome label counts as "positive" for sensitivity/specificity is a
//! labeling convention, not something derivable from the data, so it is an
//! explicit [`PositiveClass`] parameter throughout. Accuracy never depends
//! on it.

use crate::data::Dataset;
use crate::glm::{self, FitConfig};
use crate::model::{DesignMatrix, ModelSpec};
use crate::resample::ComparisonError;
use ndarray::ArrayView1;

/// Fraction of positions where predicted and actual labels agree.
pub fn accuracy(predicted: ArrayView1<f64>, actual: ArrayView1<f64>) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    if predicted.is_empty() {
        return f64::NAN;
    }
    let correct = predicted
        .iter()
        .zip(actual.iter())
        .filter(|(p, a)| p == a)
        .count();
    correct as f64 / predicted.len() as f64
}

/// Which encoded outcome label (0 or 1) is the "positive" class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositiveClass {
    /// The label encoded as 0 is positive (the source analysis' convention:
    /// positive = "no disease").
    Zero,
    /// The label encoded as 1 is positive.
    One,
}

impl PositiveClass {
    fn encoded(self) -> f64 {
        match self {
            PositiveClass::Zero => 0.0,
            PositiveClass::One => 1.0,
        }
    }
}

/// Predicted-vs-actual counts from a single held-out evaluation.
///
/// The derived rates are exact ratios of the four counts, so
/// `sensitivity() + false_negative_rate() == 1` and
/// `specificity() + false_positive_rate() == 1` whenever the denominators
/// are non-empty; an absent class yields `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfusionOutcome {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionOutcome {
    /// Tabulates predicted-vs-actual labels under the given polarity.
    pub fn tabulate(
        predicted: ArrayView1<f64>,
        actual: ArrayView1<f64>,
        positive: PositiveClass,
    ) -> Self {
        let pos = positive.encoded();
        let mut outcome = ConfusionOutcome {
            true_positive: 0,
            false_positive: 0,
            true_negative: 0,
            false_negative: 0,
        };
        for (&p, &a) in predicted.iter().zip(actual.iter()) {
            match (p == pos, a == pos) {
                (true, true) => outcome.true_positive += 1,
                (true, false) => outcome.false_positive += 1,
                (false, false) => outcome.true_negative += 1,
                (false, true) => outcome.false_negative += 1,
            }
        }
        outcome
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        (self.true_positive + self.true_negative) as f64 / self.total() as f64
    }

    /// Fraction of actual positives predicted positive.
    pub fn sensitivity(&self) -> f64 {
        self.true_positive as f64 / (self.true_positive + self.false_negative) as f64
    }

    /// Fraction of actual negatives predicted negative.
    pub fn specificity(&self) -> f64 {
        self.true_negative as f64 / (self.true_negative + self.false_positive) as f64
    }

    pub fn false_negative_rate(&self) -> f64 {
        self.false_negative as f64 / (self.true_positive + self.false_negative) as f64
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive as f64 / (self.true_negative + self.false_positive) as f64
    }
}

/// Refits `spec` once on the full training data and tabulates its label
/// predictions on the test data.
///
/// `train` and `test` must be subsets of the same loaded dataset so their
/// categorical level tables agree. Nothing is retained beyond the returned
/// tabulation.
pub fn evaluate_holdout(
    spec: &ModelSpec,
    train: &Dataset,
    test: &Dataset,
    fit_config: &FitConfig,
    positive: PositiveClass,
) -> Result<ConfusionOutcome, ComparisonError> {
    let invalid = |source| ComparisonError::InvalidSpecification {
        spec: spec.to_string(),
        source,
    };
    let train_design = DesignMatrix::classification(train, spec).map_err(invalid)?;
    let test_design = DesignMatrix::classification(test, spec).map_err(invalid)?;

    let insufficient = |detail: String| ComparisonError::InsufficientData {
        spec: spec.to_string(),
        context: "holdout refit".to_string(),
        detail,
    };
    for (j, name) in train_design.column_names.iter().enumerate().skip(1) {
        let column = train_design.x.column(j);
        let first = column[0];
        if column.iter().all(|&v| v == first) {
            return Err(insufficient(format!(
                "design column '{name}' is constant within the training data"
            )));
        }
    }

    let fitted = glm::fit(train_design.x.view(), train_design.y.view(), fit_config)
        .map_err(|e| insufficient(e.to_string()))?;
    let labels = fitted.classify(test_design.x.view());
    Ok(ConfusionOutcome::tabulate(
        labels.view(),
        test_design.y.view(),
        positive,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::glm::LinkFunction;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn accuracy_counts_agreements() {
        let predicted = array![0.0, 1.0, 1.0, 0.0];
        let actual = array![0.0, 1.0, 0.0, 0.0];
        assert_abs_diff_eq!(
            accuracy(predicted.view(), actual.view()),
            0.75,
            epsilon = 1e-12
        );
    }

    #[test]
    fn rates_are_exact_ratios_of_counts() {
        let outcome = ConfusionOutcome {
            true_positive: 80,
            false_positive: 12,
            true_negative: 70,
            false_negative: 22,
        };
        assert_eq!(outcome.total(), 184);
        assert_abs_diff_eq!(outcome.accuracy(), 150.0 / 184.0, epsilon = 1e-12);
        assert_abs_diff_eq!(outcome.sensitivity(), 80.0 / 102.0, epsilon = 1e-12);
        assert_abs_diff_eq!(outcome.specificity(), 70.0 / 82.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            outcome.sensitivity() + outcome.false_negative_rate(),
            1.0,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            outcome.specificity() + outcome.false_positive_rate(),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn polarity_swaps_the_roles_of_the_counts() {
        let predicted = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let actual = array![0.0, 1.0, 1.0, 1.0, 0.0];

        let zero = ConfusionOutcome::tabulate(predicted.view(), actual.view(), PositiveClass::Zero);
        assert_eq!(
            (zero.true_positive, zero.false_positive, zero.true_negative, zero.false_negative),
            (1, 1, 2, 1)
        );

        let one = ConfusionOutcome::tabulate(predicted.view(), actual.view(), PositiveClass::One);
        assert_eq!(
            (one.true_positive, one.false_positive, one.true_negative, one.false_negative),
            (2, 1, 1, 1)
        );

        // Accuracy is polarity-independent.
        assert_abs_diff_eq!(zero.accuracy(), one.accuracy(), epsilon = 1e-12);
    }

    #[test]
    fn holdout_counts_sum_to_the_test_size() {
        let n = 50;
        let x: Vec<f64> = (0..n).map(|i| i as f64 - 24.5).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| {
                let label = if x[i] > 0.0 { 1.0 } else { 0.0 };
                if i % 5 == 1 { 1.0 - label } else { label }
            })
            .collect();
        let data = Dataset::new(vec![
            Column::numeric("x", x),
            Column::numeric("y", y),
        ])
        .unwrap();

        let train_rows: Vec<usize> = (0..40).collect();
        let test_rows: Vec<usize> = (40..50).collect();
        let train = data.subset(&train_rows);
        let test = data.subset(&test_rows);

        let spec = ModelSpec::parse("y ~ x").unwrap();
        let config = FitConfig::new(LinkFunction::Logit);
        let outcome =
            evaluate_holdout(&spec, &train, &test, &config, PositiveClass::Zero).unwrap();

        assert_eq!(outcome.total(), 10);
        assert_abs_diff_eq!(
            outcome.sensitivity() + outcome.false_negative_rate(),
            1.0,
            epsilon = 1e-12
        );
    }
}
