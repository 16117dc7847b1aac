//! Descriptive summary statistics for a dataset.
//!
//! Numeric columns get count, mean, sample standard deviation, min, median
//! and max; categorical columns get per-level counts. [`summarize_groups`]
//! produces the same tables per level of a grouping column, the way the
//! source analysis tabulates predictors against the outcome.

use crate::data::{ColumnValues, Dataset};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct NumericSummary {
    pub name: String,
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelCount {
    pub level: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSummary {
    Numeric(NumericSummary),
    Categorical { name: String, counts: Vec<LevelCount> },
}

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("the grouping column '{0}' is not in the data")]
    UnknownColumn(String),
    #[error(
        "the numeric column '{column}' has {distinct} distinct values; grouping needs a categorical column or a numeric one with at most {max} distinct values"
    )]
    NotGroupable {
        column: String,
        distinct: usize,
        max: usize,
    },
}

const MAX_NUMERIC_GROUPS: usize = 10;

/// Summarizes every column of the dataset.
pub fn summarize(data: &Dataset) -> Vec<ColumnSummary> {
    data.columns()
        .iter()
        .map(|column| match &column.values {
            ColumnValues::Numeric(values) => {
                ColumnSummary::Numeric(numeric_summary(&column.name, values.as_slice().unwrap_or(&[])))
            }
            ColumnValues::Categorical(cat) => {
                let mut counts: Vec<LevelCount> = cat
                    .levels
                    .iter()
                    .map(|level| LevelCount {
                        level: level.clone(),
                        count: 0,
                    })
                    .collect();
                for &code in &cat.codes {
                    counts[code as usize].count += 1;
                }
                ColumnSummary::Categorical {
                    name: column.name.clone(),
                    counts,
                }
            }
        })
        .collect()
}

/// Summarizes every non-grouping column separately for each level of the
/// grouping column.
///
/// The grouping column may be categorical, or numeric with at most ten
/// distinct values (a 0/1 outcome column, in the observed use).
pub fn summarize_groups(
    data: &Dataset,
    by: &str,
) -> Result<Vec<(String, Vec<ColumnSummary>)>, SummaryError> {
    let column = data
        .column(by)
        .ok_or_else(|| SummaryError::UnknownColumn(by.to_string()))?;

    // (group label, member rows), in label order
    let groups: Vec<(String, Vec<usize>)> = match &column.values {
        ColumnValues::Categorical(cat) => cat
            .levels
            .iter()
            .enumerate()
            .map(|(code, level)| {
                let rows = cat
                    .codes
                    .iter()
                    .enumerate()
                    .filter(|&(_, &c)| c as usize == code)
                    .map(|(row, _)| row)
                    .collect::<Vec<usize>>();
                (level.clone(), rows)
            })
            .filter(|(_, rows)| !rows.is_empty())
            .collect(),
        ColumnValues::Numeric(values) => {
            let mut distinct: Vec<f64> = Vec::new();
            for &v in values {
                if !distinct.iter().any(|&d| d == v) {
                    distinct.push(v);
                }
                if distinct.len() > MAX_NUMERIC_GROUPS {
                    return Err(SummaryError::NotGroupable {
                        column: by.to_string(),
                        distinct: distinct.len(),
                        max: MAX_NUMERIC_GROUPS,
                    });
                }
            }
            distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            distinct
                .into_iter()
                .map(|value| {
                    let rows = values
                        .iter()
                        .enumerate()
                        .filter(|&(_, &v)| v == value)
                        .map(|(row, _)| row)
                        .collect::<Vec<usize>>();
                    (format!("{value}"), rows)
                })
                .collect()
        }
    };

    Ok(groups
        .into_iter()
        .map(|(label, rows)| {
            let sub = data.subset(&rows);
            let summaries = summarize(&sub)
                .into_iter()
                .filter(|summary| summary_name(summary) != by)
                .collect();
            (label, summaries)
        })
        .collect())
}

fn summary_name(summary: &ColumnSummary) -> &str {
    match summary {
        ColumnSummary::Numeric(numeric) => &numeric.name,
        ColumnSummary::Categorical { name, .. } => name,
    }
}

fn numeric_summary(name: &str, values: &[f64]) -> NumericSummary {
    let count = values.len();
    if count == 0 {
        return NumericSummary {
            name: name.to_string(),
            count,
            mean: f64::NAN,
            std_dev: f64::NAN,
            min: f64::NAN,
            median: f64::NAN,
            max: f64::NAN,
        };
    }
    let mean = values.iter().sum::<f64>() / count as f64;
    let std_dev = if count > 1 {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (count - 1) as f64).sqrt()
    } else {
        f64::NAN
    };
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };

    NumericSummary {
        name: name.to_string(),
        count,
        mean,
        std_dev,
        min,
        median,
        max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use approx::assert_abs_diff_eq;

    fn toy_data() -> Dataset {
        Dataset::new(vec![
            Column::numeric("Age", vec![40.0, 49.0, 37.0, 54.0, 50.0]),
            Column::categorical("Sex", &["M", "F", "M", "M", "F"]),
            Column::numeric("HeartDisease", vec![0.0, 1.0, 0.0, 1.0, 1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn numeric_summaries_match_hand_computation() {
        let summaries = summarize(&toy_data());
        match &summaries[0] {
            ColumnSummary::Numeric(s) => {
                assert_eq!(s.count, 5);
                assert_abs_diff_eq!(s.mean, 46.0, epsilon = 1e-12);
                assert_abs_diff_eq!(s.median, 49.0, epsilon = 1e-12);
                assert_abs_diff_eq!(s.min, 37.0, epsilon = 1e-12);
                assert_abs_diff_eq!(s.max, 54.0, epsilon = 1e-12);
                // var = (36 + 9 + 81 + 64 + 16) / 4
                assert_abs_diff_eq!(s.std_dev, (206.0f64 / 4.0).sqrt(), epsilon = 1e-12);
            }
            other => panic!("expected numeric Age summary, got {:?}", other),
        }
    }

    #[test]
    fn categorical_summaries_count_levels() {
        let summaries = summarize(&toy_data());
        match &summaries[1] {
            ColumnSummary::Categorical { name, counts } => {
                assert_eq!(name, "Sex");
                assert_eq!(
                    counts,
                    &vec![
                        LevelCount { level: "F".to_string(), count: 2 },
                        LevelCount { level: "M".to_string(), count: 3 },
                    ]
                );
            }
            other => panic!("expected categorical Sex summary, got {:?}", other),
        }
    }

    #[test]
    fn grouped_summaries_partition_the_rows() {
        let grouped = summarize_groups(&toy_data(), "HeartDisease").unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "0");
        assert_eq!(grouped[1].0, "1");
        // Grouping column itself is excluded from each group's table.
        assert_eq!(grouped[0].1.len(), 2);

        match &grouped[0].1[0] {
            ColumnSummary::Numeric(s) => {
                assert_eq!(s.name, "Age");
                assert_eq!(s.count, 2);
                assert_abs_diff_eq!(s.mean, 38.5, epsilon = 1e-12);
            }
            other => panic!("expected numeric Age summary, got {:?}", other),
        }
    }

    #[test]
    fn grouping_errors() {
        assert!(matches!(
            summarize_groups(&toy_data(), "nope"),
            Err(SummaryError::UnknownColumn(_))
        ));
        let err = summarize_groups(&toy_data(), "Age");
        // Five distinct ages stay under the cap, so this groups fine.
        assert!(err.is_ok());

        let wide = Dataset::new(vec![Column::numeric(
            "v",
            (0..20).map(|i| i as f64).collect(),
        )])
        .unwrap();
        assert!(matches!(
            summarize_groups(&wide, "v"),
            Err(SummaryError::NotGroupable { .. })
        ));
    }
}
