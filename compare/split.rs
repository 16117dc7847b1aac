//! Seeded train/test partitioning.
//!
//! The partition is a derived artifact: a shuffled index vector cut at
//! `floor(train_fraction * n)`. Both sides are returned sorted so row order
//! in the materialized subsets is stable regardless of the shuffle.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

/// A disjoint, covering split of row indices into train and test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

#[derive(Error, Debug)]
pub enum SplitError {
    #[error("train fraction must be strictly between 0 and 1, got {0}")]
    InvalidFraction(f64),
    #[error(
        "a {train_fraction} split of {n_rows} rows leaves an empty side; provide more data or a different fraction"
    )]
    DegenerateSplit { n_rows: usize, train_fraction: f64 },
}

/// Splits `0..n_rows` into train and test by a seeded shuffle.
///
/// Rerunning with a generator in the same state reproduces the partition
/// exactly.
pub fn split_train_test(
    n_rows: usize,
    train_fraction: f64,
    rng: &mut StdRng,
) -> Result<Partition, SplitError> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(SplitError::InvalidFraction(train_fraction));
    }
    let n_train = (train_fraction * n_rows as f64).floor() as usize;
    if n_train == 0 || n_train == n_rows {
        return Err(SplitError::DegenerateSplit {
            n_rows,
            train_fraction,
        });
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    indices.shuffle(rng);

    let mut train = indices[..n_train].to_vec();
    let mut test = indices[n_train..].to_vec();
    train.sort_unstable();
    test.sort_unstable();

    log::info!(
        "partitioned {} rows into {} train / {} test",
        n_rows,
        train.len(),
        test.len()
    );
    Ok(Partition { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn split_sizes_match_spec_example() {
        let mut rng = StdRng::seed_from_u64(42);
        let partition = split_train_test(918, 0.8, &mut rng).unwrap();
        assert_eq!(partition.train.len(), 734);
        assert_eq!(partition.test.len(), 184);
    }

    #[test]
    fn split_is_disjoint_and_covering() {
        let mut rng = StdRng::seed_from_u64(7);
        let partition = split_train_test(101, 0.8, &mut rng).unwrap();
        let mut all: Vec<usize> = partition
            .train
            .iter()
            .chain(partition.test.iter())
            .copied()
            .collect();
        all.sort_unstable();
        let expected: Vec<usize> = (0..101).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn split_is_deterministic_for_a_fixed_seed() {
        let mut a = StdRng::seed_from_u64(1234);
        let mut b = StdRng::seed_from_u64(1234);
        let first = split_train_test(200, 0.8, &mut a).unwrap();
        let second = split_train_test(200, 0.8, &mut b).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = StdRng::seed_from_u64(1);
        let mut b = StdRng::seed_from_u64(2);
        let first = split_train_test(200, 0.8, &mut a).unwrap();
        let second = split_train_test(200, 0.8, &mut b).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn invalid_fraction_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            split_train_test(100, 0.0, &mut rng),
            Err(SplitError::InvalidFraction(_))
        ));
        assert!(matches!(
            split_train_test(100, 1.0, &mut rng),
            Err(SplitError::InvalidFraction(_))
        ));
    }

    #[test]
    fn degenerate_split_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            split_train_test(1, 0.5, &mut rng),
            Err(SplitError::DegenerateSplit { .. })
        ));
    }
}
