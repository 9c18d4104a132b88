//! Seeded shuffling, train/test partitioning and k-fold assignment
//!
//! With a seed the permutation depends only on the seed and the number of
//! records, so identical inputs always produce identical membership. No
//! stratification is attempted: class proportions may differ between
//! partitions.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{ClassifyError, Result};

/// Ordered train/test partitions
#[derive(Debug, Clone)]
pub struct LabeledSplit<T> {
    pub train: Vec<T>,
    pub test: Vec<T>,
}

/// One cross-validation fold
#[derive(Debug, Clone)]
pub struct Fold<T> {
    pub index: usize,
    pub train: Vec<T>,
    pub test: Vec<T>,
}

fn rng_for(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Permutation of `0..len` driven by `seed`
pub fn permutation(len: usize, seed: Option<u64>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut rng_for(seed));
    indices
}

/// Reject fractions outside the open interval (0, 1)
pub fn validate_fraction(test_fraction: f64) -> Result<()> {
    if test_fraction > 0.0 && test_fraction < 1.0 {
        Ok(())
    } else {
        Err(ClassifyError::InvalidFraction(test_fraction))
    }
}

/// Number of records assigned to the test partition
pub fn test_size(total: usize, test_fraction: f64) -> usize {
    (test_fraction * total as f64).round() as usize
}

/// Shuffle `records` and move `round(test_fraction * len)` of them into the test partition.
///
/// `seed = None` draws from OS entropy and is not reproducible.
pub fn split<T>(records: Vec<T>, test_fraction: f64, seed: Option<u64>) -> Result<LabeledSplit<T>> {
    validate_fraction(test_fraction)?;

    let total = records.len();
    let n_test = test_size(total, test_fraction);
    let mut is_test = vec![false; total];
    for &idx in permutation(total, seed).iter().take(n_test) {
        is_test[idx] = true;
    }

    let mut train = Vec::with_capacity(total - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (record, to_test) in records.into_iter().zip(is_test) {
        if to_test {
            test.push(record);
        } else {
            train.push(record);
        }
    }

    debug!("Split {} records into {} train / {} test", total, train.len(), test.len());
    Ok(LabeledSplit { train, test })
}

/// Assign records to `k` folds after a seeded shuffle.
///
/// Fold sizes differ by at most one. Each returned fold holds out one group
/// as its test set and trains on the rest.
pub fn k_fold<T: Clone>(records: &[T], k: usize, seed: Option<u64>) -> Result<Vec<Fold<T>>> {
    if k < 2 {
        return Err(ClassifyError::InsufficientFolds(k));
    }
    if records.len() < k {
        return Err(ClassifyError::InvalidInput(format!(
            "{} records cannot fill {} folds",
            records.len(),
            k
        )));
    }

    let mut assignment = vec![0usize; records.len()];
    for (position, idx) in permutation(records.len(), seed).into_iter().enumerate() {
        assignment[idx] = position % k;
    }

    let folds = (0..k)
        .map(|fold| {
            let (test, train): (Vec<_>, Vec<_>) = records
                .iter()
                .zip(&assignment)
                .partition(|(_, assigned)| **assigned == fold);
            Fold {
                index: fold,
                train: train.into_iter().map(|(r, _)| r.clone()).collect(),
                test: test.into_iter().map(|(r, _)| r.clone()).collect(),
            }
        })
        .collect();

    Ok(folds)
}
