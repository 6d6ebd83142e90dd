//! Stratified train/holdout partitioning and cross-validation fold assignment.
//!
//! Both operations take an explicit seed; the same labels and seed always
//! produce the same partition.

use bt_types::{BtResult, DataError};
use bt_types::validation_error;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Disjoint, exhaustive split of record indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub train: Vec<usize>,
    pub holdout: Vec<usize>,
}

/// Indices of each class (0 then 1), shuffled with `rng`.
fn shuffled_by_class(labels: &[u8], rng: &mut ChaCha8Rng) -> [Vec<usize>; 2] {
    let mut classes: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (idx, &label) in labels.iter().enumerate() {
        classes[usize::from(label != 0)].push(idx);
    }
    for class in classes.iter_mut() {
        class.shuffle(rng);
    }
    classes
}

/// Hold out `holdout_fraction` of each class.
pub fn stratified_partition(labels: &[u8], holdout_fraction: f64, seed: u64) -> BtResult<Partition> {
    if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
        return Err(validation_error!(
            "holdout fraction must be in (0, 1), got {}",
            holdout_fraction
        ));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut holdout = Vec::new();

    for class in shuffled_by_class(labels, &mut rng) {
        let n_holdout = (class.len() as f64 * holdout_fraction).round() as usize;
        holdout.extend_from_slice(&class[..n_holdout]);
        train.extend_from_slice(&class[n_holdout..]);
    }

    if train.is_empty() || holdout.is_empty() {
        return Err(DataError::InsufficientData {
            message: format!(
                "{} records cannot be split with holdout fraction {}",
                labels.len(),
                holdout_fraction
            ),
        }
        .into());
    }

    train.sort_unstable();
    holdout.sort_unstable();
    Ok(Partition { train, holdout })
}

/// One cross-validation split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvSplit {
    pub fold: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Assignment of every record to one of `k` folds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    k: usize,
    fold_of: Vec<usize>,
}

impl FoldAssignment {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.fold_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fold_of.is_empty()
    }

    pub fn fold_of(&self, record: usize) -> Option<usize> {
        self.fold_of.get(record).copied()
    }

    pub fn test_indices(&self, fold: usize) -> Vec<usize> {
        (0..self.fold_of.len()).filter(|&i| self.fold_of[i] == fold).collect()
    }

    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        (0..self.fold_of.len()).filter(|&i| self.fold_of[i] != fold).collect()
    }

    pub fn splits(&self) -> Vec<CvSplit> {
        (0..self.k)
            .map(|fold| CvSplit {
                fold,
                train: self.train_indices(fold),
                test: self.test_indices(fold),
            })
            .collect()
    }
}

/// Deal each class round-robin across `k` folds so every fold keeps the
/// overall outcome ratio and holds at least one record of each class.
pub fn stratified_folds(labels: &[u8], k: usize, seed: u64) -> BtResult<FoldAssignment> {
    if k < 2 {
        return Err(validation_error!("need at least 2 folds, got {}", k));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let classes = shuffled_by_class(labels, &mut rng);

    for (label, class) in classes.iter().enumerate() {
        if class.len() < k {
            return Err(DataError::InsufficientData {
                message: format!(
                    "class {} has {} records, fewer than {} folds",
                    label,
                    class.len(),
                    k
                ),
            }
            .into());
        }
    }

    let mut fold_of = vec![0; labels.len()];
    // Continue the deal across classes so fold sizes differ by at most one.
    let mut slot = 0;
    for class in &classes {
        for &idx in class {
            fold_of[idx] = slot % k;
            slot += 1;
        }
    }

    Ok(FoldAssignment { k, fold_of })
}
