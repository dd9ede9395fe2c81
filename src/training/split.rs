//! Seeded train/test partitioning

use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::BTreeMap;

/// Row-aligned train and test partitions
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

impl TrainTestSplit {
    fn from_indices(x: &Array2<f64>, y: &Array1<f64>, mut train: Vec<usize>, mut test: Vec<usize>) -> Self {
        train.sort_unstable();
        test.sort_unstable();
        Self {
            x_train: x.select(Axis(0), &train),
            x_test: x.select(Axis(0), &test),
            y_train: y.select(Axis(0), &train),
            y_test: y.select(Axis(0), &test),
        }
    }
}

fn check_sizes(x: &Array2<f64>, y: &Array1<f64>, test_size: f64) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() < 2 {
        return Err(PipelineError::PreconditionError(format!(
            "at least 2 usable rows are needed to split into train and test, got {}",
            x.nrows()
        )));
    }
    if !(0.0 < test_size && test_size < 1.0) {
        return Err(PipelineError::ValidationError(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }
    Ok(())
}

/// Shuffle rows with `seed`, then hold out `ceil(n * test_size)` of them
pub fn train_test_split(x: &Array2<f64>, y: &Array1<f64>, test_size: f64, seed: u64) -> Result<TrainTestSplit> {
    check_sizes(x, y, test_size)?;
    let n = x.nrows();

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);
    let test = indices.split_off(n - n_test);
    Ok(TrainTestSplit::from_indices(x, y, indices, test))
}

/// Split that keeps every class's share in both partitions
///
/// `y` holds class indices. Each class holds out `round(n_c * test_size)`
/// rows, at least one when the class has two or more rows and never all of
/// them.
pub fn stratified_split(x: &Array2<f64>, y: &Array1<f64>, test_size: f64, seed: u64) -> Result<TrainTestSplit> {
    check_sizes(x, y, test_size)?;

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        by_class.entry(label.round() as i64).or_default().push(i);
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();

    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        let n_c = indices.len();
        let mut n_test = (n_c as f64 * test_size).round() as usize;
        if n_c >= 2 {
            n_test = n_test.clamp(1, n_c - 1);
        } else {
            n_test = 0;
        }
        test.extend_from_slice(&indices[n_c - n_test..]);
        train.extend_from_slice(&indices[..n_c - n_test]);
    }

    // Only singleton classes: borrow one row so the test set is not empty
    if test.is_empty() {
        train.shuffle(&mut rng);
        if let Some(row) = train.pop() {
            test.push(row);
        }
    }

    Ok(TrainTestSplit::from_indices(x, y, train, test))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        let y = Array1::from_iter((0..n).map(|i| if i < n * 3 / 4 { 0.0 } else { 1.0 }));
        (x, y)
    }

    #[test]
    fn test_plain_split_sizes() {
        let (x, y) = data(100);
        let split = train_test_split(&x, &y, 0.2, 42).unwrap();
        assert_eq!(split.x_train.nrows(), 80);
        assert_eq!(split.x_test.nrows(), 20);
        assert_eq!(split.y_test.len(), 20);
    }

    #[test]
    fn test_split_is_deterministic() {
        let (x, y) = data(50);
        let a = train_test_split(&x, &y, 0.2, 7).unwrap();
        let b = train_test_split(&x, &y, 0.2, 7).unwrap();
        assert_eq!(a.x_test, b.x_test);
    }

    #[test]
    fn test_stratified_keeps_proportions() {
        let (x, y) = data(100);
        let split = stratified_split(&x, &y, 0.2, 42).unwrap();
        let test_pos = split.y_test.iter().filter(|&&v| v == 1.0).count();
        assert_eq!(split.y_test.len(), 20);
        assert_eq!(test_pos, 5);
    }

    #[test]
    fn test_small_class_gets_one_test_row() {
        let x = Array2::from_shape_fn((7, 1), |(i, _)| i as f64);
        let y = Array1::from(vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        let split = stratified_split(&x, &y, 0.2, 42).unwrap();
        assert!(split.y_test.iter().any(|&v| v == 1.0));
        assert!(split.y_train.iter().any(|&v| v == 1.0));
    }

    #[test]
    fn test_too_few_rows() {
        let x = Array2::zeros((1, 2));
        let y = Array1::zeros(1);
        let err = train_test_split(&x, &y, 0.2, 42).unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionError(_)));
    }
}
