use std::collections::BTreeMap;

use ndarray::ArrayView2;

use crate::{MlErr, Result};

fn check(pred: &[usize], truth: &[usize]) -> Result<()> {
    if pred.len() != truth.len() {
        return Err(MlErr::SizeMismatch {
            what: "predictions",
            got: pred.len(),
            expected: truth.len(),
        });
    }

    if truth.is_empty() {
        return Err(MlErr::EmptyInput("labels"));
    }

    Ok(())
}

/// Returns the fraction of positions where `pred` equals `truth`.
pub fn accuracy(pred: &[usize], truth: &[usize]) -> Result<f32> {
    check(pred, truth)?;

    let hits = pred.iter().zip(truth).filter(|(p, t)| p == t).count();
    Ok(hits as f32 / truth.len() as f32)
}

/// Returns the mean per-class recall over the classes present in `truth`.
///
/// Classes that never occur in `truth` don't take part in the mean, even when predicted.
pub fn balanced_accuracy(pred: &[usize], truth: &[usize]) -> Result<f32> {
    check(pred, truth)?;

    // class -> (hits, occurrences)
    let mut recall: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for (p, t) in pred.iter().zip(truth) {
        let entry = recall.entry(*t).or_default();
        entry.0 += usize::from(p == t);
        entry.1 += 1;
    }

    let total: f64 = recall
        .values()
        .map(|&(hits, count)| hits as f64 / count as f64)
        .sum();

    Ok((total / recall.len() as f64) as f32)
}

/// Returns the index of the largest logit of every row, the first one on ties.
pub fn argmax_rows(logits: ArrayView2<f32>) -> Vec<usize> {
    logits
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
                    if v > max { (i, v) } else { (best, max) }
                })
                .0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn perfectly_balanced_truth_gives_equal_metrics() {
        let truth = [0, 0, 1, 1, 2, 2];
        let pred = [0, 1, 1, 1, 2, 0];

        let acc = accuracy(&pred, &truth).unwrap();
        let bal = balanced_accuracy(&pred, &truth).unwrap();
        assert!((acc - 4. / 6.).abs() < 1e-6);
        assert!((acc - bal).abs() < 1e-6);
    }

    #[test]
    fn under_predicted_class_lowers_balanced_accuracy() {
        let truth = [0, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        let pred = [0; 10];

        let acc = accuracy(&pred, &truth).unwrap();
        let bal = balanced_accuracy(&pred, &truth).unwrap();
        assert!((acc - 0.8).abs() < 1e-6);
        assert!((bal - 0.5).abs() < 1e-6);
        assert!(bal < acc);
    }

    #[test]
    fn absent_classes_are_excluded() {
        // Class 3 is predicted but never true.
        let truth = [0, 1];
        let pred = [0, 3];

        assert!((balanced_accuracy(&pred, &truth).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn metrics_stay_in_unit_range() {
        let truth = [4, 1, 1, 0, 2, 3, 3, 3];
        for shift in 0..5 {
            let pred: Vec<usize> = truth.iter().map(|t| (t + shift) % 5).collect();
            for metric in [accuracy, balanced_accuracy] {
                let m = metric(&pred, &truth).unwrap();
                assert!((0. ..=1.).contains(&m));
            }
        }
    }

    #[test]
    fn mismatched_or_empty_input_is_rejected() {
        assert!(matches!(
            accuracy(&[0, 1], &[0]),
            Err(MlErr::SizeMismatch { got: 2, expected: 1, .. })
        ));
        assert!(matches!(balanced_accuracy(&[], &[]), Err(MlErr::EmptyInput(_))));
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        let logits = array![[0.1, 0.7, 0.7], [-1., -2., -3.], [5., 5., 5.]];
        assert_eq!(argmax_rows(logits.view()), vec![1, 0, 0]);
    }
}
