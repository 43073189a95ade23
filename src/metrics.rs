//! Metrics.
//!
//! Metrics are evaluation helpers; they do not participate in backprop.
//! [`MetricAccumulator`] aggregates per-batch values across one epoch.

use crate::{Error, Result};

/// Index of the maximum value; the first index wins on ties.
///
/// Panics if `row` is empty.
#[inline]
pub fn argmax(row: &[f32]) -> usize {
    assert!(!row.is_empty(), "argmax of an empty row");
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Fraction of positions where `predicted == labels`.
pub fn accuracy(predicted: &[usize], labels: &[usize]) -> Result<f32> {
    if predicted.len() != labels.len() {
        return Err(Error::InvalidShape(format!(
            "predicted len {} does not match labels len {}",
            predicted.len(),
            labels.len()
        )));
    }
    if labels.is_empty() {
        return Err(Error::EmptySplit("accuracy over zero samples"));
    }
    let correct = count_correct(predicted.iter().copied(), labels);
    Ok(correct as f32 / labels.len() as f32)
}

/// Number of rows of `scores` (`labels.len() x num_classes`) whose arg-max equals the label.
pub fn correct_predictions(scores: &[f32], labels: &[usize], num_classes: usize) -> Result<usize> {
    if num_classes == 0 || scores.len() != labels.len() * num_classes {
        return Err(Error::InvalidShape(format!(
            "scores len {} does not match {} labels * {num_classes} classes",
            scores.len(),
            labels.len()
        )));
    }
    Ok(count_correct(
        scores.chunks_exact(num_classes).map(argmax),
        labels,
    ))
}

fn count_correct(predicted: impl Iterator<Item = usize>, labels: &[usize]) -> usize {
    predicted
        .zip(labels)
        .filter(|(p, l)| p == *l)
        .count()
}

/// Running loss/accuracy sums over the batches of one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricAccumulator {
    loss_sum: f64,
    accuracy_sum: f64,
    batches: usize,
    correct: usize,
    samples: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch that only contributes a loss (training batches).
    pub fn push_loss(&mut self, loss: f32) {
        self.loss_sum += f64::from(loss);
        self.batches += 1;
    }

    /// Record a batch loss together with its `correct` out of `samples` predictions.
    pub fn push_batch(&mut self, loss: f32, correct: usize, samples: usize) {
        self.push_loss(loss);
        if samples > 0 {
            self.accuracy_sum += correct as f64 / samples as f64;
        }
        self.correct += correct;
        self.samples += samples;
    }

    #[inline]
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Loss sum divided by the number of batches.
    pub fn mean_loss(&self) -> Result<f32> {
        if self.batches == 0 {
            return Err(Error::EmptySplit("no batches to average loss over"));
        }
        Ok((self.loss_sum / self.batches as f64) as f32)
    }

    /// Mean of per-batch accuracies.
    ///
    /// Exact only when every batch has the same size; a short final batch is
    /// weighted like a full one.
    pub fn mean_batch_accuracy(&self) -> Result<f32> {
        if self.batches == 0 {
            return Err(Error::EmptySplit("no batches to average accuracy over"));
        }
        Ok((self.accuracy_sum / self.batches as f64) as f32)
    }

    /// Correct predictions over all samples seen.
    pub fn sample_accuracy(&self) -> Result<f32> {
        if self.samples == 0 {
            return Err(Error::EmptySplit("no samples to compute accuracy over"));
        }
        Ok(self.correct as f32 / self.samples as f32)
    }
}
