//! Negative log-likelihood loss.
//!
//! Intended to be used like:
//!
//! - run `model.forward(...)` to get log-probabilities
//! - compute `dL/d(log_probs)` via [`nll_loss_backward`]
//! - run `model.backward(...)`
//! - update parameters with an optimizer

use crate::{Error, Result};

/// Mean negative log-likelihood of the true class.
///
/// `log_probs` is `(labels.len(), num_classes)` row-major.
pub fn nll_loss(log_probs: &[f32], labels: &[usize], num_classes: usize) -> Result<f32> {
    check(log_probs, labels, num_classes)?;

    let mut sum = 0.0_f32;
    for (row, &label) in log_probs.chunks_exact(num_classes).zip(labels) {
        sum -= row[label];
    }
    Ok(sum / labels.len() as f32)
}

/// NLL loss + gradient w.r.t. `log_probs`.
///
/// Writes `d_log_probs = dL/d(log_probs)` (`-1 / batch` at each true class, zero
/// elsewhere) and returns the loss.
pub fn nll_loss_backward(
    log_probs: &[f32],
    labels: &[usize],
    num_classes: usize,
    d_log_probs: &mut [f32],
) -> Result<f32> {
    check(log_probs, labels, num_classes)?;
    if d_log_probs.len() != log_probs.len() {
        return Err(Error::InvalidShape(format!(
            "d_log_probs len {} does not match log_probs len {}",
            d_log_probs.len(),
            log_probs.len()
        )));
    }

    let inv_n = 1.0 / labels.len() as f32;
    let mut sum = 0.0_f32;
    d_log_probs.fill(0.0);
    for (i, (row, &label)) in log_probs
        .chunks_exact(num_classes)
        .zip(labels)
        .enumerate()
    {
        sum -= row[label];
        d_log_probs[i * num_classes + label] = -inv_n;
    }
    Ok(sum * inv_n)
}

fn check(log_probs: &[f32], labels: &[usize], num_classes: usize) -> Result<()> {
    if labels.is_empty() {
        return Err(Error::InvalidShape(
            "loss requires at least one sample".to_owned(),
        ));
    }
    if num_classes == 0 || log_probs.len() != labels.len() * num_classes {
        return Err(Error::InvalidShape(format!(
            "log_probs len {} does not match {} labels * {num_classes} classes",
            log_probs.len(),
            labels.len()
        )));
    }
    if let Some((sample, &label)) = labels
        .iter()
        .enumerate()
        .find(|(_, l)| **l >= num_classes)
    {
        return Err(Error::LabelOutOfRange {
            sample,
            label,
            num_classes,
        });
    }
    Ok(())
}
