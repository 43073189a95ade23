//! Activation functions.
//!
//! A dense layer computes a pre-activation value `z = W x + b` and then applies an
//! activation function element-wise: `y = activation(z)`.
//!
//! We cache the *post-activation* outputs `y` in `Scratch`. During backprop we
//! compute `dL/dz` from `dL/dy` using `y`, so no separate `z` buffer is needed.
//!
//! The classifier head is a row-wise log-softmax over the output layer's logits.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Element-wise activation function.
pub enum Activation {
    ReLU,
    Identity,
}

impl Activation {
    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::Identity => x,
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    ///
    /// For ReLU this also holds when `y` was rescaled by dropout afterwards: the
    /// scale is positive, so the sign of `y` is unchanged.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Identity => 1.0,
        }
    }
}

/// In-place, numerically stable log-softmax over one row of logits.
///
/// Panics if `row` is empty.
#[inline]
pub fn log_softmax_in_place(row: &mut [f32]) {
    assert!(!row.is_empty(), "log_softmax requires at least 1 class");

    let mut max_x = row[0];
    for &x in row.iter().skip(1) {
        if x > max_x {
            max_x = x;
        }
    }
    let mut sum_exp = 0.0_f32;
    for &x in row.iter() {
        sum_exp += (x - max_x).exp();
    }
    let log_sum_exp = max_x + sum_exp.ln();
    for x in row.iter_mut() {
        *x -= log_sum_exp;
    }
}

/// Backprop through log-softmax for one row.
///
/// Given the log-softmax output `log_probs` and the upstream gradient
/// `d_log_probs`, overwrites `d_log_probs` with `dL/d(logits)`:
/// `d_z[i] = d_lp[i] - exp(lp[i]) * sum_j d_lp[j]`.
#[inline]
pub fn log_softmax_backward_in_place(log_probs: &[f32], d_log_probs: &mut [f32]) {
    debug_assert_eq!(log_probs.len(), d_log_probs.len());

    let total: f32 = d_log_probs.iter().sum();
    for (d, &lp) in d_log_probs.iter_mut().zip(log_probs) {
        *d -= lp.exp() * total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relu_and_identity_shapes() {
        assert_eq!(Activation::ReLU.forward(-2.0), 0.0);
        assert_eq!(Activation::ReLU.forward(3.0), 3.0);
        assert_eq!(Activation::Identity.forward(-2.0), -2.0);

        // Gradients expressed via cached outputs.
        assert_eq!(Activation::ReLU.grad_from_output(0.0), 0.0);
        assert_eq!(Activation::ReLU.grad_from_output(1.25), 1.0);
        assert_eq!(Activation::Identity.grad_from_output(-7.0), 1.0);
    }

    #[test]
    fn log_softmax_is_stable_for_large_logits() {
        let mut row = [1000.0_f32, 1000.0, -1000.0];
        log_softmax_in_place(&mut row);
        assert!(row.iter().all(|v| v.is_finite()));
        assert!((row[0] - (-std::f32::consts::LN_2)).abs() < 1e-5);
        let total: f32 = row.iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn log_softmax_backward_with_one_hot_upstream_is_softmax_minus_target() {
        let mut row = [0.5_f32, -1.0, 2.0];
        log_softmax_in_place(&mut row);
        let mut d = [0.0_f32, -1.0, 0.0];
        log_softmax_backward_in_place(&row, &mut d);

        for i in 0..3 {
            let target = if i == 1 { 1.0 } else { 0.0 };
            let expected = row[i].exp() - target;
            assert!((d[i] - expected).abs() < 1e-6);
        }
    }
}
