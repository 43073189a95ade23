use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::matmul::gemm_f32;
use crate::{Activation, Error, Result};

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    /// Uniform in `±sqrt(6 / (in + out))`.
    Xavier,
    /// Uniform in `±sqrt(6 / in)`, for ReLU layers.
    He,
    /// All weights zero. Only useful for deterministic tests.
    Zeros,
}

/// A dense (fully connected) layer: `y = activation(W x + b)`.
#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }

        let len = in_dim * out_dim;
        let weights = match init {
            Init::Zeros => vec![0.0; len],
            Init::Xavier | Init::He => {
                let fan = match init {
                    Init::Xavier => (in_dim + out_dim) as f32,
                    _ => in_dim as f32,
                };
                let limit = (6.0 / fan).sqrt();
                let dist = Uniform::new_inclusive(-limit, limit);
                (0..len).map(|_| dist.sample(rng)).collect()
            }
        };

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Forward pass for a batch of samples.
    ///
    /// Computes, for each row `b`:
    /// - `z = W * inputs[b] + bias`
    /// - `outputs[b] = activation(z)`
    ///
    /// Shape contract:
    /// - `inputs.len() == batch * self.in_dim`
    /// - `outputs.len() == batch * self.out_dim`
    pub fn forward(&self, batch: usize, inputs: &[f32], outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), batch * self.in_dim);
        debug_assert_eq!(outputs.len(), batch * self.out_dim);

        for row in outputs.chunks_exact_mut(self.out_dim) {
            row.copy_from_slice(&self.biases);
        }

        // outputs (batch, out) += inputs (batch, in) * W^T (in, out)
        gemm_f32(
            batch,
            self.out_dim,
            self.in_dim,
            1.0,
            inputs,
            self.in_dim,
            1,
            &self.weights,
            1,
            self.in_dim,
            1.0,
            outputs,
            self.out_dim,
            1,
        );

        if self.activation != Activation::Identity {
            for v in outputs.iter_mut() {
                *v = self.activation.forward(*v);
            }
        }
    }

    /// Backward pass for a batch of samples.
    ///
    /// Accumulate semantics for parameters:
    /// - `d_weights` and `d_biases` are *added to*; zero them before a new batch
    /// - `d_inputs`, when provided, is overwritten
    ///
    /// Inputs:
    /// - `inputs`: the same inputs passed to `forward`
    /// - `outputs`: the cached outputs (post-activation)
    /// - `d_outputs`: upstream gradient dL/d(outputs); overwritten with dL/dz
    ///
    /// Shape contract:
    /// - `inputs.len() == d_inputs.len() == batch * self.in_dim`
    /// - `outputs.len() == d_outputs.len() == batch * self.out_dim`
    /// - `d_weights.len() == self.weights.len()`
    /// - `d_biases.len() == self.out_dim`
    #[allow(clippy::too_many_arguments)]
    pub fn backward(
        &self,
        batch: usize,
        inputs: &[f32],
        outputs: &[f32],
        d_outputs: &mut [f32],
        d_inputs: Option<&mut [f32]>,
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), batch * self.in_dim);
        debug_assert_eq!(outputs.len(), batch * self.out_dim);
        debug_assert_eq!(d_outputs.len(), batch * self.out_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        // d_z = d_y * act'(y)
        if self.activation != Activation::Identity {
            for (d, &y) in d_outputs.iter_mut().zip(outputs) {
                *d *= self.activation.grad_from_output(y);
            }
        }
        let d_z: &[f32] = d_outputs;

        for row in d_z.chunks_exact(self.out_dim) {
            for (db, &g) in d_biases.iter_mut().zip(row) {
                *db += g;
            }
        }

        // d_weights (out, in) += d_z^T (out, batch) * inputs (batch, in)
        gemm_f32(
            self.out_dim,
            self.in_dim,
            batch,
            1.0,
            d_z,
            1,
            self.out_dim,
            inputs,
            self.in_dim,
            1,
            1.0,
            d_weights,
            self.in_dim,
            1,
        );

        // d_inputs (batch, in) = d_z (batch, out) * W (out, in)
        if let Some(d_inputs) = d_inputs {
            debug_assert_eq!(d_inputs.len(), batch * self.in_dim);
            gemm_f32(
                batch,
                self.in_dim,
                self.out_dim,
                1.0,
                d_z,
                self.out_dim,
                1,
                &self.weights,
                self.in_dim,
                1,
                0.0,
                d_inputs,
                self.in_dim,
                1,
            );
        }
    }
}
