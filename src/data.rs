//! Contiguous labeled dataset and mini-batching.
//!
//! The training loop operates on slices to avoid per-step allocations. `Dataset`
//! provides validated, row-major storage for the feature matrix plus one integer
//! label per sample; `Batches` yields the per-epoch sample order in chunks.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::{Error, Result};

/// A labeled classification dataset.
///
/// Stored as a contiguous buffer with row-major layout:
/// - `inputs.len() == len * input_dim`
/// - `labels.len() == len`, every label `< num_classes`
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Vec<f32>,
    labels: Vec<usize>,
    input_dim: usize,
    num_classes: usize,
}

impl Dataset {
    /// Build a dataset from a flat `(len, input_dim)` buffer and `len` labels.
    pub fn from_flat(
        inputs: Vec<f32>,
        labels: Vec<usize>,
        input_dim: usize,
        num_classes: usize,
    ) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        if num_classes == 0 {
            return Err(Error::InvalidData("num_classes must be > 0".to_owned()));
        }
        if !inputs.len().is_multiple_of(input_dim) {
            return Err(Error::InvalidData(format!(
                "inputs length {} is not divisible by input_dim {}",
                inputs.len(),
                input_dim
            )));
        }
        if inputs.len() / input_dim != labels.len() {
            return Err(Error::InvalidData(format!(
                "inputs/labels length mismatch: {} vs {}",
                inputs.len() / input_dim,
                labels.len()
            )));
        }
        if let Some((i, &label)) = labels
            .iter()
            .enumerate()
            .find(|(_, l)| **l >= num_classes)
        {
            return Err(Error::InvalidData(format!(
                "label {label} at sample {i} is outside [0, {num_classes})"
            )));
        }

        Ok(Self {
            inputs,
            labels,
            input_dim,
            num_classes,
        })
    }

    /// Build a dataset from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f32>], labels: &[usize], num_classes: usize) -> Result<Self> {
        let input_dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if input_dim == 0 {
            return Err(Error::InvalidData("input_dim must be > 0".to_owned()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != input_dim {
                return Err(Error::InvalidData(format!(
                    "input row {i} has len {}, expected {input_dim}",
                    row.len()
                )));
            }
        }

        let mut flat = Vec::with_capacity(rows.len() * input_dim);
        for row in rows {
            flat.extend_from_slice(row);
        }
        Self::from_flat(flat, labels.to_vec(), input_dim, num_classes)
    }

    #[inline]
    /// Returns the number of samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    /// Returns true if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    /// Returns the per-sample input dimension.
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    #[inline]
    /// Returns the `idx`-th input row (shape: `(input_dim,)`).
    ///
    /// Panics if `idx >= len`.
    pub fn input(&self, idx: usize) -> &[f32] {
        let start = idx * self.input_dim;
        &self.inputs[start..start + self.input_dim]
    }

    #[inline]
    /// Panics if `idx >= len`.
    pub fn label(&self, idx: usize) -> usize {
        self.labels[idx]
    }

    #[inline]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Copy the samples at `indices` into contiguous batch buffers.
    ///
    /// Returns the filled prefixes `(inputs, labels)`. Panics if the buffers are too
    /// small or an index is out of bounds.
    pub fn gather<'a>(
        &self,
        indices: &[usize],
        inputs_out: &'a mut [f32],
        labels_out: &'a mut [usize],
    ) -> (&'a [f32], &'a [usize]) {
        let n = indices.len();
        assert!(
            inputs_out.len() >= n * self.input_dim && labels_out.len() >= n,
            "batch buffers too small for {n} samples"
        );
        for (slot, &idx) in indices.iter().enumerate() {
            let start = slot * self.input_dim;
            inputs_out[start..start + self.input_dim].copy_from_slice(self.input(idx));
            labels_out[slot] = self.labels[idx];
        }
        (&inputs_out[..n * self.input_dim], &labels_out[..n])
    }
}

/// Per-epoch sample order, consumed in chunks of `batch_size`.
///
/// The final chunk may be shorter.
#[derive(Debug, Clone)]
pub struct Batches {
    order: Vec<usize>,
    batch_size: usize,
}

impl Batches {
    pub fn new(len: usize, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        Ok(Self {
            order: (0..len).collect(),
            batch_size,
        })
    }

    /// Shuffle the sample order in place (a fresh permutation each call).
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.order.shuffle(rng);
    }

    /// Number of batches per pass: `ceil(len / batch_size)`.
    #[inline]
    pub fn len(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> std::slice::Chunks<'_, usize> {
        self.order.chunks(self.batch_size)
    }
}
