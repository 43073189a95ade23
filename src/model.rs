use std::ops::{Deref, DerefMut};

use rand::{Rng, RngCore};

use crate::activation::{log_softmax_backward_in_place, log_softmax_in_place};
use crate::{Dropout, Error, GradMode, Layer, Mode, Result};

/// Feed-forward classifier: dense ReLU layers with dropout, then a log-softmax head.
///
/// The model owns its [`Mode`]. Dropout only fires in [`Mode::Train`].
#[derive(Debug, Clone)]
pub struct Classifier {
    layers: Vec<Layer>,
    dropout: Dropout,
    mode: Mode,
}

/// Reusable activation buffers for batched forward passes of up to `capacity` rows.
///
/// After a forward pass the last layer buffer holds log-probabilities.
#[derive(Debug, Clone)]
pub struct Scratch {
    capacity: usize,
    batch: usize,
    tracked: bool,
    layer_outputs: Vec<Vec<f32>>,
    // One per hidden layer: the multiplier dropout applied to each unit.
    masks: Vec<Vec<f32>>,
}

/// Parameter gradients for a `Classifier` (accumulate semantics).
///
/// `Classifier::backward` adds into the parameter gradients, so call
/// [`Gradients::zero`] before each new batch.
#[derive(Debug, Clone)]
pub struct Gradients {
    capacity: usize,
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,
    // Backprop intermediate: gradient w.r.t each layer output, for up to `capacity` rows.
    d_layer_outputs: Vec<Vec<f32>>,
}

impl Classifier {
    /// Assemble a classifier from already-built layers.
    ///
    /// The last layer produces logits; every other layer is treated as hidden and
    /// followed by `dropout`.
    pub fn from_layers(layers: Vec<Layer>, dropout: Dropout) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "classifier must have at least one layer".to_owned(),
            ));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].out_dim() != pair[1].in_dim() {
                return Err(Error::InvalidConfig(format!(
                    "layer {} in_dim {} does not match layer {i} out_dim {}",
                    i + 1,
                    pair[1].in_dim(),
                    pair[0].out_dim()
                )));
            }
        }
        Ok(Self {
            layers,
            dropout,
            mode: Mode::Train,
        })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn num_classes(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    #[inline]
    pub fn dropout(&self) -> Dropout {
        self.dropout
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Switch to eval mode until the returned guard is dropped.
    ///
    /// The guard restores [`Mode::Train`] on every exit path, including early
    /// returns through `?` and unwinding panics.
    pub fn eval_guard(&mut self) -> EvalGuard<'_> {
        self.mode = Mode::Eval;
        EvalGuard { model: self }
    }

    pub fn scratch(&self, capacity: usize) -> Scratch {
        Scratch::new(self, capacity)
    }

    pub fn gradients(&self, capacity: usize) -> Gradients {
        Gradients::new(self, capacity)
    }

    /// Batched forward pass in the model's current mode.
    ///
    /// `inputs` holds `batch` flattened samples row-major (`batch * input_dim`
    /// scalars). Returns `batch * num_classes` log-probabilities.
    ///
    /// Panics if `inputs.len()` is not a positive multiple of `input_dim` or the
    /// batch does not fit in `scratch`.
    pub fn forward<'a, R: Rng>(
        &self,
        inputs: &[f32],
        scratch: &'a mut Scratch,
        grad: GradMode,
        rng: &mut R,
    ) -> &'a [f32] {
        self.run(self.mode, inputs, scratch, grad, Some(rng))
    }

    /// Deterministic forward pass: eval semantics, no gradient tracking, regardless
    /// of the stored mode.
    pub fn forward_eval<'a>(&self, inputs: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        self.run(Mode::Eval, inputs, scratch, GradMode::NoGrad, None)
    }

    fn run<'a>(
        &self,
        mode: Mode,
        inputs: &[f32],
        scratch: &'a mut Scratch,
        grad: GradMode,
        mut rng: Option<&mut dyn RngCore>,
    ) -> &'a [f32] {
        let batch = self.batch_len(inputs, scratch);
        assert!(
            !self.dropout.is_active(mode) || rng.is_some(),
            "dropout in train mode requires an rng"
        );

        scratch.batch = batch;
        scratch.tracked = grad == GradMode::Track;

        let last = self.layers.len() - 1;
        for (idx, layer) in self.layers.iter().enumerate() {
            let out_len = batch * layer.out_dim();
            // Borrow the previous output immutably and the current output mutably.
            let (left, right) = scratch.layer_outputs.split_at_mut(idx);
            let prev: &[f32] = if idx == 0 {
                inputs
            } else {
                &left[idx - 1][..batch * layer.in_dim()]
            };
            let out = &mut right[0][..out_len];
            layer.forward(batch, prev, out);

            if idx < last {
                let mask = match grad {
                    GradMode::Track => Some(&mut scratch.masks[idx][..out_len]),
                    GradMode::NoGrad => None,
                };
                match rng.as_deref_mut() {
                    Some(r) => self.dropout.forward(mode, out, mask, r),
                    None => {
                        debug_assert!(!self.dropout.is_active(mode));
                        if let Some(m) = mask {
                            m.fill(1.0);
                        }
                    }
                }
            } else {
                for row in out.chunks_exact_mut(layer.out_dim()) {
                    log_softmax_in_place(row);
                }
            }
        }

        scratch.output()
    }

    fn batch_len(&self, inputs: &[f32], scratch: &Scratch) -> usize {
        let input_dim = self.input_dim();
        assert!(
            !inputs.is_empty() && inputs.len().is_multiple_of(input_dim),
            "inputs len {} is not a positive multiple of input_dim {}",
            inputs.len(),
            input_dim
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, model has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );
        let batch = inputs.len() / input_dim;
        assert!(
            batch <= scratch.capacity,
            "batch of {batch} exceeds scratch capacity {}",
            scratch.capacity
        );
        batch
    }

    /// Backward pass for the batch in `scratch`.
    ///
    /// You must call `forward` with [`GradMode::Track`] first, using the same
    /// `inputs` and `scratch`. Before calling this, write the upstream gradient
    /// `dL/d(log_probs)` into `grads.d_output_mut(batch)`.
    ///
    /// Parameter gradients are accumulated into `grads`.
    pub fn backward(&self, inputs: &[f32], scratch: &Scratch, grads: &mut Gradients) {
        assert!(
            scratch.tracked,
            "backward requires a forward pass with GradMode::Track"
        );
        let batch = scratch.batch;
        assert_eq!(
            inputs.len(),
            batch * self.input_dim(),
            "inputs len {} does not match batch {batch} * input_dim {}",
            inputs.len(),
            self.input_dim()
        );
        assert_eq!(
            grads.d_weights.len(),
            self.layers.len(),
            "grads has {} d_weights entries, model has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );
        assert!(
            batch <= grads.capacity,
            "batch of {batch} exceeds gradient capacity {}",
            grads.capacity
        );

        let last = self.layers.len() - 1;
        let classes = self.num_classes();
        {
            let log_probs = &scratch.layer_outputs[last][..batch * classes];
            let d_out = &mut grads.d_layer_outputs[last][..batch * classes];
            for (lp, d) in log_probs
                .chunks_exact(classes)
                .zip(d_out.chunks_exact_mut(classes))
            {
                log_softmax_backward_in_place(lp, d);
            }
        }

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];
            let out_len = batch * layer.out_dim();
            let in_len = batch * layer.in_dim();

            let layer_input: &[f32] = if idx == 0 {
                inputs
            } else {
                &scratch.layer_outputs[idx - 1][..in_len]
            };
            let layer_output = &scratch.layer_outputs[idx][..out_len];

            // We need two different gradient buffers:
            // - `d_outputs` for the current layer
            // - `d_inputs` for the current layer, which becomes `d_outputs` of the previous
            let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
            let d_outputs = &mut right[0][..out_len];
            if idx < last {
                for (d, &m) in d_outputs.iter_mut().zip(&scratch.masks[idx][..out_len]) {
                    *d *= m;
                }
            }
            let d_inputs = if idx == 0 {
                None
            } else {
                Some(&mut left[idx - 1][..in_len])
            };

            layer.backward(
                batch,
                layer_input,
                layer_output,
                d_outputs,
                d_inputs,
                &mut grads.d_weights[idx],
                &mut grads.d_biases[idx],
            );
        }
    }
}

/// Scoped eval mode. Derefs to the model; restores [`Mode::Train`] on drop.
#[derive(Debug)]
pub struct EvalGuard<'a> {
    model: &'a mut Classifier,
}

impl Deref for EvalGuard<'_> {
    type Target = Classifier;

    fn deref(&self) -> &Classifier {
        self.model
    }
}

impl DerefMut for EvalGuard<'_> {
    fn deref_mut(&mut self) -> &mut Classifier {
        self.model
    }
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        self.model.mode = Mode::Train;
    }
}

impl Scratch {
    pub fn new(model: &Classifier, capacity: usize) -> Self {
        assert!(capacity > 0, "scratch capacity must be > 0");
        let layer_outputs = model
            .layers
            .iter()
            .map(|l| vec![0.0; capacity * l.out_dim()])
            .collect();
        let masks = model.layers[..model.layers.len() - 1]
            .iter()
            .map(|l| vec![1.0; capacity * l.out_dim()])
            .collect();
        Self {
            capacity,
            batch: 0,
            tracked: false,
            layer_outputs,
            masks,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows produced by the most recent forward pass.
    #[inline]
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Log-probabilities of the most recent forward pass (`batch * num_classes`).
    #[inline]
    pub fn output(&self) -> &[f32] {
        let last = &self.layer_outputs[self.layer_outputs.len() - 1];
        let classes = last.len() / self.capacity;
        &last[..self.batch * classes]
    }
}

impl Gradients {
    pub fn new(model: &Classifier, capacity: usize) -> Self {
        assert!(capacity > 0, "gradient capacity must be > 0");
        let mut d_weights = Vec::with_capacity(model.layers.len());
        let mut d_biases = Vec::with_capacity(model.layers.len());
        let mut d_layer_outputs = Vec::with_capacity(model.layers.len());

        for layer in &model.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_biases.push(vec![0.0; layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; capacity * layer.out_dim()]);
        }

        Self {
            capacity,
            d_weights,
            d_biases,
            d_layer_outputs,
        }
    }

    /// Reset parameter gradients before accumulating a new batch.
    pub fn zero(&mut self) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            g.fill(0.0);
        }
    }

    /// Mutable view of the upstream gradient `dL/d(log_probs)` for `batch` rows.
    ///
    /// Typical training flow:
    /// - `grads.zero()`
    /// - `model.forward(inputs, &mut scratch, GradMode::Track, &mut rng)`
    /// - loss writes `dL/d(log_probs)` into `grads.d_output_mut(batch)`
    /// - `model.backward(inputs, &scratch, &mut grads)`
    #[inline]
    pub fn d_output_mut(&mut self, batch: usize) -> &mut [f32] {
        let last = self.d_layer_outputs.len() - 1;
        let classes = self.d_biases[last].len();
        &mut self.d_layer_outputs[last][..batch * classes]
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::{ClassifierBuilder, Init, loss};

    fn small(dropout: f32, seed: u64) -> Classifier {
        ClassifierBuilder::new(4)
            .unwrap()
            .hidden(5)
            .unwrap()
            .hidden(3)
            .unwrap()
            .dropout(dropout)
            .unwrap()
            .build_with_seed(3, seed)
            .unwrap()
    }

    fn loss_for(
        model: &Classifier,
        inputs: &[f32],
        labels: &[usize],
        scratch: &mut Scratch,
    ) -> f32 {
        let out = model.forward_eval(inputs, scratch);
        loss::nll_loss(out, labels, model.num_classes()).unwrap()
    }

    fn assert_close(analytic: f32, numeric: f32, abs_tol: f32, rel_tol: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn zero_init_output_has_batch_by_classes_shape_and_uniform_probs() {
        let model = ClassifierBuilder::new(6)
            .unwrap()
            .hidden(4)
            .unwrap()
            .init(Init::Zeros)
            .build_with_seed(10, 0)
            .unwrap();
        let mut scratch = model.scratch(8);
        let inputs = vec![0.3_f32; 5 * 6];
        let out = model.forward_eval(&inputs, &mut scratch);

        assert_eq!(out.len(), 5 * 10);
        for &lp in out {
            assert!((lp - (0.1_f32).ln()).abs() < 1e-6);
        }
    }

    #[test]
    fn log_probs_exponentiate_to_one_per_sample() {
        let model = small(0.2, 11);
        let mut scratch = model.scratch(4);
        let mut rng = StdRng::seed_from_u64(5);
        let inputs: Vec<f32> = (0..16).map(|i| (i as f32 * 0.37).sin()).collect();
        let out = model.forward(&inputs, &mut scratch, GradMode::Track, &mut rng);
        for row in out.chunks_exact(3) {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn eval_guard_restores_train_mode() {
        let mut model = small(0.2, 0);
        {
            let guard = model.eval_guard();
            assert_eq!(guard.mode(), Mode::Eval);
        }
        assert_eq!(model.mode(), Mode::Train);

        let failed: Result<()> = (|| {
            let _guard = model.eval_guard();
            Err(Error::EmptySplit("validation"))
        })();
        assert!(failed.is_err());
        assert_eq!(model.mode(), Mode::Train);
    }

    #[test]
    fn eval_guard_restores_train_mode_on_panic() {
        let mut model = small(0.2, 0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = model.eval_guard();
            panic!("validation blew up");
        }));
        assert!(result.is_err());
        assert_eq!(model.mode(), Mode::Train);
    }

    #[test]
    fn train_mode_dropout_changes_output_but_eval_does_not() {
        let model = small(0.5, 1);
        let mut scratch = model.scratch(1);
        let mut rng = StdRng::seed_from_u64(9);
        let input = [0.5_f32, -0.25, 1.0, 0.75];

        let eval_a = model.forward_eval(&input, &mut scratch).to_vec();
        let eval_b = model.forward_eval(&input, &mut scratch).to_vec();
        assert_eq!(eval_a, eval_b);

        let differs = (0..20).any(|_| {
            model.forward(&input, &mut scratch, GradMode::NoGrad, &mut rng) != eval_a.as_slice()
        });
        assert!(differs);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        // No dropout so the finite-difference loss is deterministic.
        let mut model = small(0.0, 4);
        let mut scratch = model.scratch(2);
        let mut grads = model.gradients(2);
        let mut rng = StdRng::seed_from_u64(0);

        let inputs = [0.3_f32, -0.7, 0.1, 0.9, -0.4, 0.2, 0.8, -0.5];
        let labels = [2_usize, 0];

        grads.zero();
        let out = model.forward(&inputs, &mut scratch, GradMode::Track, &mut rng);
        let classes = model.num_classes();
        loss::nll_loss_backward(out, &labels, classes, grads.d_output_mut(2)).unwrap();
        model.backward(&inputs, &scratch, &mut grads);

        let eps = 1e-3_f32;
        let mut scratch_tmp = model.scratch(2);

        for layer_idx in 0..model.num_layers() {
            let w_len = model.layers[layer_idx].weights().len();
            for p in 0..w_len {
                let orig = model.layers[layer_idx].weights()[p];
                model.layers[layer_idx].weights_mut()[p] = orig + eps;
                let plus = loss_for(&model, &inputs, &labels, &mut scratch_tmp);
                model.layers[layer_idx].weights_mut()[p] = orig - eps;
                let minus = loss_for(&model, &inputs, &labels, &mut scratch_tmp);
                model.layers[layer_idx].weights_mut()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.d_weights(layer_idx)[p], numeric, 1e-3, 1e-2);
            }

            let b_len = model.layers[layer_idx].biases().len();
            for p in 0..b_len {
                let orig = model.layers[layer_idx].biases()[p];
                model.layers[layer_idx].biases_mut()[p] = orig + eps;
                let plus = loss_for(&model, &inputs, &labels, &mut scratch_tmp);
                model.layers[layer_idx].biases_mut()[p] = orig - eps;
                let minus = loss_for(&model, &inputs, &labels, &mut scratch_tmp);
                model.layers[layer_idx].biases_mut()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.d_biases(layer_idx)[p], numeric, 1e-3, 1e-2);
            }
        }
    }

    #[test]
    fn zero_clears_accumulated_gradients() {
        let model = small(0.0, 2);
        let mut scratch = model.scratch(1);
        let mut grads = model.gradients(1);
        let mut rng = StdRng::seed_from_u64(0);
        let input = [1.0_f32, 2.0, 3.0, 4.0];

        let out = model.forward(&input, &mut scratch, GradMode::Track, &mut rng);
        loss::nll_loss_backward(out, &[1], 3, grads.d_output_mut(1)).unwrap();
        model.backward(&input, &scratch, &mut grads);
        assert!(grads.d_biases(2).iter().any(|&g| g != 0.0));

        grads.zero();
        for i in 0..model.num_layers() {
            assert!(grads.d_weights(i).iter().all(|&g| g == 0.0));
            assert!(grads.d_biases(i).iter().all(|&g| g == 0.0));
        }
    }

    #[test]
    #[should_panic(expected = "GradMode::Track")]
    fn backward_panics_after_no_grad_forward() {
        let model = small(0.0, 0);
        let mut scratch = model.scratch(1);
        let mut grads = model.gradients(1);
        let input = [0.0_f32; 4];
        model.forward_eval(&input, &mut scratch);
        model.backward(&input, &scratch, &mut grads);
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let model = small(0.0, 0);
        let mut scratch = model.scratch(1);
        let input = [0.0_f32; 3];
        model.forward_eval(&input, &mut scratch);
    }

    #[test]
    #[should_panic]
    fn forward_panics_when_batch_exceeds_capacity() {
        let model = small(0.0, 0);
        let mut scratch = model.scratch(1);
        let input = [0.0_f32; 8];
        model.forward_eval(&input, &mut scratch);
    }
}
