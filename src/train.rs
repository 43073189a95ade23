//! Training/validation driver.
//!
//! One epoch runs three phases in order:
//!
//! 1. training batches: zero grads, forward (dropout on, tracked), NLL, backward, step
//! 2. validation: eval mode via [`Classifier::eval_guard`], untracked forward, loss and
//!    per-batch accuracy
//! 3. report: average, append to the [`History`], hand the report to the caller
//!
//! Batch buffers are sized on first use to `min(batch_size, split len)` rows and
//! reused for every later batch.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::metrics::{MetricAccumulator, correct_predictions};
use crate::{
    Batches, Classifier, Dataset, Error, GradMode, Gradients, Mode, OptimizerState, Result,
    Scratch, TrainConfig, loss,
};

/// Metrics for one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based.
    pub epoch: usize,
    pub epochs: usize,
    pub train_loss: f32,
    pub test_loss: f32,
    /// Mean of per-batch accuracies, in `[0, 1]`.
    pub accuracy: f32,
    /// Correct predictions over all validation samples, in `[0, 1]`.
    pub sample_accuracy: f32,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {} of {}  |  Train Loss: {:.3}  |  Test Loss: {:.3}  |  Accuracy: {:.3}%",
            self.epoch,
            self.epochs,
            self.train_loss,
            self.test_loss,
            self.accuracy * 100.0
        )
    }
}

/// Ordered per-epoch reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub epochs: Vec<EpochReport>,
}

impl History {
    pub fn train_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.train_loss).collect()
    }

    pub fn test_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|e| e.test_loss).collect()
    }

    pub fn last(&self) -> Option<&EpochReport> {
        self.epochs.last()
    }

    /// Epoch with the lowest validation loss. Past it, the model is overfitting.
    pub fn best_epoch(&self) -> Option<&EpochReport> {
        self.epochs
            .iter()
            .min_by(|a, b| a.test_loss.total_cmp(&b.test_loss))
    }
}

/// Validation results for one pass over a split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validation {
    pub loss: f32,
    pub accuracy: f32,
    pub sample_accuracy: f32,
}

/// Owns everything a training run mutates besides the model parameters.
#[derive(Debug)]
pub struct Trainer {
    config: TrainConfig,
    optimizer: OptimizerState,
    scratch: Scratch,
    grads: Gradients,
    batch_inputs: Vec<f32>,
    batch_labels: Vec<usize>,
    rng: StdRng,
}

impl Trainer {
    pub fn new(model: &Classifier, config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let optimizer = config.optimizer.state(model)?;
        Ok(Self {
            config,
            optimizer,
            scratch: model.scratch(1),
            grads: model.gradients(1),
            batch_inputs: Vec::new(),
            batch_labels: Vec::new(),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    #[inline]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Optimizer steps taken so far.
    #[inline]
    pub fn steps(&self) -> u64 {
        self.optimizer.steps()
    }

    /// Train for `config.epochs` epochs, logging each report.
    pub fn fit(
        &mut self,
        model: &mut Classifier,
        train: &Dataset,
        test: &Dataset,
    ) -> Result<History> {
        self.fit_with(model, train, test, |report| info!("{report}"))
    }

    /// Train for `config.epochs` epochs, calling `on_epoch` after each report.
    pub fn fit_with<F>(
        &mut self,
        model: &mut Classifier,
        train: &Dataset,
        test: &Dataset,
        mut on_epoch: F,
    ) -> Result<History>
    where
        F: FnMut(&EpochReport),
    {
        check_split(model, train, "training")?;
        check_split(model, test, "validation")?;

        info!(
            epochs = self.config.epochs,
            batch_size = self.config.batch_size,
            lr = self.config.lr,
            dropout = model.dropout().p(),
            train_samples = train.len(),
            test_samples = test.len(),
            "starting training"
        );

        model.set_mode(Mode::Train);
        let mut history = History::default();
        for epoch in 1..=self.config.epochs {
            let train_loss = self.train_epoch(model, train)?;
            let val = self.validate(model, test)?;

            let report = EpochReport {
                epoch,
                epochs: self.config.epochs,
                train_loss,
                test_loss: val.loss,
                accuracy: val.accuracy,
                sample_accuracy: val.sample_accuracy,
            };
            on_epoch(&report);
            history.epochs.push(report);
        }

        if let Some(best) = history.best_epoch() {
            info!(
                best_epoch = best.epoch,
                best_test_loss = best.test_loss,
                "training finished"
            );
        }
        Ok(history)
    }

    /// One pass over `train` in the model's current mode. Returns the mean batch loss.
    pub fn train_epoch(&mut self, model: &mut Classifier, train: &Dataset) -> Result<f32> {
        check_split(model, train, "training")?;
        self.reserve(model, train.len());

        let mut batches = Batches::new(train.len(), self.config.batch_size)?;
        if self.config.shuffle {
            batches.shuffle(&mut self.rng);
        }

        let classes = model.num_classes();
        let mut acc = MetricAccumulator::new();
        for (step, indices) in batches.iter().enumerate() {
            let (inputs, labels) =
                train.gather(indices, &mut self.batch_inputs, &mut self.batch_labels);

            self.grads.zero();
            let log_probs =
                model.forward(inputs, &mut self.scratch, GradMode::Track, &mut self.rng);
            let batch_loss = loss::nll_loss_backward(
                log_probs,
                labels,
                classes,
                self.grads.d_output_mut(labels.len()),
            )?;
            model.backward(inputs, &self.scratch, &mut self.grads);
            self.optimizer.step(model, &self.grads, self.config.lr);

            acc.push_loss(batch_loss);
            debug!(step, batch = labels.len(), loss = batch_loss, "train batch");
        }

        acc.mean_loss()
    }

    /// One pass over `test` in eval mode without gradient tracking.
    ///
    /// The model is back in train mode when this returns, whether it succeeded or not.
    pub fn validate(&mut self, model: &mut Classifier, test: &Dataset) -> Result<Validation> {
        let model = model.eval_guard();
        check_split(&model, test, "validation")?;
        self.reserve(&model, test.len());

        let batches = Batches::new(test.len(), self.config.batch_size)?;
        let classes = model.num_classes();
        let mut acc = MetricAccumulator::new();
        for indices in batches.iter() {
            let (inputs, labels) =
                test.gather(indices, &mut self.batch_inputs, &mut self.batch_labels);

            let log_probs =
                model.forward(inputs, &mut self.scratch, GradMode::NoGrad, &mut self.rng);
            let batch_loss = loss::nll_loss(log_probs, labels, classes)?;
            let correct = correct_predictions(log_probs, labels, classes)?;
            acc.push_batch(batch_loss, correct, labels.len());
        }

        Ok(Validation {
            loss: acc.mean_loss()?,
            accuracy: acc.mean_batch_accuracy()?,
            sample_accuracy: acc.sample_accuracy()?,
        })
    }

    /// Grow the batch buffers to fit the largest batch of a `len`-sample split.
    fn reserve(&mut self, model: &Classifier, len: usize) {
        let rows = self.config.batch_size.min(len);
        if rows <= self.scratch.capacity() && self.batch_labels.len() >= rows {
            return;
        }
        self.scratch = model.scratch(rows);
        self.grads = model.gradients(rows);
        self.batch_inputs.resize(rows * model.input_dim(), 0.0);
        self.batch_labels.resize(rows, 0);
    }
}

fn check_split(model: &Classifier, data: &Dataset, name: &'static str) -> Result<()> {
    if data.is_empty() {
        return Err(Error::EmptySplit(name));
    }
    if data.input_dim() != model.input_dim() {
        return Err(Error::InvalidShape(format!(
            "{name} input_dim {} does not match model input_dim {}",
            data.input_dim(),
            model.input_dim()
        )));
    }
    if data.num_classes() != model.num_classes() {
        return Err(Error::InvalidShape(format!(
            "{name} has {} classes but the model outputs {}",
            data.num_classes(),
            model.num_classes()
        )));
    }
    Ok(())
}
