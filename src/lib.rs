//! A small feed-forward image classifier with dropout, trained from scratch.
//!
//! `fashion-mlp` implements a dense ReLU network with a log-softmax head, a
//! negative log-likelihood loss, Adam, and an epoch-based train/validate driver.
//! It targets MNIST-format data (Fashion-MNIST by default) but works on any
//! labeled dataset of fixed-size feature vectors.
//!
//! # Modes
//!
//! - [`Mode`] (`Train` / `Eval`) is owned by the [`Classifier`] and decides
//!   whether dropout fires. [`Classifier::eval_guard`] switches to `Eval` and
//!   restores `Train` when dropped, on every exit path.
//! - [`GradMode`] (`Track` / `NoGrad`) is passed explicitly to every forward
//!   pass. Only a tracked pass can be followed by [`Classifier::backward`].
//!
//! # Panics vs `Result`
//!
//! - Low-level hot path (panics on misuse): [`Classifier::forward`],
//!   [`Classifier::backward`], [`Classifier::forward_eval`]. Buffer shape
//!   mismatches are programmer error.
//! - High-level APIs validate and return [`Result`]: [`Trainer::fit`],
//!   [`Trainer::validate`], [`infer::predict_proba`], the loss functions and
//!   the data loaders.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`, labels are `usize`.
//! - [`Dataset`] stores samples contiguously in row-major layout.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//! - Batched inputs/outputs are flat row-major buffers:
//!   - inputs: `(batch, input_dim)`
//!   - log-probabilities: `(batch, num_classes)`
//!
//! # Quick start
//!
//! ```rust
//! use fashion_mlp::synthetic::{self, SyntheticConfig};
//! use fashion_mlp::{ClassifierBuilder, TrainConfig, Trainer};
//!
//! # fn main() -> fashion_mlp::Result<()> {
//! let (train, test) = synthetic::train_test(
//!     &SyntheticConfig { samples: 64, input_dim: 8, num_classes: 3, ..Default::default() },
//!     32,
//! )?;
//!
//! let mut model = ClassifierBuilder::new(8)?
//!     .hidden(16)?
//!     .dropout(0.2)?
//!     .build_with_seed(3, 0)?;
//!
//! let cfg = TrainConfig { epochs: 2, batch_size: 16, ..TrainConfig::default() };
//! let mut trainer = Trainer::new(&model, cfg)?;
//! let history = trainer.fit(&mut model, &train, &test)?;
//! assert_eq!(history.epochs.len(), 2);
//!
//! let probs = fashion_mlp::infer::predict_proba(&model, test.input(0))?;
//! assert_eq!(probs.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod config;
pub mod data;
pub mod dropout;
pub mod error;
pub mod idx;
pub mod infer;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod metrics;
pub mod mode;
pub mod model;
pub mod optim;
pub mod synthetic;
pub mod train;

pub use activation::Activation;
pub use builder::ClassifierBuilder;
pub use config::{ExperimentConfig, ModelConfig, TrainConfig};
pub use data::{Batches, Dataset};
pub use dropout::Dropout;
pub use error::{Error, Result};
pub use infer::{FASHION_MNIST_LABELS, Prediction, TextView, View};
pub use layer::{Init, Layer};
pub use metrics::MetricAccumulator;
pub use mode::{GradMode, Mode};
pub use model::{Classifier, EvalGuard, Gradients, Scratch};
pub use optim::{Optimizer, OptimizerState};
pub use train::{EpochReport, History, Trainer, Validation};
