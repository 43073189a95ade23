//! Model builder.
//!
//! `ClassifierBuilder` is the recommended way to define a model. It makes the
//! structure explicit (input size, hidden sizes, dropout, class count) and picks a
//! default initializer per layer:
//!
//! - hidden ReLU layers: He/Kaiming
//! - the logits layer: Xavier/Glorot

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Classifier, Dropout, Error, Init, Layer, ModelConfig, Result};

#[derive(Debug, Clone)]
/// Builder for a `Classifier`.
///
/// Example:
///
/// ```rust
/// use fashion_mlp::ClassifierBuilder;
///
/// # fn main() -> fashion_mlp::Result<()> {
/// let model = ClassifierBuilder::new(784)?
///     .hidden(256)?
///     .hidden(128)?
///     .hidden(64)?
///     .dropout(0.2)?
///     .build_with_seed(10, 0)?;
/// assert_eq!(model.num_classes(), 10);
/// # Ok(())
/// # }
/// ```
pub struct ClassifierBuilder {
    input_dim: usize,
    hidden: Vec<usize>,
    dropout: f32,
    init: Option<Init>,
}

impl ClassifierBuilder {
    /// Start building a classifier that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            hidden: Vec::new(),
            dropout: 0.0,
            init: None,
        })
    }

    /// Builder pre-filled from a model config (input dim, hidden sizes, dropout).
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        cfg.validate()?;
        let mut b = Self::new(cfg.input_dim)?;
        for &size in &cfg.hidden {
            b = b.hidden(size)?;
        }
        b.dropout(cfg.dropout)
    }

    /// Add a hidden ReLU layer with `out_dim` units.
    pub fn hidden(mut self, out_dim: usize) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig(
                "hidden layer size must be > 0".to_owned(),
            ));
        }
        self.hidden.push(out_dim);
        Ok(self)
    }

    /// Dropout probability applied after every hidden layer in train mode.
    pub fn dropout(mut self, p: f32) -> Result<Self> {
        Dropout::new(p)?;
        self.dropout = p;
        Ok(self)
    }

    /// Use `init` for every layer instead of the per-activation default.
    pub fn init(mut self, init: Init) -> Self {
        self.init = Some(init);
        self
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, num_classes: usize, seed: u64) -> Result<Classifier> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(num_classes, &mut rng)
    }

    /// Build using the provided RNG. Adds the logits layer with `num_classes` outputs.
    pub fn build_with_rng<R: Rng + ?Sized>(
        self,
        num_classes: usize,
        rng: &mut R,
    ) -> Result<Classifier> {
        if num_classes < 2 {
            return Err(Error::InvalidConfig(format!(
                "num_classes must be >= 2, got {num_classes}"
            )));
        }

        let mut layers = Vec::with_capacity(self.hidden.len() + 1);
        let mut in_dim = self.input_dim;
        for &out_dim in &self.hidden {
            let init = self.init.unwrap_or(default_init_for(Activation::ReLU));
            layers.push(Layer::new_with_rng(
                in_dim,
                out_dim,
                init,
                Activation::ReLU,
                rng,
            )?);
            in_dim = out_dim;
        }
        let init = self.init.unwrap_or(default_init_for(Activation::Identity));
        layers.push(Layer::new_with_rng(
            in_dim,
            num_classes,
            init,
            Activation::Identity,
            rng,
        )?);

        Classifier::from_layers(layers, Dropout::new(self.dropout)?)
    }
}

#[inline]
fn default_init_for(act: Activation) -> Init {
    match act {
        Activation::Identity => Init::Xavier,
        Activation::ReLU => Init::He,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_dims_and_dropout() {
        assert!(ClassifierBuilder::new(0).is_err());
        assert!(ClassifierBuilder::new(4).unwrap().hidden(0).is_err());
        assert!(ClassifierBuilder::new(4).unwrap().dropout(1.2).is_err());
        assert!(
            ClassifierBuilder::new(4)
                .unwrap()
                .build_with_seed(1, 0)
                .is_err()
        );
    }

    #[test]
    fn default_config_builds_notebook_architecture() {
        let model = ClassifierBuilder::from_config(&ModelConfig::default())
            .unwrap()
            .build_with_seed(10, 0)
            .unwrap();
        let dims: Vec<(usize, usize)> = (0..model.num_layers())
            .map(|i| {
                let l = model.layer(i).unwrap();
                (l.in_dim(), l.out_dim())
            })
            .collect();
        assert_eq!(dims, vec![(784, 256), (256, 128), (128, 64), (64, 10)]);
        assert_eq!(model.dropout().p(), 0.2);
        assert_eq!(
            model.layer(3).unwrap().activation(),
            Activation::Identity
        );
    }

    #[test]
    fn seeded_builds_are_deterministic() {
        let a = ClassifierBuilder::new(3)
            .unwrap()
            .hidden(4)
            .unwrap()
            .build_with_seed(2, 42)
            .unwrap();
        let b = ClassifierBuilder::new(3)
            .unwrap()
            .hidden(4)
            .unwrap()
            .build_with_seed(2, 42)
            .unwrap();
        for i in 0..a.num_layers() {
            assert_eq!(a.layer(i).unwrap().weights(), b.layer(i).unwrap().weights());
        }
    }
}
