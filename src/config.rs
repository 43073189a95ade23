//! Experiment configuration.
//!
//! Every section has defaults matching the reference run (784-256-128-64-10,
//! dropout 0.2, Adam at 0.003, 30 epochs of batch 64) and can be loaded from JSON.
//! Missing fields fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Dropout, Error, Optimizer, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub input_dim: usize,
    pub hidden: Vec<usize>,
    pub num_classes: usize,
    pub dropout: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_dim: 784,
            hidden: vec![256, 128, 64],
            num_classes: 10,
            dropout: 0.2,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        if self.hidden.contains(&0) {
            return Err(Error::InvalidConfig(
                "all hidden sizes must be > 0".to_owned(),
            ));
        }
        if self.num_classes < 2 {
            return Err(Error::InvalidConfig(format!(
                "num_classes must be >= 2, got {}",
                self.num_classes
            )));
        }
        Dropout::new(self.dropout)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f32,
    pub optimizer: Optimizer,
    /// Shuffle the training split at the start of every epoch.
    pub shuffle: bool,
    /// Seeds batch shuffling and dropout masks.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 30,
            batch_size: 64,
            lr: 0.003,
            optimizer: Optimizer::default(),
            shuffle: true,
            seed: 0,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lr must be finite and > 0, got {}",
                self.lr
            )));
        }
        self.optimizer.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub model: ModelConfig,
    pub train: TrainConfig,
    /// Seeds parameter initialization.
    pub init_seed: u64,
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.train.validate()
    }

    /// Parse and validate a config from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json_str(&s)
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
