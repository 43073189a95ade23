//! Seeded synthetic classification data.
//!
//! Each class is a blob of points scattered uniformly around its own random
//! center. Useful for reproducible runs without downloading a dataset.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Dataset, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticConfig {
    pub samples: usize,
    pub input_dim: usize,
    pub num_classes: usize,
    /// Half-width of the uniform noise around each class center.
    pub spread: f32,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            samples: 1024,
            input_dim: 784,
            num_classes: 10,
            spread: 0.5,
            seed: 0,
        }
    }
}

/// Generate `cfg.samples` points, labels cycling through the classes.
pub fn blobs(cfg: &SyntheticConfig) -> Result<Dataset> {
    if cfg.input_dim == 0 || cfg.num_classes < 2 {
        return Err(Error::InvalidConfig(format!(
            "synthetic data needs input_dim > 0 and num_classes >= 2, got {} and {}",
            cfg.input_dim, cfg.num_classes
        )));
    }
    if !(cfg.spread.is_finite() && cfg.spread >= 0.0) {
        return Err(Error::InvalidConfig(format!(
            "spread must be finite and >= 0, got {}",
            cfg.spread
        )));
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let centers: Vec<Vec<f32>> = (0..cfg.num_classes)
        .map(|_| {
            (0..cfg.input_dim)
                .map(|_| rng.gen_range(-1.0..=1.0))
                .collect()
        })
        .collect();

    let mut inputs = Vec::with_capacity(cfg.samples * cfg.input_dim);
    let mut labels = Vec::with_capacity(cfg.samples);
    for i in 0..cfg.samples {
        let class = i % cfg.num_classes;
        for &c in &centers[class] {
            let noise = if cfg.spread > 0.0 {
                rng.gen_range(-cfg.spread..=cfg.spread)
            } else {
                0.0
            };
            inputs.push(c + noise);
        }
        labels.push(class);
    }

    Dataset::from_flat(inputs, labels, cfg.input_dim, cfg.num_classes)
}

/// Generate a train split of `cfg.samples` rows and a test split of `test_samples`
/// rows drawn around the same class centers.
pub fn train_test(cfg: &SyntheticConfig, test_samples: usize) -> Result<(Dataset, Dataset)> {
    let all = blobs(&SyntheticConfig {
        samples: cfg.samples + test_samples,
        ..*cfg
    })?;
    let split = |range: std::ops::Range<usize>| {
        let inputs = range
            .clone()
            .flat_map(|i| all.input(i).iter().copied())
            .collect();
        Dataset::from_flat(
            inputs,
            all.labels()[range].to_vec(),
            cfg.input_dim,
            cfg.num_classes,
        )
    };
    Ok((split(0..cfg.samples)?, split(cfg.samples..all.len())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_data() {
        let cfg = SyntheticConfig {
            samples: 20,
            input_dim: 3,
            num_classes: 4,
            ..SyntheticConfig::default()
        };
        let a = blobs(&cfg).unwrap();
        let b = blobs(&cfg).unwrap();
        for i in 0..a.len() {
            assert_eq!(a.input(i), b.input(i));
        }
        assert_eq!(a.labels()[..5], [0, 1, 2, 3, 0]);
    }

    #[test]
    fn train_and_test_splits_do_not_share_samples() {
        let cfg = SyntheticConfig {
            samples: 12,
            input_dim: 5,
            num_classes: 3,
            ..SyntheticConfig::default()
        };
        let (train, test) = train_test(&cfg, 6).unwrap();
        assert_eq!(train.len(), 12);
        assert_eq!(test.len(), 6);
        for i in 0..test.len() {
            for j in 0..train.len() {
                assert_ne!(test.input(i), train.input(j));
            }
        }
    }

    #[test]
    fn rejects_degenerate_configs() {
        let cfg = SyntheticConfig {
            num_classes: 1,
            ..SyntheticConfig::default()
        };
        assert!(blobs(&cfg).is_err());
        let cfg = SyntheticConfig {
            spread: -1.0,
            ..SyntheticConfig::default()
        };
        assert!(blobs(&cfg).is_err());
    }
}
