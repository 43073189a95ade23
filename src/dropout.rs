//! Inverted dropout.
//!
//! In training, each unit is zeroed independently with probability `p` and the
//! survivors are scaled by `1 / (1 - p)` so the expected activation is unchanged.
//! In evaluation the step is the identity.

use rand::Rng;

use crate::{Error, Mode, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    /// Returns an error unless `p` is finite and in `[0, 1]`.
    pub fn new(p: f32) -> Result<Self> {
        if !(p.is_finite() && (0.0..=1.0).contains(&p)) {
            return Err(Error::InvalidConfig(format!(
                "dropout probability must be finite and in [0, 1], got {p}"
            )));
        }
        Ok(Self { p })
    }

    #[inline]
    pub fn p(&self) -> f32 {
        self.p
    }

    /// Whether `forward` would touch `values` in `mode`.
    #[inline]
    pub fn is_active(&self, mode: Mode) -> bool {
        mode == Mode::Train && self.p > 0.0
    }

    /// Survivor scale `1 / (1 - p)`; zero when every unit is dropped.
    #[inline]
    fn keep_scale(&self) -> f32 {
        if self.p >= 1.0 {
            0.0
        } else {
            1.0 / (1.0 - self.p)
        }
    }

    /// Apply dropout to `values` in place.
    ///
    /// When `mask` is provided it receives the per-unit multiplier that was applied
    /// (`0` or `1 / (1 - p)`, or `1` everywhere when dropout is inactive), which is
    /// exactly the local gradient needed by backprop.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        mode: Mode,
        values: &mut [f32],
        mut mask: Option<&mut [f32]>,
        rng: &mut R,
    ) {
        if let Some(m) = mask.as_deref() {
            assert_eq!(
                m.len(),
                values.len(),
                "dropout mask len {} does not match values len {}",
                m.len(),
                values.len()
            );
        }

        if !self.is_active(mode) {
            if let Some(m) = mask.as_deref_mut() {
                m.fill(1.0);
            }
            return;
        }

        let scale = self.keep_scale();
        for (i, v) in values.iter_mut().enumerate() {
            // `gen::<f32>()` is in [0, 1), so p == 1 always drops.
            let keep = rng.r#gen::<f32>() >= self.p;
            let factor = if keep { scale } else { 0.0 };
            *v *= factor;
            if let Some(m) = mask.as_deref_mut() {
                m[i] = factor;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rejects_probabilities_outside_unit_interval() {
        assert!(Dropout::new(-0.1).is_err());
        assert!(Dropout::new(1.5).is_err());
        assert!(Dropout::new(f32::NAN).is_err());
        assert!(Dropout::new(0.0).is_ok());
        assert!(Dropout::new(1.0).is_ok());
    }

    #[test]
    fn eval_mode_is_identity() {
        let dropout = Dropout::new(0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let input = [1.0_f32, -2.0, 3.5, 0.0];
        let mut values = input;
        let mut mask = [0.0_f32; 4];
        dropout.forward(Mode::Eval, &mut values, Some(&mut mask), &mut rng);
        assert_eq!(values, input);
        assert_eq!(mask, [1.0; 4]);
    }

    #[test]
    fn zero_probability_is_identity_in_train_mode() {
        let dropout = Dropout::new(0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let input = [0.25_f32, -1.0, 4.0];
        let mut values = input;
        dropout.forward(Mode::Train, &mut values, None, &mut rng);
        assert_eq!(values, input);
    }

    #[test]
    fn probability_one_zeros_everything_in_train_mode() {
        let dropout = Dropout::new(1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut values = [1.0_f32; 32];
        let mut mask = [1.0_f32; 32];
        dropout.forward(Mode::Train, &mut values, Some(&mut mask), &mut rng);
        assert!(values.iter().all(|&v| v == 0.0));
        assert!(mask.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn survivors_are_rescaled() {
        let dropout = Dropout::new(0.2).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut values = [1.0_f32; 1000];
        dropout.forward(Mode::Train, &mut values, None, &mut rng);

        let dropped = values.iter().filter(|&&v| v == 0.0).count();
        assert!(values.iter().all(|&v| v == 0.0 || (v - 1.25).abs() < 1e-6));
        // Loose bound around the expected 200 drops.
        assert!((120..280).contains(&dropped), "dropped={dropped}");
    }
}
