//! Single-sample inference and display.

use std::io::Write;

use crate::metrics::argmax;
use crate::{Classifier, Error, Result};

/// Fashion-MNIST class names, in label order.
pub const FASHION_MNIST_LABELS: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle Boot",
];

/// Class probabilities for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub probabilities: Vec<f32>,
    /// Arg-max class (first index on ties).
    pub class: usize,
}

impl Prediction {
    /// Name of the predicted class, if `labels` covers it.
    pub fn label<'a>(&self, labels: &[&'a str]) -> Option<&'a str> {
        labels.get(self.class).copied()
    }
}

/// Probability distribution over classes for one flattened image.
///
/// Runs with eval semantics and no gradient tracking regardless of the model's
/// stored mode, so repeated calls on the same input are bit-identical.
pub fn predict_proba(model: &Classifier, image: &[f32]) -> Result<Vec<f32>> {
    if image.len() != model.input_dim() {
        return Err(Error::InvalidShape(format!(
            "image len {} does not match model input_dim {}",
            image.len(),
            model.input_dim()
        )));
    }

    let mut scratch = model.scratch(1);
    let log_probs = model.forward_eval(image, &mut scratch);
    Ok(log_probs.iter().map(|lp| lp.exp()).collect())
}

pub fn predict(model: &Classifier, image: &[f32]) -> Result<Prediction> {
    let probabilities = predict_proba(model, image)?;
    let class = argmax(&probabilities);
    Ok(Prediction {
        probabilities,
        class,
    })
}

/// Display collaborator for one classified image.
pub trait View {
    fn show(&mut self, image: &[f32], probabilities: &[f32], labels: &[&str]) -> Result<()>;
}

/// Renders the image as ASCII shading and the probabilities as a bar chart.
#[derive(Debug)]
pub struct TextView<W> {
    out: W,
    width: usize,
    bar_width: usize,
}

impl<W: Write> TextView<W> {
    /// `width` is the image row length (28 for MNIST-format images).
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width: width.max(1),
            bar_width: 40,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

const SHADES: &[u8] = b" .:-=+*#%@";

impl<W: Write> View for TextView<W> {
    fn show(&mut self, image: &[f32], probabilities: &[f32], labels: &[&str]) -> Result<()> {
        if labels.len() != probabilities.len() {
            return Err(Error::InvalidShape(format!(
                "{} labels for {} probabilities",
                labels.len(),
                probabilities.len()
            )));
        }

        // Pixels are normalized to [-1, 1].
        for row in image.chunks(self.width) {
            let line: String = row
                .iter()
                .map(|&v| {
                    let t = ((v + 1.0) / 2.0).clamp(0.0, 1.0);
                    let idx = (t * (SHADES.len() - 1) as f32).round() as usize;
                    SHADES[idx] as char
                })
                .collect();
            writeln!(self.out, "{line}")?;
        }
        writeln!(self.out)?;

        let name_width = labels.iter().map(|l| l.len()).max().unwrap_or(0);
        for (&label, &p) in labels.iter().zip(probabilities) {
            let filled = (p.clamp(0.0, 1.0) * self.bar_width as f32).round() as usize;
            writeln!(
                self.out,
                "{label:>name_width$} | {}{} {:.3}",
                "#".repeat(filled),
                " ".repeat(self.bar_width - filled),
                p
            )?;
        }
        Ok(())
    }
}
