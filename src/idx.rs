//! IDX reader for MNIST-format datasets (Fashion-MNIST by default).
//!
//! Expects the uncompressed files in one directory:
//! `train-images-idx3-ubyte`, `train-labels-idx1-ubyte`,
//! `t10k-images-idx3-ubyte`, `t10k-labels-idx1-ubyte`.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::{Dataset, Error, Result};

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// Classes in MNIST-format datasets.
pub const NUM_CLASSES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn prefix(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "t10k",
        }
    }
}

/// Load one split from `dir`, normalizing pixels to `[-1, 1]`.
pub fn load_split(dir: impl AsRef<Path>, split: Split) -> Result<Dataset> {
    let dir = dir.as_ref();
    let images_path = dir.join(format!("{}-images-idx3-ubyte", split.prefix()));
    let labels_path = dir.join(format!("{}-labels-idx1-ubyte", split.prefix()));

    let (inputs, input_dim, count) = parse_images(&fs::read(&images_path)?)?;
    let labels = parse_labels(&fs::read(&labels_path)?)?;
    if labels.len() != count {
        return Err(Error::InvalidData(format!(
            "{} has {count} images but {} has {} labels",
            images_path.display(),
            labels_path.display(),
            labels.len()
        )));
    }

    info!(split = split.prefix(), samples = count, input_dim, "loaded idx split");
    Dataset::from_flat(inputs, labels, input_dim, NUM_CLASSES)
}

/// Normalize a raw pixel with mean 0.5 and std 0.5: `(x/255 - 0.5) / 0.5`.
#[inline]
pub fn normalize_pixel(raw: u8) -> f32 {
    (f32::from(raw) / 255.0 - 0.5) / 0.5
}

/// Parse an IDX3 image file into `(flattened normalized pixels, rows * cols, count)`.
pub fn parse_images(bytes: &[u8]) -> Result<(Vec<f32>, usize, usize)> {
    let mut offset = 0;
    let magic = read_be_u32(bytes, &mut offset)?;
    if magic != IMAGES_MAGIC {
        return Err(Error::InvalidData(format!(
            "bad idx image magic {magic}, expected {IMAGES_MAGIC}"
        )));
    }
    let count = read_be_u32(bytes, &mut offset)? as usize;
    let rows = read_be_u32(bytes, &mut offset)? as usize;
    let cols = read_be_u32(bytes, &mut offset)? as usize;
    let image_size = rows * cols;
    if image_size == 0 {
        return Err(Error::InvalidData(format!(
            "idx images have empty shape {rows}x{cols}"
        )));
    }

    let total = count
        .checked_mul(image_size)
        .ok_or_else(|| Error::InvalidData("idx image count overflow".to_owned()))?;
    let pixels = bytes
        .get(offset..offset + total)
        .ok_or_else(|| Error::InvalidData("idx image file is truncated".to_owned()))?;

    Ok((
        pixels.iter().copied().map(normalize_pixel).collect(),
        image_size,
        count,
    ))
}

/// Parse an IDX1 label file.
pub fn parse_labels(bytes: &[u8]) -> Result<Vec<usize>> {
    let mut offset = 0;
    let magic = read_be_u32(bytes, &mut offset)?;
    if magic != LABELS_MAGIC {
        return Err(Error::InvalidData(format!(
            "bad idx label magic {magic}, expected {LABELS_MAGIC}"
        )));
    }
    let count = read_be_u32(bytes, &mut offset)? as usize;
    let labels = bytes
        .get(offset..offset + count)
        .ok_or_else(|| Error::InvalidData("idx label file is truncated".to_owned()))?;
    Ok(labels.iter().map(|&l| usize::from(l)).collect())
}

fn read_be_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    let chunk: [u8; 4] = bytes
        .get(*offset..*offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::InvalidData("idx header is truncated".to_owned()))?;
    *offset += 4;
    Ok(u32::from_be_bytes(chunk))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_file(count: u32, rows: u32, cols: u32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for v in [IMAGES_MAGIC, count, rows, cols] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(pixels);
        bytes
    }

    fn label_file(labels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
        bytes.extend_from_slice(&(labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn parses_and_normalizes_images() {
        let bytes = image_file(2, 1, 2, &[0, 255, 51, 204]);
        let (pixels, dim, count) = parse_images(&bytes).unwrap();
        assert_eq!((dim, count), (2, 2));
        assert_eq!(pixels[0], -1.0);
        assert_eq!(pixels[1], 1.0);
        assert!((pixels[2] - (-0.6)).abs() < 1e-6);
        assert!((pixels[3] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut bad = image_file(1, 1, 1, &[0]);
        bad[3] = 0;
        assert!(parse_images(&bad).is_err());

        let short = image_file(3, 2, 2, &[0; 5]);
        assert!(parse_images(&short).is_err());

        assert!(parse_labels(&[0, 0]).is_err());
        let mut labels = label_file(&[1, 2, 3]);
        labels.pop();
        assert!(parse_labels(&labels).is_err());
    }

    #[test]
    fn loads_split_from_directory() {
        let dir = std::env::temp_dir().join(format!("fashion-mlp-idx-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("t10k-images-idx3-ubyte"),
            image_file(2, 2, 2, &[0, 10, 20, 30, 40, 50, 60, 70]),
        )
        .unwrap();
        fs::write(dir.join("t10k-labels-idx1-ubyte"), label_file(&[9, 3])).unwrap();

        let data = load_split(&dir, Split::Test).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.input_dim(), 4);
        assert_eq!(data.labels(), &[9, 3]);

        assert!(matches!(load_split(&dir, Split::Train), Err(Error::Io(_))));
        fs::remove_dir_all(&dir).unwrap();
    }
}
