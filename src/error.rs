use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("label {label} at sample {sample} is outside [0, {num_classes})")]
    LabelOutOfRange {
        sample: usize,
        label: usize,
        num_classes: usize,
    },
    /// A split with no samples (or no batches) was used where averaging is required.
    #[error("empty split: {0}")]
    EmptySplit(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_out_of_range_message_names_the_bounds() {
        let err = Error::LabelOutOfRange {
            sample: 3,
            label: 12,
            num_classes: 10,
        };
        let msg = format!("{err}");
        assert!(msg.contains("12"));
        assert!(msg.contains("[0, 10)"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
