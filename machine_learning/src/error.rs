use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

use ndarray::ShapeError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    BackwardBeforeForward {
        layer: &'static str,
    },
    InvalidLabel {
        label: usize,
        classes: usize,
    },
    IndexOutOfBounds {
        index: usize,
        len: usize,
    },
    InvalidHyperparameter {
        what: &'static str,
        value: f32,
    },
    InvalidDistribution(String),
    Io {
        path: PathBuf,
        source: io::Error,
    },
    CorruptDataset {
        path: PathBuf,
        reason: String,
    },
    Download {
        url: String,
        reason: String,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid array shape: {e}"),
            MlErr::BackwardBeforeForward { layer } => write!(
                f,
                "Tried to run the backward pass of a {layer} layer without a forward pass"
            ),
            MlErr::InvalidLabel { label, classes } => {
                write!(f, "Label {label} is out of range for {classes} classes")
            }
            MlErr::IndexOutOfBounds { index, len } => {
                write!(f, "Index {index} is out of bounds for a length of {len}")
            }
            MlErr::InvalidHyperparameter { what, value } => {
                write!(f, "Invalid value {value} for {what}")
            }
            MlErr::InvalidDistribution(e) => write!(f, "Invalid distribution: {e}"),
            MlErr::Io { path, source } => {
                write!(f, "Failed to read {}: {source}", path.display())
            }
            MlErr::CorruptDataset { path, reason } => {
                write!(f, "Corrupt dataset file {}: {reason}", path.display())
            }
            MlErr::Download { url, reason } => write!(f, "Failed to download {url}: {reason}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            MlErr::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}
