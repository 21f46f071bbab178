use std::{error::Error, fmt, io};

use machine_learning::MlErr;

/// The collective module's result type.
pub type Result<T> = std::result::Result<T, CollectiveErr>;

/// Failures of the collective layer.
#[derive(Debug)]
pub enum CollectiveErr {
    Io(io::Error),
    Config(String),
    Handshake {
        expected: usize,
        got: usize,
    },
    UnexpectedMessage {
        op: &'static str,
        got: &'static str,
    },
    LengthMismatch {
        op: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidRoot {
        root: usize,
        size: usize,
    },
    Remote(String),
    Optimizer(MlErr),
}

impl fmt::Display for CollectiveErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectiveErr::Io(e) => write!(f, "io error: {e}"),
            CollectiveErr::Config(msg) => write!(f, "invalid world configuration: {msg}"),
            CollectiveErr::Handshake { expected, got } => write!(
                f,
                "ring handshake failed: expected left neighbour {expected}, got {got}"
            ),
            CollectiveErr::UnexpectedMessage { op, got } => {
                write!(f, "unexpected message during {op}: got {got}")
            }
            CollectiveErr::LengthMismatch { op, got, expected } => write!(
                f,
                "length mismatch during {op}: got {got}, expected {expected}"
            ),
            CollectiveErr::InvalidRoot { root, size } => {
                write!(f, "root rank {root} is out of range for a world of size {size}")
            }
            CollectiveErr::Remote(detail) => write!(f, "a peer reported an error: {detail}"),
            CollectiveErr::Optimizer(e) => write!(f, "optimizer error: {e}"),
        }
    }
}

impl Error for CollectiveErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CollectiveErr::Io(e) => Some(e),
            CollectiveErr::Optimizer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CollectiveErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<MlErr> for CollectiveErr {
    fn from(value: MlErr) -> Self {
        Self::Optimizer(value)
    }
}
