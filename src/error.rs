use std::{error::Error, fmt, io};

/// The result type used across the optimizer subsystem.
pub type Result<T> = std::result::Result<T, OptimErr>;

/// Failures while building, stepping or restoring an optimizer.
#[derive(Debug)]
pub enum OptimErr {
    /// The configuration mapping is missing a key or holds an invalid value.
    Configuration(String),
    /// The optimizer class is neither registered nor a built-in algorithm.
    UnknownOptimizer { name: String },
    /// Fp16 gradient compression and the mixed precision rewrite were both requested.
    PrecisionConflict,
    /// A loaded state doesn't fit the layout of the freshly built optimizer.
    ResumeMismatch(String),
    /// A buffer handed to an optimizer or collective has the wrong length.
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A collective operation failed at the transport level.
    Collective(io::Error),
    /// Reading or writing persisted state failed.
    Persistence(io::Error),
    /// Encoding or decoding a serialized state failed.
    Serde(serde_json::Error),
}

impl OptimErr {
    /// Shorthand for a `Configuration` error.
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for a `ResumeMismatch` error.
    pub(crate) fn resume(msg: impl Into<String>) -> Self {
        Self::ResumeMismatch(msg.into())
    }
}

impl fmt::Display for OptimErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "invalid optimizer configuration: {msg}"),
            Self::UnknownOptimizer { name } => write!(
                f,
                "unknown optimizer class {name:?}, it's neither registered nor built-in"
            ),
            Self::PrecisionConflict => f.write_str(
                "fp16 gradient compression and the mixed precision rewrite are mutually exclusive",
            ),
            Self::ResumeMismatch(msg) => write!(f, "incompatible optimizer state: {msg}"),
            Self::SizeMismatch {
                what,
                got,
                expected,
            } => write!(f, "size mismatch for {what}: got {got}, expected {expected}"),
            Self::Collective(e) => write!(f, "collective operation failed: {e}"),
            Self::Persistence(e) => write!(f, "state persistence failed: {e}"),
            Self::Serde(e) => write!(f, "state serialization failed: {e}"),
        }
    }
}

impl Error for OptimErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Collective(e) | Self::Persistence(e) => Some(e),
            Self::Serde(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for OptimErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<OptimErr> for io::Error {
    fn from(value: OptimErr) -> Self {
        match value {
            OptimErr::Collective(e) | OptimErr::Persistence(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
