use std::path::PathBuf;
use thiserror::Error;

/// Broad classification of an [`OmzError`].
///
/// `NotFound` is the only recoverable class: the collector records it as an
/// omission in its result instead of returning it. Everything else aborts the
/// enclosing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    IoFailure,
}

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum OmzError {
    #[error("No data found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Unknown basin '{0}'. Expected one of Pacific, Atlantic, Indian, Global")]
    UnknownBasin(String),
    #[error("Expected an annual time series with {min} to {max} time steps, got {len}")]
    SeriesLength { len: usize, min: usize, max: usize },
    #[error("Malformed reference date '{0}'")]
    MalformedDate(String),
    #[error("Dimension '{dim}' not found in {context}")]
    DimensionMismatch { dim: String, context: String },
    #[error("Variable '{0}' not found in dataset")]
    MissingVariable(String),
    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read dataset {}: {message}", path.display())]
    Read { path: PathBuf, message: String },
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl OmzError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OmzError::NotFound(_) => ErrorKind::NotFound,
            OmzError::Io { .. } | OmzError::Read { .. } => ErrorKind::IoFailure,
            _ => ErrorKind::Invalid,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OmzError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience type for `Result<T, OmzError>`.
pub type OmzResult<T> = Result<T, OmzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(OmzError::NotFound("CanESM5".to_string()).is_recoverable());
        assert_eq!(
            OmzError::UnknownBasin("Arctic".to_string()).kind(),
            ErrorKind::Invalid
        );
        let err = OmzError::io(
            "/data/missing.nc",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn messages() {
        let err = OmzError::SeriesLength {
            len: 50,
            min: 96,
            max: 299,
        };
        assert_eq!(
            err.to_string(),
            "Expected an annual time series with 96 to 299 time steps, got 50"
        );
    }
}
