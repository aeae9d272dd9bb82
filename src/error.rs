//! Error type shared by the data writer and the image writer.

use std::collections::TryReserveError;
use std::io;
use std::sync::Arc;

/// Errors raised while producing an image.
///
/// The data writer keeps the first error it sees as a sticky status and hands a clone of it to
/// every later caller, so every variant is cheap to clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The compressor rejected or failed on a payload
    #[error("compression failed: {0}")]
    Compression(String),
    /// Appending to the output failed
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
    /// A block buffer could not be allocated
    #[error("allocation failed: {0}")]
    Allocation(String),
    /// A sequence id the writer waits for never arrived
    #[error("internal error: expected block {expected}, found {found}")]
    OutOfOrder { expected: u64, found: u64 },
    /// Rejected writer configuration
    #[error("invalid configuration: {0}")]
    Config(String),
    /// API called in the wrong state
    #[error("{0}")]
    Usage(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Self::Allocation(e.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => match Arc::try_unwrap(inner) {
                Ok(inner) => inner,
                Err(inner) => io::Error::new(inner.kind(), inner.to_string()),
            },
            Error::Config(_) | Error::Usage(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            _ => io::Error::new(io::ErrorKind::Other, e),
        }
    }
}
