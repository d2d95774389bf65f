use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Open, seek or read failure on the underlying handle.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Malformed or truncated compressed stream.
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    /// Offset beyond the known uncompressed size.
    #[error("offset {offset} out of range (size {size})")]
    OutOfRange { offset: u64, size: u64 },
    /// No handle is open or the access index has not been built.
    #[error("reader not ready")]
    NotReady,
}

impl Error {
    /// True for errors caused by the compressed data rather than the handle.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt(_))
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(err) => err,
            Error::Corrupt(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
            err @ Error::OutOfRange { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::NotReady => io::Error::new(io::ErrorKind::NotConnected, Error::NotReady),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
