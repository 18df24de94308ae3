use std::fmt::Display;

/// MahDB errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Invalid data, typically corruption or unexpected on-disk values.
    InvalidData(String),
    /// Invalid user input, typically tuple, pattern, or choice-vector parse errors.
    InvalidInput(String),
    /// An IO error.
    IO(String),
    /// A tuple larger than a page's data area; it cannot be stored anywhere.
    NoSpace,
    /// The named relation does not exist on disk.
    NotFound(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::NoSpace => write!(f, "tuple too large to fit in a page"),
            Error::NotFound(name) => write!(f, "relation {name} does not exist"),
        }
    }
}

/// Constructs an Error::InvalidData for the given format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::error::Error::InvalidData(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidInput(format!($($args)*)).into() };
}

/// A MahDB Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}
