use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Key absent where a caller required it to exist.
    NotFound,
    /// Declared key type disagrees with the table manifest.
    KeyTypeMismatch,
    /// Declared value type disagrees with the table manifest.
    ValueTypeMismatch,
    /// Network, DNS or TLS failure while fetching.
    Transport,
    /// Malformed HTML, JSON or URL.
    Parse,
    /// Underlying storage engine I/O failure.
    Storage,
    /// The lifecycle handle fired.
    Cancelled,
    /// Broken internal invariant.
    Internal,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context)
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, context)
    }

    pub fn cancelled(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Cancelled, context)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Storage,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Storage,
            context: format!("log frame: {}", err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error {
            kind: ErrorKind::Transport,
            context: err.to_string(),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("url: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
