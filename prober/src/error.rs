use std::{fmt, fmt::Formatter, io};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Socket level failure, e.g. a refused connection or a reset while writing
    IO(String),
    /// The peer did not answer before the read timeout expired
    Timeout(String),
    /// The peer behaved differently than the conversation expected
    Protocol(String),
    /// A message could not be decoded or encoded
    Codec(String),
    /// A cryptographic operation failed, e.g. a record did not authenticate
    Crypto(String),
    /// A named entry was read before anything stored it. Always a bug in the conversation.
    Lookup(String),
    /// A node or conversation was assembled in a way that can never work
    Configuration(String),
}

impl Error {
    /// Errors which are the fault of whoever wrote the conversation rather than of the peer.
    ///
    /// The runner never turns these into a failed conversation, they abort the whole batch.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, Error::Lookup(_) | Error::Configuration(_))
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::IO(err) => write!(f, "error in io: {}", err),
            Error::Timeout(err) => write!(f, "timeout while waiting for the peer: {}", err),
            Error::Protocol(err) => write!(f, "unexpected peer behaviour: {}", err),
            Error::Codec(err) => write!(f, "error while coding a message: {}", err),
            Error::Crypto(err) => write!(f, "error in a cryptographic operation: {}", err),
            Error::Lookup(err) => write!(f, "lookup of an undefined entry: {}", err),
            Error::Configuration(err) => write!(f, "misconfigured conversation: {}", err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Error::Timeout(err.to_string()),
            _ => Error::IO(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::IO(err.to_string())
    }
}
