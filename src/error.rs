//! Errors surfaced to the embedder, and the handler-side error types a
//! host application's handlers may return.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::status::StatusCode;

/// Errors returned synchronously by `Server::start`. Once the accept
/// loop is running, per-connection errors never propagate out of
/// `start()`; they are logged per the event table and handled inline.
#[derive(Debug)]
pub enum Error {
    /// The listening socket could not be created or configured.
    Bind(io::Error),
    /// An invalid configuration value (e.g. a queue capacity of zero).
    Config(String),
    /// An I/O error outside of bind (e.g. setting socket options).
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bind(err) => write!(f, "failed to bind listening socket: {}", err),
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Bind(err) | Error::Io(err) => Some(err),
            Error::Config(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// A handler error carrying a deliberate HTTP status code and an
/// optional message, the Rust expression of "a designated exception
/// type carrying a status code and message".
#[derive(Debug)]
pub struct StatusError {
    pub code: StatusCode,
    pub message: Option<String>,
}

impl StatusError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> StatusError {
        StatusError { code, message: Some(message.into()) }
    }

    pub fn without_message(code: StatusCode) -> StatusError {
        StatusError { code, message: None }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{} {}: {}", self.code.code(), self.code.reason_phrase(), msg),
            None => write!(f, "{} {}", self.code.code(), self.code.reason_phrase()),
        }
    }
}

impl StdError for StatusError {}

/// The error type a handler may return. Handlers that never return
/// `Err` and instead write their own error response directly to the
/// `Response` are equally valid; this type exists for the handlers
/// that prefer to signal failure by returning.
pub type HandlerError = Box<dyn StdError + Send + 'static>;
