//! `pgvalue` error types.
use std::{backtrace::Backtrace, error::Error as StdError, fmt, io};

use crate::{
    codec::{ReadError, WriteError},
    column::ProtocolError,
    length_cache::LengthCacheError,
    registry::RegistryError,
    value::{ConvertError, ValueKind},
};

/// A specialized [`Result`] type for `pgvalue` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type Cause = Box<dyn StdError + Send + Sync>;

/// All possible error from `pgvalue` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Returns `true` if the connection byte stream is in unknown state,
    /// and the connection must be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Stream(_) | ErrorKind::Io(_) | ErrorKind::Broken(_))
    }

    /// Returns `true` if a value failed to decode but the connection is still usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::Value(_))
    }

    pub(crate) fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// All possible error kind from `pgvalue` library.
pub enum ErrorKind {
    /// Requested type cannot be read from the column type.
    TypeMismatch(TypeMismatch),
    /// Value failed to decode, its bytes are consumed and the connection is still usable.
    Value(ValueError),
    /// Decoding failed with the stream in unknown position.
    Stream(StreamError),
    /// Session is broken by previous fatal error.
    Broken(BrokenSession),
    Registry(RegistryError),
    LengthCache(LengthCacheError),
    Write(WriteError),
    Protocol(ProtocolError),
    Io(io::Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<TypeMismatch>e => ErrorKind::TypeMismatch(e));
from!(<ValueError>e => ErrorKind::Value(e));
from!(<StreamError>e => ErrorKind::Stream(e));
from!(<BrokenSession>e => ErrorKind::Broken(e));
from!(<RegistryError>e => ErrorKind::Registry(e));
from!(<LengthCacheError>e => ErrorKind::LengthCache(e));
from!(<WriteError>e => ErrorKind::Write(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));

from!(<ConvertError>e => ErrorKind::Value(ValueError::new(e)));
from!(<ReadError>e => match e.into_parts() {
    (true, cause) => ErrorKind::Value(ValueError { cause }),
    (false, cause) => ErrorKind::Stream(StreamError { cause }),
});

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.kind.source()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl StdError for ErrorKind {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Value(e) => Some(&*e.cause),
            Self::Stream(e) => Some(&*e.cause),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch(e) => fmt::Display::fmt(e, f),
            Self::Value(e) => fmt::Display::fmt(e, f),
            Self::Stream(e) => fmt::Display::fmt(e, f),
            Self::Broken(e) => fmt::Display::fmt(e, f),
            Self::Registry(e) => fmt::Display::fmt(e, f),
            Self::LengthCache(e) => fmt::Display::fmt(e, f),
            Self::Write(e) => fmt::Display::fmt(e, f),
            Self::Protocol(e) => fmt::Display::fmt(e, f),
            Self::Io(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Requested type has no codec on the column type handler.
#[derive(Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub pg_name: &'static str,
    pub requested: &'static str,
    pub kind: ValueKind,
}

impl StdError for TypeMismatch { }

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "can't cast database type {} to {}", self.pg_name, self.requested)
    }
}

impl fmt::Debug for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A value failed to decode after its bytes were consumed.
///
/// The cause is always present, and is what should be shown to the user.
pub struct ValueError {
    cause: Cause,
}

impl ValueError {
    pub fn new(cause: impl Into<Cause>) -> ValueError {
        Self { cause: cause.into() }
    }

    /// Returns the underlying cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to decode value, {}", self.cause)
    }
}

/// Decoding failed and the stream position is unknown.
pub struct StreamError {
    cause: Cause,
}

impl StreamError {
    pub fn new(cause: impl Into<Cause>) -> StreamError {
        Self { cause: cause.into() }
    }

    /// Returns the underlying cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection stream corrupted, {}", self.cause)
    }
}

crate::common::unit_error! {
    /// An error when using a session after a fatal error.
    pub struct BrokenSession("session is broken by previous fatal error");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify_read_error() {
        let err = Error::from(ReadError::value("invalid digit"));
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert_eq!(err.kind().source().unwrap().to_string(), "invalid digit");

        let err = Error::from(ReadError::stream("eof"));
        assert!(err.is_fatal());
        assert!(matches!(err.kind(), ErrorKind::Stream(_)));
    }

    #[test]
    fn context_prefix() {
        let err = Error::from(BrokenSession).with_context("column `id`");
        assert!(err.to_string().starts_with("column `id`: session is broken"));
    }
}
