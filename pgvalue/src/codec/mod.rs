//! Simple and chunking codecs.
//!
//! A handler read a value either with a [`SimpleReader`], when the whole value
//! is small and can be buffered before decoding, or with a [`ChunkingReader`],
//! whose [`ReadState`] consume bytes as they arrive. Writing has the same split
//! with [`SimpleWriter`] and [`ChunkingWriter`].
//!
//! Codecs are shared between sessions, all per value progress lives in the
//! returned [`ReadState`] and [`WriteState`].
use bytes::Buf;
use std::{error::Error as StdError, fmt, sync::Arc};

use crate::{
    Result,
    buffer::DirectWindow,
    column::FieldDescription,
    length_cache::LengthCache,
    param::ParameterSettings,
    value::{Value, ValueKind},
};

pub(crate) mod numeric;
pub(crate) mod text;
pub(crate) mod bytea;
pub(crate) mod datetime;
pub(crate) mod array;
#[cfg(feature = "json")]
pub(crate) mod json;

pub use numeric::{BoolCodec, Float4Codec, Float8Codec, Int2Codec, Int4Codec, Int8Codec, OidCodec};
pub use text::TextCodec;
pub use bytea::ByteaCodec;
pub use datetime::{DateCodec, TimeRepr, TimestampCodec};
pub use array::ArrayCodec;
#[cfg(feature = "json")]
pub use json::JsonCodec;

type Cause = Box<dyn StdError + Send + Sync>;

/// Progress of a chunking read.
#[derive(Debug)]
pub enum Step<T> {
    /// Value complete.
    Done(T),
    /// More bytes are required, partial progress is kept in the state.
    Pending,
}

/// An error returned by readers.
///
/// A recoverable error means that the value bytes were consumed up to the
/// declared column length, only interpreting them failed, and reading can
/// continue on the same connection. Any other error leave the stream in an
/// unknown position.
pub struct ReadError {
    recoverable: bool,
    cause: Cause,
}

impl ReadError {
    /// Interpreting the value failed, but its bytes are wholly consumed.
    pub fn value(cause: impl Into<Cause>) -> ReadError {
        Self { recoverable: true, cause: cause.into() }
    }

    /// The stream position is unknown after this error.
    pub fn stream(cause: impl Into<Cause>) -> ReadError {
        Self { recoverable: false, cause: cause.into() }
    }

    /// Returns `true` if reading can continue on the same connection.
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Returns the underlying cause.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }

    pub(crate) fn into_parts(self) -> (bool, Cause) {
        (self.recoverable, self.cause)
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.cause, f)
    }
}

impl fmt::Debug for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.recoverable {
            true => "recoverable",
            false => "fatal",
        };
        write!(f, "\"{class}: {self}\"")
    }
}

/// Buffered bytes of one column value.
///
/// [`Buf::remaining`] is the number of value bytes currently buffered, which
/// never exceed the bytes left in the column.
pub struct ColumnBuf<'a> {
    inner: &'a mut dyn Buf,
    left: usize,
}

impl<'a> ColumnBuf<'a> {
    /// `left` is the number of bytes of the value not yet consumed.
    pub fn new(inner: &'a mut dyn Buf, left: usize) -> ColumnBuf<'a> {
        Self { inner, left }
    }

    /// Returns the number of value bytes not yet consumed, buffered or not.
    pub fn column_remaining(&self) -> usize {
        self.left
    }

    /// Returns `true` if the whole value is consumed.
    pub fn is_complete(&self) -> bool {
        self.left == 0
    }

    /// Returns a view limited to the next `len` bytes, for nested values.
    pub fn nested(&mut self, len: usize) -> ColumnBuf<'_> {
        let left = len.min(self.left);
        ColumnBuf { inner: self, left }
    }

    /// Discard all buffered bytes of the value, returns `true` if the whole value is consumed.
    pub fn skip_buffered(&mut self) -> bool {
        let n = self.remaining();
        self.advance(n);
        self.is_complete()
    }
}

impl Buf for ColumnBuf<'_> {
    fn remaining(&self) -> usize {
        self.inner.remaining().min(self.left)
    }

    fn chunk(&self) -> &[u8] {
        let chunk = self.inner.chunk();
        &chunk[..chunk.len().min(self.left)]
    }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= self.left, "advance beyond column value");
        self.inner.advance(cnt);
        self.left -= cnt;
    }
}

/// A reader for small values whose wire bytes are entirely buffered.
pub trait SimpleReader: Send + Sync {
    /// Decode the whole value in `bytes`.
    ///
    /// The dispatcher consume `bytes` regardless of the outcome, so any error
    /// returned here can be recoverable.
    fn read(&self, bytes: &[u8], field: Option<&FieldDescription>) -> Result<Value, ReadError>;
}

/// A reader for values of arbitrary length.
pub trait ChunkingReader: Send + Sync {
    /// Create fresh decode state for a value of `len` bytes.
    fn prepare(&self, len: usize, field: Option<&FieldDescription>) -> Box<dyn ReadState>;
}

/// Per value state of a [`ChunkingReader`].
pub trait ReadState: Send {
    /// Make progress using only the buffered bytes.
    ///
    /// Returning a recoverable error is only allowed after the whole value is consumed.
    fn step(&mut self, buf: &mut ColumnBuf<'_>) -> Result<Step<Value>, ReadError>;
}

/// A writer for small values, written in one call.
pub trait SimpleWriter: Send + Sync {
    /// Returns the exact number of bytes [`write`][SimpleWriter::write] will write.
    fn validate_and_get_length(&self, value: &Value) -> Result<usize, WriteError>;

    /// Write the whole value, caller guarantee the window have enough room.
    fn write(&self, value: &Value, window: &mut DirectWindow<'_>) -> Result<(), WriteError>;
}

/// A writer for values of arbitrary length, written across multiple windows.
pub trait ChunkingWriter: Send + Sync {
    /// Returns the exact number of bytes the [`WriteState`] will write.
    ///
    /// During the estimation pass, length may be stored in `cache`. Once the
    /// cache [`is_populated`][LengthCache::is_populated], it must be read back
    /// from `cache` in the same order.
    fn validate_and_get_length(
        &self,
        value: &Value,
        cache: &mut LengthCache,
        settings: Option<&ParameterSettings>,
    ) -> Result<usize>;

    /// Prepare writing value, called right after the second pass
    /// [`validate_and_get_length`][ChunkingWriter::validate_and_get_length].
    fn prepare_write<'v>(
        &self,
        value: &'v Value,
        cache: &mut LengthCache,
        settings: Option<&ParameterSettings>,
    ) -> Result<Box<dyn WriteState + 'v>>;
}

/// Per value state of a [`ChunkingWriter`].
pub trait WriteState: Send {
    /// Fill as much of the window as possible.
    ///
    /// Returns `true` if more output remains. When no more output remains,
    /// the window must be [cleared][DirectWindow::clear].
    fn write(&mut self, window: &mut DirectWindow<'_>) -> bool;
}

/// Read capability of a handler, either simple or chunking, never both.
#[derive(Clone)]
pub enum ReadCodec {
    Simple(Arc<dyn SimpleReader>),
    Chunking(Arc<dyn ChunkingReader>),
}

impl ReadCodec {
    pub fn simple(codec: impl SimpleReader + 'static) -> ReadCodec {
        ReadCodec::Simple(Arc::new(codec))
    }

    pub fn chunking(codec: impl ChunkingReader + 'static) -> ReadCodec {
        ReadCodec::Chunking(Arc::new(codec))
    }
}

impl fmt::Debug for ReadCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(_) => f.write_str("Simple"),
            Self::Chunking(_) => f.write_str("Chunking"),
        }
    }
}

/// Write capability of a handler, either simple or chunking, never both.
#[derive(Clone)]
pub enum WriteCodec {
    Simple(Arc<dyn SimpleWriter>),
    Chunking(Arc<dyn ChunkingWriter>),
}

impl WriteCodec {
    pub fn simple(codec: impl SimpleWriter + 'static) -> WriteCodec {
        WriteCodec::Simple(Arc::new(codec))
    }

    pub fn chunking(codec: impl ChunkingWriter + 'static) -> WriteCodec {
        WriteCodec::Chunking(Arc::new(codec))
    }

    /// Run the estimation pass for a value.
    pub fn validate_and_get_length(
        &self,
        value: &Value,
        cache: &mut LengthCache,
        settings: Option<&ParameterSettings>,
    ) -> Result<usize> {
        match self {
            Self::Simple(codec) => Ok(codec.validate_and_get_length(value)?),
            Self::Chunking(codec) => codec.validate_and_get_length(value, cache, settings),
        }
    }
}

impl fmt::Debug for WriteCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(_) => f.write_str("Simple"),
            Self::Chunking(_) => f.write_str("Chunking"),
        }
    }
}

/// An error when a value cannot be written.
pub enum WriteError {
    /// Value kind is not accepted by the handler.
    Mismatch {
        pg_name: &'static str,
        found: ValueKind,
    },
    /// Integer value does not fit the wire type.
    OutOfRange {
        pg_name: &'static str,
    },
    /// Value length exceed the `i32` length prefix.
    TooLarge(usize),
    /// Handler is read only.
    ReadOnly(&'static str),
    /// Transmit buffer cannot hold a simple value.
    WindowTooSmall {
        required: usize,
        available: usize,
    },
    /// Write pass produced a different number of bytes than estimated.
    LengthMismatch {
        estimated: usize,
        written: usize,
    },
    /// Chunking writer produced nothing into an empty transmit buffer.
    Stalled(&'static str),
    /// Parameter count exceed the `i16` count prefix.
    TooManyParameters(usize),
    /// Failed to serialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::Error),
}

impl WriteError {
    pub(crate) fn mismatch(pg_name: &'static str, value: &Value) -> WriteError {
        WriteError::Mismatch { pg_name, found: value.kind() }
    }
}

impl std::error::Error for WriteError { }

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to write value, ")?;
        match self {
            Self::Mismatch { pg_name, found } => write!(f, "cannot write {found} as `{pg_name}`"),
            Self::OutOfRange { pg_name } => write!(f, "value out of range for `{pg_name}`"),
            Self::TooLarge(len) => write!(f, "value too large: {len} bytes"),
            Self::ReadOnly(pg_name) => write!(f, "`{pg_name}` cannot be written"),
            Self::WindowTooSmall { required, available } => {
                write!(f, "transmit buffer too small, required {required}, available {available}")
            }
            Self::LengthMismatch { estimated, written } => {
                write!(f, "estimated {estimated} bytes, written {written}")
            }
            Self::Stalled(pg_name) => write!(f, "`{pg_name}` writer made no progress"),
            Self::TooManyParameters(count) => write!(f, "too many parameters: {count}"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Debug for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Writer state over bytes rendered ahead of time.
pub(crate) struct BytesWrite<B> {
    bytes: B,
    written: usize,
}

impl<B: AsRef<[u8]>> BytesWrite<B> {
    pub(crate) fn new(bytes: B) -> Self {
        Self { bytes, written: 0 }
    }
}

impl<B: AsRef<[u8]> + Send> WriteState for BytesWrite<B> {
    fn write(&mut self, window: &mut DirectWindow<'_>) -> bool {
        let bytes = self.bytes.as_ref();
        self.written += window.put_partial(&bytes[self.written..]);
        if self.written == bytes.len() {
            window.clear();
            return false;
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn column_buf_limits() {
        let mut inner = Bytes::from_static(b"abcdef");
        let mut col = ColumnBuf::new(&mut inner, 4);
        assert_eq!(col.remaining(), 4);
        assert_eq!(col.chunk(), b"abcd");
        {
            let mut nested = col.nested(2);
            assert_eq!(nested.chunk(), b"ab");
            nested.advance(2);
            assert!(nested.is_complete());
        }
        assert_eq!(col.column_remaining(), 2);
        assert!(col.skip_buffered());
        assert_eq!(&inner[..], b"ef");
    }

    #[test]
    fn bytes_write_clears() {
        let mut state = BytesWrite::new(b"hello".to_vec());
        let mut storage = [0u8; 3];
        let mut window = DirectWindow::new(&mut storage);
        assert!(state.write(&mut window));
        let mut storage = [0u8; 3];
        let mut window = DirectWindow::new(&mut storage);
        assert!(!state.write(&mut window));
        assert!(window.is_cleared());
        assert_eq!(window.as_filled(), b"lo");
    }

    #[test]
    fn recoverable_flag() {
        let err = ReadError::value("bad digit");
        assert!(err.is_recoverable());
        assert!(!ReadError::stream("eof").is_recoverable());
        assert_eq!(err.to_string(), "bad digit");
    }
}
