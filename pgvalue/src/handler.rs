//! The [`TypeHandler`] and the [`ReadValue`] dispatcher.
use std::{
    any::type_name,
    fmt,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use crate::{
    Error, Result,
    buffer::ReadBuffer,
    codec::{ColumnBuf, ReadCodec, ReadError, ReadState, SimpleReader, Step, WriteCodec},
    column::{ColumnCursor, FieldDescription},
    common::verbose,
    error::{StreamError, TypeMismatch},
    postgres::Oid,
    registry::TypeTag,
    value::{ConvertError, FromValue, Value, ValueKind},
};

/// Binds a wire type to its codecs.
///
/// Read is either simple or chunking, write is either simple, chunking or
/// absent for read only types. Handlers are immutable and shared between
/// sessions, all per value progress lives in the caller owned state.
pub struct TypeHandler {
    pg_name: &'static str,
    oid: Oid,
    tag: Option<TypeTag>,
    kind: ValueKind,
    read: ReadCodec,
    secondary: Option<Secondary>,
    write: Option<WriteCodec>,
    element: Option<Arc<TypeHandler>>,
}

/// Another decoded representation of the same wire bytes.
#[derive(Debug, Clone)]
pub struct Secondary {
    pub kind: ValueKind,
    pub read: ReadCodec,
}

impl TypeHandler {
    /// Create read only handler, `read` produce values of `kind`.
    pub fn new(pg_name: &'static str, oid: Oid, kind: ValueKind, read: ReadCodec) -> TypeHandler {
        Self {
            pg_name,
            oid,
            tag: None,
            kind,
            read,
            secondary: None,
            write: None,
            element: None,
        }
    }

    /// Create array handler of `element`, `read` produce [`Value::Array`].
    pub fn array(pg_name: &'static str, oid: Oid, element: Arc<TypeHandler>, read: ReadCodec) -> TypeHandler {
        Self {
            element: Some(element),
            ..Self::new(pg_name, oid, ValueKind::Array, read)
        }
    }

    /// Add secondary representation.
    pub fn with_secondary(mut self, kind: ValueKind, read: ReadCodec) -> TypeHandler {
        self.secondary = Some(Secondary { kind, read });
        self
    }

    /// Make the handler writable.
    pub fn with_writer(mut self, write: WriteCodec) -> TypeHandler {
        self.write = Some(write);
        self
    }

    pub(crate) fn set_tag(&mut self, tag: TypeTag) {
        self.tag = Some(tag);
    }

    pub fn pg_name(&self) -> &'static str {
        self.pg_name
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn tag(&self) -> Option<TypeTag> {
        self.tag
    }

    /// Returns the host exposed value kind.
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Returns the provider specific value kind, which is [`kind`][TypeHandler::kind]
    /// if there is no secondary representation.
    pub fn secondary_kind(&self) -> ValueKind {
        self.secondary.as_ref().map_or(self.kind, |e| e.kind)
    }

    pub fn secondary(&self) -> Option<&Secondary> {
        self.secondary.as_ref()
    }

    pub fn read_codec(&self) -> &ReadCodec {
        &self.read
    }

    /// Returns [`None`] for read only type.
    pub fn writer(&self) -> Option<&WriteCodec> {
        self.write.as_ref()
    }

    /// Returns the element handler of array type.
    pub fn element(&self) -> Option<&Arc<TypeHandler>> {
        self.element.as_ref()
    }

    /// Select the read codec producing `kind`.
    pub fn codec_for(&self, kind: ValueKind) -> Option<&ReadCodec> {
        if kind == self.kind {
            return Some(&self.read);
        }
        self.secondary.as_ref().filter(|e| e.kind == kind).map(|e| &e.read)
    }

    /// Read column value as `T`.
    ///
    /// Fails with [`TypeMismatch`] if neither the primary nor the secondary
    /// representation produce [`T::KIND`][FromValue::KIND], or if array
    /// elements are not of [`T::ELEMENT`][FromValue::ELEMENT].
    ///
    /// Whatever the outcome, including dropping the future before completion,
    /// the `cursor` ends at the declared column length.
    pub fn read<'a, T: FromValue, B: ReadBuffer>(
        &'a self,
        buf: &'a mut B,
        cursor: &'a mut ColumnCursor,
        field: Option<&'a FieldDescription>,
    ) -> ReadValue<'a, B, T> {
        let element = match (&self.element, T::ELEMENT) {
            (Some(handler), Some(kind)) => handler.kind == kind,
            _ => true,
        };
        let phase = match self.codec_for(T::KIND) {
            Some(codec) if element => Phase::Start(codec),
            _ => Phase::Mismatch(
                TypeMismatch {
                    pg_name: self.pg_name,
                    requested: type_name::<T>(),
                    kind: T::KIND,
                },
                false,
            ),
        };
        ReadValue::new(self.pg_name, buf, cursor, field, phase, T::from_value)
    }

    /// Read the primary representation.
    pub fn read_value<'a, B: ReadBuffer>(
        &'a self,
        buf: &'a mut B,
        cursor: &'a mut ColumnCursor,
        field: Option<&'a FieldDescription>,
    ) -> ReadValue<'a, B, Value> {
        ReadValue::new(self.pg_name, buf, cursor, field, Phase::Start(&self.read), Ok)
    }

    /// Read the secondary representation, decoding the wire bytes again
    /// with its own codec.
    pub fn read_secondary_value<'a, B: ReadBuffer>(
        &'a self,
        buf: &'a mut B,
        cursor: &'a mut ColumnCursor,
        field: Option<&'a FieldDescription>,
    ) -> ReadValue<'a, B, Value> {
        let codec = self.secondary.as_ref().map_or(&self.read, |e| &e.read);
        ReadValue::new(self.pg_name, buf, cursor, field, Phase::Start(codec), Ok)
    }
}

impl fmt::Debug for TypeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandler")
            .field("pg_name", &self.pg_name)
            .field("oid", &self.oid)
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("read", &self.read)
            .field("secondary", &self.secondary)
            .field("write", &self.write)
            .finish()
    }
}

/// Future returned by [`TypeHandler::read`].
///
/// Dropping this future before completion still move the cursor to the
/// declared column end, though the buffer position is then unknown.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ReadValue<'a, B, O> {
    pg_name: &'static str,
    buf: &'a mut B,
    cursor: &'a mut ColumnCursor,
    field: Option<&'a FieldDescription>,
    phase: Phase<'a>,
    convert: fn(Value) -> Result<O, ConvertError>,
}

enum Phase<'a> {
    /// Discard the column bytes, then fail, `bool` as in [`Phase::Step`].
    Mismatch(TypeMismatch, bool),
    Start(&'a ReadCodec),
    Ensure(&'a dyn SimpleReader),
    /// `bool` is whether a refill is required before the next step.
    Step(Box<dyn ReadState>, bool),
    Complete,
}

impl<'a, B, O> ReadValue<'a, B, O> {
    fn new(
        pg_name: &'static str,
        buf: &'a mut B,
        cursor: &'a mut ColumnCursor,
        field: Option<&'a FieldDescription>,
        phase: Phase<'a>,
        convert: fn(Value) -> Result<O, ConvertError>,
    ) -> Self {
        Self { pg_name, buf, cursor, field, phase, convert }
    }

    fn complete(&mut self, value: Result<Value, ReadError>) -> Poll<Result<O>> {
        self.cursor.finish();
        let value = value.map_err(Error::from)?;
        Poll::Ready((self.convert)(value).map_err(Error::from))
    }

    fn fail(&mut self, err: impl Into<Error>) -> Poll<Result<O>> {
        self.cursor.finish();
        Poll::Ready(Err(err.into()))
    }
}

impl<B, O> Future for ReadValue<'_, B, O>
where
    B: ReadBuffer,
{
    type Output = Result<O>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.get_mut();

        loop {
            match mem::replace(&mut me.phase, Phase::Complete) {
                Phase::Mismatch(err, refill) => {
                    if refill {
                        match me.buf.poll_read_more(cx) {
                            Poll::Ready(Ok(())) => {}
                            Poll::Ready(Err(err)) => return me.fail(err),
                            Poll::Pending => {
                                me.phase = Phase::Mismatch(err, true);
                                return Poll::Pending;
                            }
                        }
                    }

                    let skip = me.buf.remaining().min(me.cursor.remaining());
                    me.buf.advance(skip);
                    me.cursor.advance(skip);
                    verbose!(pg_name = me.pg_name, skip, "mismatched column skipped");

                    match me.cursor.remaining() {
                        0 => return me.fail(err),
                        _ => me.phase = Phase::Mismatch(err, true),
                    }
                }
                Phase::Start(codec) => {
                    if me.cursor.is_null() {
                        verbose!(pg_name = me.pg_name, "null column");
                        return me.complete(Ok(Value::Null));
                    }
                    me.phase = match codec {
                        ReadCodec::Simple(reader) => Phase::Ensure(&**reader),
                        ReadCodec::Chunking(reader) => {
                            Phase::Step(reader.prepare(me.cursor.remaining(), me.field), false)
                        }
                    };
                }
                Phase::Ensure(reader) => {
                    let len = me.cursor.remaining();
                    match me.buf.poll_ensure(cx, len) {
                        Poll::Ready(Ok(())) => {}
                        Poll::Ready(Err(err)) => return me.fail(err),
                        Poll::Pending => {
                            me.phase = Phase::Ensure(reader);
                            return Poll::Pending;
                        }
                    }

                    let chunk = me.buf.chunk();
                    if chunk.len() < len {
                        return me.fail(StreamError::new("receive buffer is not contiguous after ensure"));
                    }

                    verbose!(pg_name = me.pg_name, len, "simple read");
                    let value = reader.read(&chunk[..len], me.field);
                    me.buf.advance(len);
                    return me.complete(value);
                }
                Phase::Step(mut state, refill) => {
                    if refill {
                        match me.buf.poll_read_more(cx) {
                            Poll::Ready(Ok(())) => {}
                            Poll::Ready(Err(err)) => return me.fail(err),
                            Poll::Pending => {
                                me.phase = Phase::Step(state, true);
                                return Poll::Pending;
                            }
                        }
                    }

                    let left = me.cursor.remaining();
                    let mut column = ColumnBuf::new(&mut *me.buf, left);
                    let result = state.step(&mut column);
                    let consumed = left - column.column_remaining();
                    me.cursor.advance(consumed);
                    let complete = me.cursor.remaining() == 0;

                    verbose!(pg_name = me.pg_name, consumed, complete, "chunking step");

                    match result {
                        Ok(Step::Done(value)) if complete => return me.complete(Ok(value)),
                        Ok(Step::Done(_)) => {
                            return me.fail(StreamError::new("reader completed before the declared column end"));
                        }
                        Ok(Step::Pending) if complete => {
                            return me.fail(StreamError::new("reader requested bytes beyond the declared column end"));
                        }
                        Ok(Step::Pending) => me.phase = Phase::Step(state, true),
                        Err(err) if err.is_recoverable() && !complete => {
                            let (_, cause) = err.into_parts();
                            return me.fail(StreamError::new(cause));
                        }
                        Err(err) => return me.complete(Err(err)),
                    }
                }
                Phase::Complete => panic!("`ReadValue` polled after completion"),
            }
        }
    }
}

impl<B, O> Drop for ReadValue<'_, B, O> {
    fn drop(&mut self) {
        self.cursor.finish();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Buf;
    use crate::{
        buffer::MemoryBuffer,
        codec::{Int4Codec, TextCodec},
        error::ErrorKind,
        postgres::oid,
    };

    fn int4() -> TypeHandler {
        TypeHandler::new("int4", oid::INT4, ValueKind::Int4, ReadCodec::simple(Int4Codec))
    }

    fn text() -> TypeHandler {
        TypeHandler::new("text", oid::TEXT, ValueKind::Text, ReadCodec::chunking(TextCodec::new("text")))
    }

    #[tokio::test]
    async fn ensure_before_simple_read() {
        let mut buf = MemoryBuffer::from_fragments([&b"\0\0"[..], &b"\x01\x02"[..]]);
        let mut cursor = ColumnCursor::new(4);
        let value = int4().read::<i32, _>(&mut buf, &mut cursor, None).await.unwrap();
        assert_eq!(value, 258);
        assert_eq!(buf.refills(), 2);
        assert_eq!(cursor.position(), 4);
    }

    #[tokio::test]
    async fn chunking_across_fills() {
        let mut buf = MemoryBuffer::from_fragments([&b"abc"[..], &b"def"[..], &b"ghij"[..], &b"rest"[..]]);
        let mut cursor = ColumnCursor::new(10);
        let value = text().read::<String, _>(&mut buf, &mut cursor, None).await.unwrap();
        assert_eq!(value, "abcdefghij");
        assert_eq!(cursor.position(), 10);
        assert_eq!(buf.unreceived(), 4);
    }

    #[tokio::test]
    async fn one_byte_fills_match_prebuffered() {
        let wire = "ünïcödé value".as_bytes();
        let len = wire.len() as i32;

        let mut buf = MemoryBuffer::new(wire);
        let mut cursor = ColumnCursor::new(len);
        let whole = text().read_value(&mut buf, &mut cursor, None).await.unwrap();

        let mut buf = MemoryBuffer::chunked(wire, 1);
        let mut cursor = ColumnCursor::new(len);
        let trickled = text().read_value(&mut buf, &mut cursor, None).await.unwrap();

        assert_eq!(whole, trickled);
        assert_eq!(buf.refills(), wire.len());
    }

    #[tokio::test]
    async fn recoverable_error_consumes_value() {
        let handler = int4();
        let field = FieldDescription::new("n", oid::INT4, crate::postgres::PgFormat::Text);
        let mut buf = MemoryBuffer::new(b"12x7");
        let mut cursor = ColumnCursor::new(3);

        let err = handler.read::<i32, _>(&mut buf, &mut cursor, Some(&field)).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(cursor.position(), 3);

        let mut cursor = ColumnCursor::new(1);
        let value = handler.read::<i32, _>(&mut buf, &mut cursor, Some(&field)).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn type_mismatch() {
        let mut buf = MemoryBuffer::new(b"\0\0\0\x01");
        let mut cursor = ColumnCursor::new(4);
        let err = int4().read::<String, _>(&mut buf, &mut cursor, None).await.unwrap_err();
        let ErrorKind::TypeMismatch(mismatch) = err.kind() else {
            panic!("expected type mismatch, found {err}");
        };
        assert_eq!(mismatch.pg_name, "int4");
        assert_eq!(mismatch.requested, "alloc::string::String");
        assert!(!err.is_fatal());
        assert_eq!(cursor.position(), 4);
    }

    #[tokio::test]
    async fn type_mismatch_skips_value() {
        let mut buf = MemoryBuffer::from_fragments([&b"\0\0"[..], &b"\0\x07\0\0"[..], &b"\0\x09"[..]]);
        let mut cursor = ColumnCursor::new(4);
        let err = int4().read::<String, _>(&mut buf, &mut cursor, None).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeMismatch(_)));

        let mut cursor = ColumnCursor::new(4);
        let value = int4().read::<i32, _>(&mut buf, &mut cursor, None).await.unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn type_mismatch_eof_is_fatal() {
        let mut buf = MemoryBuffer::from_fragments([&b"\0\0"[..]]);
        let mut cursor = ColumnCursor::new(4);
        let err = int4().read::<String, _>(&mut buf, &mut cursor, None).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(cursor.position(), 4);
    }

    #[tokio::test]
    async fn array_element_mismatch() {
        let array = TypeHandler::array(
            "_int4",
            oid::INT4_ARRAY,
            Arc::new(int4()),
            ReadCodec::chunking(crate::codec::ArrayCodec::new(Arc::new(int4()))),
        );
        let mut buf = MemoryBuffer::new(b"\0\0\0\0\0\0\0\0\0\0\0\x17");
        let mut cursor = ColumnCursor::new(12);
        let err = array.read::<Vec<String>, _>(&mut buf, &mut cursor, None).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeMismatch(_)));
        assert_eq!(buf.remaining(), 0);

        let mut buf = MemoryBuffer::new(b"\0\0\0\0\0\0\0\0\0\0\0\x17");
        let mut cursor = ColumnCursor::new(12);
        let items = array.read::<Vec<i32>, _>(&mut buf, &mut cursor, None).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn null_column() {
        let mut buf = MemoryBuffer::default();
        let mut cursor = ColumnCursor::null();
        let value = int4().read::<Option<i32>, _>(&mut buf, &mut cursor, None).await.unwrap();
        assert_eq!(value, None);

        let err = int4().read::<i32, _>(&mut buf, &mut cursor, None).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn eof_is_fatal() {
        let mut buf = MemoryBuffer::from_fragments([&b"ab"[..]]);
        let mut cursor = ColumnCursor::new(5);
        let err = text().read::<String, _>(&mut buf, &mut cursor, None).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
        assert_eq!(cursor.position(), 5);
    }

    #[test]
    fn dropped_read_finishes_cursor() {
        let handler = text();
        let mut buf = MemoryBuffer::default();
        let mut cursor = ColumnCursor::new(8);
        drop(handler.read::<String, _>(&mut buf, &mut cursor, None));
        assert_eq!(cursor.position(), 8);
    }
}
