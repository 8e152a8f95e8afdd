//! The [`Session`], which owns the receive buffer of one connection.
//!
//! Reads on a session are strictly sequential. A fatal error, or a read
//! dropped before completion, leaves the stream in an unknown position, and
//! the session reject all further operation until [`reset`][Session::reset].
use bytes::{Buf, Bytes};
use std::{future::Future, sync::Arc};

use crate::{
    Error, Result,
    buffer::{ReadBuffer, ReadBufferExt, WriteBuffer},
    column::{ColumnCursor, FieldDescription},
    common::verbose,
    error::{BrokenSession, StreamError},
    handler::{ReadValue, TypeHandler},
    param::Parameters,
    registry::TypeRegistry,
    value::{FromValue, Value},
};

/// Value decoding session over a receive buffer.
pub struct Session<B> {
    buf: B,
    registry: Arc<TypeRegistry>,
    broken: bool,
}

impl<B: ReadBuffer> Session<B> {
    pub fn new(buf: B, registry: Arc<TypeRegistry>) -> Session<B> {
        Self { buf, registry, broken: false }
    }

    /// Returns `true` if previous fatal error leaves the stream in unknown position.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buf
    }

    /// Replace the buffer with a fresh one, making the session usable again.
    ///
    /// Returns the previous buffer.
    pub fn reset(&mut self, buf: B) -> B {
        self.broken = false;
        std::mem::replace(&mut self.buf, buf)
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    /// Parse `RowDescription` body, resolving each field handler.
    pub fn describe(&self, body: Bytes) -> Result<Vec<FieldDescription>> {
        let fields = FieldDescription::parse_all(body)?;
        Ok(fields.into_iter().map(|e| e.resolve(&self.registry)).collect())
    }

    /// Read the next `DataRow` column length prefix.
    pub async fn begin_column(&mut self) -> Result<ColumnCursor> {
        let Self { buf, broken, .. } = self;
        let was_broken = *broken;
        let guard = BreakGuard::new(broken);
        if was_broken {
            return guard.finish(Err(BrokenSession.into()));
        }

        guard.finish(column_len(buf).await)
    }

    /// Read column value as `T`, using the field handler.
    ///
    /// Field that is not [resolved][FieldDescription::resolve] is looked up
    /// in the session registry by its type oid.
    pub fn read<'a, T: FromValue + 'a>(
        &'a mut self,
        cursor: &'a mut ColumnCursor,
        field: &'a FieldDescription,
    ) -> impl Future<Output = Result<T>> + 'a {
        let Self { buf, registry, broken } = self;
        let registry: &'a TypeRegistry = registry;
        let read = match handler_of(registry, field) {
            Ok(handler) => Ok(handler.read::<T, B>(buf, cursor, Some(field))),
            Err(err) => {
                cursor.finish();
                Err(err)
            }
        };
        drive(broken, read)
    }

    /// Read column value as `T`, using an explicit handler.
    pub fn read_with<'a, T: FromValue + 'a>(
        &'a mut self,
        handler: &'a TypeHandler,
        cursor: &'a mut ColumnCursor,
        field: Option<&'a FieldDescription>,
    ) -> impl Future<Output = Result<T>> + 'a {
        let Self { buf, broken, .. } = self;
        drive(broken, Ok(handler.read::<T, B>(buf, cursor, field)))
    }

    /// Read the primary representation of column value.
    pub fn read_value<'a>(
        &'a mut self,
        cursor: &'a mut ColumnCursor,
        field: &'a FieldDescription,
    ) -> impl Future<Output = Result<Value>> + 'a {
        let Self { buf, registry, broken } = self;
        let registry: &'a TypeRegistry = registry;
        let read = match handler_of(registry, field) {
            Ok(handler) => Ok(handler.read_value(buf, cursor, Some(field))),
            Err(err) => {
                cursor.finish();
                Err(err)
            }
        };
        drive(broken, read)
    }

    /// Read the secondary representation of column value.
    pub fn read_secondary_value<'a>(
        &'a mut self,
        cursor: &'a mut ColumnCursor,
        field: &'a FieldDescription,
    ) -> impl Future<Output = Result<Value>> + 'a {
        let Self { buf, registry, broken } = self;
        let registry: &'a TypeRegistry = registry;
        let read = match handler_of(registry, field) {
            Ok(handler) => Ok(handler.read_secondary_value(buf, cursor, Some(field))),
            Err(err) => {
                cursor.finish();
                Err(err)
            }
        };
        drive(broken, read)
    }
}

impl<B: ReadBuffer + WriteBuffer> Session<B> {
    /// Write parameter block into the transmit buffer.
    ///
    /// Value rejected during estimation fails without breaking the session,
    /// any later error breaks it, as the block may be partially sent.
    pub async fn write_parameters(&mut self, params: &mut Parameters) -> Result<()> {
        if self.broken {
            return Err(BrokenSession.into());
        }
        params.validate_and_get_lengths()?;

        let Self { buf, broken, .. } = self;
        let mut guard = BreakGuard::new(broken);
        guard.strict = true;
        guard.finish(params.write_estimated(buf).await)
    }
}

async fn column_len<B: ReadBuffer>(buf: &mut B) -> Result<ColumnCursor> {
    buf.ensure(size_of::<i32>()).await?;
    let len = buf.get_i32();
    if len < -1 {
        return Err(StreamError::new("negative column length").into());
    }
    Ok(ColumnCursor::new(len))
}

fn handler_of<'a>(registry: &'a TypeRegistry, field: &'a FieldDescription) -> Result<&'a TypeHandler> {
    let handler = field
        .handler()
        .or_else(|| registry.by_oid(field.type_oid()))
        .or_else(|| registry.unknown());
    match handler {
        Some(handler) => Ok(&**handler),
        None => Err(StreamError::new(format!("no handler for type oid {}", field.type_oid())).into()),
    }
}

fn drive<'a, B, O>(broken: &'a mut bool, read: Result<ReadValue<'a, B, O>>) -> impl Future<Output = Result<O>> + 'a
where
    B: ReadBuffer,
    O: 'a,
{
    let was_broken = *broken;
    let guard = BreakGuard::new(broken);
    async move {
        if was_broken {
            drop(read);
            return guard.finish(Err(BrokenSession.into()));
        }
        let result = match read {
            Ok(read) => read.await,
            Err(err) => Err(err),
        };
        guard.finish(result)
    }
}

/// Marks session broken when dropped before [`finish`][BreakGuard::finish].
struct BreakGuard<'a> {
    broken: &'a mut bool,
    finished: bool,
    /// Any error breaks the session.
    strict: bool,
}

impl<'a> BreakGuard<'a> {
    fn new(broken: &'a mut bool) -> Self {
        Self { broken, finished: false, strict: false }
    }

    fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        self.finished = true;
        if let Err(err) = &result {
            if self.strict || err.is_fatal() {
                self.set_broken(err);
            } else {
                #[cfg(feature = "log")]
                log::debug!("value skipped: {err}");
            }
        }
        result
    }

    fn set_broken(&mut self, _err: &Error) {
        if !*self.broken {
            #[cfg(feature = "log")]
            log::error!("session broken: {_err}");
        }
        *self.broken = true;
    }
}

impl Drop for BreakGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            verbose!("read dropped before completion");
            #[cfg(feature = "log")]
            log::error!("session broken: read dropped before completion");
            *self.broken = true;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        ErrorKind,
        buffer::{MemoryBuffer, WriteBufferExt},
        postgres::{PgFormat, oid},
        value::PgDate,
    };
    use bytes::{BufMut, BytesMut};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn session(buf: MemoryBuffer) -> Session<MemoryBuffer> {
        Session::new(buf, Arc::new(TypeRegistry::builtin()))
    }

    fn field(oid: u32, format: PgFormat) -> FieldDescription {
        FieldDescription::new("col", oid, format)
    }

    #[tokio::test]
    async fn describe_and_read_row() {
        let mut body = BytesMut::new();
        body.put_u16(2);
        for (name, oid) in [("id", oid::INT4), ("name", oid::TEXT)] {
            body.put_slice(name.as_bytes());
            body.put_u8(0);
            body.put_u32(0);
            body.put_i16(0);
            body.put_u32(oid);
            body.put_i16(-1);
            body.put_i32(-1);
            body.put_u16(1);
        }

        let mut row = BytesMut::new();
        row.put_i32(4);
        row.put_i32(9);
        row.put_i32(5);
        row.put_slice(b"hello");

        let mut session = session(MemoryBuffer::chunked(&row, 3));
        let fields = session.describe(body.freeze()).unwrap();
        assert_eq!(fields[1].pg_name(), Some("text"));

        let mut cursor = session.begin_column().await.unwrap();
        let id = session.read::<i32>(&mut cursor, &fields[0]).await.unwrap();
        let mut cursor = session.begin_column().await.unwrap();
        let name = session.read::<String>(&mut cursor, &fields[1]).await.unwrap();
        assert_eq!((id, name.as_str()), (9, "hello"));
        assert!(!session.is_broken());
    }

    #[tokio::test]
    async fn recoverable_error_keeps_session() {
        let field = field(oid::INT8, PgFormat::Text).resolve(&TypeRegistry::builtin());
        let mut session = session(MemoryBuffer::new(b"\0\0\0\x021x\0\0\0\x0242"));

        let mut cursor = session.begin_column().await.unwrap();
        let err = session.read::<i64>(&mut cursor, &field).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(!session.is_broken());

        let mut cursor = session.begin_column().await.unwrap();
        assert_eq!(session.read::<i64>(&mut cursor, &field).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn type_mismatch_keeps_stream_aligned() {
        let field = field(oid::INT4, PgFormat::Binary);
        let mut row = BytesMut::new();
        for value in [7, 9] {
            row.put_i32(4);
            row.put_i32(value);
        }
        let mut session = session(MemoryBuffer::chunked(&row, 3));

        let mut cursor = session.begin_column().await.unwrap();
        let err = session.read::<String>(&mut cursor, &field).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TypeMismatch(_)));
        assert!(!session.is_broken());

        let mut cursor = session.begin_column().await.unwrap();
        assert_eq!(cursor.declared_len(), 4);
        assert_eq!(session.read::<i32>(&mut cursor, &field).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn dropped_read_breaks_session() {
        let field = field(oid::TEXT, PgFormat::Binary);
        let mut session = session(MemoryBuffer::from_fragments([&b"\0\0\0\x08abc"[..]]));

        let mut cursor = session.begin_column().await.unwrap();
        drop(session.read::<String>(&mut cursor, &field));
        assert_eq!(cursor.position(), 8);
        assert!(session.is_broken());

        let err = session.begin_column().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Broken(_)));

        session.reset(MemoryBuffer::new(b"\0\0\0\x02ok"));
        let mut cursor = session.begin_column().await.unwrap();
        assert_eq!(session.read::<String>(&mut cursor, &field).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn eof_breaks_session() {
        let field = field(oid::TEXT, PgFormat::Binary);
        let mut session = session(MemoryBuffer::from_fragments([&b"\0\0\0\x08abc"[..]]));

        let mut cursor = session.begin_column().await.unwrap();
        let err = session.read::<String>(&mut cursor, &field).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(session.is_broken());

        let mut cursor = ColumnCursor::new(1);
        let err = session.read::<String>(&mut cursor, &field).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Broken(_)));
        assert_eq!(cursor.position(), 1);
    }

    #[tokio::test]
    async fn secondary_representation() {
        let field = field(oid::DATE, PgFormat::Binary);
        let mut buf = BytesMut::new();
        buf.put_i32(4);
        buf.put_i32(1);
        buf.put_i32(4);
        buf.put_i32(1);
        let mut session = session(MemoryBuffer::new(buf));

        let mut cursor = session.begin_column().await.unwrap();
        let time = session.read::<SystemTime>(&mut cursor, &field).await.unwrap();
        assert_eq!(time, UNIX_EPOCH + Duration::from_secs(946_684_800 + 86_400));

        let mut cursor = session.begin_column().await.unwrap();
        let value = session.read_secondary_value(&mut cursor, &field).await.unwrap();
        assert_eq!(value, Value::Date(PgDate::from_days(1)));
    }

    #[tokio::test]
    async fn write_parameters() {
        use crate::buffer::SocketBuffer;
        use tokio::io::AsyncReadExt;

        let (client, mut server) = tokio::io::duplex(1024);
        let registry = Arc::new(TypeRegistry::builtin());
        let mut session = Session::new(SocketBuffer::new(client), registry.clone());

        let mut params = Parameters::new();
        params.bind(&registry, true).unwrap();
        params.push(registry.unknown().unwrap().clone(), "read only");
        let err = session.write_parameters(&mut params).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Write(_)));
        assert!(!session.is_broken());

        let mut params = Parameters::new();
        params.bind(&registry, true).unwrap();
        session.write_parameters(&mut params).await.unwrap();
        session.buffer_mut().flush().await.unwrap();

        let mut sent = [0u8; 7];
        server.read_exact(&mut sent).await.unwrap();
        assert_eq!(&sent, b"\0\x01\0\0\0\x01\x01");
    }
}
