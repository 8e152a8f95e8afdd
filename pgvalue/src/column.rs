//! Column context of a value being read.
//!
//! - [`ColumnCursor`]
//! - [`FieldDescription`]
use bytes::{Buf, Bytes};
use std::{fmt, sync::Arc};

use crate::{
    common::unit_error,
    ext::BytesExt,
    handler::TypeHandler,
    postgres::{Oid, PgFormat},
    registry::TypeRegistry,
};

// <https://www.postgresql.org/docs/current/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-ROWDESCRIPTION>
// table_oid
// attribute_len
// oid
// data_type_size
// type_modifier
// format_code
const SUFFIX: usize = size_of::<u32>()
    + size_of::<i16>()
    + size_of::<u32>()
    + size_of::<i16>()
    + size_of::<i32>()
    + size_of::<u16>();

/// Tracks the bytes consumed within one column value.
///
/// After any read attempt, [`position`][ColumnCursor::position] equals
/// [`len`][ColumnCursor::len].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnCursor {
    declared: i32,
    position: usize,
}

impl ColumnCursor {
    /// Create cursor from a `DataRow` column length, `-1` is NULL.
    pub const fn new(declared: i32) -> ColumnCursor {
        Self { declared, position: 0 }
    }

    /// Create cursor for a NULL value.
    pub const fn null() -> ColumnCursor {
        Self::new(-1)
    }

    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        self.declared < 0
    }

    /// Returns the declared column length as sent by the server.
    pub const fn declared_len(&self) -> i32 {
        self.declared
    }

    /// Returns the value length, NULL value have zero length.
    pub const fn len(&self) -> usize {
        match self.declared {
            ..0 => 0,
            len => len as usize,
        }
    }

    /// Returns `true` if value have no bytes.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of bytes consumed.
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns the number of bytes not yet consumed.
    pub const fn remaining(&self) -> usize {
        self.len() - self.position
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.position = (self.position + n).min(self.len());
    }

    /// Move the cursor to the declared end.
    pub(crate) fn finish(&mut self) {
        self.position = self.len();
    }
}

/// A field in `RowDescription` message.
#[derive(Clone)]
pub struct FieldDescription {
    name: String,
    table_oid: Oid,
    column_attr: i16,
    type_oid: Oid,
    type_size: i16,
    type_modifier: i32,
    format: PgFormat,
    handler: Option<Arc<TypeHandler>>,
}

impl FieldDescription {
    /// Create description of an expression column.
    pub fn new(name: impl Into<String>, type_oid: Oid, format: PgFormat) -> FieldDescription {
        Self {
            name: name.into(),
            table_oid: 0,
            column_attr: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format,
            handler: None,
        }
    }

    /// Parse one field of a `RowDescription` body.
    pub fn parse(body: &mut Bytes) -> Result<FieldDescription, ProtocolError> {
        let name = body.get_nul_string().ok_or(ProtocolError)?;
        if body.remaining() < SUFFIX {
            return Err(ProtocolError);
        }
        let table_oid = body.get_u32();
        let column_attr = body.get_i16();
        let type_oid = body.get_u32();
        let type_size = body.get_i16();
        let type_modifier = body.get_i32();
        let format = PgFormat::from_code(body.get_u16()).ok_or(ProtocolError)?;
        Ok(Self {
            name,
            table_oid,
            column_attr,
            type_oid,
            type_size,
            type_modifier,
            format,
            handler: None,
        })
    }

    /// Parse all fields of a `RowDescription` body, including the leading field count.
    pub fn parse_all(mut body: Bytes) -> Result<Vec<FieldDescription>, ProtocolError> {
        if body.remaining() < size_of::<u16>() {
            return Err(ProtocolError);
        }
        let len = body.get_u16();
        (0..len).map(|_| Self::parse(&mut body)).collect()
    }

    /// Bind the handler of the field type.
    ///
    /// Unregistered type fallback to the `unknown` handler, which read text.
    pub fn resolve(mut self, registry: &TypeRegistry) -> FieldDescription {
        self.handler = registry.by_oid(self.type_oid).or_else(|| registry.unknown()).cloned();
        self
    }

    /// Bind a specific handler.
    pub fn with_handler(mut self, handler: Arc<TypeHandler>) -> FieldDescription {
        self.handler = Some(handler);
        self
    }

    /// Returns field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// If the field can be identified as a column of a specific table, the object ID of the table; otherwise zero.
    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    /// If the field can be identified as a column of a specific table, the attribute number of the column; otherwise zero.
    pub fn column_attr(&self) -> i16 {
        self.column_attr
    }

    pub fn type_oid(&self) -> Oid {
        self.type_oid
    }

    /// Negative values denote variable-width types.
    pub fn type_size(&self) -> i16 {
        self.type_size
    }

    pub fn type_modifier(&self) -> i32 {
        self.type_modifier
    }

    pub fn format(&self) -> PgFormat {
        self.format
    }

    /// Returns the resolved handler.
    pub fn handler(&self) -> Option<&Arc<TypeHandler>> {
        self.handler.as_ref()
    }

    /// Returns the wire type name, from the resolved handler.
    pub fn pg_name(&self) -> Option<&'static str> {
        self.handler.as_ref().map(|e| e.pg_name())
    }
}

impl fmt::Debug for FieldDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescription")
            .field("name", &self.name)
            .field("type_oid", &self.type_oid)
            .field("pg_name", &self.pg_name())
            .field("format", &self.format)
            .finish()
    }
}

unit_error! {
    /// An error when a `RowDescription` field is malformed.
    pub struct ProtocolError("malformed field description");
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn field(name: &str, oid: Oid, format: u16) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_slice(name.as_bytes());
        buf.put_u8(0);
        buf.put_u32(16384);
        buf.put_i16(1);
        buf.put_u32(oid);
        buf.put_i16(4);
        buf.put_i32(-1);
        buf.put_u16(format);
        buf
    }

    #[test]
    fn parse_row_description() {
        let mut body = BytesMut::new();
        body.put_u16(2);
        body.extend_from_slice(&field("id", 23, 1));
        body.extend_from_slice(&field("name", 25, 0));

        let fields = FieldDescription::parse_all(body.freeze()).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name(), "id");
        assert_eq!(fields[0].type_oid(), 23);
        assert_eq!(fields[0].table_oid(), 16384);
        assert_eq!(fields[0].format(), PgFormat::Binary);
        assert_eq!(fields[1].format(), PgFormat::Text);
    }

    #[test]
    fn truncated_field() {
        let mut body = field("id", 23, 1).freeze();
        body.truncate(body.len() - 1);
        assert_eq!(FieldDescription::parse(&mut body).unwrap_err(), ProtocolError);
    }

    #[test]
    fn cursor_null() {
        let mut cursor = ColumnCursor::null();
        assert!(cursor.is_null());
        assert_eq!(cursor.len(), 0);
        cursor.finish();
        assert_eq!(cursor.position(), 0);

        let mut cursor = ColumnCursor::new(10);
        cursor.advance(3);
        assert_eq!(cursor.remaining(), 7);
        cursor.finish();
        assert_eq!(cursor.position(), 10);
    }
}
