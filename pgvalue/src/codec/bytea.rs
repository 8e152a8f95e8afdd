use bytes::{Buf, Bytes, BytesMut};

use super::{
    BytesWrite, ChunkingReader, ChunkingWriter, ColumnBuf, ReadError, ReadState, Step, WriteError, WriteState,
    numeric::is_text, text::PREALLOC_LIMIT,
};
use crate::{
    Result,
    column::FieldDescription,
    ext::MAX_VALUE_LEN,
    length_cache::LengthCache,
    param::ParameterSettings,
    value::Value,
};

/// `bytea`, binary string.
///
/// Text format value use the `\x` hex encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteaCodec;

impl ByteaCodec {
    /// Returns the bytes that will be sent, truncated to `settings.size` bytes.
    fn bytes<'v>(value: &'v Value, settings: Option<&ParameterSettings>) -> Result<&'v [u8], WriteError> {
        let Value::Bytea(bytes) = value else {
            return Err(WriteError::mismatch("bytea", value));
        };
        let len = settings.and_then(|e| e.size).unwrap_or(bytes.len()).min(bytes.len());
        Ok(&bytes[..len])
    }
}

impl ChunkingReader for ByteaCodec {
    fn prepare(&self, len: usize, field: Option<&FieldDescription>) -> Box<dyn ReadState> {
        Box::new(ByteaRead {
            bytes: BytesMut::with_capacity(len.min(PREALLOC_LIMIT)),
            hex: is_text(field),
        })
    }
}

struct ByteaRead {
    bytes: BytesMut,
    hex: bool,
}

impl ReadState for ByteaRead {
    fn step(&mut self, buf: &mut ColumnBuf<'_>) -> Result<Step<Value>, ReadError> {
        while buf.has_remaining() {
            let chunk = buf.chunk();
            let n = chunk.len();
            self.bytes.extend_from_slice(chunk);
            buf.advance(n);
        }

        if !buf.is_complete() {
            return Ok(Step::Pending);
        }

        let bytes = self.bytes.split().freeze();
        match self.hex {
            true => decode_hex(&bytes).map(|e| Step::Done(Value::Bytea(e))),
            false => Ok(Step::Done(Value::Bytea(bytes))),
        }
    }
}

fn decode_hex(text: &[u8]) -> Result<Bytes, ReadError> {
    let Some(digits) = text.strip_prefix(b"\\x") else {
        return Err(ReadError::value("`bytea` text is not in hex format"));
    };
    hex::decode(digits).map(Bytes::from).map_err(ReadError::value)
}

impl ChunkingWriter for ByteaCodec {
    fn validate_and_get_length(
        &self,
        value: &Value,
        _: &mut LengthCache,
        settings: Option<&ParameterSettings>,
    ) -> Result<usize> {
        let len = Self::bytes(value, settings)?.len();
        if len > MAX_VALUE_LEN {
            return Err(WriteError::TooLarge(len).into());
        }
        Ok(len)
    }

    fn prepare_write<'v>(
        &self,
        value: &'v Value,
        _: &mut LengthCache,
        settings: Option<&ParameterSettings>,
    ) -> Result<Box<dyn WriteState + 'v>> {
        Ok(Box::new(BytesWrite::new(Self::bytes(value, settings)?)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{buffer::DirectWindow, postgres::PgFormat};

    #[test]
    fn read_one_byte_at_a_time() {
        let wire = b"\x00\x01\xfe\xff";
        let mut state = ByteaCodec.prepare(wire.len(), None);
        let mut left = wire.len();
        let mut value = None;
        for b in wire {
            let mut inner = Bytes::copy_from_slice(&[*b]);
            let mut buf = ColumnBuf::new(&mut inner, left);
            if let Step::Done(done) = state.step(&mut buf).unwrap() {
                value = Some(done);
            }
            left = buf.column_remaining();
        }
        assert_eq!(value, Some(Value::Bytea(Bytes::from_static(wire))));
    }

    #[test]
    fn read_hex_text() {
        let field = FieldDescription::new("data", 17, PgFormat::Text);
        let mut inner = Bytes::from_static(b"\\x00fF");
        let mut state = ByteaCodec.prepare(inner.len(), Some(&field));
        let mut buf = ColumnBuf::new(&mut inner, 6);
        let Step::Done(value) = state.step(&mut buf).unwrap() else {
            panic!("value incomplete");
        };
        assert_eq!(value, Value::Bytea(Bytes::from_static(b"\x00\xff")));

        let err = decode_hex(b"\\x0g").unwrap_err();
        assert!(err.is_recoverable());
        assert!(decode_hex(b"\\xabc").is_err());
        assert!(decode_hex(b"00ff").is_err());
    }

    #[test]
    fn write_truncated() {
        let value = Value::Bytea(Bytes::from_static(b"abcdef"));
        let settings = ParameterSettings::size(4);
        let mut cache = LengthCache::new();
        assert_eq!(ByteaCodec.validate_and_get_length(&value, &mut cache, Some(&settings)).unwrap(), 4);
        assert!(cache.is_empty());

        let mut state = ByteaCodec.prepare_write(&value, &mut cache, Some(&settings)).unwrap();
        let mut storage = [0u8; 3];
        let mut window = DirectWindow::new(&mut storage);
        assert!(state.write(&mut window));
        assert_eq!(window.as_filled(), b"abc");
        let mut storage = [0u8; 3];
        let mut window = DirectWindow::new(&mut storage);
        assert!(!state.write(&mut window));
        assert_eq!(window.as_filled(), b"d");
    }
}
