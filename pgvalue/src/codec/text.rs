//! Character codecs, `text`, `varchar`, `bpchar`, `name` and `unknown`.
use bytes::Buf;

use super::{BytesWrite, ChunkingReader, ChunkingWriter, ColumnBuf, ReadError, ReadState, Step, WriteError, WriteState};
use crate::{
    Result,
    column::FieldDescription,
    ext::{MAX_VALUE_LEN, UsizeExt},
    length_cache::LengthCache,
    param::ParameterSettings,
    value::Value,
};

/// Upper bound of capacity reserved from a declared length.
pub(crate) const PREALLOC_LIMIT: usize = 16 * 1024;

/// Utf8 text, identical in text and binary format.
#[derive(Debug, Clone, Copy)]
pub struct TextCodec {
    pg_name: &'static str,
}

impl TextCodec {
    pub const fn new(pg_name: &'static str) -> TextCodec {
        Self { pg_name }
    }

    /// Returns the text that will be sent, truncated to `settings.size` characters.
    fn text<'v>(&self, value: &'v Value, settings: Option<&ParameterSettings>) -> Result<&'v str, WriteError> {
        let Value::Text(text) = value else {
            return Err(WriteError::mismatch(self.pg_name, value));
        };
        let Some(size) = settings.and_then(|e| e.size) else {
            return Ok(text);
        };
        match text.char_indices().nth(size) {
            Some((end, _)) => Ok(&text[..end]),
            None => Ok(text),
        }
    }
}

impl ChunkingReader for TextCodec {
    fn prepare(&self, len: usize, _: Option<&FieldDescription>) -> Box<dyn ReadState> {
        Box::new(TextRead { bytes: Vec::with_capacity(len.min(PREALLOC_LIMIT)) })
    }
}

struct TextRead {
    bytes: Vec<u8>,
}

impl ReadState for TextRead {
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

        match String::from_utf8(std::mem::take(&mut self.bytes)) {
            Ok(text) => Ok(Step::Done(Value::Text(text))),
            Err(err) => Err(ReadError::value(err)),
        }
    }
}

impl ChunkingWriter for TextCodec {
    fn validate_and_get_length(
        &self,
        value: &Value,
        cache: &mut LengthCache,
        settings: Option<&ParameterSettings>,
    ) -> Result<usize> {
        if cache.is_populated() {
            return Ok(cache.get()? as usize);
        }

        let len = self.text(value, settings)?.len();
        if len > MAX_VALUE_LEN {
            return Err(WriteError::TooLarge(len).into());
        }
        Ok(cache.set(len.to_i32()) as usize)
    }

    fn prepare_write<'v>(
        &self,
        value: &'v Value,
        cache: &mut LengthCache,
        settings: Option<&ParameterSettings>,
    ) -> Result<Box<dyn WriteState + 'v>> {
        let len = cache.last()? as usize;
        let text = self.text(value, settings)?;
        match text.as_bytes().get(..len) {
            Some(bytes) if bytes.len() == text.len() => Ok(Box::new(BytesWrite::new(bytes))),
            _ => Err(WriteError::LengthMismatch { estimated: len, written: text.len() }.into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::buffer::DirectWindow;
    use bytes::Bytes;

    fn read_fragments(codec: &TextCodec, fragments: &[&[u8]]) -> Result<Value, ReadError> {
        let len = fragments.iter().map(|e| e.len()).sum::<usize>();
        let mut state = codec.prepare(len, None);
        let mut left = len;
        for fragment in fragments {
            let mut inner = Bytes::copy_from_slice(fragment);
            let mut buf = ColumnBuf::new(&mut inner, left);
            let step = state.step(&mut buf)?;
            left = buf.column_remaining();
            if let Step::Done(value) = step {
                return Ok(value);
            }
        }
        panic!("value incomplete");
    }

    #[test]
    fn read_across_fills() {
        let codec = TextCodec::new("text");
        let value = read_fragments(&codec, &[b"Hel", b"lo ", b"Rust"]).unwrap();
        assert_eq!(value, Value::Text("Hello Rust".into()));
        assert_eq!(read_fragments(&codec, &[b""]).unwrap(), Value::Text(String::new()));
    }

    #[test]
    fn invalid_utf8_is_recoverable() {
        let codec = TextCodec::new("text");
        let err = read_fragments(&codec, &[b"ab\xff", b"cd"]).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn two_pass_with_truncation() {
        let codec = TextCodec::new("varchar");
        let value = Value::Text("héllo".into());
        let settings = ParameterSettings::size(2);
        let mut cache = LengthCache::new();

        assert_eq!(codec.validate_and_get_length(&value, &mut cache, Some(&settings)).unwrap(), 3);
        cache.rewind();
        assert_eq!(codec.validate_and_get_length(&value, &mut cache, Some(&settings)).unwrap(), 3);
        let mut state = codec.prepare_write(&value, &mut cache, Some(&settings)).unwrap();

        let mut storage = [0u8; 8];
        let mut window = DirectWindow::new(&mut storage);
        assert!(!state.write(&mut window));
        assert!(window.is_cleared());
        assert_eq!(window.as_filled(), "hé".as_bytes());
    }

    #[test]
    fn reject_non_text() {
        let codec = TextCodec::new("text");
        let err = codec.validate_and_get_length(&Value::Int4(1), &mut LengthCache::new(), None).unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Write(WriteError::Mismatch { .. })));
    }
}
