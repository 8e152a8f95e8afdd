use bytes::Buf;

use super::{BytesWrite, ChunkingReader, ChunkingWriter, ColumnBuf, ReadError, ReadState, Step, WriteError, WriteState};
use crate::{
    Result,
    column::FieldDescription,
    ext::{MAX_VALUE_LEN, UsizeExt},
    length_cache::LengthCache,
    param::ParameterSettings,
    postgres::PgFormat,
    value::Value,
};

/// `jsonb` binary format version.
const JSONB_VERSION: u8 = 1;

/// `json` and `jsonb` using [`serde_json`].
///
/// Writing accept [`Value::Json`], or [`Value::Text`] which is sent as is.
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec {
    jsonb: bool,
}

impl JsonCodec {
    /// `json`, textual json.
    pub const fn json() -> JsonCodec {
        Self { jsonb: false }
    }

    /// `jsonb`, binary format is prefixed with a version byte.
    pub const fn jsonb() -> JsonCodec {
        Self { jsonb: true }
    }

    fn pg_name(&self) -> &'static str {
        match self.jsonb {
            true => "jsonb",
            false => "json",
        }
    }

    fn render(&self, value: &Value) -> Result<Vec<u8>, WriteError> {
        let mut bytes = Vec::new();
        if self.jsonb {
            bytes.push(JSONB_VERSION);
        }
        match value {
            Value::Json(json) => serde_json::to_writer(&mut bytes, json).map_err(WriteError::Json)?,
            Value::Text(text) => bytes.extend_from_slice(text.as_bytes()),
            value => return Err(WriteError::mismatch(self.pg_name(), value)),
        }
        Ok(bytes)
    }
}

impl ChunkingReader for JsonCodec {
    fn prepare(&self, len: usize, field: Option<&FieldDescription>) -> Box<dyn ReadState> {
        let binary = !matches!(field.map(FieldDescription::format), Some(PgFormat::Text));
        Box::new(JsonRead {
            bytes: Vec::with_capacity(len.min(super::text::PREALLOC_LIMIT)),
            versioned: self.jsonb && binary,
        })
    }
}

struct JsonRead {
    bytes: Vec<u8>,
    versioned: bool,
}

impl ReadState for JsonRead {
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

        let mut json = &self.bytes[..];
        if self.versioned {
            match json.split_first() {
                Some((&JSONB_VERSION, rest)) => json = rest,
                _ => return Err(ReadError::value("unsupported `jsonb` version")),
            }
        }
        match serde_json::from_slice(json) {
            Ok(json) => Ok(Step::Done(Value::Json(json))),
            Err(err) => Err(ReadError::value(err)),
        }
    }
}

impl ChunkingWriter for JsonCodec {
    fn validate_and_get_length(
        &self,
        value: &Value,
        cache: &mut LengthCache,
        _: Option<&ParameterSettings>,
    ) -> Result<usize> {
        if cache.is_populated() {
            return Ok(cache.get()? as usize);
        }

        let len = self.render(value)?.len();
        if len > MAX_VALUE_LEN {
            return Err(WriteError::TooLarge(len).into());
        }
        Ok(cache.set(len.to_i32()) as usize)
    }

    fn prepare_write<'v>(
        &self,
        value: &'v Value,
        cache: &mut LengthCache,
        _: Option<&ParameterSettings>,
    ) -> Result<Box<dyn WriteState + 'v>> {
        let estimated = cache.last()? as usize;
        let bytes = self.render(value)?;
        if bytes.len() != estimated {
            return Err(WriteError::LengthMismatch { estimated, written: bytes.len() }.into());
        }
        Ok(Box::new(BytesWrite::new(bytes)))
    }
}
