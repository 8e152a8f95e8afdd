//! Binary array codec.
//!
//! <https://github.com/postgres/postgres/blob/master/src/backend/utils/adt/arrayfuncs.c>
//!
//! ```text
//! i32 ndim
//! i32 has null flag
//! u32 element oid
//! ndim * (i32 dimension size, i32 lower bound)
//! elements * (i32 length or -1 for NULL, bytes)
//! ```
//!
//! Multi dimensional arrays are read flattened in row-major order, and
//! always written as one dimensional array.
use bytes::{Buf, BufMut, BytesMut};
use std::{collections::VecDeque, sync::Arc};

use super::{
    BytesWrite, ChunkingReader, ChunkingWriter, ColumnBuf, ReadCodec, ReadError, ReadState, Step, WriteCodec,
    WriteError, WriteState, numeric::is_text, text::PREALLOC_LIMIT,
};
use crate::{
    Result,
    buffer::DirectWindow,
    column::FieldDescription,
    ext::{MAX_VALUE_LEN, UsizeExt},
    handler::TypeHandler,
    length_cache::LengthCache,
    param::ParameterSettings,
    value::Value,
};

const HEADER_LEN: usize = 3 * size_of::<i32>();
const DIM_LEN: usize = 2 * size_of::<i32>();
const PREFIX_LEN: usize = size_of::<i32>();

/// One dimensional binary array of `element`.
#[derive(Debug, Clone)]
pub struct ArrayCodec {
    element: Arc<TypeHandler>,
}

impl ArrayCodec {
    pub fn new(element: Arc<TypeHandler>) -> ArrayCodec {
        Self { element }
    }

    fn items<'v>(&self, value: &'v Value) -> Result<(&'v [Value], &WriteCodec), WriteError> {
        let writer = self.element.writer().ok_or(WriteError::ReadOnly(self.element.pg_name()))?;
        match value {
            Value::Array(items) => Ok((items, writer)),
            value => Err(WriteError::Mismatch { pg_name: self.element.pg_name(), found: value.kind() }),
        }
    }
}

// ===== Read =====

impl ChunkingReader for ArrayCodec {
    fn prepare(&self, _: usize, field: Option<&FieldDescription>) -> Box<dyn ReadState> {
        let phase = match is_text(field) {
            true => Phase::Skip(Some(ReadError::value("text format array is not supported"))),
            false => Phase::Header,
        };
        Box::new(ArrayRead {
            element: self.element.clone(),
            phase,
            dims: 0,
            elements: 0,
            items: Vec::new(),
        })
    }
}

struct ArrayRead {
    element: Arc<TypeHandler>,
    phase: Phase,
    /// Dimensions left to read.
    dims: usize,
    /// Elements left to read.
    elements: usize,
    items: Vec<Value>,
}

enum Phase {
    Header,
    Dims,
    Prefix,
    Simple(usize),
    Chunking {
        state: Box<dyn ReadState>,
        left: usize,
    },
    /// Value is malformed, consume the rest then return the error.
    Skip(Option<ReadError>),
}

/// Returns `Ok(true)` if `n` bytes are buffered, `Ok(false)` if more bytes are required.
fn need(buf: &ColumnBuf<'_>, n: usize) -> Result<bool, ReadError> {
    if buf.column_remaining() < n {
        return Err(ReadError::value("array is shorter than its header declares"));
    }
    Ok(buf.remaining() >= n)
}

impl ArrayRead {
    fn header(&mut self, buf: &mut ColumnBuf<'_>) -> Result<(), ReadError> {
        let ndim = buf.get_i32();
        let _flags = buf.get_i32();
        let oid = buf.get_u32();

        if oid != self.element.oid() {
            return Err(ReadError::value(format!(
                "array element oid {oid} does not match `{}`",
                self.element.pg_name(),
            )));
        }
        self.dims = usize::try_from(ndim).map_err(|_| ReadError::value("negative array dimension count"))?;
        self.elements = usize::from(self.dims != 0);
        Ok(())
    }

    fn dim(&mut self, buf: &mut ColumnBuf<'_>) -> Result<(), ReadError> {
        let size = buf.get_i32();
        let _lower_bound = buf.get_i32();
        self.dims -= 1;
        self.elements = usize::try_from(size)
            .ok()
            .and_then(|size| self.elements.checked_mul(size))
            .ok_or_else(|| ReadError::value("invalid array dimension size"))?;
        if self.dims == 0 {
            self.items.reserve(self.elements.min(PREALLOC_LIMIT));
        }
        Ok(())
    }

    /// Read element length prefix, returns the next phase.
    fn prefix(&mut self, buf: &mut ColumnBuf<'_>) -> Result<Phase, ReadError> {
        let len = buf.get_i32();
        self.elements -= 1;

        let Ok(len) = usize::try_from(len) else {
            self.items.push(Value::Null);
            return Ok(Phase::Prefix);
        };
        if len > buf.column_remaining() {
            return Err(ReadError::value("array element exceed the array length"));
        }

        Ok(match self.element.read_codec() {
            ReadCodec::Simple(_) => Phase::Simple(len),
            ReadCodec::Chunking(reader) => Phase::Chunking { state: reader.prepare(len, None), left: len },
        })
    }

    fn simple(&mut self, buf: &mut ColumnBuf<'_>, len: usize) -> Result<(), ReadError> {
        let ReadCodec::Simple(reader) = self.element.read_codec() else {
            unreachable!("element codec changed")
        };
        let bytes = buf.copy_to_bytes(len);
        self.items.push(reader.read(&bytes, None)?);
        Ok(())
    }
}

/// Outcome of one phase.
enum Next {
    Continue(Phase),
    Pending(Phase),
}

impl ArrayRead {
    fn advance(&mut self, phase: Phase, buf: &mut ColumnBuf<'_>) -> Result<Next, ReadError> {
        let next = match phase {
            Phase::Header => match need(buf, HEADER_LEN)? {
                true => {
                    self.header(buf)?;
                    Next::Continue(Phase::Dims)
                }
                false => Next::Pending(Phase::Header),
            },
            Phase::Dims if self.dims == 0 => Next::Continue(Phase::Prefix),
            Phase::Dims => match need(buf, DIM_LEN)? {
                true => {
                    self.dim(buf)?;
                    Next::Continue(Phase::Dims)
                }
                false => Next::Pending(Phase::Dims),
            },
            Phase::Prefix if self.elements == 0 => {
                return Err(ReadError::value("array have trailing bytes"));
            }
            Phase::Prefix => match need(buf, PREFIX_LEN)? {
                true => Next::Continue(self.prefix(buf)?),
                false => Next::Pending(Phase::Prefix),
            },
            Phase::Simple(len) => match need(buf, len)? {
                true => {
                    self.simple(buf, len)?;
                    Next::Continue(Phase::Prefix)
                }
                false => Next::Pending(Phase::Simple(len)),
            },
            Phase::Chunking { mut state, left } => {
                let mut nested = buf.nested(left);
                let step = state.step(&mut nested)?;
                let left = nested.column_remaining();
                match step {
                    Step::Done(value) if left == 0 => {
                        self.items.push(value);
                        Next::Continue(Phase::Prefix)
                    }
                    Step::Done(_) => return Err(ReadError::value("array element completed before its end")),
                    Step::Pending if left == 0 => {
                        return Err(ReadError::stream("array element requested bytes beyond its end"));
                    }
                    Step::Pending => Next::Pending(Phase::Chunking { state, left }),
                }
            }
            Phase::Skip(err) => match buf.skip_buffered() {
                true => return Err(err.unwrap_or_else(|| ReadError::value("malformed array"))),
                false => Next::Pending(Phase::Skip(err)),
            },
        };
        Ok(next)
    }
}

impl ReadState for ArrayRead {
    fn step(&mut self, buf: &mut ColumnBuf<'_>) -> Result<Step<Value>, ReadError> {
        loop {
            if matches!(self.phase, Phase::Prefix) && self.elements == 0 && buf.is_complete() {
                return Ok(Step::Done(Value::Array(std::mem::take(&mut self.items))));
            }

            let phase = std::mem::replace(&mut self.phase, Phase::Skip(None));
            let skipping = matches!(phase, Phase::Skip(_));
            match self.advance(phase, buf) {
                Ok(Next::Continue(phase)) => self.phase = phase,
                Ok(Next::Pending(phase)) => {
                    self.phase = phase;
                    return Ok(Step::Pending);
                }
                // element bytes are skipped within the array
                Err(err) if err.is_recoverable() && !skipping => self.phase = Phase::Skip(Some(err)),
                Err(err) => return Err(err),
            }
        }
    }
}

// ===== Write =====

fn header(buf: &mut BytesMut, items: &[Value], element: &TypeHandler) {
    let has_null = items.iter().any(Value::is_null);
    buf.put_i32(i32::from(!items.is_empty()));
    buf.put_i32(has_null.into());
    buf.put_u32(element.oid());
    if !items.is_empty() {
        buf.put_i32(items.len().to_i32());
        buf.put_i32(1);
    }
}

fn header_len(items: &[Value]) -> usize {
    match items.is_empty() {
        true => HEADER_LEN,
        false => HEADER_LEN + DIM_LEN,
    }
}

impl ChunkingWriter for ArrayCodec {
    /// The array length is stored before the length of its elements.
    fn validate_and_get_length(
        &self,
        value: &Value,
        cache: &mut LengthCache,
        _: Option<&ParameterSettings>,
    ) -> Result<usize> {
        if cache.is_populated() {
            return Ok(cache.get()? as usize);
        }

        let (items, writer) = self.items(value)?;
        if items.len() > MAX_VALUE_LEN {
            return Err(WriteError::TooLarge(items.len()).into());
        }

        let slot = cache.reserve();
        let mut len = header_len(items);
        for item in items {
            len += PREFIX_LEN;
            if !item.is_null() {
                len += writer.validate_and_get_length(item, cache, None)?;
            }
            if len > MAX_VALUE_LEN {
                return Err(WriteError::TooLarge(len).into());
            }
        }
        cache.fill(slot, len.to_i32())?;
        Ok(len)
    }

    /// Element lengths are consumed from `cache` as elements are prepared.
    fn prepare_write<'v>(
        &self,
        value: &'v Value,
        cache: &mut LengthCache,
        _: Option<&ParameterSettings>,
    ) -> Result<Box<dyn WriteState + 'v>> {
        let (items, writer) = self.items(value)?;
        let mut parts: VecDeque<Box<dyn WriteState + 'v>> = VecDeque::new();
        let mut pending = BytesMut::with_capacity(header_len(items));
        header(&mut pending, items, &self.element);

        for item in items {
            if item.is_null() {
                pending.put_i32(-1);
                continue;
            }

            let len = writer.validate_and_get_length(item, cache, None)?;
            pending.put_i32(len.to_i32());

            match writer {
                WriteCodec::Simple(writer) => {
                    let start = pending.len();
                    pending.resize(start + len, 0);
                    let mut window = DirectWindow::new(&mut pending[start..]);
                    writer.write(item, &mut window)?;
                    if window.filled() != len {
                        return Err(WriteError::LengthMismatch { estimated: len, written: window.filled() }.into());
                    }
                }
                WriteCodec::Chunking(writer) => {
                    parts.push_back(Box::new(BytesWrite::new(pending.split().freeze())));
                    parts.push_back(writer.prepare_write(item, cache, None)?);
                }
            }
        }

        if !pending.is_empty() {
            parts.push_back(Box::new(BytesWrite::new(pending.freeze())));
        }
        Ok(Box::new(ArrayWrite { parts }))
    }
}

struct ArrayWrite<'v> {
    parts: VecDeque<Box<dyn WriteState + 'v>>,
}

impl WriteState for ArrayWrite<'_> {
    fn write(&mut self, window: &mut DirectWindow<'_>) -> bool {
        while let Some(part) = self.parts.front_mut() {
            let mut nested = window.nested();
            let more = part.write(&mut nested);
            let n = nested.filled();
            window.advance(n);
            if more {
                return true;
            }
            self.parts.pop_front();
        }
        window.clear();
        false
    }
}

/// One dimensional wire array of pre-rendered elements.
#[cfg(test)]
pub(crate) fn wire(oid: u32, elements: &[Option<&[u8]>]) -> bytes::Bytes {
    let mut buf = BytesMut::new();
    buf.put_i32(1);
    buf.put_i32(elements.iter().any(Option::is_none).into());
    buf.put_u32(oid);
    buf.put_i32(elements.len() as i32);
    buf.put_i32(1);
    for element in elements {
        match element {
            Some(bytes) => {
                buf.put_i32(bytes.len() as i32);
                buf.put_slice(bytes);
            }
            None => buf.put_i32(-1),
        }
    }
    buf.freeze()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        codec::{Int4Codec, TextCodec},
        postgres::oid,
        value::ValueKind,
    };

    fn int4() -> Arc<TypeHandler> {
        Arc::new(
            TypeHandler::new("int4", oid::INT4, ValueKind::Int4, ReadCodec::simple(Int4Codec))
                .with_writer(WriteCodec::simple(Int4Codec)),
        )
    }

    fn text() -> Arc<TypeHandler> {
        Arc::new(
            TypeHandler::new("text", oid::TEXT, ValueKind::Text, ReadCodec::chunking(TextCodec::new("text")))
                .with_writer(WriteCodec::chunking(TextCodec::new("text"))),
        )
    }

    /// Feed `wire` in fragments of `size` bytes.
    fn read(codec: &ArrayCodec, wire: &[u8], size: usize) -> Result<Value, ReadError> {
        let mut state = codec.prepare(wire.len(), None);
        let mut inner = BytesMut::new();
        let mut left = wire.len();
        for fragment in wire.chunks(size) {
            inner.extend_from_slice(fragment);
            let mut buf = ColumnBuf::new(&mut inner, left);
            let step = state.step(&mut buf);
            left = buf.column_remaining();
            if let Step::Done(value) = step? {
                assert_eq!(left, 0);
                return Ok(value);
            }
        }
        panic!("value incomplete");
    }

    fn write(codec: &ArrayCodec, value: &Value, window: usize) -> Vec<u8> {
        let mut cache = LengthCache::new();
        let len = codec.validate_and_get_length(value, &mut cache, None).unwrap();
        cache.rewind();
        assert_eq!(codec.validate_and_get_length(value, &mut cache, None).unwrap(), len);
        let mut state = codec.prepare_write(value, &mut cache, None).unwrap();

        let mut output = vec![];
        loop {
            let mut storage = vec![0u8; window];
            let mut window = DirectWindow::new(&mut storage);
            let more = state.write(&mut window);
            output.extend_from_slice(window.as_filled());
            if !more {
                assert!(window.is_cleared());
                break;
            }
        }
        assert_eq!(output.len(), len);
        assert_eq!(cache.position(), cache.len());
        output
    }

    #[test]
    fn read_simple_elements() {
        let codec = ArrayCodec::new(int4());
        let wire = wire(oid::INT4, &[Some(&7i32.to_be_bytes()[..]), None, Some(&(-1i32).to_be_bytes()[..])]);
        let expected = Value::Array(vec![Value::Int4(7), Value::Null, Value::Int4(-1)]);
        assert_eq!(read(&codec, &wire, wire.len()).unwrap(), expected);
        assert_eq!(read(&codec, &wire, 1).unwrap(), expected);
    }

    #[test]
    fn read_chunking_elements() {
        let codec = ArrayCodec::new(text());
        let wire = wire(oid::TEXT, &[Some(&b"hello"[..]), Some(&b""[..]), Some(&b"world"[..])]);
        let expected: Value = vec!["hello", "", "world"].into();
        assert_eq!(read(&codec, &wire, 1).unwrap(), expected);
        assert_eq!(read(&codec, &wire, 7).unwrap(), expected);
    }

    #[test]
    fn empty_array() {
        let codec = ArrayCodec::new(int4());
        let wire = write(&codec, &Value::Array(vec![]), 64);
        assert_eq!(wire.len(), HEADER_LEN);
        assert_eq!(read(&codec, &wire, 1).unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn element_oid_mismatch_consumes_value() {
        let codec = ArrayCodec::new(int4());
        let wire = wire(oid::INT8, &[Some(&7i64.to_be_bytes()[..])]);
        let mut inner = wire.clone();
        let mut state = codec.prepare(wire.len(), None);
        let mut buf = ColumnBuf::new(&mut inner, wire.len());
        let err = state.step(&mut buf).unwrap_err();
        assert!(err.is_recoverable());
        assert!(buf.is_complete());
    }

    #[test]
    fn malformed_element_consumes_value() {
        let codec = ArrayCodec::new(int4());
        let wire = wire(oid::INT4, &[Some(&b"\0\x01"[..]), Some(&7i32.to_be_bytes()[..])]);
        let err = read(&codec, &wire, 3).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn write_nested_lengths_in_order() {
        let codec = ArrayCodec::new(text());
        let value: Value = vec![Some("ab"), None, Some("cde")].into();
        let output = write(&codec, &value, 5);
        assert_eq!(output, wire(oid::TEXT, &[Some(&b"ab"[..]), None, Some(&b"cde"[..])]));

        let mut cache = LengthCache::new();
        codec.validate_and_get_length(&value, &mut cache, None).unwrap();
        cache.rewind();
        assert_eq!(cache.get(), Ok(output.len() as i32));
        assert_eq!(cache.get(), Ok(2));
        assert_eq!(cache.get(), Ok(3));
    }

    #[test]
    fn write_read_simple() {
        let codec = ArrayCodec::new(int4());
        let value: Value = vec![Some(1i32), None, Some(i32::MIN)].into();
        let output = write(&codec, &value, 3);
        assert_eq!(read(&codec, &output, 2).unwrap(), value);
    }
}
