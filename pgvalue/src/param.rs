//! Statement parameters and the two pass write.
//!
//! Writing a parameter block is done in two passes:
//!
//! 1. estimation, every writer validate its value and returns the exact
//!    length it will write, lengths that are costly to compute are stored in
//!    the [`LengthCache`]
//! 2. write, after [`rewind`][LengthCache::rewind], writers read the cached
//!    lengths back in the same order, and fill transmit windows, flushing as
//!    many times as needed
//!
//! The block layout is the one of a `Bind` message parameter section: `i16`
//! count, then for each parameter an `i32` length, `-1` for NULL, followed by
//! the value bytes.
use std::sync::Arc;

use crate::{
    Result,
    buffer::{WriteBuffer, WriteBufferExt},
    codec::{WriteCodec, WriteError},
    common::{span, verbose},
    ext::{MAX_VALUE_LEN, UsizeExt},
    handler::TypeHandler,
    length_cache::LengthCache,
    postgres::Oid,
    registry::{RegistryError, TypeRegistry},
    value::Value,
};

/// Per parameter write hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParameterSettings {
    /// Truncate `text` to this many characters and `bytea` to this many bytes.
    pub size: Option<usize>,
}

impl ParameterSettings {
    /// Settings truncating value to `size`.
    pub const fn size(size: usize) -> ParameterSettings {
        Self { size: Some(size) }
    }
}

/// A value bound to the handler that writes it.
#[derive(Debug)]
pub struct Parameter {
    handler: Arc<TypeHandler>,
    value: Value,
    settings: Option<ParameterSettings>,
}

impl Parameter {
    pub fn handler(&self) -> &Arc<TypeHandler> {
        &self.handler
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn settings(&self) -> Option<&ParameterSettings> {
        self.settings.as_ref()
    }
}

/// Parameter list of a statement.
#[derive(Debug, Default)]
pub struct Parameters {
    params: Vec<Parameter>,
    cache: LengthCache,
    lengths: Vec<Option<usize>>,
}

impl Parameters {
    pub fn new() -> Parameters {
        Self::default()
    }

    /// Bind `value` with an explicit handler.
    pub fn push(&mut self, handler: Arc<TypeHandler>, value: impl Into<Value>) -> &mut Self {
        self.params.push(Parameter { handler, value: value.into(), settings: None });
        self
    }

    /// Bind `value` with an explicit handler and write hints.
    pub fn push_with(
        &mut self,
        handler: Arc<TypeHandler>,
        value: impl Into<Value>,
        settings: ParameterSettings,
    ) -> &mut Self {
        self.params.push(Parameter { handler, value: value.into(), settings: Some(settings) });
        self
    }

    /// Bind `value` with the handler implicitly bound to its kind.
    ///
    /// NULL is bound to the `unknown` type, letting the server infer it.
    pub fn bind(&mut self, registry: &TypeRegistry, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        let handler = match value.is_null() {
            true => registry.unknown(),
            false => registry.for_value(&value),
        };
        let Some(handler) = handler else {
            return Err(RegistryError::Unbound(value.kind()).into());
        };
        Ok(self.push(handler.clone(), value))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    /// Returns parameter type oids, as sent in `Parse` message.
    pub fn oids(&self) -> impl Iterator<Item = Oid> + '_ {
        self.params.iter().map(|e| e.handler.oid())
    }

    /// Returns the cache of the last estimation pass.
    pub fn length_cache(&self) -> &LengthCache {
        &self.cache
    }

    /// Run the estimation pass, returns each parameter length, [`None`] for NULL.
    ///
    /// Value rejected by its writer fails here, before anything is written.
    pub fn validate_and_get_lengths(&mut self) -> Result<&[Option<usize>]> {
        span!("estimate", count = self.params.len());
        self.cache.clear();
        self.lengths.clear();

        for (i, param) in self.params.iter().enumerate() {
            if param.value.is_null() {
                self.lengths.push(None);
                continue;
            }

            let len = estimate(param, &mut self.cache).map_err(|e| e.with_context(context(i)))?;
            self.lengths.push(Some(len));
        }

        Ok(&self.lengths)
    }

    /// Write the parameter block into `out`.
    ///
    /// Written bytes are committed but not flushed, except when the transmit
    /// buffer is full.
    pub async fn write<W: WriteBuffer>(&mut self, out: &mut W) -> Result<()> {
        self.validate_and_get_lengths()?;
        self.write_estimated(out).await
    }

    /// Write pass only, lengths must come from the last
    /// [`validate_and_get_lengths`][Parameters::validate_and_get_lengths].
    pub(crate) async fn write_estimated<W: WriteBuffer>(&mut self, out: &mut W) -> Result<()> {
        self.cache.rewind();

        let Ok(count) = i16::try_from(self.params.len()) else {
            return Err(WriteError::TooManyParameters(self.params.len()).into());
        };
        put_fixed(out, &count.to_be_bytes()).await?;

        let Self { params, cache, lengths } = self;
        for (i, (param, len)) in params.iter().zip(lengths.iter()).enumerate() {
            let Some(len) = *len else {
                put_fixed(out, &(-1i32).to_be_bytes()).await?;
                continue;
            };

            put_fixed(out, &len.to_i32().to_be_bytes()).await?;
            write_value(param, len, cache, out)
                .await
                .map_err(|e| e.with_context(context(i)))?;
        }

        Ok(())
    }
}

fn context(i: usize) -> String {
    let mut n = itoa::Buffer::new();
    format!("parameter ${}", n.format(i + 1))
}

fn writer(param: &Parameter) -> Result<&WriteCodec, WriteError> {
    param.handler.writer().ok_or(WriteError::ReadOnly(param.handler.pg_name()))
}

fn estimate(param: &Parameter, cache: &mut LengthCache) -> Result<usize> {
    let len = writer(param)?.validate_and_get_length(&param.value, cache, param.settings.as_ref())?;
    if len > MAX_VALUE_LEN {
        return Err(WriteError::TooLarge(len).into());
    }
    Ok(len)
}

async fn write_value<W: WriteBuffer>(param: &Parameter, len: usize, cache: &mut LengthCache, out: &mut W) -> Result<()> {
    let pg_name = param.handler.pg_name();
    let settings = param.settings.as_ref();

    match writer(param)? {
        WriteCodec::Simple(codec) => {
            room(out, len).await?;
            let mut window = out.window();
            codec.write(&param.value, &mut window)?;
            let written = window.filled();
            out.commit(written);
            verbose!(pg_name, len, "simple write");
            if written != len {
                return Err(WriteError::LengthMismatch { estimated: len, written }.into());
            }
        }
        WriteCodec::Chunking(codec) => {
            let estimated = codec.validate_and_get_length(&param.value, cache, settings)?;
            if estimated != len {
                return Err(WriteError::LengthMismatch { estimated: len, written: estimated }.into());
            }

            let mut state = codec.prepare_write(&param.value, cache, settings)?;
            let mut written = 0;
            loop {
                let fresh = out.pending() == 0;
                let mut window = out.window();
                let more = state.write(&mut window);
                let n = window.filled();
                out.commit(n);
                written += n;
                verbose!(pg_name, n, more, "chunking write step");

                if !more {
                    break;
                }
                if n == 0 && fresh {
                    return Err(WriteError::Stalled(pg_name).into());
                }
                out.flush().await?;
            }

            if written != len {
                return Err(WriteError::LengthMismatch { estimated: len, written }.into());
            }
        }
    }

    Ok(())
}

/// Flush if the transmit buffer cannot hold `n` more bytes.
async fn room<W: WriteBuffer>(out: &mut W, n: usize) -> Result<()> {
    if out.window().size() >= n {
        return Ok(());
    }
    out.flush().await?;
    let available = out.window().size();
    if available < n {
        return Err(WriteError::WindowTooSmall { required: n, available }.into());
    }
    Ok(())
}

async fn put_fixed<W: WriteBuffer>(out: &mut W, bytes: &[u8]) -> Result<()> {
    room(out, bytes.len()).await?;
    let mut window = out.window();
    window.put_slice(bytes);
    let n = window.filled();
    out.commit(n);
    Ok(())
}
