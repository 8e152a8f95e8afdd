//! Fixed size scalar codecs.
//!
//! All of them are simple codecs, binary format is big endian, text format is
//! the postgres output representation.
use std::{error::Error as StdError, str::FromStr};

use super::{ReadError, SimpleReader, SimpleWriter, WriteError};
use crate::{
    buffer::DirectWindow,
    column::FieldDescription,
    postgres::PgFormat,
    value::Value,
};

/// Returns `true` if the column is sent in text format.
pub(crate) fn is_text(field: Option<&FieldDescription>) -> bool {
    matches!(field.map(FieldDescription::format), Some(PgFormat::Text))
}

/// Binary value with exact length.
fn exact<const N: usize>(bytes: &[u8], pg_name: &'static str) -> Result<[u8; N], ReadError> {
    bytes.try_into().map_err(|_| {
        let mut len = itoa::Buffer::new();
        ReadError::value(format!(
            "invalid `{pg_name}` binary length {}, expected {N}",
            len.format(bytes.len()),
        ))
    })
}

fn parse_text<T>(bytes: &[u8]) -> Result<T, ReadError>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    std::str::from_utf8(bytes)
        .map_err(ReadError::value)?
        .parse()
        .map_err(ReadError::value)
}

/// `bool`
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolCodec;

impl BoolCodec {
    fn encode(value: &Value) -> Result<bool, WriteError> {
        match *value {
            Value::Bool(v) => Ok(v),
            ref value => Err(WriteError::mismatch("bool", value)),
        }
    }
}

impl SimpleReader for BoolCodec {
    fn read(&self, bytes: &[u8], field: Option<&FieldDescription>) -> Result<Value, ReadError> {
        if is_text(field) {
            return match bytes {
                b"t" | b"true" => Ok(Value::Bool(true)),
                b"f" | b"false" => Ok(Value::Bool(false)),
                _ => Err(ReadError::value("invalid `bool` text, expected `t` or `f`")),
            };
        }
        let [b] = exact::<1>(bytes, "bool")?;
        Ok(Value::Bool(b != 0))
    }
}

impl SimpleWriter for BoolCodec {
    fn validate_and_get_length(&self, value: &Value) -> Result<usize, WriteError> {
        Self::encode(value).map(|_| 1)
    }

    fn write(&self, value: &Value, window: &mut DirectWindow<'_>) -> Result<(), WriteError> {
        window.put_u8(Self::encode(value)?.into());
        Ok(())
    }
}

macro_rules! integer {
    ($(#[$meta:meta])* $name:ident, $pg:literal, $ty:ty, $variant:ident, $put:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl $name {
            /// Accept any integer value that fits.
            fn encode(value: &Value) -> Result<$ty, WriteError> {
                let int = value.as_i64().ok_or_else(|| WriteError::mismatch($pg, value))?;
                <$ty>::try_from(int).map_err(|_| WriteError::OutOfRange { pg_name: $pg })
            }
        }

        impl SimpleReader for $name {
            fn read(&self, bytes: &[u8], field: Option<&FieldDescription>) -> Result<Value, ReadError> {
                let int = match is_text(field) {
                    true => parse_text::<$ty>(bytes)?,
                    false => <$ty>::from_be_bytes(exact(bytes, $pg)?),
                };
                Ok(Value::$variant(int))
            }
        }

        impl SimpleWriter for $name {
            fn validate_and_get_length(&self, value: &Value) -> Result<usize, WriteError> {
                Self::encode(value).map(|_| size_of::<$ty>())
            }

            fn write(&self, value: &Value, window: &mut DirectWindow<'_>) -> Result<(), WriteError> {
                window.$put(Self::encode(value)?);
                Ok(())
            }
        }
    };
}

macro_rules! float {
    ($(#[$meta:meta])* $name:ident, $pg:literal, $ty:ty, $variant:ident, $put:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl $name {
            fn encode(value: &Value) -> Result<$ty, WriteError> {
                match *value {
                    Value::Float4(v) => Ok(v as $ty),
                    Value::Float8(v) => Ok(v as $ty),
                    ref value => Err(WriteError::mismatch($pg, value)),
                }
            }
        }

        impl SimpleReader for $name {
            fn read(&self, bytes: &[u8], field: Option<&FieldDescription>) -> Result<Value, ReadError> {
                let float = match is_text(field) {
                    true => parse_text::<$ty>(bytes)?,
                    false => <$ty>::from_be_bytes(exact(bytes, $pg)?),
                };
                Ok(Value::$variant(float))
            }
        }

        impl SimpleWriter for $name {
            fn validate_and_get_length(&self, value: &Value) -> Result<usize, WriteError> {
                Self::encode(value).map(|_| size_of::<$ty>())
            }

            fn write(&self, value: &Value, window: &mut DirectWindow<'_>) -> Result<(), WriteError> {
                window.$put(Self::encode(value)?);
                Ok(())
            }
        }
    };
}

integer!(
    /// `int2`, `smallint`
    Int2Codec, "int2", i16, Int2, put_i16
);
integer!(
    /// `int4`, `integer`
    Int4Codec, "int4", i32, Int4, put_i32
);
integer!(
    /// `int8`, `bigint`
    Int8Codec, "int8", i64, Int8, put_i64
);
integer!(
    /// `oid`, unsigned object identifier
    OidCodec, "oid", u32, Oid, put_u32
);
float!(
    /// `float4`, `real`
    ///
    /// Writing a `float8` value loses precision.
    Float4Codec, "float4", f32, Float4, put_f32
);
float!(
    /// `float8`, `double precision`
    Float8Codec, "float8", f64, Float8, put_f64
);

#[cfg(test)]
mod test {
    use super::*;
    use crate::postgres::oid;

    fn text_field(oid: u32) -> FieldDescription {
        FieldDescription::new("col", oid, PgFormat::Text)
    }

    fn rewrite(codec: &(impl SimpleReader + SimpleWriter), bytes: &[u8]) -> Vec<u8> {
        let value = codec.read(bytes, None).unwrap();
        let len = codec.validate_and_get_length(&value).unwrap();
        let mut storage = vec![0u8; len];
        let mut window = DirectWindow::new(&mut storage);
        codec.write(&value, &mut window).unwrap();
        assert_eq!(window.filled(), len);
        storage
    }

    #[test]
    fn fixed_size_roundtrip() {
        assert_eq!(rewrite(&BoolCodec, b"\x01"), b"\x01");
        assert_eq!(rewrite(&Int2Codec, b"\xff\xfe"), b"\xff\xfe");
        assert_eq!(rewrite(&Int4Codec, b"\x80\0\0\x01"), b"\x80\0\0\x01");
        assert_eq!(rewrite(&Int8Codec, b"\0\0\0\0\0\0\x01\xa4"), b"\0\0\0\0\0\0\x01\xa4");
        assert_eq!(rewrite(&OidCodec, b"\xff\xff\xff\xff"), b"\xff\xff\xff\xff");
        assert_eq!(rewrite(&Float4Codec, b"\x3f\xc0\0\0"), b"\x3f\xc0\0\0");
        assert_eq!(
            rewrite(&Float8Codec, b"\x40\x09\x21\xfb\x54\x44\x2d\x18"),
            b"\x40\x09\x21\xfb\x54\x44\x2d\x18",
        );
    }

    #[test]
    fn text_format() {
        let field = text_field(oid::INT4);
        assert_eq!(Int4Codec.read(b"-42", Some(&field)).unwrap(), Value::Int4(-42));
        assert_eq!(BoolCodec.read(b"t", Some(&field)).unwrap(), Value::Bool(true));
        assert_eq!(Float8Codec.read(b"Infinity", Some(&field)).unwrap(), Value::Float8(f64::INFINITY));

        let err = Int4Codec.read(b"12a", Some(&field)).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "invalid digit found in string");
    }

    #[test]
    fn invalid_binary_length() {
        let err = Int8Codec.read(b"\0\0\0\x01", None).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "invalid `int8` binary length 4, expected 8");
    }

    #[test]
    fn integer_range() {
        assert_eq!(Int4Codec.validate_and_get_length(&Value::Int2(7)).unwrap(), 4);
        assert!(matches!(
            Int2Codec.validate_and_get_length(&Value::Int8(70_000)),
            Err(WriteError::OutOfRange { pg_name: "int2" }),
        ));
        assert!(matches!(
            OidCodec.validate_and_get_length(&Value::Int4(-1)),
            Err(WriteError::OutOfRange { .. }),
        ));
        assert!(matches!(
            Int4Codec.validate_and_get_length(&Value::Text("1".into())),
            Err(WriteError::Mismatch { pg_name: "int4", .. }),
        ));
    }
}
