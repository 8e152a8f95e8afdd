//! `date`, `timestamp` and `timestamptz` codecs.
//!
//! Binary format only. The host representation is [`SystemTime`], the native
//! [`PgDate`] and [`PgTimestamp`] are available as secondary representation,
//! they can hold `infinity` which [`SystemTime`] cannot.
//!
//! [`SystemTime`]: std::time::SystemTime
use super::{ReadError, SimpleReader, SimpleWriter, WriteError, numeric::is_text};
use crate::{
    buffer::DirectWindow,
    column::FieldDescription,
    value::{PgDate, PgTimestamp, Value},
};

/// Which value a date or time codec produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRepr {
    /// [`PgDate`] or [`PgTimestamp`].
    Native,
    /// [`SystemTime`][std::time::SystemTime], infinity fails to read.
    SystemTime,
}

fn binary(field: Option<&FieldDescription>, pg_name: &'static str) -> Result<(), ReadError> {
    match is_text(field) {
        true => Err(ReadError::value(format!("text format `{pg_name}` is not supported"))),
        false => Ok(()),
    }
}

fn infinity(pg_name: &'static str) -> ReadError {
    ReadError::value(format!("infinite or out of range `{pg_name}` cannot be represented as system time"))
}

/// `date`
#[derive(Debug, Clone, Copy)]
pub struct DateCodec {
    repr: TimeRepr,
}

impl DateCodec {
    pub const fn new(repr: TimeRepr) -> DateCodec {
        Self { repr }
    }

    fn encode(value: &Value) -> Result<PgDate, WriteError> {
        match *value {
            Value::Date(date) => Ok(date),
            Value::SystemTime(time) => PgDate::from_system_time(time).ok_or(WriteError::OutOfRange { pg_name: "date" }),
            ref value => Err(WriteError::mismatch("date", value)),
        }
    }
}

impl SimpleReader for DateCodec {
    fn read(&self, bytes: &[u8], field: Option<&FieldDescription>) -> Result<Value, ReadError> {
        binary(field, "date")?;
        let Ok(days) = bytes.try_into().map(i32::from_be_bytes) else {
            return Err(ReadError::value("invalid `date` binary length"));
        };
        let date = PgDate::from_days(days);
        match self.repr {
            TimeRepr::Native => Ok(Value::Date(date)),
            TimeRepr::SystemTime => date.to_system_time().map(Value::SystemTime).ok_or_else(|| infinity("date")),
        }
    }
}

impl SimpleWriter for DateCodec {
    fn validate_and_get_length(&self, value: &Value) -> Result<usize, WriteError> {
        Self::encode(value).map(|_| size_of::<i32>())
    }

    fn write(&self, value: &Value, window: &mut DirectWindow<'_>) -> Result<(), WriteError> {
        window.put_i32(Self::encode(value)?.days());
        Ok(())
    }
}

/// `timestamp` and `timestamptz`, both sent as microseconds since `2000-01-01T00:00:00`.
#[derive(Debug, Clone, Copy)]
pub struct TimestampCodec {
    pg_name: &'static str,
    repr: TimeRepr,
}

impl TimestampCodec {
    pub const fn new(pg_name: &'static str, repr: TimeRepr) -> TimestampCodec {
        Self { pg_name, repr }
    }

    fn encode(&self, value: &Value) -> Result<PgTimestamp, WriteError> {
        match *value {
            Value::Timestamp(ts) => Ok(ts),
            Value::SystemTime(time) => {
                PgTimestamp::from_system_time(time).ok_or(WriteError::OutOfRange { pg_name: self.pg_name })
            }
            ref value => Err(WriteError::mismatch(self.pg_name, value)),
        }
    }
}

impl SimpleReader for TimestampCodec {
    fn read(&self, bytes: &[u8], field: Option<&FieldDescription>) -> Result<Value, ReadError> {
        binary(field, self.pg_name)?;
        let Ok(micros) = bytes.try_into().map(i64::from_be_bytes) else {
            return Err(ReadError::value(format!("invalid `{}` binary length", self.pg_name)));
        };
        let ts = PgTimestamp::from_micros(micros);
        match self.repr {
            TimeRepr::Native => Ok(Value::Timestamp(ts)),
            TimeRepr::SystemTime => ts
                .to_system_time()
                .map(Value::SystemTime)
                .ok_or_else(|| infinity(self.pg_name)),
        }
    }
}

impl SimpleWriter for TimestampCodec {
    fn validate_and_get_length(&self, value: &Value) -> Result<usize, WriteError> {
        self.encode(value).map(|_| size_of::<i64>())
    }

    fn write(&self, value: &Value, window: &mut DirectWindow<'_>) -> Result<(), WriteError> {
        window.put_i64(self.encode(value)?.micros());
        Ok(())
    }
}
