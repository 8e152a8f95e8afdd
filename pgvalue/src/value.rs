//! Host value representation.
//!
//! - [`Value`]
//! - [`ValueKind`]
//! - [`FromValue`]
//!
//! - [`PgDate`]
//! - [`PgTimestamp`]
use bytes::Bytes;
use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{ext::FmtExt, postgres::Oid};

/// `2000-01-01T00:00:00Z` in unix seconds, the postgres epoch.
const PG_EPOCH_UNIX_SECS: u64 = 946_684_800;
const SECS_PER_DAY: u64 = 86_400;

fn pg_epoch() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(PG_EPOCH_UNIX_SECS)
}

/// A decoded value, or a value to be bound as parameter.
#[derive(Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Oid(Oid),
    Float4(f32),
    Float8(f64),
    Text(String),
    Bytea(Bytes),
    Date(PgDate),
    Timestamp(PgTimestamp),
    SystemTime(SystemTime),
    /// Array elements in row-major order, `NULL` element is [`Value::Null`].
    Array(Vec<Value>),
    #[cfg(feature = "json")]
    Json(serde_json::Value),
}

/// The tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Text,
    Bytea,
    Date,
    Timestamp,
    SystemTime,
    Array,
    Json,
}

impl Value {
    /// Returns the tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int2(_) => ValueKind::Int2,
            Value::Int4(_) => ValueKind::Int4,
            Value::Int8(_) => ValueKind::Int8,
            Value::Oid(_) => ValueKind::Oid,
            Value::Float4(_) => ValueKind::Float4,
            Value::Float8(_) => ValueKind::Float8,
            Value::Text(_) => ValueKind::Text,
            Value::Bytea(_) => ValueKind::Bytea,
            Value::Date(_) => ValueKind::Date,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::SystemTime(_) => ValueKind::SystemTime,
            Value::Array(_) => ValueKind::Array,
            #[cfg(feature = "json")]
            Value::Json(_) => ValueKind::Json,
        }
    }

    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as `i64` if it is any integer kind.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int2(v) => Some(v.into()),
            Value::Int4(v) => Some(v.into()),
            Value::Int8(v) => Some(v),
            Value::Oid(v) => Some(v.into()),
            _ => None,
        }
    }

    /// Returns the value as `f64` if it is any float kind.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float4(v) => Some(v.into()),
            Value::Float8(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => fmt::Debug::fmt(v, f),
            Value::Int2(v) => fmt::Debug::fmt(v, f),
            Value::Int4(v) => fmt::Debug::fmt(v, f),
            Value::Int8(v) => fmt::Debug::fmt(v, f),
            Value::Oid(v) => write!(f, "oid({v})"),
            Value::Float4(v) => fmt::Debug::fmt(v, f),
            Value::Float8(v) => fmt::Debug::fmt(v, f),
            Value::Text(v) => fmt::Debug::fmt(v, f),
            Value::Bytea(v) => fmt::Debug::fmt(&v[..].lossy(), f),
            Value::Date(v) => fmt::Debug::fmt(v, f),
            Value::Timestamp(v) => fmt::Debug::fmt(v, f),
            Value::SystemTime(v) => fmt::Debug::fmt(v, f),
            Value::Array(v) => f.debug_list().entries(v).finish(),
            #[cfg(feature = "json")]
            Value::Json(v) => fmt::Debug::fmt(v, f),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int2 => "int2",
            ValueKind::Int4 => "int4",
            ValueKind::Int8 => "int8",
            ValueKind::Oid => "oid",
            ValueKind::Float4 => "float4",
            ValueKind::Float8 => "float8",
            ValueKind::Text => "text",
            ValueKind::Bytea => "bytes",
            ValueKind::Date => "date",
            ValueKind::Timestamp => "timestamp",
            ValueKind::SystemTime => "system time",
            ValueKind::Array => "array",
            ValueKind::Json => "json",
        };
        f.write_str(name)
    }
}

// ===== Date and time =====

/// Postgres `date`, days since `2000-01-01`.
///
/// Unlike [`SystemTime`], it can hold `infinity` and `-infinity`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PgDate(i32);

impl PgDate {
    pub const INFINITY: PgDate = PgDate(i32::MAX);
    pub const NEG_INFINITY: PgDate = PgDate(i32::MIN);
    /// `2000-01-01`
    pub const EPOCH: PgDate = PgDate(0);

    /// Create date from days since `2000-01-01`.
    pub const fn from_days(days: i32) -> PgDate {
        PgDate(days)
    }

    /// Returns days since `2000-01-01`.
    pub const fn days(self) -> i32 {
        self.0
    }

    /// Returns `false` for `infinity` and `-infinity`.
    pub const fn is_finite(self) -> bool {
        self.0 != i32::MAX && self.0 != i32::MIN
    }

    /// Returns midnight UTC of this date.
    ///
    /// Returns [`None`] if date is infinite or not representable.
    pub fn to_system_time(self) -> Option<SystemTime> {
        if !self.is_finite() {
            return None;
        }
        // the whole date range overflow microseconds in i64, go through seconds
        let offset = Duration::from_secs(u64::from(self.0.unsigned_abs()) * SECS_PER_DAY);
        match self.0 >= 0 {
            true => pg_epoch().checked_add(offset),
            false => pg_epoch().checked_sub(offset),
        }
    }

    /// Returns the date of given time in UTC.
    pub fn from_system_time(time: SystemTime) -> Option<PgDate> {
        let days = match time.duration_since(pg_epoch()) {
            Ok(after) => i64::try_from(after.as_secs() / SECS_PER_DAY).ok()?,
            Err(before) => {
                let before = before.duration();
                let partial = before.subsec_nanos() != 0 || before.as_secs() % SECS_PER_DAY != 0;
                let days = before.as_secs() / SECS_PER_DAY + u64::from(partial);
                -i64::try_from(days).ok()?
            }
        };
        i32::try_from(days).ok().map(PgDate).filter(|date| date.is_finite())
    }
}

impl fmt::Debug for PgDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PgDate::INFINITY => f.write_str("infinity"),
            PgDate::NEG_INFINITY => f.write_str("-infinity"),
            PgDate(days) => write!(f, "PgDate({days})"),
        }
    }
}

/// Postgres `timestamp` or `timestamptz`, microseconds since `2000-01-01T00:00:00Z`.
///
/// Unlike [`SystemTime`], it can hold `infinity` and `-infinity`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PgTimestamp(i64);

impl PgTimestamp {
    pub const INFINITY: PgTimestamp = PgTimestamp(i64::MAX);
    pub const NEG_INFINITY: PgTimestamp = PgTimestamp(i64::MIN);
    /// `2000-01-01T00:00:00Z`
    pub const EPOCH: PgTimestamp = PgTimestamp(0);

    /// Create timestamp from microseconds since `2000-01-01T00:00:00Z`.
    pub const fn from_micros(micros: i64) -> PgTimestamp {
        PgTimestamp(micros)
    }

    /// Returns microseconds since `2000-01-01T00:00:00Z`.
    pub const fn micros(self) -> i64 {
        self.0
    }

    /// Returns `false` for `infinity` and `-infinity`.
    pub const fn is_finite(self) -> bool {
        self.0 != i64::MAX && self.0 != i64::MIN
    }

    /// Returns [`None`] if timestamp is infinite or not representable.
    pub fn to_system_time(self) -> Option<SystemTime> {
        if !self.is_finite() {
            return None;
        }
        let offset = Duration::from_micros(self.0.unsigned_abs());
        match self.0 >= 0 {
            true => pg_epoch().checked_add(offset),
            false => pg_epoch().checked_sub(offset),
        }
    }

    /// Sub-microsecond precision is truncated toward the postgres epoch.
    pub fn from_system_time(time: SystemTime) -> Option<PgTimestamp> {
        match time.duration_since(pg_epoch()) {
            Ok(after) => after.as_micros().try_into().ok().map(PgTimestamp),
            Err(before) => {
                let micros: i64 = before.duration().as_micros().try_into().ok()?;
                Some(PgTimestamp(-micros))
            }
        }
    }
}

impl fmt::Debug for PgTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PgTimestamp::INFINITY => f.write_str("infinity"),
            PgTimestamp::NEG_INFINITY => f.write_str("-infinity"),
            PgTimestamp(micros) => write!(f, "PgTimestamp({micros})"),
        }
    }
}

// ===== Conversion =====

/// Type that can be constructed from a decoded [`Value`].
pub trait FromValue: Sized {
    /// The value kind that must be decoded to construct self.
    ///
    /// The dispatcher selects a handler codec by this kind, before reading any byte.
    const KIND: ValueKind;

    /// The element kind, for array kind.
    const ELEMENT: Option<ValueKind> = None;

    /// Construct self from value.
    fn from_value(value: Value) -> Result<Self, ConvertError>;
}

impl<T: FromValue> FromValue for Option<T> {
    const KIND: ValueKind = T::KIND;
    const ELEMENT: Option<ValueKind> = T::ELEMENT;

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    const KIND: ValueKind = ValueKind::Array;
    const ELEMENT: Option<ValueKind> = Some(T::KIND);

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            Value::Null => Err(ConvertError::UnexpectedNull),
            value => Err(ConvertError::mismatch(ValueKind::Array, &value)),
        }
    }
}

macro_rules! value {
    ($ty:ty, $variant:ident) => {
        impl FromValue for $ty {
            const KIND: ValueKind = ValueKind::$variant;

            fn from_value(value: Value) -> Result<Self, ConvertError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    Value::Null => Err(ConvertError::UnexpectedNull),
                    value => Err(ConvertError::mismatch(Self::KIND, &value)),
                }
            }
        }

        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value)
            }
        }
    };
}

value!(bool, Bool);
value!(i16, Int2);
value!(i32, Int4);
value!(i64, Int8);
value!(u32, Oid);
value!(f32, Float4);
value!(f64, Float8);
value!(String, Text);
value!(Bytes, Bytea);
value!(PgDate, Date);
value!(PgTimestamp, Timestamp);
value!(SystemTime, SystemTime);
#[cfg(feature = "json")]
value!(serde_json::Value, Json);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.into())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytea(Bytes::copy_from_slice(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

/// An error when converting a decoded [`Value`] into the requested type.
#[derive(Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Value is NULL but the requested type is not an [`Option`].
    UnexpectedNull,
    /// Decoded value kind differ from the requested one.
    Mismatch {
        expected: ValueKind,
        found: ValueKind,
    },
    /// Value cannot be represented by the requested type.
    OutOfRange,
    /// Json value does not match the requested type, contains the `serde_json` message.
    #[cfg(feature = "json")]
    Json(String),
}

impl ConvertError {
    pub(crate) fn mismatch(expected: ValueKind, found: &Value) -> ConvertError {
        ConvertError::Mismatch { expected, found: found.kind() }
    }
}

impl std::error::Error for ConvertError { }

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedNull => f.write_str("unexpected NULL value"),
            Self::Mismatch { expected, found } => write!(f, "expected {expected}, found {found}"),
            Self::OutOfRange => f.write_str("value out of range"),
            #[cfg(feature = "json")]
            Self::Json(msg) => write!(f, "failed to deserialize json, {msg}"),
        }
    }
}

impl fmt::Debug for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timestamp_system_time() {
        let ts = PgTimestamp::from_micros(-1_500_000);
        let time = ts.to_system_time().unwrap();
        assert_eq!(PgTimestamp::from_system_time(time), Some(ts));
        assert_eq!(PgTimestamp::from_system_time(UNIX_EPOCH), Some(PgTimestamp::from_micros(-946_684_800_000_000)));
        assert_eq!(PgTimestamp::INFINITY.to_system_time(), None);
    }

    #[test]
    fn date_floor() {
        let time = PgTimestamp::from_micros(-1).to_system_time().unwrap();
        assert_eq!(PgDate::from_system_time(time), Some(PgDate::from_days(-1)));
        assert_eq!(PgDate::from_days(1).to_system_time(), Some(pg_epoch() + Duration::from_secs(86_400)));
        assert_eq!(PgDate::NEG_INFINITY.to_system_time(), None);
    }

    #[test]
    fn date_range_edges() {
        // 5874897-12-31, the last date postgres accepts
        let last = PgDate::from_days(2_145_031_949);
        let time = last.to_system_time().unwrap();
        assert_eq!(time, pg_epoch() + Duration::from_secs(2_145_031_949 * 86_400));
        assert_eq!(PgDate::from_system_time(time), Some(last));

        // 4714-11-24 BC
        let first = PgDate::from_days(-2_451_545);
        let time = first.to_system_time().unwrap();
        assert_eq!(PgDate::from_system_time(time), Some(first));

        assert_eq!(PgDate::from_days(2_142_580_403).to_system_time().map(|_| ()), Some(()));
    }

    #[test]
    fn option_and_vec() {
        assert_eq!(Option::<i32>::from_value(Value::Null), Ok(None));
        assert_eq!(i32::from_value(Value::Null), Err(ConvertError::UnexpectedNull));
        let items = Vec::<Option<i32>>::from_value(vec![Some(1), None].into()).unwrap();
        assert_eq!(items, [Some(1), None]);
        assert_eq!(
            String::from_value(Value::Int4(1)),
            Err(ConvertError::Mismatch { expected: ValueKind::Text, found: ValueKind::Int4 }),
        );
    }
}
