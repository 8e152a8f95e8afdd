use time::{Date, Duration, PrimitiveDateTime, UtcDateTime};

use crate::value::{ConvertError, FromValue, PgDate, PgTimestamp, Value, ValueKind};

const DATE_PG_EPOCH: Date = {
    // source: `from_julian_day` docs
    match Date::from_julian_day(2_451_545) {
        Ok(ok) => ok,
        Err(_) => panic!("2000-01-01 is a valid date"),
    }
};

const PRIMITIVE_PG_EPOCH: PrimitiveDateTime = PrimitiveDateTime::new(DATE_PG_EPOCH, time::Time::MIDNIGHT);

const UTC_PG_EPOCH: UtcDateTime = UtcDateTime::new(DATE_PG_EPOCH, time::Time::MIDNIGHT);

fn timestamp(value: Value) -> Result<Duration, ConvertError> {
    match value {
        Value::Timestamp(ts) if ts.is_finite() => Ok(Duration::microseconds(ts.micros())),
        Value::Timestamp(_) => Err(ConvertError::OutOfRange),
        Value::Null => Err(ConvertError::UnexpectedNull),
        value => Err(ConvertError::mismatch(ValueKind::Timestamp, &value)),
    }
}

/// Saturate to infinity when out of `i64` range.
fn micros(duration: Duration) -> PgTimestamp {
    match i64::try_from(duration.whole_microseconds()) {
        Ok(micros) => PgTimestamp::from_micros(micros),
        Err(_) if duration.is_negative() => PgTimestamp::NEG_INFINITY,
        Err(_) => PgTimestamp::INFINITY,
    }
}

impl FromValue for PrimitiveDateTime {
    const KIND: ValueKind = ValueKind::Timestamp;

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        PRIMITIVE_PG_EPOCH.checked_add(timestamp(value)?).ok_or(ConvertError::OutOfRange)
    }
}

impl FromValue for UtcDateTime {
    const KIND: ValueKind = ValueKind::Timestamp;

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        UTC_PG_EPOCH.checked_add(timestamp(value)?).ok_or(ConvertError::OutOfRange)
    }
}

impl FromValue for Date {
    const KIND: ValueKind = ValueKind::Date;

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Date(date) if date.is_finite() => DATE_PG_EPOCH
                .checked_add(Duration::days(date.days().into()))
                .ok_or(ConvertError::OutOfRange),
            Value::Date(_) => Err(ConvertError::OutOfRange),
            Value::Null => Err(ConvertError::UnexpectedNull),
            value => Err(ConvertError::mismatch(Self::KIND, &value)),
        }
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::Timestamp(micros(value - PRIMITIVE_PG_EPOCH))
    }
}

impl From<UtcDateTime> for Value {
    fn from(value: UtcDateTime) -> Self {
        Value::Timestamp(micros(value - UTC_PG_EPOCH))
    }
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        // ±999999 years in days always fit `i32`
        Value::Date(PgDate::from_days((value - DATE_PG_EPOCH).whole_days() as i32))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::Month;

    #[test]
    fn timestamp_from_pg_epoch() {
        let ts = Value::Timestamp(PgTimestamp::from_micros(86_400_000_001));
        let dt = PrimitiveDateTime::from_value(ts.clone()).unwrap();
        assert_eq!(dt.date(), Date::from_calendar_date(2000, Month::January, 2).unwrap());
        assert_eq!(dt.microsecond(), 1);
        assert_eq!(Value::from(dt), ts);
    }

    #[test]
    fn infinity_out_of_range() {
        let err = UtcDateTime::from_value(Value::Timestamp(PgTimestamp::INFINITY)).unwrap_err();
        assert_eq!(err, ConvertError::OutOfRange);
        let err = Date::from_value(Value::Date(PgDate::NEG_INFINITY)).unwrap_err();
        assert_eq!(err, ConvertError::OutOfRange);
    }

    #[test]
    fn date_before_epoch() {
        let date = Date::from_calendar_date(1999, Month::December, 31).unwrap();
        assert_eq!(Value::from(date), Value::Date(PgDate::from_days(-1)));
        assert_eq!(Date::from_value(Value::Date(PgDate::from_days(-1))).unwrap(), date);
    }
}
