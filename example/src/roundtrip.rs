use bytes::Buf;
use pgvalue::{
    BufferConfig, Parameters, Result, Session, TypeRegistry, Value,
    buffer::{MemoryBuffer, MemorySink, ReadBufferExt, WriteBufferExt},
    column::FieldDescription,
    postgres::PgFormat,
    types::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Date, Month, PrimitiveDateTime, Time};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Foo {
    id: i32,
    tags: Vec<String>,
}

/// Write a parameter block through a small transmit buffer, then read it
/// back as a `DataRow`, one byte per refill.
pub async fn main() -> Result<()> {
    let registry = Arc::new(TypeRegistry::builtin());
    let config = BufferConfig::from_env().write_capacity(64);

    let foo = Foo { id: 420, tags: vec!["a".into(), "b".into()] };
    let date = Date::from_calendar_date(2025, Month::April, 1).unwrap();
    let local = PrimitiveDateTime::new(date, Time::from_hms(13, 37, 0).unwrap());
    let long = "postgres ".repeat(40);

    let mut params = Parameters::new();
    params
        .bind(&registry, 420)?
        .bind(&registry, long.as_str())?
        .bind(&registry, Value::Null)?
        .bind(&registry, vec![Some(1i64), None, Some(3)])?
        .bind(&registry, Value::try_from(Json(&foo)).unwrap())?
        .bind(&registry, local)?;

    let mut sink = MemorySink::new(&config);
    params.write(&mut sink).await?;
    sink.flush().await?;
    tracing::info!(flushes = sink.flushes(), "parameters written");

    // the parameter block layout is the same as `DataRow` body
    let row = sink.take_output();
    let fields = params
        .oids()
        .map(|oid| FieldDescription::new("", oid, PgFormat::Binary).resolve(&registry))
        .collect::<Vec<_>>();

    let mut session = Session::new(MemoryBuffer::chunked(&row, 1), registry.clone());
    session.buffer_mut().ensure(2).await?;
    assert_eq!(session.buffer_mut().get_i16(), 6);

    let mut cursor = session.begin_column().await?;
    assert_eq!(session.read::<i32>(&mut cursor, &fields[0]).await?, 420);

    let mut cursor = session.begin_column().await?;
    assert_eq!(session.read::<String>(&mut cursor, &fields[1]).await?, long);

    let mut cursor = session.begin_column().await?;
    assert_eq!(session.read::<Option<String>>(&mut cursor, &fields[2]).await?, None);

    let mut cursor = session.begin_column().await?;
    let ids = session.read::<Vec<Option<i64>>>(&mut cursor, &fields[3]).await?;
    assert_eq!(ids, [Some(1), None, Some(3)]);

    let mut cursor = session.begin_column().await?;
    let Json(json) = session.read::<Json<Foo>>(&mut cursor, &fields[4]).await?;
    assert_eq!(json, foo);

    let mut cursor = session.begin_column().await?;
    assert_eq!(session.read::<PrimitiveDateTime>(&mut cursor, &fields[5]).await?, local);

    let refills = session.buffer_mut().refills();
    tracing::info!(refills, "row decoded");
    assert_eq!(refills, row.len());

    Ok(())
}
