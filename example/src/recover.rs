use pgvalue::{
    Result, Session, TypeRegistry,
    buffer::MemoryBuffer,
    column::FieldDescription,
    postgres::{PgFormat, oid},
};
use std::sync::Arc;

/// A malformed value fails alone, the next column is still readable.
pub async fn main() -> Result<()> {
    let registry = Arc::new(TypeRegistry::builtin());
    let field = FieldDescription::new("n", oid::INT8, PgFormat::Text).resolve(&registry);

    let row = b"\0\0\0\x0312x\0\0\0\x017";
    let mut session = Session::new(MemoryBuffer::chunked(row, 2), registry);

    let mut cursor = session.begin_column().await?;
    match session.read::<i64>(&mut cursor, &field).await {
        Err(err) if err.is_recoverable() => tracing::warn!("{err}"),
        other => panic!("expected recoverable error, found {other:?}"),
    }

    let mut cursor = session.begin_column().await?;
    assert_eq!(session.read::<i64>(&mut cursor, &field).await?, 7);
    assert!(!session.is_broken());

    Ok(())
}
