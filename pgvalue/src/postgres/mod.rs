//! Postgres protocol constants.
mod pg_type;

pub use pg_type::{Oid, oid};

/// Format code of a column value or parameter.
///
/// <https://www.postgresql.org/docs/current/protocol-overview.html#PROTOCOL-FORMAT-CODES>
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PgFormat {
    Text,
    #[default]
    Binary,
}

impl PgFormat {
    /// Returns the format from wire format code, `0` is text, `1` is binary.
    pub fn from_code(code: u16) -> Option<PgFormat> {
        match code {
            0 => Some(PgFormat::Text),
            1 => Some(PgFormat::Binary),
            _ => None,
        }
    }

    /// Returns the wire format code.
    pub fn code(self) -> u16 {
        match self {
            PgFormat::Text => 0,
            PgFormat::Binary => 1,
        }
    }
}
