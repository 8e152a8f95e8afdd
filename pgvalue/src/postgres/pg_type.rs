
/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// Builtin type oids, as found in `pg_type.dat`.
///
/// Builtin oids are stable across server versions.
pub mod oid {
    use super::Oid;

    macro_rules! oid {
        ($($name:ident = $oid:literal $(, $doc:literal)?;)*) => {
            $(
                $(#[doc = $doc])?
                pub const $name: Oid = $oid;
            )*
        };
    }

    oid! {
        BOOL = 16, "`bool` boolean, 'true'/'false'";
        BYTEA = 17, "`bytea` variable-length string, binary values escaped";
        NAME = 19, "`name` 63-byte type for storing system identifiers";
        INT8 = 20, "`int8` ~18 digit integer, 8-byte storage";
        INT2 = 21, "`int2` -32 thousand to 32 thousand, 2-byte storage";
        INT4 = 23, "`int4` -2 billion to 2 billion integer, 4-byte storage";
        TEXT = 25, "`text` variable-length string, no limit specified";
        OID = 26, "`oid` object identifier, 4-byte storage";
        JSON = 114, "`json` JSON stored as text";
        FLOAT4 = 700, "`float4` single-precision floating point number, 4-byte storage";
        FLOAT8 = 701, "`float8` double-precision floating point number, 8-byte storage";
        UNKNOWN = 705, "`unknown` pseudo-type representing an undetermined type";
        BPCHAR = 1042, "`bpchar` char(length), blank-padded string";
        VARCHAR = 1043, "`varchar` varchar(length), non-blank-padded string";
        DATE = 1082, "`date` date";
        TIMESTAMP = 1114, "`timestamp` date and time";
        TIMESTAMPTZ = 1184, "`timestamptz` date and time with time zone";
        JSONB = 3802, "`jsonb` Binary JSON";

        BOOL_ARRAY = 1000;
        BYTEA_ARRAY = 1001;
        INT2_ARRAY = 1005;
        INT4_ARRAY = 1007;
        TEXT_ARRAY = 1009;
        VARCHAR_ARRAY = 1015;
        INT8_ARRAY = 1016;
        FLOAT4_ARRAY = 1021;
        FLOAT8_ARRAY = 1022;
        OID_ARRAY = 1028;
        TIMESTAMP_ARRAY = 1115;
        DATE_ARRAY = 1182;
        TIMESTAMPTZ_ARRAY = 1185;
    }
}
