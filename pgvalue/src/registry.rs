//! Type mapping registry.
//!
//! - [`TypeMapping`], static metadata of a wire type
//! - [`RegistryBuilder`], validate and register mapping with its handler
//! - [`TypeRegistry`], immutable lookup table shared between sessions
//!
//! Multiple entries may map the same wire type name, oid, tag or host kind.
//! For every lookup key, the most recently registered entry wins, earlier
//! entries are kept in [`TypeRegistry::mappings`].
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    codec::{
        ArrayCodec, BoolCodec, ByteaCodec, DateCodec, Float4Codec, Float8Codec, Int2Codec, Int4Codec, Int8Codec,
        OidCodec, ReadCodec, TextCodec, TimeRepr, TimestampCodec, WriteCodec,
    },
    common::verbose,
    handler::TypeHandler,
    postgres::{Oid, oid},
    value::{Value, ValueKind},
};

/// Canonical semantic type of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Bool,
    Bytea,
    Name,
    Int8,
    Int2,
    Int4,
    Text,
    Oid,
    Json,
    Float4,
    Float8,
    Unknown,
    Bpchar,
    Varchar,
    Date,
    Timestamp,
    TimestampTz,
    Jsonb,
    Array(&'static TypeTag),
}

/// Static metadata of a wire type.
#[derive(Debug, Clone)]
pub struct TypeMapping {
    pg_name: &'static str,
    oid: Oid,
    tag: Option<TypeTag>,
    aliases: Vec<&'static str>,
    host_kinds: Vec<ValueKind>,
}

impl TypeMapping {
    /// Create mapping, fails if `pg_name` is blank.
    pub fn new(pg_name: &'static str, oid: Oid) -> Result<TypeMapping, RegistryError> {
        if pg_name.trim().is_empty() {
            return Err(RegistryError::BlankName);
        }
        Ok(Self {
            pg_name,
            oid,
            tag: None,
            aliases: vec![],
            host_kinds: vec![],
        })
    }

    /// Set the canonical semantic type.
    pub fn tag(mut self, tag: TypeTag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Add other names this type can be looked up with.
    pub fn aliases(mut self, aliases: &[&'static str]) -> Self {
        self.aliases.extend_from_slice(aliases);
        self
    }

    /// Add value kinds implicitly bound to this type.
    pub fn host_kinds(mut self, kinds: &[ValueKind]) -> Self {
        self.host_kinds.extend_from_slice(kinds);
        self
    }

    pub fn pg_name(&self) -> &'static str {
        self.pg_name
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn get_tag(&self) -> Option<TypeTag> {
        self.tag
    }

    pub fn get_aliases(&self) -> &[&'static str] {
        &self.aliases
    }

    pub fn get_host_kinds(&self) -> &[ValueKind] {
        &self.host_kinds
    }
}

struct Entry {
    mapping: TypeMapping,
    handler: Arc<TypeHandler>,
}

/// Validate and collect registry entries.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Entry>,
}

impl RegistryBuilder {
    /// Create empty builder.
    pub fn new() -> RegistryBuilder {
        Self::default()
    }

    /// Create builder with all builtin types registered.
    pub fn builtin() -> Result<RegistryBuilder, RegistryError> {
        let mut me = Self::new();
        for builtin in BUILTIN {
            let mapping = TypeMapping::new(builtin.pg_name, builtin.oid)?
                .tag(builtin.tag)
                .aliases(builtin.aliases)
                .host_kinds(builtin.host_kinds);
            let handler = (builtin.build)(&me)?;
            me.register(mapping, handler)?;
        }
        Ok(me)
    }

    /// Validate and register handler.
    ///
    /// The mapping tag, if any, is assigned to the handler.
    pub fn register(&mut self, mapping: TypeMapping, mut handler: TypeHandler) -> Result<Arc<TypeHandler>, RegistryError> {
        if handler.pg_name().trim().is_empty() {
            return Err(RegistryError::BlankName);
        }
        if handler.pg_name() != mapping.pg_name {
            return Err(RegistryError::NameMismatch {
                mapping: mapping.pg_name,
                handler: handler.pg_name(),
            });
        }
        if handler.oid() != mapping.oid {
            return Err(RegistryError::OidMismatch {
                pg_name: mapping.pg_name,
                mapping: mapping.oid,
                handler: handler.oid(),
            });
        }
        if handler.secondary().is_some_and(|e| e.kind == handler.kind()) {
            return Err(RegistryError::SecondaryShadowsPrimary(mapping.pg_name));
        }
        if handler.kind() == ValueKind::Array && handler.element().is_none() {
            return Err(RegistryError::MissingElement(mapping.pg_name));
        }

        if let Some(tag) = mapping.tag {
            handler.set_tag(tag);
        }

        verbose!(pg_name = mapping.pg_name, oid = mapping.oid, "type registered");

        let handler = Arc::new(handler);
        self.entries.push(Entry { mapping, handler: handler.clone() });
        Ok(handler)
    }

    /// Returns the most recently registered handler of `pg_name`.
    pub fn get(&self, pg_name: &str) -> Option<&Arc<TypeHandler>> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.mapping.pg_name == pg_name)
            .map(|e| &e.handler)
    }

    /// Build the lookup tables.
    pub fn build(self) -> TypeRegistry {
        let mut registry = TypeRegistry {
            by_oid: HashMap::new(),
            by_name: HashMap::new(),
            by_tag: HashMap::new(),
            by_kind: HashMap::new(),
            by_element: HashMap::new(),
            entries: vec![],
        };

        // later insert replace earlier, the most recently registered wins
        for (i, entry) in self.entries.iter().enumerate() {
            let mapping = &entry.mapping;
            registry.by_oid.insert(mapping.oid, i);
            registry.by_name.insert(mapping.pg_name, i);
            for alias in &mapping.aliases {
                registry.by_name.insert(*alias, i);
            }
            if let Some(tag) = mapping.tag {
                registry.by_tag.insert(tag, i);
            }
            for kind in &mapping.host_kinds {
                registry.by_kind.insert(*kind, i);
            }
            if let Some(element) = entry.handler.element() {
                registry.by_element.insert(element.oid(), i);
            }
        }

        registry.entries = self.entries;
        registry
    }
}

/// Immutable type lookup table.
pub struct TypeRegistry {
    entries: Vec<Entry>,
    by_oid: HashMap<Oid, usize>,
    by_name: HashMap<&'static str, usize>,
    by_tag: HashMap<TypeTag, usize>,
    by_kind: HashMap<ValueKind, usize>,
    by_element: HashMap<Oid, usize>,
}

impl TypeRegistry {
    /// Build registry with all builtin types.
    pub fn builtin() -> TypeRegistry {
        match RegistryBuilder::builtin() {
            Ok(builder) => builder.build(),
            Err(err) => unreachable!("builtin registry is invalid: {err}"),
        }
    }

    fn handler(&self, i: Option<&usize>) -> Option<&Arc<TypeHandler>> {
        i.map(|&i| &self.entries[i].handler)
    }

    pub fn by_oid(&self, oid: Oid) -> Option<&Arc<TypeHandler>> {
        self.handler(self.by_oid.get(&oid))
    }

    /// Lookup by wire type name or alias.
    pub fn by_name(&self, pg_name: &str) -> Option<&Arc<TypeHandler>> {
        self.handler(self.by_name.get(pg_name))
    }

    pub fn by_tag(&self, tag: TypeTag) -> Option<&Arc<TypeHandler>> {
        self.handler(self.by_tag.get(&tag))
    }

    /// Returns the handler implicitly bound to values of `kind`.
    pub fn for_kind(&self, kind: ValueKind) -> Option<&Arc<TypeHandler>> {
        self.handler(self.by_kind.get(&kind))
    }

    /// Returns the handler implicitly bound to `value`.
    ///
    /// Array is bound to the array type whose element is bound to its first
    /// non NULL element. Returns [`None`] for NULL, empty array, or array of NULLs.
    pub fn for_value(&self, value: &Value) -> Option<&Arc<TypeHandler>> {
        match value {
            Value::Array(items) => {
                let element = self.for_value(items.iter().find(|e| !e.is_null())?)?;
                self.handler(self.by_element.get(&element.oid()))
            }
            value => self.for_kind(value.kind()),
        }
    }

    /// Returns the fallback handler of unregistered types.
    pub fn unknown(&self) -> Option<&Arc<TypeHandler>> {
        self.by_tag(TypeTag::Unknown)
    }

    /// Returns all registered mappings, in registration order.
    pub fn mappings(&self) -> impl Iterator<Item = (&TypeMapping, &Arc<TypeHandler>)> {
        self.entries.iter().map(|e| (&e.mapping, &e.handler))
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|e| &e.mapping)).finish()
    }
}

// ===== Builtin =====

struct Builtin {
    pg_name: &'static str,
    oid: Oid,
    tag: TypeTag,
    aliases: &'static [&'static str],
    host_kinds: &'static [ValueKind],
    build: fn(&RegistryBuilder) -> Result<TypeHandler, RegistryError>,
}

macro_rules! simple {
    ($pg:literal, $oid:expr, $kind:ident, $codec:expr) => {
        |_| {
            Ok(TypeHandler::new($pg, $oid, ValueKind::$kind, ReadCodec::simple($codec))
                .with_writer(WriteCodec::simple($codec)))
        }
    };
}

macro_rules! text {
    ($pg:literal, $oid:expr) => {
        |_| {
            Ok(TypeHandler::new($pg, $oid, ValueKind::Text, ReadCodec::chunking(TextCodec::new($pg)))
                .with_writer(WriteCodec::chunking(TextCodec::new($pg))))
        }
    };
}

macro_rules! time {
    ($pg:literal, $oid:expr, $secondary:ident, $codec:ident $(, $arg:expr)?) => {
        |_| {
            Ok(TypeHandler::new(
                $pg,
                $oid,
                ValueKind::SystemTime,
                ReadCodec::simple($codec::new($($arg,)? TimeRepr::SystemTime)),
            )
            .with_secondary(ValueKind::$secondary, ReadCodec::simple($codec::new($($arg,)? TimeRepr::Native)))
            .with_writer(WriteCodec::simple($codec::new($($arg,)? TimeRepr::Native))))
        }
    };
}

macro_rules! array {
    ($pg:literal, $oid:expr, $element:literal) => {
        |builder| array(builder, $pg, $oid, $element)
    };
}

fn array(builder: &RegistryBuilder, pg_name: &'static str, oid: Oid, element: &'static str) -> Result<TypeHandler, RegistryError> {
    let element = builder.get(element).ok_or(RegistryError::MissingElement(pg_name))?.clone();
    let codec = ArrayCodec::new(element.clone());
    Ok(TypeHandler::array(pg_name, oid, element, ReadCodec::chunking(codec.clone()))
        .with_writer(WriteCodec::chunking(codec)))
}

const NONE: &[ValueKind] = &[];

static BUILTIN: &[Builtin] = &[
    Builtin { pg_name: "bool", oid: oid::BOOL, tag: TypeTag::Bool, aliases: &["boolean"], host_kinds: &[ValueKind::Bool], build: simple!("bool", oid::BOOL, Bool, BoolCodec) },
    Builtin { pg_name: "bytea", oid: oid::BYTEA, tag: TypeTag::Bytea, aliases: &[], host_kinds: &[ValueKind::Bytea], build: |_| {
        Ok(TypeHandler::new("bytea", oid::BYTEA, ValueKind::Bytea, ReadCodec::chunking(ByteaCodec))
            .with_writer(WriteCodec::chunking(ByteaCodec)))
    } },
    Builtin { pg_name: "name", oid: oid::NAME, tag: TypeTag::Name, aliases: &[], host_kinds: NONE, build: text!("name", oid::NAME) },
    Builtin { pg_name: "int8", oid: oid::INT8, tag: TypeTag::Int8, aliases: &["bigint"], host_kinds: &[ValueKind::Int8], build: simple!("int8", oid::INT8, Int8, Int8Codec) },
    Builtin { pg_name: "int2", oid: oid::INT2, tag: TypeTag::Int2, aliases: &["smallint"], host_kinds: &[ValueKind::Int2], build: simple!("int2", oid::INT2, Int2, Int2Codec) },
    Builtin { pg_name: "int4", oid: oid::INT4, tag: TypeTag::Int4, aliases: &["integer", "int"], host_kinds: &[ValueKind::Int4], build: simple!("int4", oid::INT4, Int4, Int4Codec) },
    Builtin { pg_name: "text", oid: oid::TEXT, tag: TypeTag::Text, aliases: &[], host_kinds: &[ValueKind::Text], build: text!("text", oid::TEXT) },
    Builtin { pg_name: "oid", oid: oid::OID, tag: TypeTag::Oid, aliases: &[], host_kinds: &[ValueKind::Oid], build: simple!("oid", oid::OID, Oid, OidCodec) },
    Builtin { pg_name: "json", oid: oid::JSON, tag: TypeTag::Json, aliases: &[], host_kinds: NONE, build: text!("json", oid::JSON) },
    Builtin { pg_name: "float4", oid: oid::FLOAT4, tag: TypeTag::Float4, aliases: &["real"], host_kinds: &[ValueKind::Float4], build: simple!("float4", oid::FLOAT4, Float4, Float4Codec) },
    Builtin { pg_name: "float8", oid: oid::FLOAT8, tag: TypeTag::Float8, aliases: &["double precision"], host_kinds: &[ValueKind::Float8], build: simple!("float8", oid::FLOAT8, Float8, Float8Codec) },
    Builtin { pg_name: "unknown", oid: oid::UNKNOWN, tag: TypeTag::Unknown, aliases: &[], host_kinds: NONE, build: |_| {
        Ok(TypeHandler::new("unknown", oid::UNKNOWN, ValueKind::Text, ReadCodec::chunking(TextCodec::new("unknown"))))
    } },
    Builtin { pg_name: "bpchar", oid: oid::BPCHAR, tag: TypeTag::Bpchar, aliases: &["character", "char"], host_kinds: NONE, build: text!("bpchar", oid::BPCHAR) },
    Builtin { pg_name: "varchar", oid: oid::VARCHAR, tag: TypeTag::Varchar, aliases: &["character varying"], host_kinds: NONE, build: text!("varchar", oid::VARCHAR) },
    Builtin { pg_name: "date", oid: oid::DATE, tag: TypeTag::Date, aliases: &[], host_kinds: &[ValueKind::Date], build: time!("date", oid::DATE, Date, DateCodec) },
    Builtin { pg_name: "timestamp", oid: oid::TIMESTAMP, tag: TypeTag::Timestamp, aliases: &["timestamp without time zone"], host_kinds: &[ValueKind::Timestamp], build: time!("timestamp", oid::TIMESTAMP, Timestamp, TimestampCodec, "timestamp") },
    Builtin { pg_name: "timestamptz", oid: oid::TIMESTAMPTZ, tag: TypeTag::TimestampTz, aliases: &["timestamp with time zone"], host_kinds: &[ValueKind::SystemTime], build: time!("timestamptz", oid::TIMESTAMPTZ, Timestamp, TimestampCodec, "timestamptz") },
    #[cfg(feature = "json")]
    Builtin { pg_name: "json", oid: oid::JSON, tag: TypeTag::Json, aliases: &[], host_kinds: NONE, build: |_| {
        use crate::codec::JsonCodec;
        Ok(TypeHandler::new("json", oid::JSON, ValueKind::Json, ReadCodec::chunking(JsonCodec::json()))
            .with_writer(WriteCodec::chunking(JsonCodec::json())))
    } },
    #[cfg(feature = "json")]
    Builtin { pg_name: "jsonb", oid: oid::JSONB, tag: TypeTag::Jsonb, aliases: &[], host_kinds: &[ValueKind::Json], build: |_| {
        use crate::codec::JsonCodec;
        Ok(TypeHandler::new("jsonb", oid::JSONB, ValueKind::Json, ReadCodec::chunking(JsonCodec::jsonb()))
            .with_writer(WriteCodec::chunking(JsonCodec::jsonb())))
    } },
    Builtin { pg_name: "_bool", oid: oid::BOOL_ARRAY, tag: TypeTag::Array(&TypeTag::Bool), aliases: &["bool[]"], host_kinds: NONE, build: array!("_bool", oid::BOOL_ARRAY, "bool") },
    Builtin { pg_name: "_bytea", oid: oid::BYTEA_ARRAY, tag: TypeTag::Array(&TypeTag::Bytea), aliases: &["bytea[]"], host_kinds: NONE, build: array!("_bytea", oid::BYTEA_ARRAY, "bytea") },
    Builtin { pg_name: "_int2", oid: oid::INT2_ARRAY, tag: TypeTag::Array(&TypeTag::Int2), aliases: &["int2[]"], host_kinds: NONE, build: array!("_int2", oid::INT2_ARRAY, "int2") },
    Builtin { pg_name: "_int4", oid: oid::INT4_ARRAY, tag: TypeTag::Array(&TypeTag::Int4), aliases: &["int4[]"], host_kinds: NONE, build: array!("_int4", oid::INT4_ARRAY, "int4") },
    Builtin { pg_name: "_varchar", oid: oid::VARCHAR_ARRAY, tag: TypeTag::Array(&TypeTag::Varchar), aliases: &["varchar[]"], host_kinds: NONE, build: array!("_varchar", oid::VARCHAR_ARRAY, "varchar") },
    Builtin { pg_name: "_text", oid: oid::TEXT_ARRAY, tag: TypeTag::Array(&TypeTag::Text), aliases: &["text[]"], host_kinds: NONE, build: array!("_text", oid::TEXT_ARRAY, "text") },
    Builtin { pg_name: "_int8", oid: oid::INT8_ARRAY, tag: TypeTag::Array(&TypeTag::Int8), aliases: &["int8[]"], host_kinds: NONE, build: array!("_int8", oid::INT8_ARRAY, "int8") },
    Builtin { pg_name: "_float4", oid: oid::FLOAT4_ARRAY, tag: TypeTag::Array(&TypeTag::Float4), aliases: &["float4[]"], host_kinds: NONE, build: array!("_float4", oid::FLOAT4_ARRAY, "float4") },
    Builtin { pg_name: "_float8", oid: oid::FLOAT8_ARRAY, tag: TypeTag::Array(&TypeTag::Float8), aliases: &["float8[]"], host_kinds: NONE, build: array!("_float8", oid::FLOAT8_ARRAY, "float8") },
    Builtin { pg_name: "_oid", oid: oid::OID_ARRAY, tag: TypeTag::Array(&TypeTag::Oid), aliases: &["oid[]"], host_kinds: NONE, build: array!("_oid", oid::OID_ARRAY, "oid") },
    Builtin { pg_name: "_timestamp", oid: oid::TIMESTAMP_ARRAY, tag: TypeTag::Array(&TypeTag::Timestamp), aliases: &["timestamp[]"], host_kinds: NONE, build: array!("_timestamp", oid::TIMESTAMP_ARRAY, "timestamp") },
    Builtin { pg_name: "_date", oid: oid::DATE_ARRAY, tag: TypeTag::Array(&TypeTag::Date), aliases: &["date[]"], host_kinds: NONE, build: array!("_date", oid::DATE_ARRAY, "date") },
    Builtin { pg_name: "_timestamptz", oid: oid::TIMESTAMPTZ_ARRAY, tag: TypeTag::Array(&TypeTag::TimestampTz), aliases: &["timestamptz[]"], host_kinds: NONE, build: array!("_timestamptz", oid::TIMESTAMPTZ_ARRAY, "timestamptz") },
];

/// An error when registering a type.
#[derive(Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Wire type name is empty or whitespace.
    BlankName,
    NameMismatch {
        mapping: &'static str,
        handler: &'static str,
    },
    OidMismatch {
        pg_name: &'static str,
        mapping: Oid,
        handler: Oid,
    },
    /// Secondary representation produce the same kind as the primary one.
    SecondaryShadowsPrimary(&'static str),
    /// Array type without a registered element type.
    MissingElement(&'static str),
    /// No handler is implicitly bound to a value kind.
    Unbound(ValueKind),
}

impl std::error::Error for RegistryError { }

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlankName => f.write_str("type mapping name cannot be blank"),
            Self::NameMismatch { mapping, handler } => {
                write!(f, "type mapping `{mapping}` registered with handler `{handler}`")
            }
            Self::OidMismatch { pg_name, mapping, handler } => {
                write!(f, "type mapping `{pg_name}` oid {mapping} registered with handler oid {handler}")
            }
            Self::SecondaryShadowsPrimary(pg_name) => {
                write!(f, "`{pg_name}` secondary representation have the same kind as the primary")
            }
            Self::MissingElement(pg_name) => write!(f, "array type `{pg_name}` element is not registered"),
            Self::Unbound(kind) => write!(f, "no type is implicitly bound to {kind}, bind the parameter explicitly"),
        }
    }
}

impl fmt::Debug for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blank_name_fails_construction() {
        assert_eq!(TypeMapping::new("  ", 1).unwrap_err(), RegistryError::BlankName);
        assert_eq!(TypeMapping::new("", 1).unwrap_err(), RegistryError::BlankName);
    }

    #[test]
    fn register_validation() {
        let mut builder = RegistryBuilder::new();
        let handler = || TypeHandler::new("int4", oid::INT4, ValueKind::Int4, ReadCodec::simple(Int4Codec));

        let mapping = TypeMapping::new("integer", oid::INT4).unwrap();
        assert!(matches!(builder.register(mapping, handler()), Err(RegistryError::NameMismatch { .. })));

        let mapping = TypeMapping::new("int4", 1).unwrap();
        assert!(matches!(builder.register(mapping, handler()), Err(RegistryError::OidMismatch { .. })));

        let shadow = handler().with_secondary(ValueKind::Int4, ReadCodec::simple(Int4Codec));
        let mapping = TypeMapping::new("int4", oid::INT4).unwrap();
        assert_eq!(
            builder.register(mapping, shadow).unwrap_err(),
            RegistryError::SecondaryShadowsPrimary("int4"),
        );

        let array = TypeHandler::new("_int4", oid::INT4_ARRAY, ValueKind::Array, ReadCodec::simple(Int4Codec));
        let mapping = TypeMapping::new("_int4", oid::INT4_ARRAY).unwrap();
        assert_eq!(builder.register(mapping, array).unwrap_err(), RegistryError::MissingElement("_int4"));
    }

    #[test]
    fn builtin_lookup() {
        let registry = TypeRegistry::builtin();
        assert_eq!(registry.by_oid(oid::INT4).unwrap().pg_name(), "int4");
        assert_eq!(registry.by_name("integer").unwrap().oid(), oid::INT4);
        assert_eq!(registry.by_name("character varying").unwrap().pg_name(), "varchar");
        assert_eq!(registry.by_tag(TypeTag::Array(&TypeTag::Text)).unwrap().oid(), oid::TEXT_ARRAY);
        assert_eq!(registry.for_kind(ValueKind::SystemTime).unwrap().pg_name(), "timestamptz");
        assert_eq!(registry.unknown().unwrap().oid(), oid::UNKNOWN);
        assert!(registry.unknown().unwrap().writer().is_none());

        let date = registry.by_name("date").unwrap();
        assert_eq!(date.kind(), ValueKind::SystemTime);
        assert_eq!(date.secondary_kind(), ValueKind::Date);
        assert_eq!(date.tag(), Some(TypeTag::Date));
    }

    #[test]
    fn array_bound_by_element() {
        let registry = TypeRegistry::builtin();
        let value: Value = vec![None, Some(1i64)].into();
        assert_eq!(registry.for_value(&value).unwrap().pg_name(), "_int8");
        assert!(registry.for_value(&Value::Array(vec![Value::Null])).is_none());
        assert!(registry.for_value(&Value::Null).is_none());
        assert_eq!(registry.for_value(&"x".into()).unwrap().pg_name(), "text");
    }

    #[test]
    fn most_recently_registered_wins() {
        let mut builder = RegistryBuilder::builtin().unwrap();
        let mapping = TypeMapping::new("citext", 90_001)
            .unwrap()
            .aliases(&["text"])
            .host_kinds(&[ValueKind::Text]);
        let handler = TypeHandler::new("citext", 90_001, ValueKind::Text, ReadCodec::chunking(TextCodec::new("citext")))
            .with_writer(WriteCodec::chunking(TextCodec::new("citext")));
        builder.register(mapping, handler).unwrap();
        let registry = builder.build();

        assert_eq!(registry.by_name("text").unwrap().pg_name(), "citext");
        assert_eq!(registry.for_kind(ValueKind::Text).unwrap().pg_name(), "citext");
        assert_eq!(registry.by_oid(oid::TEXT).unwrap().pg_name(), "text");
        assert_eq!(registry.mappings().filter(|(m, _)| m.pg_name() == "citext").count(), 1);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_feature_replace_text_json() {
        let registry = TypeRegistry::builtin();
        assert_eq!(registry.by_name("json").unwrap().kind(), ValueKind::Json);
        assert_eq!(registry.mappings().filter(|(m, _)| m.pg_name() == "json").count(), 2);
    }
}
