//! Per-opcode request and response bodies.

use bytes::{Bytes, BytesMut};

use crate::error::CodecError;
use crate::primitive::{
    self, Consistency, Cursor, MaybeBytes, put_bytes, put_consistency, put_int, put_long_string,
    put_short, put_short_bytes, put_string, put_string_list, put_string_map, put_string_multimap,
};
use crate::opcode::Opcode;
use crate::value::ColumnType;

bitflags::bitflags! {
    /// Flags carried in the byte immediately following a `QUERY`/`EXECUTE`
    /// consistency field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueryFlags: u8 {
        /// Bind values are present.
        const VALUES = 0x01;
        /// The server should not return result metadata.
        const SKIP_METADATA = 0x02;
        /// A page-size field follows.
        const PAGE_SIZE = 0x04;
        /// A paging-state field follows.
        const WITH_PAGING_STATE = 0x08;
        /// A serial-consistency field follows.
        const WITH_SERIAL_CONSISTENCY = 0x10;
        /// A default-timestamp field follows.
        const WITH_DEFAULT_TIMESTAMP = 0x20;
        /// Bind values are named, not positional.
        const WITH_NAMES_FOR_VALUES = 0x40;
    }
}

/// A single bind value, optionally named (only meaningful alongside
/// [`QueryFlags::WITH_NAMES_FOR_VALUES`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindValue {
    /// Parameter name, when using named binding.
    pub name: Option<String>,
    /// The value itself, including the null/unset sentinels.
    pub value: MaybeBytes,
}

/// The shared parameter block used by both `QUERY` and `EXECUTE`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryParams {
    /// Bind values, in positional or named form.
    pub values: Vec<BindValue>,
    /// Requested page size, in rows.
    pub page_size: Option<i32>,
    /// Opaque paging-state token from a previous response.
    pub paging_state: Option<Bytes>,
    /// Serial consistency for conditional updates.
    pub serial_consistency: Option<Consistency>,
    /// Client-supplied write timestamp, in microseconds.
    pub default_timestamp: Option<i64>,
    /// Keyspace to execute the statement against (protocol v5 field;
    /// accepted here only because the flag bit is otherwise unused —
    /// this core never sets it on encode).
    pub skip_metadata: bool,
}

fn encode_query_params(buf: &mut BytesMut, consistency: Consistency, params: &QueryParams) {
    put_consistency(buf, consistency);

    let mut flags = QueryFlags::empty();
    if !params.values.is_empty() {
        flags |= QueryFlags::VALUES;
        if params.values.iter().any(|v| v.name.is_some()) {
            flags |= QueryFlags::WITH_NAMES_FOR_VALUES;
        }
    }
    if params.skip_metadata {
        flags |= QueryFlags::SKIP_METADATA;
    }
    if params.page_size.is_some() {
        flags |= QueryFlags::PAGE_SIZE;
    }
    if params.paging_state.is_some() {
        flags |= QueryFlags::WITH_PAGING_STATE;
    }
    if params.serial_consistency.is_some() {
        flags |= QueryFlags::WITH_SERIAL_CONSISTENCY;
    }
    if params.default_timestamp.is_some() {
        flags |= QueryFlags::WITH_DEFAULT_TIMESTAMP;
    }
    primitive::put_byte(buf, flags.bits());

    if flags.contains(QueryFlags::VALUES) {
        put_short(buf, params.values.len() as u16);
        for bound in &params.values {
            if let Some(name) = &bound.name {
                put_string(buf, name);
            }
            put_bytes(buf, &bound.value);
        }
    }
    if let Some(page_size) = params.page_size {
        put_int(buf, page_size);
    }
    if let Some(state) = &params.paging_state {
        put_bytes(buf, &MaybeBytes::Value(state.clone()));
    }
    if let Some(serial) = params.serial_consistency {
        put_consistency(buf, serial);
    }
    if let Some(ts) = params.default_timestamp {
        primitive::put_long(buf, ts);
    }
}

fn decode_query_params(cursor: &mut Cursor<'_>) -> Result<(Consistency, QueryFlags), CodecError> {
    let consistency = cursor.get_consistency()?;
    let flags = QueryFlags::from_bits_truncate(cursor.get_byte()?);
    Ok((consistency, flags))
}

fn decode_query_param_fields(
    cursor: &mut Cursor<'_>,
    flags: QueryFlags,
) -> Result<QueryParams, CodecError> {
    let mut params = QueryParams { skip_metadata: flags.contains(QueryFlags::SKIP_METADATA), ..Default::default() };

    if flags.contains(QueryFlags::VALUES) {
        let count = cursor.get_short()?;
        for _ in 0..count {
            let name = if flags.contains(QueryFlags::WITH_NAMES_FOR_VALUES) {
                Some(cursor.get_string()?)
            } else {
                None
            };
            let value = cursor.get_bytes()?;
            params.values.push(BindValue { name, value });
        }
    }
    if flags.contains(QueryFlags::PAGE_SIZE) {
        params.page_size = Some(cursor.get_int()?);
    }
    if flags.contains(QueryFlags::WITH_PAGING_STATE) {
        params.paging_state = match cursor.get_bytes()? {
            MaybeBytes::Value(b) => Some(b),
            MaybeBytes::Null | MaybeBytes::Unset => None,
        };
    }
    if flags.contains(QueryFlags::WITH_SERIAL_CONSISTENCY) {
        params.serial_consistency = Some(cursor.get_consistency()?);
    }
    if flags.contains(QueryFlags::WITH_DEFAULT_TIMESTAMP) {
        params.default_timestamp = Some(cursor.get_long()?);
    }
    Ok(params)
}

/// Body of a `STARTUP` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Startup {
    /// `CQL_VERSION` and any optional negotiation keys (`COMPRESSION`,
    /// `NO_COMPACT`, `THROW_ON_OVERLOAD`).
    pub options: Vec<(String, String)>,
}

impl Startup {
    /// Builds the `STARTUP` body for the given CQL version and optional
    /// compression algorithm name.
    #[must_use]
    pub fn new(cql_version: &str, compression: Option<&str>) -> Self {
        let mut options = vec![("CQL_VERSION".to_owned(), cql_version.to_owned())];
        if let Some(c) = compression {
            options.push(("COMPRESSION".to_owned(), c.to_owned()));
        }
        Self { options }
    }

    /// Looks up `COMPRESSION`, if present.
    #[must_use]
    pub fn compression(&self) -> Option<&str> {
        self.options.iter().find(|(k, _)| k == "COMPRESSION").map(|(_, v)| v.as_str())
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_string_map(buf, &self.options);
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self { options: cursor.get_string_map()? })
    }
}

/// Body of a `QUERY` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// The CQL text, opaque to this core.
    pub text: String,
    /// Consistency level for the statement.
    pub consistency: Consistency,
    /// Bind values and paging/timestamp parameters.
    pub params: QueryParams,
}

impl Query {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_long_string(buf, &self.text);
        encode_query_params(buf, self.consistency, &self.params);
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let text = cursor.get_long_string()?;
        let (consistency, flags) = decode_query_params(cursor)?;
        let params = decode_query_param_fields(cursor, flags)?;
        Ok(Self { text, consistency, params })
    }
}

/// Body of a `PREPARE` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    /// The CQL text to prepare.
    pub text: String,
}

impl Prepare {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_long_string(buf, &self.text);
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self { text: cursor.get_long_string()? })
    }
}

/// Body of an `EXECUTE` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execute {
    /// The server-assigned prepared-statement id.
    pub prepared_id: Bytes,
    /// Consistency level for the statement.
    pub consistency: Consistency,
    /// Bind values and paging/timestamp parameters.
    pub params: QueryParams,
}

impl Execute {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_short_bytes(buf, &self.prepared_id);
        encode_query_params(buf, self.consistency, &self.params);
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let prepared_id = cursor.get_short_bytes()?;
        let (consistency, flags) = decode_query_params(cursor)?;
        let params = decode_query_param_fields(cursor, flags)?;
        Ok(Self { prepared_id, consistency, params })
    }
}

/// Event categories a client may `REGISTER` for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Node joined or left the cluster.
    TopologyChange,
    /// Node status changed (up/down).
    StatusChange,
    /// A schema object was created, altered, or dropped.
    SchemaChange,
}

impl EventType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::TopologyChange => "TOPOLOGY_CHANGE",
            Self::StatusChange => "STATUS_CHANGE",
            Self::SchemaChange => "SCHEMA_CHANGE",
        }
    }

    fn parse(s: &str) -> Result<Self, CodecError> {
        Ok(match s {
            "TOPOLOGY_CHANGE" => Self::TopologyChange,
            "STATUS_CHANGE" => Self::StatusChange,
            "SCHEMA_CHANGE" => Self::SchemaChange,
            other => {
                return Err(CodecError::BadColumnData {
                    type_name: "event type",
                    reason: format!("unknown event type {other}"),
                });
            },
        })
    }
}

/// Body of a `REGISTER` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    /// The set of event categories to subscribe to.
    pub events: Vec<EventType>,
}

impl Register {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let names: Vec<String> = self.events.iter().map(|e| e.as_str().to_owned()).collect();
        put_string_list(buf, &names);
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let names = cursor.get_string_list()?;
        let events = names.iter().map(|n| EventType::parse(n)).collect::<Result<_, _>>()?;
        Ok(Self { events })
    }
}

/// Body of a server-pushed `EVENT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `TOPOLOGY_CHANGE`: change kind plus the affected node's address.
    TopologyChange { change: String, address: (Vec<u8>, i32) },
    /// `STATUS_CHANGE`: change kind plus the affected node's address.
    StatusChange { change: String, address: (Vec<u8>, i32) },
    /// `SCHEMA_CHANGE`: change kind, target kind, and target-dependent
    /// names (keyspace, and optionally object name).
    SchemaChange { change: String, target: String, names: Vec<String> },
}

impl Event {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::TopologyChange { change, address } => {
                put_string(buf, "TOPOLOGY_CHANGE");
                put_string(buf, change);
                primitive::put_inet(buf, &address.0, address.1);
            },
            Self::StatusChange { change, address } => {
                put_string(buf, "STATUS_CHANGE");
                put_string(buf, change);
                primitive::put_inet(buf, &address.0, address.1);
            },
            Self::SchemaChange { change, target, names } => {
                put_string(buf, "SCHEMA_CHANGE");
                put_string(buf, change);
                put_string(buf, target);
                for name in names {
                    put_string(buf, name);
                }
            },
        }
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let kind = cursor.get_string()?;
        match kind.as_str() {
            "TOPOLOGY_CHANGE" => {
                let change = cursor.get_string()?;
                let address = cursor.get_inet()?;
                Ok(Self::TopologyChange { change, address })
            },
            "STATUS_CHANGE" => {
                let change = cursor.get_string()?;
                let address = cursor.get_inet()?;
                Ok(Self::StatusChange { change, address })
            },
            "SCHEMA_CHANGE" => {
                let change = cursor.get_string()?;
                let target = cursor.get_string()?;
                let mut names = Vec::new();
                // KEYSPACE changes carry just the keyspace name; TABLE/TYPE/
                // FUNCTION/AGGREGATE changes carry keyspace + object name.
                while cursor.remaining() > 0 {
                    names.push(cursor.get_string()?);
                }
                Ok(Self::SchemaChange { change, target, names })
            },
            other => Err(CodecError::BadColumnData {
                type_name: "event type",
                reason: format!("unknown event type {other}"),
            }),
        }
    }
}

/// Body of an `ERROR` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    /// The server's numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_int(buf, self.code);
        put_string(buf, &self.message);
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let code = cursor.get_int()?;
        let message = cursor.get_string()?;
        Ok(Self { code, message })
    }
}

/// Body of a `SUPPORTED` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supported {
    /// Option name to list of supported values (e.g. `COMPRESSION` ->
    /// `["snappy", "lz4"]`).
    pub options: Vec<(String, Vec<String>)>,
}

impl Supported {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        put_string_multimap(buf, &self.options);
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        Ok(Self { options: cursor.get_string_multimap()? })
    }
}

/// A single column's schema as carried in `RESULT` metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Owning keyspace (absent when global table spec applies).
    pub keyspace: Option<String>,
    /// Owning table (absent when global table spec applies).
    pub table: Option<String>,
    /// Column name.
    pub name: String,
    /// Column type.
    pub ty: ColumnType,
}

/// Metadata describing a `Rows` result or an `EXECUTE` bind-parameter set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMetadata {
    /// Whether column specs carry per-column keyspace/table or share one
    /// global spec.
    pub global_table_spec: Option<(String, String)>,
    /// Opaque paging-state token, present when more pages remain.
    pub paging_state: Option<Bytes>,
    /// Per-column schema, in result order.
    pub columns: Vec<ColumnSpec>,
}

/// The `kind`-tagged body of a `RESULT` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultBody {
    /// `0x0001` — statement executed, no rows returned.
    Void,
    /// `0x0002` — a row set.
    Rows { metadata: ResultMetadata, rows: Vec<Vec<MaybeBytes>> },
    /// `0x0003` — a `USE` statement changed the current keyspace.
    SetKeyspace(String),
    /// `0x0004` — the statement was prepared.
    Prepared {
        /// Server-assigned opaque id for subsequent `EXECUTE`s.
        id: Bytes,
        /// Bind-parameter metadata (one entry per `?` placeholder).
        bind_metadata: ResultMetadata,
        /// Result-set metadata for rows this statement will return.
        result_metadata: ResultMetadata,
    },
    /// `0x0005` — a schema object was created, altered, or dropped as a
    /// direct effect of the statement (as opposed to a pushed `EVENT`).
    SchemaChange { change: String, target: String, names: Vec<String> },
}

const RESULT_KIND_VOID: i32 = 0x0001;
const RESULT_KIND_ROWS: i32 = 0x0002;
const RESULT_KIND_SET_KEYSPACE: i32 = 0x0003;
const RESULT_KIND_PREPARED: i32 = 0x0004;
const RESULT_KIND_SCHEMA_CHANGE: i32 = 0x0005;

bitflags::bitflags! {
    struct RowsFlags: i32 {
        const GLOBAL_TABLES_SPEC = 0x0001;
        const HAS_MORE_PAGES = 0x0002;
        const NO_METADATA = 0x0004;
    }
}

fn encode_column_type(buf: &mut BytesMut, ty: &ColumnType) {
    let (id, custom_name): (u16, Option<&str>) = match ty {
        ColumnType::Custom(name) => (0x0000, Some(name.as_str())),
        ColumnType::Ascii => (0x0001, None),
        ColumnType::BigInt => (0x0002, None),
        ColumnType::Blob => (0x0003, None),
        ColumnType::Boolean => (0x0004, None),
        ColumnType::Counter => (0x0005, None),
        ColumnType::Decimal => (0x0006, None),
        ColumnType::Double => (0x0007, None),
        ColumnType::Float => (0x0008, None),
        ColumnType::Int => (0x0009, None),
        ColumnType::Timestamp => (0x000B, None),
        ColumnType::Uuid => (0x000C, None),
        ColumnType::Varchar => (0x000D, None),
        ColumnType::Varint => (0x000E, None),
        ColumnType::TimeUuid => (0x000F, None),
        ColumnType::Inet => (0x0010, None),
        ColumnType::Date => (0x0011, None),
        ColumnType::Time => (0x0012, None),
        ColumnType::SmallInt => (0x0013, None),
        ColumnType::TinyInt => (0x0014, None),
        ColumnType::List(_) => (0x0020, None),
        ColumnType::Map(_, _) => (0x0021, None),
        ColumnType::Set(_) => (0x0022, None),
        ColumnType::Udt { .. } => (0x0030, None),
        ColumnType::Tuple(_) => (0x0031, None),
    };
    put_short(buf, id);
    match ty {
        ColumnType::Custom(_) => {
            // `custom_name` is `Some` exactly when `ty` is `Custom`, set in
            // the match above that produced it.
            #[allow(clippy::expect_used)]
            let name = custom_name.expect("Custom always pairs with Some(name) above");
            put_string(buf, name);
        },
        ColumnType::List(elem) | ColumnType::Set(elem) => encode_column_type(buf, elem),
        ColumnType::Map(k, v) => {
            encode_column_type(buf, k);
            encode_column_type(buf, v);
        },
        ColumnType::Tuple(elems) => {
            put_short(buf, elems.len() as u16);
            for e in elems {
                encode_column_type(buf, e);
            }
        },
        ColumnType::Udt { keyspace, name, fields } => {
            put_string(buf, keyspace);
            put_string(buf, name);
            put_short(buf, fields.len() as u16);
            for f in fields {
                put_string(buf, &f.name);
                encode_column_type(buf, &f.ty);
            }
        },
        _ => {},
    }
}

fn decode_column_type(cursor: &mut Cursor<'_>) -> Result<ColumnType, CodecError> {
    let id = cursor.get_short()?;
    Ok(match id {
        0x0000 => ColumnType::Custom(cursor.get_string()?),
        0x0001 => ColumnType::Ascii,
        0x0002 => ColumnType::BigInt,
        0x0003 => ColumnType::Blob,
        0x0004 => ColumnType::Boolean,
        0x0005 => ColumnType::Counter,
        0x0006 => ColumnType::Decimal,
        0x0007 => ColumnType::Double,
        0x0008 => ColumnType::Float,
        0x0009 => ColumnType::Int,
        0x000B => ColumnType::Timestamp,
        0x000C => ColumnType::Uuid,
        0x000D => ColumnType::Varchar,
        0x000E => ColumnType::Varint,
        0x000F => ColumnType::TimeUuid,
        0x0010 => ColumnType::Inet,
        0x0011 => ColumnType::Date,
        0x0012 => ColumnType::Time,
        0x0013 => ColumnType::SmallInt,
        0x0014 => ColumnType::TinyInt,
        0x0020 => ColumnType::List(Box::new(decode_column_type(cursor)?)),
        0x0021 => {
            let k = decode_column_type(cursor)?;
            let v = decode_column_type(cursor)?;
            ColumnType::Map(Box::new(k), Box::new(v))
        },
        0x0022 => ColumnType::Set(Box::new(decode_column_type(cursor)?)),
        0x0030 => {
            let keyspace = cursor.get_string()?;
            let name = cursor.get_string()?;
            let count = cursor.get_short()?;
            let mut fields = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let field_name = cursor.get_string()?;
                let ty = decode_column_type(cursor)?;
                fields.push(crate::value::UdtField { name: field_name, ty });
            }
            ColumnType::Udt { keyspace, name, fields }
        },
        0x0031 => {
            let count = cursor.get_short()?;
            let mut elems = Vec::with_capacity(count as usize);
            for _ in 0..count {
                elems.push(decode_column_type(cursor)?);
            }
            ColumnType::Tuple(elems)
        },
        other => {
            return Err(CodecError::BadColumnData {
                type_name: "column type id",
                reason: format!("unknown type id {other:#06x}"),
            });
        },
    })
}

fn encode_metadata(buf: &mut BytesMut, metadata: &ResultMetadata) {
    let mut flags = RowsFlags::empty();
    if metadata.global_table_spec.is_some() {
        flags |= RowsFlags::GLOBAL_TABLES_SPEC;
    }
    if metadata.paging_state.is_some() {
        flags |= RowsFlags::HAS_MORE_PAGES;
    }
    put_int(buf, flags.bits());
    put_int(buf, metadata.columns.len() as i32);
    if let Some(state) = &metadata.paging_state {
        put_bytes(buf, &MaybeBytes::Value(state.clone()));
    }
    if let Some((ks, table)) = &metadata.global_table_spec {
        put_string(buf, ks);
        put_string(buf, table);
    }
    for col in &metadata.columns {
        if metadata.global_table_spec.is_none() {
            put_string(buf, col.keyspace.as_deref().unwrap_or_default());
            put_string(buf, col.table.as_deref().unwrap_or_default());
        }
        put_string(buf, &col.name);
        encode_column_type(buf, &col.ty);
    }
}

fn decode_metadata(cursor: &mut Cursor<'_>) -> Result<ResultMetadata, CodecError> {
    let flags = RowsFlags::from_bits_truncate(cursor.get_int()?);
    let column_count = cursor.get_int()?;
    if column_count < 0 {
        return Err(CodecError::NegativeLength(column_count));
    }
    let paging_state = if flags.contains(RowsFlags::HAS_MORE_PAGES) {
        match cursor.get_bytes()? {
            MaybeBytes::Value(b) => Some(b),
            MaybeBytes::Null | MaybeBytes::Unset => None,
        }
    } else {
        None
    };
    let global_table_spec = if flags.contains(RowsFlags::GLOBAL_TABLES_SPEC) {
        Some((cursor.get_string()?, cursor.get_string()?))
    } else {
        None
    };
    let no_metadata = flags.contains(RowsFlags::NO_METADATA);
    let mut columns = Vec::new();
    if !no_metadata {
        for _ in 0..column_count {
            let (keyspace, table) = if let Some((ks, table)) = &global_table_spec {
                (Some(ks.clone()), Some(table.clone()))
            } else {
                (Some(cursor.get_string()?), Some(cursor.get_string()?))
            };
            let name = cursor.get_string()?;
            let ty = decode_column_type(cursor)?;
            columns.push(ColumnSpec { keyspace, table, name, ty });
        }
    }
    Ok(ResultMetadata { global_table_spec, paging_state, columns })
}

impl ResultBody {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Void => put_int(buf, RESULT_KIND_VOID),
            Self::Rows { metadata, rows } => {
                put_int(buf, RESULT_KIND_ROWS);
                encode_metadata(buf, metadata);
                put_int(buf, rows.len() as i32);
                for row in rows {
                    for value in row {
                        put_bytes(buf, value);
                    }
                }
            },
            Self::SetKeyspace(ks) => {
                put_int(buf, RESULT_KIND_SET_KEYSPACE);
                put_string(buf, ks);
            },
            Self::Prepared { id, bind_metadata, result_metadata } => {
                put_int(buf, RESULT_KIND_PREPARED);
                put_short_bytes(buf, id);
                encode_metadata(buf, bind_metadata);
                encode_metadata(buf, result_metadata);
            },
            Self::SchemaChange { change, target, names } => {
                put_int(buf, RESULT_KIND_SCHEMA_CHANGE);
                put_string(buf, change);
                put_string(buf, target);
                for name in names {
                    put_string(buf, name);
                }
            },
        }
    }

    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let kind = cursor.get_int()?;
        Ok(match kind {
            RESULT_KIND_VOID => Self::Void,
            RESULT_KIND_ROWS => {
                let metadata = decode_metadata(cursor)?;
                let row_count = cursor.get_int()?;
                if row_count < 0 {
                    return Err(CodecError::NegativeLength(row_count));
                }
                let mut rows = Vec::with_capacity(row_count as usize);
                for _ in 0..row_count {
                    let mut row = Vec::with_capacity(metadata.columns.len());
                    for _ in 0..metadata.columns.len() {
                        row.push(cursor.get_bytes()?);
                    }
                    rows.push(row);
                }
                Self::Rows { metadata, rows }
            },
            RESULT_KIND_SET_KEYSPACE => Self::SetKeyspace(cursor.get_string()?),
            RESULT_KIND_PREPARED => {
                let id = cursor.get_short_bytes()?;
                let bind_metadata = decode_metadata(cursor)?;
                let result_metadata = decode_metadata(cursor)?;
                Self::Prepared { id, bind_metadata, result_metadata }
            },
            RESULT_KIND_SCHEMA_CHANGE => {
                let change = cursor.get_string()?;
                let target = cursor.get_string()?;
                let mut names = Vec::new();
                while cursor.remaining() > 0 {
                    names.push(cursor.get_string()?);
                }
                Self::SchemaChange { change, target, names }
            },
            other => return Err(CodecError::UnknownResultKind(other)),
        })
    }
}

/// A frame body, tagged by the opcode it belongs to. This is the public
/// entry point for building request bodies and interpreting response
/// bodies; callers never touch [`primitive::Cursor`] directly.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Payload {
    /// `STARTUP` request body.
    Startup(Startup),
    /// `OPTIONS` request body (empty).
    Options,
    /// `QUERY` request body.
    Query(Query),
    /// `PREPARE` request body.
    Prepare(Prepare),
    /// `EXECUTE` request body.
    Execute(Execute),
    /// `REGISTER` request body.
    Register(Register),
    /// `ERROR` response body.
    Error(ErrorBody),
    /// `READY` response body (empty).
    Ready,
    /// `AUTHENTICATE` response body: the authenticator class name.
    Authenticate(String),
    /// `SUPPORTED` response body.
    Supported(Supported),
    /// `RESULT` response body.
    Result(ResultBody),
    /// `EVENT` response body.
    Event(Event),
}

impl Payload {
    /// The opcode this payload is carried under.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Startup(_) => Opcode::Startup,
            Self::Options => Opcode::Options,
            Self::Query(_) => Opcode::Query,
            Self::Prepare(_) => Opcode::Prepare,
            Self::Execute(_) => Opcode::Execute,
            Self::Register(_) => Opcode::Register,
            Self::Error(_) => Opcode::Error,
            Self::Ready => Opcode::Ready,
            Self::Authenticate(_) => Opcode::Authenticate,
            Self::Supported(_) => Opcode::Supported,
            Self::Result(_) => Opcode::Result,
            Self::Event(_) => Opcode::Event,
        }
    }

    /// Encodes this payload's body bytes, ready to be wrapped in a
    /// [`crate::Frame`] by the caller.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Self::Startup(body) => body.encode(&mut buf),
            Self::Options | Self::Ready => {},
            Self::Query(body) => body.encode(&mut buf),
            Self::Prepare(body) => body.encode(&mut buf),
            Self::Execute(body) => body.encode(&mut buf),
            Self::Register(body) => body.encode(&mut buf),
            Self::Error(body) => body.encode(&mut buf),
            Self::Authenticate(name) => put_string(&mut buf, name),
            Self::Supported(body) => body.encode(&mut buf),
            Self::Result(body) => body.encode(&mut buf),
            Self::Event(body) => body.encode(&mut buf),
        }
        buf.freeze()
    }

    /// Decodes a payload given the opcode it arrived under. Any bytes
    /// left over once the decoder for that opcode is done are tolerated
    /// (see the design note on trailing bytes) rather than treated as an
    /// error.
    pub fn decode(opcode: Opcode, body: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(body);
        let payload = match opcode {
            Opcode::Startup => Self::Startup(Startup::decode(&mut cursor)?),
            Opcode::Options => Self::Options,
            Opcode::Query => Self::Query(Query::decode(&mut cursor)?),
            Opcode::Prepare => Self::Prepare(Prepare::decode(&mut cursor)?),
            Opcode::Execute => Self::Execute(Execute::decode(&mut cursor)?),
            Opcode::Register => Self::Register(Register::decode(&mut cursor)?),
            Opcode::Error => Self::Error(ErrorBody::decode(&mut cursor)?),
            Opcode::Ready => Self::Ready,
            Opcode::Authenticate => Self::Authenticate(cursor.get_string()?),
            Opcode::Supported => Self::Supported(Supported::decode(&mut cursor)?),
            Opcode::Result => Self::Result(ResultBody::decode(&mut cursor)?),
            Opcode::Event => Self::Event(Event::decode(&mut cursor)?),
            other => {
                return Err(CodecError::UnknownOpcode(other.as_u8()));
            },
        };
        if cursor.remaining() > 0 {
            tracing::debug!(opcode = ?opcode, leftover = cursor.remaining(), "trailing bytes in frame body");
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_round_trips() {
        let startup = Startup::new("3.4.4", Some("lz4"));
        let mut buf = BytesMut::new();
        startup.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        let decoded = Startup::decode(&mut cursor).expect("decodes");
        assert_eq!(decoded.compression(), Some("lz4"));
        assert_eq!(decoded, startup);
    }

    #[test]
    fn query_with_positional_values_round_trips() {
        let query = Query {
            text: "SELECT * FROM t WHERE k=?".to_owned(),
            consistency: Consistency::One,
            params: QueryParams {
                values: vec![BindValue {
                    name: None,
                    value: MaybeBytes::Value(Bytes::copy_from_slice(&42i32.to_be_bytes())),
                }],
                ..Default::default()
            },
        };
        let mut buf = BytesMut::new();
        query.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        let decoded = Query::decode(&mut cursor).expect("decodes");
        assert_eq!(decoded, query);
    }

    #[test]
    fn void_result_round_trips() {
        let result = ResultBody::Void;
        let mut buf = BytesMut::new();
        result.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(ResultBody::decode(&mut cursor).expect("decodes"), result);
    }

    #[test]
    fn rows_result_round_trips_with_scalar_column() {
        let metadata = ResultMetadata {
            global_table_spec: Some(("ks".to_owned(), "t".to_owned())),
            paging_state: None,
            columns: vec![ColumnSpec {
                keyspace: None,
                table: None,
                name: "k".to_owned(),
                ty: ColumnType::Int,
            }],
        };
        let rows = vec![vec![MaybeBytes::Value(Bytes::copy_from_slice(&7i32.to_be_bytes()))]];
        let result = ResultBody::Rows { metadata, rows };
        let mut buf = BytesMut::new();
        result.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(ResultBody::decode(&mut cursor).expect("decodes"), result);
    }

    #[test]
    fn prepared_result_round_trips() {
        let bind_metadata = ResultMetadata {
            global_table_spec: Some(("ks".to_owned(), "t".to_owned())),
            paging_state: None,
            columns: vec![ColumnSpec {
                keyspace: None,
                table: None,
                name: "k".to_owned(),
                ty: ColumnType::Int,
            }],
        };
        let result_metadata = ResultMetadata { global_table_spec: None, paging_state: None, columns: vec![] };
        let result = ResultBody::Prepared {
            id: Bytes::from_static(b"\x01\x02\x03\x04"),
            bind_metadata,
            result_metadata,
        };
        let mut buf = BytesMut::new();
        result.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(ResultBody::decode(&mut cursor).expect("decodes"), result);
    }

    #[test]
    fn schema_change_event_round_trips() {
        let event = Event::SchemaChange {
            change: "CREATED".to_owned(),
            target: "TABLE".to_owned(),
            names: vec!["ks".to_owned(), "t".to_owned()],
        };
        let mut buf = BytesMut::new();
        event.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(Event::decode(&mut cursor).expect("decodes"), event);
    }

    #[test]
    fn error_body_round_trips() {
        let err = ErrorBody { code: 0x2200, message: "invalid query".to_owned() };
        let mut buf = BytesMut::new();
        err.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(ErrorBody::decode(&mut cursor).expect("decodes"), err);
    }

    #[test]
    fn register_round_trips() {
        let reg = Register { events: vec![EventType::SchemaChange, EventType::StatusChange] };
        let mut buf = BytesMut::new();
        reg.encode(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(Register::decode(&mut cursor).expect("decodes"), reg);
    }
}
