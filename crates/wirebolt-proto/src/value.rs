//! Column type descriptors and typed decoding of `[bytes]` column payloads.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::CodecError;
use crate::primitive::{Cursor, MaybeBytes};

/// A field of a user-defined type: name plus the field's own type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdtField {
    /// Field name as declared in the schema.
    pub name: String,
    /// Field type.
    pub ty: ColumnType,
}

/// The type descriptor attached to every column in a result set and every
/// bind parameter of a prepared statement. Recursive: collection and
/// tuple/UDT kinds carry nested descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ColumnType {
    /// `ascii`
    Ascii,
    /// `bigint`
    BigInt,
    /// `blob`
    Blob,
    /// `boolean`
    Boolean,
    /// `counter`
    Counter,
    /// `decimal`
    Decimal,
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int`
    Int,
    /// `timestamp`
    Timestamp,
    /// `uuid`
    Uuid,
    /// `varchar`
    Varchar,
    /// `varint`
    Varint,
    /// `timeuuid`
    TimeUuid,
    /// `inet`
    Inet,
    /// `date`
    Date,
    /// `time`
    Time,
    /// `smallint`
    SmallInt,
    /// `tinyint`
    TinyInt,
    /// `list<T>`
    List(Box<ColumnType>),
    /// `set<T>`
    Set(Box<ColumnType>),
    /// `map<K, V>`
    Map(Box<ColumnType>, Box<ColumnType>),
    /// `tuple<T...>`
    Tuple(Vec<ColumnType>),
    /// A user-defined type: keyspace, type name, and its fields in
    /// declaration order.
    Udt {
        /// Owning keyspace.
        keyspace: String,
        /// Type name.
        name: String,
        /// Fields in declaration order.
        fields: Vec<UdtField>,
    },
    /// A custom type identified only by its Java class name; this core
    /// recognises but does not decode custom payloads.
    Custom(String),
}

/// A decoded column value. `Null` is distinct from, e.g., an empty blob or
/// an empty string.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// SQL-style null; the column's `[bytes]` length was `-1`.
    Null,
    /// Parameter explicitly left unset; only ever produced when decoding
    /// values the client itself sent, never seen in a server response.
    Unset,
    Ascii(String),
    BigInt(i64),
    Blob(Bytes),
    Boolean(bool),
    Counter(i64),
    /// Unscaled value and scale, matching the wire representation; not
    /// resolved to a host decimal type (no such dependency is in scope).
    Decimal(Bytes, i32),
    Double(f64),
    Float(f32),
    Int(i32),
    /// Milliseconds since the epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
    Varchar(String),
    /// Arbitrary-precision integer, stored as its big-endian two's
    /// complement wire bytes.
    Varint(Bytes),
    TimeUuid([u8; 16]),
    Inet(Vec<u8>),
    /// Days since the epoch, offset by 2^31 per the wire format.
    Date(u32),
    /// Nanoseconds since midnight.
    Time(i64),
    SmallInt(i16),
    TinyInt(i8),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
    Udt(BTreeMap<String, Value>),
    /// Raw bytes for a custom type.
    Custom(Bytes),
}

/// Decodes one column's raw `[bytes]` payload according to its declared
/// type. A present-but-empty payload is decoded structurally (e.g. an
/// empty `Blob`); `MaybeBytes::Null` always decodes to [`Value::Null`]
/// regardless of type.
pub fn decode_value(raw: &MaybeBytes, ty: &ColumnType) -> Result<Value, CodecError> {
    let bytes = match raw {
        MaybeBytes::Null => return Ok(Value::Null),
        MaybeBytes::Unset => return Ok(Value::Unset),
        MaybeBytes::Value(b) => b,
    };
    decode_typed(bytes, ty)
}

fn type_name(ty: &ColumnType) -> &'static str {
    match ty {
        ColumnType::Ascii => "ascii",
        ColumnType::BigInt => "bigint",
        ColumnType::Blob => "blob",
        ColumnType::Boolean => "boolean",
        ColumnType::Counter => "counter",
        ColumnType::Decimal => "decimal",
        ColumnType::Double => "double",
        ColumnType::Float => "float",
        ColumnType::Int => "int",
        ColumnType::Timestamp => "timestamp",
        ColumnType::Uuid => "uuid",
        ColumnType::Varchar => "varchar",
        ColumnType::Varint => "varint",
        ColumnType::TimeUuid => "timeuuid",
        ColumnType::Inet => "inet",
        ColumnType::Date => "date",
        ColumnType::Time => "time",
        ColumnType::SmallInt => "smallint",
        ColumnType::TinyInt => "tinyint",
        ColumnType::List(_) => "list",
        ColumnType::Set(_) => "set",
        ColumnType::Map(_, _) => "map",
        ColumnType::Tuple(_) => "tuple",
        ColumnType::Udt { .. } => "udt",
        ColumnType::Custom(_) => "custom",
    }
}

fn bad(ty: &ColumnType, reason: impl Into<String>) -> CodecError {
    CodecError::BadColumnData { type_name: type_name(ty), reason: reason.into() }
}

fn decode_typed(bytes: &Bytes, ty: &ColumnType) -> Result<Value, CodecError> {
    match ty {
        ColumnType::Ascii => {
            str_from_ascii(bytes).map(Value::Ascii).ok_or_else(|| bad(ty, "not ascii"))
        },
        ColumnType::Varchar => {
            String::from_utf8(bytes.to_vec()).map(Value::Varchar).map_err(|_| bad(ty, "not utf-8"))
        },
        ColumnType::BigInt | ColumnType::Counter => {
            let v = fixed_i64(bytes).ok_or_else(|| bad(ty, "expected 8 bytes"))?;
            Ok(if matches!(ty, ColumnType::Counter) { Value::Counter(v) } else { Value::BigInt(v) })
        },
        ColumnType::Int => fixed_i32(bytes).map(Value::Int).ok_or_else(|| bad(ty, "expected 4 bytes")),
        ColumnType::SmallInt => {
            let b: [u8; 2] = bytes.as_ref().try_into().map_err(|_| bad(ty, "expected 2 bytes"))?;
            Ok(Value::SmallInt(i16::from_be_bytes(b)))
        },
        ColumnType::TinyInt => {
            let b: [u8; 1] = bytes.as_ref().try_into().map_err(|_| bad(ty, "expected 1 byte"))?;
            Ok(Value::TinyInt(i8::from_be_bytes(b)))
        },
        ColumnType::Float => {
            let b: [u8; 4] = bytes.as_ref().try_into().map_err(|_| bad(ty, "expected 4 bytes"))?;
            Ok(Value::Float(f32::from_be_bytes(b)))
        },
        ColumnType::Double => {
            let b: [u8; 8] = bytes.as_ref().try_into().map_err(|_| bad(ty, "expected 8 bytes"))?;
            Ok(Value::Double(f64::from_be_bytes(b)))
        },
        ColumnType::Timestamp => {
            fixed_i64(bytes).map(Value::Timestamp).ok_or_else(|| bad(ty, "expected 8 bytes"))
        },
        ColumnType::Time => fixed_i64(bytes).map(Value::Time).ok_or_else(|| bad(ty, "expected 8 bytes")),
        ColumnType::Date => {
            let b: [u8; 4] = bytes.as_ref().try_into().map_err(|_| bad(ty, "expected 4 bytes"))?;
            Ok(Value::Date(u32::from_be_bytes(b)))
        },
        ColumnType::Boolean => {
            let b = bytes.first().ok_or_else(|| bad(ty, "expected 1 byte"))?;
            Ok(Value::Boolean(*b != 0))
        },
        ColumnType::Blob => Ok(Value::Blob(bytes.clone())),
        ColumnType::Varint => Ok(Value::Varint(bytes.clone())),
        ColumnType::Custom(_) => Ok(Value::Custom(bytes.clone())),
        ColumnType::Decimal => {
            if bytes.len() < 4 {
                return Err(bad(ty, "expected at least 4 bytes"));
            }
            // Length checked immediately above; this conversion cannot fail.
            #[allow(clippy::expect_used)]
            let scale_bytes: [u8; 4] = bytes[..4].try_into().expect("checked length above");
            Ok(Value::Decimal(bytes.slice(4..), i32::from_be_bytes(scale_bytes)))
        },
        ColumnType::Uuid => fixed_uuid(bytes).map(Value::Uuid).ok_or_else(|| bad(ty, "expected 16 bytes")),
        ColumnType::TimeUuid => {
            fixed_uuid(bytes).map(Value::TimeUuid).ok_or_else(|| bad(ty, "expected 16 bytes"))
        },
        ColumnType::Inet => {
            if bytes.len() != 4 && bytes.len() != 16 {
                return Err(bad(ty, "expected 4 or 16 bytes"));
            }
            Ok(Value::Inet(bytes.to_vec()))
        },
        ColumnType::List(elem) => decode_sequence(bytes, elem).map(Value::List),
        ColumnType::Set(elem) => decode_sequence(bytes, elem).map(Value::Set),
        ColumnType::Map(key_ty, val_ty) => {
            let mut cursor = Cursor::new(bytes);
            let count = cursor.get_int()?;
            if count < 0 {
                return Err(bad(ty, "negative map count"));
            }
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let key = decode_collection_element(&mut cursor, key_ty)?;
                let val = decode_collection_element(&mut cursor, val_ty)?;
                entries.push((key, val));
            }
            Ok(Value::Map(entries))
        },
        ColumnType::Tuple(elems) => {
            let mut cursor = Cursor::new(bytes);
            let mut values = Vec::with_capacity(elems.len());
            for elem_ty in elems {
                let raw = cursor.get_bytes()?;
                values.push(decode_value(&raw, elem_ty)?);
            }
            Ok(Value::Tuple(values))
        },
        ColumnType::Udt { fields, .. } => {
            let mut cursor = Cursor::new(bytes);
            let mut map = BTreeMap::new();
            for field in fields {
                let raw = cursor.get_bytes()?;
                map.insert(field.name.clone(), decode_value(&raw, &field.ty)?);
            }
            Ok(Value::Udt(map))
        },
    }
}

fn decode_sequence(bytes: &Bytes, elem_ty: &ColumnType) -> Result<Vec<Value>, CodecError> {
    let mut cursor = Cursor::new(bytes);
    let count = cursor.get_int()?;
    if count < 0 {
        return Err(CodecError::NegativeLength(count));
    }
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        values.push(decode_collection_element(&mut cursor, elem_ty)?);
    }
    Ok(values)
}

fn decode_collection_element(cursor: &mut Cursor<'_>, ty: &ColumnType) -> Result<Value, CodecError> {
    let raw = cursor.get_bytes()?;
    decode_value(&raw, ty)
}

/// Encodes a host value as the `[bytes]` payload its declared column type
/// expects, for use as an `EXECUTE`/`QUERY` bind value. The inverse of
/// [`decode_value`]; used by the session layer to bind parameters against
/// a prepared statement's bind-metadata column specs.
///
/// A type mismatch between `value` and `ty` is reported as
/// [`CodecError::BadColumnData`], which the driver crate surfaces as
/// `DriverError::BadParameter` before any I/O takes place.
pub fn encode_value(value: &Value, ty: &ColumnType) -> Result<MaybeBytes, CodecError> {
    match value {
        Value::Null => return Ok(MaybeBytes::Null),
        Value::Unset => return Ok(MaybeBytes::Unset),
        _ => {},
    }
    let mut buf = bytes::BytesMut::new();
    encode_typed(&mut buf, value, ty)?;
    Ok(MaybeBytes::Value(buf.freeze()))
}

fn encode_typed(buf: &mut bytes::BytesMut, value: &Value, ty: &ColumnType) -> Result<(), CodecError> {
    use crate::primitive::{put_byte, put_int, put_long, put_uuid};

    match (value, ty) {
        (Value::Ascii(s), ColumnType::Ascii) => buf.extend_from_slice(s.as_bytes()),
        (Value::Varchar(s), ColumnType::Varchar) => buf.extend_from_slice(s.as_bytes()),
        (Value::BigInt(v), ColumnType::BigInt) => put_long(buf, *v),
        (Value::Counter(v), ColumnType::Counter) => put_long(buf, *v),
        (Value::Int(v), ColumnType::Int) => put_int(buf, *v),
        (Value::SmallInt(v), ColumnType::SmallInt) => buf.extend_from_slice(&v.to_be_bytes()),
        (Value::TinyInt(v), ColumnType::TinyInt) => buf.extend_from_slice(&v.to_be_bytes()),
        (Value::Float(v), ColumnType::Float) => buf.extend_from_slice(&v.to_be_bytes()),
        (Value::Double(v), ColumnType::Double) => buf.extend_from_slice(&v.to_be_bytes()),
        (Value::Timestamp(v), ColumnType::Timestamp) => put_long(buf, *v),
        (Value::Time(v), ColumnType::Time) => put_long(buf, *v),
        (Value::Date(v), ColumnType::Date) => buf.extend_from_slice(&v.to_be_bytes()),
        (Value::Boolean(v), ColumnType::Boolean) => put_byte(buf, u8::from(*v)),
        (Value::Blob(b), ColumnType::Blob) => buf.extend_from_slice(b),
        (Value::Varint(b), ColumnType::Varint) => buf.extend_from_slice(b),
        (Value::Custom(b), ColumnType::Custom(_)) => buf.extend_from_slice(b),
        (Value::Decimal(unscaled, scale), ColumnType::Decimal) => {
            put_int(buf, *scale);
            buf.extend_from_slice(unscaled);
        },
        (Value::Uuid(v), ColumnType::Uuid) => put_uuid(buf, v),
        (Value::TimeUuid(v), ColumnType::TimeUuid) => put_uuid(buf, v),
        (Value::Inet(addr), ColumnType::Inet) => {
            if addr.len() != 4 && addr.len() != 16 {
                return Err(bad(ty, "expected 4 or 16 address bytes"));
            }
            buf.extend_from_slice(addr);
        },
        (Value::List(items), ColumnType::List(elem)) => encode_sequence(buf, items, elem)?,
        (Value::Set(items), ColumnType::Set(elem)) => encode_sequence(buf, items, elem)?,
        (Value::Map(entries), ColumnType::Map(key_ty, val_ty)) => {
            put_int(buf, entries.len() as i32);
            for (k, v) in entries {
                encode_collection_element(buf, k, key_ty)?;
                encode_collection_element(buf, v, val_ty)?;
            }
        },
        (Value::Tuple(items), ColumnType::Tuple(elem_tys)) => {
            if items.len() != elem_tys.len() {
                return Err(bad(ty, format!("tuple arity mismatch: expected {}, got {}", elem_tys.len(), items.len())));
            }
            for (item, elem_ty) in items.iter().zip(elem_tys) {
                let encoded = encode_value(item, elem_ty)?;
                put_bytes_helper(buf, &encoded);
            }
        },
        (Value::Udt(fields), ColumnType::Udt { fields: schema, .. }) => {
            for field in schema {
                let item = fields.get(&field.name).unwrap_or(&Value::Null);
                let encoded = encode_value(item, &field.ty)?;
                put_bytes_helper(buf, &encoded);
            }
        },
        _ => return Err(bad(ty, format!("value {value:?} is not a {}", type_name(ty)))),
    }
    Ok(())
}

fn encode_sequence(buf: &mut bytes::BytesMut, items: &[Value], elem_ty: &ColumnType) -> Result<(), CodecError> {
    use crate::primitive::put_int;
    put_int(buf, items.len() as i32);
    for item in items {
        encode_collection_element(buf, item, elem_ty)?;
    }
    Ok(())
}

fn encode_collection_element(buf: &mut bytes::BytesMut, value: &Value, ty: &ColumnType) -> Result<(), CodecError> {
    let encoded = encode_value(value, ty)?;
    put_bytes_helper(buf, &encoded);
    Ok(())
}

fn put_bytes_helper(buf: &mut bytes::BytesMut, value: &MaybeBytes) {
    crate::primitive::put_bytes(buf, value);
}

fn str_from_ascii(bytes: &Bytes) -> Option<String> {
    if bytes.is_ascii() { String::from_utf8(bytes.to_vec()).ok() } else { None }
}

fn fixed_i64(bytes: &Bytes) -> Option<i64> {
    let arr: [u8; 8] = bytes.as_ref().try_into().ok()?;
    Some(i64::from_be_bytes(arr))
}

fn fixed_i32(bytes: &Bytes) -> Option<i32> {
    let arr: [u8; 4] = bytes.as_ref().try_into().ok()?;
    Some(i32::from_be_bytes(arr))
}

fn fixed_uuid(bytes: &Bytes) -> Option<[u8; 16]> {
    bytes.as_ref().try_into().ok()
}
