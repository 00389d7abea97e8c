//! Encoders and decoders for the primitive wire types of the native
//! protocol: `int`, `long`, `short`, `byte`, `string`, `long string`,
//! `uuid`, `string list`, `bytes`, `short bytes`, `inet`, `string map`,
//! `string multimap`, `consistency`.
//!
//! Decoding is done over a simple byte cursor rather than a `Read` impl:
//! every value is fully buffered before decoding starts (the framer reads
//! one whole frame body before handing it here), so there is no point
//! paying for trait-object or `Read`-adapter overhead.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// A `[bytes]` value as distinguished on the wire: present, explicitly
/// null (length `-1`), or explicitly unset (length `-2`, protocol v4+
/// only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaybeBytes {
    /// A present value.
    Value(Bytes),
    /// Explicit SQL-style null.
    Null,
    /// Explicitly unset (distinct from null; used to skip binding a
    /// parameter so the server falls back to an existing value).
    Unset,
}

/// Replication/consistency level, a `[short]`-encoded enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Consistency {
    /// 0x0000
    Any,
    /// 0x0001
    One,
    /// 0x0002
    Two,
    /// 0x0003
    Three,
    /// 0x0004
    Quorum,
    /// 0x0005
    All,
    /// 0x0006
    LocalQuorum,
    /// 0x0007
    EachQuorum,
    /// 0x0008
    Serial,
    /// 0x0009
    LocalSerial,
    /// 0x000A
    LocalOne,
}

impl Consistency {
    /// Numeric wire value of this consistency level.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Any => 0x0000,
            Self::One => 0x0001,
            Self::Two => 0x0002,
            Self::Three => 0x0003,
            Self::Quorum => 0x0004,
            Self::All => 0x0005,
            Self::LocalQuorum => 0x0006,
            Self::EachQuorum => 0x0007,
            Self::Serial => 0x0008,
            Self::LocalSerial => 0x0009,
            Self::LocalOne => 0x000A,
        }
    }

    /// Parses a consistency level from its wire value.
    pub fn from_u16(value: u16) -> Result<Self, CodecError> {
        Ok(match value {
            0x0000 => Self::Any,
            0x0001 => Self::One,
            0x0002 => Self::Two,
            0x0003 => Self::Three,
            0x0004 => Self::Quorum,
            0x0005 => Self::All,
            0x0006 => Self::LocalQuorum,
            0x0007 => Self::EachQuorum,
            0x0008 => Self::Serial,
            0x0009 => Self::LocalSerial,
            0x000A => Self::LocalOne,
            other => {
                return Err(CodecError::BadColumnData {
                    type_name: "consistency",
                    reason: format!("unknown consistency level {other:#06x}"),
                });
            },
        })
    }
}

/// A cursor over an in-memory frame body, tracking how many bytes have
/// been consumed so trailing-byte anomalies can be detected by the
/// caller.
#[derive(Debug)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Wraps a byte slice for sequential decoding.
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Number of bytes not yet consumed.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Bytes consumed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Truncated { needed: n, available: self.remaining() });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Decodes `[byte]`: a single unsigned byte.
    pub fn get_byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Decodes `[short]`: an unsigned 16-bit big-endian integer.
    pub fn get_short(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Decodes `[int]`: a signed 32-bit big-endian integer.
    pub fn get_int(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Decodes `[long]`: a signed 64-bit big-endian integer.
    pub fn get_long(&mut self) -> Result<i64, CodecError> {
        let b = self.take(8)?;
        // `take(8)` returns a slice of exactly 8 bytes or an error; this
        // conversion cannot fail.
        #[allow(clippy::expect_used)]
        let bytes: [u8; 8] = b.try_into().expect("take(8) guarantees 8 bytes");
        Ok(i64::from_be_bytes(bytes))
    }

    /// Decodes `[string]`: a `[short]` length followed by that many UTF-8
    /// bytes.
    pub fn get_string(&mut self) -> Result<String, CodecError> {
        let len = self.get_short()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Decodes `[long string]`: an `[int]` length followed by that many
    /// UTF-8 bytes.
    pub fn get_long_string(&mut self) -> Result<String, CodecError> {
        let len = self.get_int()?;
        if len < 0 {
            return Err(CodecError::NegativeLength(len));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Decodes `[uuid]`: a fixed 16-byte value.
    pub fn get_uuid(&mut self) -> Result<[u8; 16], CodecError> {
        let b = self.take(16)?;
        // `take(16)` returns a slice of exactly 16 bytes or an error; this
        // conversion cannot fail.
        #[allow(clippy::expect_used)]
        let uuid = b.try_into().expect("take(16) guarantees 16 bytes");
        Ok(uuid)
    }

    /// Decodes `[string list]`: a `[short]` count followed by that many
    /// `[string]`s.
    pub fn get_string_list(&mut self) -> Result<Vec<String>, CodecError> {
        let count = self.get_short()?;
        (0..count).map(|_| self.get_string()).collect()
    }

    /// Decodes `[bytes]`: an `[int]` length followed by that many raw
    /// bytes, or the null (`-1`) / unset (`-2`) sentinels.
    pub fn get_bytes(&mut self) -> Result<MaybeBytes, CodecError> {
        let len = self.get_int()?;
        match len {
            -1 => Ok(MaybeBytes::Null),
            -2 => Ok(MaybeBytes::Unset),
            len if len < -2 => Err(CodecError::NegativeLength(len)),
            len => Ok(MaybeBytes::Value(Bytes::copy_from_slice(self.take(len as usize)?))),
        }
    }

    /// Decodes `[short bytes]`: a `[short]` length followed by that many
    /// raw bytes. Never null.
    pub fn get_short_bytes(&mut self) -> Result<Bytes, CodecError> {
        let len = self.get_short()? as usize;
        Ok(Bytes::copy_from_slice(self.take(len)?))
    }

    /// Decodes `[inet]`: a one-byte address length, that many address
    /// bytes, and an `[int]` port.
    pub fn get_inet(&mut self) -> Result<(Vec<u8>, i32), CodecError> {
        let len = self.get_byte()? as usize;
        let addr = self.take(len)?.to_vec();
        let port = self.get_int()?;
        Ok((addr, port))
    }

    /// Decodes `[string map]`: a `[short]` count of `[string]`-`[string]`
    /// pairs.
    pub fn get_string_map(&mut self) -> Result<Vec<(String, String)>, CodecError> {
        let count = self.get_short()?;
        (0..count).map(|_| Ok((self.get_string()?, self.get_string()?))).collect()
    }

    /// Decodes `[string multimap]`: a `[short]` count of `[string]`-to-
    /// `[string list]` pairs.
    pub fn get_string_multimap(&mut self) -> Result<Vec<(String, Vec<String>)>, CodecError> {
        let count = self.get_short()?;
        (0..count).map(|_| Ok((self.get_string()?, self.get_string_list()?))).collect()
    }

    /// Decodes `[consistency]`: a `[short]`-encoded enum.
    pub fn get_consistency(&mut self) -> Result<Consistency, CodecError> {
        Consistency::from_u16(self.get_short()?)
    }
}

/// Encodes `[byte]`.
pub fn put_byte(buf: &mut BytesMut, v: u8) {
    buf.put_u8(v);
}

/// Encodes `[short]`.
pub fn put_short(buf: &mut BytesMut, v: u16) {
    buf.put_u16(v);
}

/// Encodes `[int]`.
pub fn put_int(buf: &mut BytesMut, v: i32) {
    buf.put_i32(v);
}

/// Encodes `[long]`.
pub fn put_long(buf: &mut BytesMut, v: i64) {
    buf.put_i64(v);
}

/// Encodes `[string]`.
pub fn put_string(buf: &mut BytesMut, v: &str) {
    put_short(buf, v.len() as u16);
    buf.put_slice(v.as_bytes());
}

/// Encodes `[long string]`.
pub fn put_long_string(buf: &mut BytesMut, v: &str) {
    put_int(buf, v.len() as i32);
    buf.put_slice(v.as_bytes());
}

/// Encodes `[uuid]`.
pub fn put_uuid(buf: &mut BytesMut, v: &[u8; 16]) {
    buf.put_slice(v);
}

/// Encodes `[string list]`.
pub fn put_string_list(buf: &mut BytesMut, v: &[String]) {
    put_short(buf, v.len() as u16);
    for s in v {
        put_string(buf, s);
    }
}

/// Encodes `[bytes]`, preserving the null/unset distinction.
pub fn put_bytes(buf: &mut BytesMut, v: &MaybeBytes) {
    match v {
        MaybeBytes::Value(b) => {
            put_int(buf, b.len() as i32);
            buf.put_slice(b);
        },
        MaybeBytes::Null => put_int(buf, -1),
        MaybeBytes::Unset => put_int(buf, -2),
    }
}

/// Encodes `[short bytes]`.
pub fn put_short_bytes(buf: &mut BytesMut, v: &[u8]) {
    put_short(buf, v.len() as u16);
    buf.put_slice(v);
}

/// Encodes `[inet]`.
pub fn put_inet(buf: &mut BytesMut, addr: &[u8], port: i32) {
    put_byte(buf, addr.len() as u8);
    buf.put_slice(addr);
    put_int(buf, port);
}

/// Encodes `[string map]`.
pub fn put_string_map(buf: &mut BytesMut, entries: &[(String, String)]) {
    put_short(buf, entries.len() as u16);
    for (k, v) in entries {
        put_string(buf, k);
        put_string(buf, v);
    }
}

/// Encodes `[string multimap]`.
pub fn put_string_multimap(buf: &mut BytesMut, entries: &[(String, Vec<String>)]) {
    put_short(buf, entries.len() as u16);
    for (k, v) in entries {
        put_string(buf, k);
        put_string_list(buf, v);
    }
}

/// Encodes `[consistency]`.
pub fn put_consistency(buf: &mut BytesMut, c: Consistency) {
    put_short(buf, c.as_u16());
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn arb_maybe_bytes() -> impl Strategy<Value = MaybeBytes> {
        prop_oneof![
            Just(MaybeBytes::Null),
            Just(MaybeBytes::Unset),
            proptest::collection::vec(any::<u8>(), 0..128)
                .prop_map(|v| MaybeBytes::Value(Bytes::from(v))),
        ]
    }

    fn arb_consistency() -> impl Strategy<Value = Consistency> {
        prop_oneof![
            Just(Consistency::Any),
            Just(Consistency::One),
            Just(Consistency::Two),
            Just(Consistency::Three),
            Just(Consistency::Quorum),
            Just(Consistency::All),
            Just(Consistency::LocalQuorum),
            Just(Consistency::EachQuorum),
            Just(Consistency::Serial),
            Just(Consistency::LocalSerial),
            Just(Consistency::LocalOne),
        ]
    }

    proptest! {
        #[test]
        fn string_round_trips(s in "[a-zA-Z0-9_ ]{0,64}") {
            let mut buf = BytesMut::new();
            put_string(&mut buf, &s);
            let mut cursor = Cursor::new(&buf);
            prop_assert_eq!(cursor.get_string().expect("decodes"), s);
            prop_assert_eq!(cursor.remaining(), 0);
        }

        #[test]
        fn long_string_round_trips(s in "[a-zA-Z0-9_ ]{0,256}") {
            let mut buf = BytesMut::new();
            put_long_string(&mut buf, &s);
            let mut cursor = Cursor::new(&buf);
            prop_assert_eq!(cursor.get_long_string().expect("decodes"), s);
        }

        #[test]
        fn int_round_trips(v in any::<i32>()) {
            let mut buf = BytesMut::new();
            put_int(&mut buf, v);
            let mut cursor = Cursor::new(&buf);
            prop_assert_eq!(cursor.get_int().expect("decodes"), v);
        }

        #[test]
        fn long_round_trips(v in any::<i64>()) {
            let mut buf = BytesMut::new();
            put_long(&mut buf, v);
            let mut cursor = Cursor::new(&buf);
            prop_assert_eq!(cursor.get_long().expect("decodes"), v);
        }

        #[test]
        fn bytes_round_trips_preserving_null_and_unset(v in arb_maybe_bytes()) {
            let mut buf = BytesMut::new();
            put_bytes(&mut buf, &v);
            let mut cursor = Cursor::new(&buf);
            prop_assert_eq!(cursor.get_bytes().expect("decodes"), v);
        }

        #[test]
        fn string_list_round_trips(items in proptest::collection::vec("[a-z]{0,16}", 0..8)) {
            let mut buf = BytesMut::new();
            put_string_list(&mut buf, &items);
            let mut cursor = Cursor::new(&buf);
            prop_assert_eq!(cursor.get_string_list().expect("decodes"), items);
        }

        #[test]
        fn consistency_round_trips(c in arb_consistency()) {
            let mut buf = BytesMut::new();
            put_consistency(&mut buf, c);
            let mut cursor = Cursor::new(&buf);
            prop_assert_eq!(cursor.get_consistency().expect("decodes"), c);
        }
    }

    #[test]
    fn truncated_short_is_rejected() {
        let buf = [0_u8; 1];
        let mut cursor = Cursor::new(&buf);
        assert!(matches!(
            cursor.get_short(),
            Err(CodecError::Truncated { needed: 2, available: 1 })
        ));
    }

    #[test]
    fn negative_short_bytes_length_is_impossible_but_long_bytes_null_sentinel_survives() {
        let mut buf = BytesMut::new();
        put_bytes(&mut buf, &MaybeBytes::Null);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.get_bytes().expect("decodes"), MaybeBytes::Null);
    }
}
