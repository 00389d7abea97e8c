//! The 9-byte frame header and the async read/write halves of the framer.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::compression::Compressor;
use crate::error::CodecError;
use crate::opcode::Opcode;

/// Header byte length on the wire; does not vary across opcodes.
pub const HEADER_LEN: usize = 9;

/// Version nibble used by protocol v4.
const PROTOCOL_VERSION: u8 = 0x04;

/// High bit set on the version byte of a response frame.
const DIRECTION_RESPONSE: u8 = 0x80;

/// Bit 0 of the flags byte: body is compressed.
pub const FLAG_COMPRESSION: u8 = 0x01;
/// Bit 1 of the flags byte: tracing was requested/enabled.
pub const FLAG_TRACING: u8 = 0x02;
/// Bit 3 of the flags byte: a warnings list is attached.
pub const FLAG_WARNING: u8 = 0x08;
/// Bit 4 of the flags byte: a custom payload map is attached.
pub const FLAG_CUSTOM_PAYLOAD: u8 = 0x10;

/// The parsed 9-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw version byte, including the request/response direction bit.
    pub version: u8,
    /// Raw flags byte.
    pub flags: u8,
    /// Stream id; `-1` is reserved for server-pushed events.
    pub stream: i16,
    /// Message opcode.
    pub opcode: Opcode,
    /// Declared body length in bytes.
    pub length: u32,
}

impl FrameHeader {
    /// `true` when the compression flag bit is set.
    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSION != 0
    }

    /// `true` when the version byte marks this as a response frame.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        self.version & DIRECTION_RESPONSE != 0
    }

    fn encode(self, buf: &mut BytesMut) {
        buf.extend_from_slice(&[
            self.version,
            self.flags,
            (self.stream >> 8) as u8,
            (self.stream & 0xFF) as u8,
            self.opcode.as_u8(),
        ]);
        buf.extend_from_slice(&self.length.to_be_bytes());
    }

    fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, CodecError> {
        let version = bytes[0];
        if version & !DIRECTION_RESPONSE != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let flags = bytes[1];
        let stream = i16::from_be_bytes([bytes[2], bytes[3]]);
        let opcode = Opcode::try_from(bytes[4])?;
        let length = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        Ok(Self { version, flags, stream, opcode, length })
    }
}

/// A complete frame: header plus body bytes (already decompressed, if the
/// wire copy was compressed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame header.
    pub header: FrameHeader,
    /// The frame body.
    pub body: Bytes,
}

impl Frame {
    /// Builds a request frame for the given stream and opcode with an
    /// already-encoded body, leaving compression to the caller (the
    /// dispatcher decides whether this frame is eligible based on
    /// handshake state, per the design note that `STARTUP` and `READY`
    /// are never compressed).
    #[must_use]
    pub fn request(stream: i16, opcode: Opcode, body: Bytes) -> Self {
        Self {
            header: FrameHeader {
                version: PROTOCOL_VERSION,
                flags: 0,
                stream,
                opcode,
                length: body.len() as u32,
            },
            body,
        }
    }

    /// Writes this frame to `writer`, compressing the body with
    /// `compressor` when one is supplied and the frame isn't already
    /// flagged otherwise. Returns once the whole frame has been flushed.
    pub async fn write<W>(
        &self,
        writer: &mut W,
        compressor: Option<&dyn Compressor>,
    ) -> Result<(), CodecError>
    where
        W: AsyncWrite + Unpin,
    {
        let (flags, body): (u8, Bytes) = match compressor {
            Some(c) => (self.header.flags | FLAG_COMPRESSION, c.compress(&self.body).into()),
            None => (self.header.flags, self.body.clone()),
        };
        let header = FrameHeader { flags, length: body.len() as u32, ..self.header };

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        header.encode(&mut out);
        out.extend_from_slice(&body);

        writer.write_all(&out).await.map_err(io_to_codec_error)?;
        writer.flush().await.map_err(io_to_codec_error)?;
        Ok(())
    }

    /// Reads one frame from `reader`, decompressing the body when the
    /// compression flag is set. `max_body_len` enforces invariant (iv):
    /// a declared length beyond the ceiling is rejected before any body
    /// bytes are read.
    pub async fn read<R>(
        reader: &mut R,
        max_body_len: u32,
        compressor: Option<&dyn Compressor>,
    ) -> Result<Self, CodecError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header_bytes = [0_u8; HEADER_LEN];
        reader.read_exact(&mut header_bytes).await.map_err(io_to_codec_error)?;
        let header = FrameHeader::decode(&header_bytes)?;

        if header.length > max_body_len {
            return Err(CodecError::ValueTooLarge { limit: max_body_len, actual: header.length });
        }

        let mut raw_body = vec![0_u8; header.length as usize];
        reader.read_exact(&mut raw_body).await.map_err(io_to_codec_error)?;

        let body = if header.is_compressed() {
            let Some(compressor) = compressor else {
                return Err(CodecError::CompressionNotNegotiated);
            };
            Bytes::from(compressor.decompress(&raw_body)?)
        } else {
            Bytes::from(raw_body)
        };

        Ok(Self { header, body })
    }
}

fn io_to_codec_error(err: std::io::Error) -> CodecError {
    // The framer only surfaces codec-shaped errors; a broken pipe or reset
    // connection is reported to the caller as an end-of-frame truncation,
    // which the driver crate maps onward to its own connection-fatal
    // error kind.
    tracing::debug!(error = %err, "transport read/write failed");
    CodecError::Truncated { needed: HEADER_LEN, available: 0 }
}
