//! Message opcodes for native protocol v4.

use crate::error::CodecError;

/// The one-byte discriminator carried in every frame header, naming the
/// kind of request or response the frame body holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Opcode {
    /// `0x00` — response: the request could not be completed.
    Error,
    /// `0x01` — request: opens a connection.
    Startup,
    /// `0x02` — response: the server is ready for queries.
    Ready,
    /// `0x03` — response: the server requires authentication.
    Authenticate,
    /// `0x05` — request: asks the server which options it supports.
    Options,
    /// `0x06` — response: answers an `Options` request.
    Supported,
    /// `0x07` — request: a CQL query.
    Query,
    /// `0x08` — response: the result of a query.
    Result,
    /// `0x09` — request: prepares a query for later execution.
    Prepare,
    /// `0x0A` — request: executes a previously prepared query.
    Execute,
    /// `0x0B` — request: registers for server-pushed events.
    Register,
    /// `0x0C` — response: a server-pushed event, always on stream `-1`.
    Event,
    /// `0x0D` — request: executes a batch of statements (unsupported by
    /// this core; kept as a recognised opcode so frames bearing it are
    /// parsed rather than rejected as garbage).
    Batch,
    /// `0x0E` — response: a challenge in a multi-step authentication
    /// exchange.
    AuthChallenge,
    /// `0x0F` — request: a response to an authentication challenge.
    AuthResponse,
    /// `0x10` — response: authentication succeeded.
    AuthSuccess,
}

impl Opcode {
    /// The byte value of this opcode on the wire.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Error => 0x00,
            Self::Startup => 0x01,
            Self::Ready => 0x02,
            Self::Authenticate => 0x03,
            Self::Options => 0x05,
            Self::Supported => 0x06,
            Self::Query => 0x07,
            Self::Result => 0x08,
            Self::Prepare => 0x09,
            Self::Execute => 0x0A,
            Self::Register => 0x0B,
            Self::Event => 0x0C,
            Self::Batch => 0x0D,
            Self::AuthChallenge => 0x0E,
            Self::AuthResponse => 0x0F,
            Self::AuthSuccess => 0x10,
        }
    }

    /// `true` for opcodes a client sends as requests.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::Startup
                | Self::Options
                | Self::Query
                | Self::Prepare
                | Self::Execute
                | Self::Register
                | Self::Batch
                | Self::AuthResponse
        )
    }

    /// `true` for opcodes a client receives: server responses and
    /// server-pushed events.
    #[must_use]
    pub const fn is_response(self) -> bool {
        matches!(
            self,
            Self::Error
                | Self::Ready
                | Self::Authenticate
                | Self::Supported
                | Self::Result
                | Self::Event
                | Self::AuthChallenge
                | Self::AuthSuccess
        )
    }
}

impl TryFrom<u8> for Opcode {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::Error,
            0x01 => Self::Startup,
            0x02 => Self::Ready,
            0x03 => Self::Authenticate,
            0x05 => Self::Options,
            0x06 => Self::Supported,
            0x07 => Self::Query,
            0x08 => Self::Result,
            0x09 => Self::Prepare,
            0x0A => Self::Execute,
            0x0B => Self::Register,
            0x0C => Self::Event,
            0x0D => Self::Batch,
            0x0E => Self::AuthChallenge,
            0x0F => Self::AuthResponse,
            0x10 => Self::AuthSuccess,
            other => return Err(CodecError::UnknownOpcode(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_round_trips_through_its_byte() {
        let all = [
            Opcode::Error,
            Opcode::Startup,
            Opcode::Ready,
            Opcode::Authenticate,
            Opcode::Options,
            Opcode::Supported,
            Opcode::Query,
            Opcode::Result,
            Opcode::Prepare,
            Opcode::Execute,
            Opcode::Register,
            Opcode::Event,
            Opcode::Batch,
            Opcode::AuthChallenge,
            Opcode::AuthResponse,
            Opcode::AuthSuccess,
        ];
        for op in all {
            assert_eq!(Opcode::try_from(op.as_u8()).expect("known opcode"), op);
        }
    }

    #[test]
    fn unknown_byte_is_rejected() {
        assert!(matches!(Opcode::try_from(0x04), Err(CodecError::UnknownOpcode(0x04))));
    }

    #[test]
    fn every_opcode_is_exactly_request_or_response() {
        let all = [
            Opcode::Error,
            Opcode::Startup,
            Opcode::Ready,
            Opcode::Authenticate,
            Opcode::Options,
            Opcode::Supported,
            Opcode::Query,
            Opcode::Result,
            Opcode::Prepare,
            Opcode::Execute,
            Opcode::Register,
            Opcode::Event,
            Opcode::Batch,
            Opcode::AuthChallenge,
            Opcode::AuthResponse,
            Opcode::AuthSuccess,
        ];
        for op in all {
            assert_ne!(op.is_request(), op.is_response(), "{op:?} must be exactly one of request/response");
        }
    }
}
