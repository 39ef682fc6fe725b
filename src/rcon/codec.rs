//! RCON packet codec.
//!
//! Frames the Minecraft remote-console wire format for
//! [`tokio_util::codec::Framed`]. Every packet is little-endian:
//!
//! ```text
//! i32 length | i32 request id | i32 type | body bytes | 0x00 0x00
//! ```
//!
//! `length` counts everything after itself. Inbound packets longer than
//! [`MAX_PACKET_LEN`] are rejected rather than buffered.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Login request.
pub const TYPE_AUTH: i32 = 3;
/// Command request, and the server's login reply.
pub const TYPE_COMMAND: i32 = 2;
/// Login reply (shares the command type value).
pub const TYPE_AUTH_RESPONSE: i32 = 2;
/// Command reply.
pub const TYPE_RESPONSE_VALUE: i32 = 0;

/// Request id the server uses to signal a rejected login.
pub const AUTH_FAILED_ID: i32 = -1;

/// Largest body the server accepts from a client.
pub const MAX_COMMAND_BYTES: usize = 1446;

/// Largest `length` field accepted inbound: a 4096-byte payload plus
/// id, type, and the two terminators.
pub const MAX_PACKET_LEN: usize = 4096 + 10;

/// Smallest legal `length`: id, type, and the two terminators.
const MIN_PACKET_LEN: usize = 10;

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Client-chosen correlation id, echoed by the server.
    pub id: i32,
    /// Packet type (see the `TYPE_*` constants).
    pub kind: i32,
    /// Body text.
    pub body: String,
}

impl Packet {
    /// Build a login packet.
    #[must_use]
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            kind: TYPE_AUTH,
            body: password.to_owned(),
        }
    }

    /// Build a command packet.
    #[must_use]
    pub fn command(id: i32, command: &str) -> Self {
        Self {
            id,
            kind: TYPE_COMMAND,
            body: command.to_owned(),
        }
    }
}

/// Length-prefixed RCON codec.
#[derive(Debug, Default)]
pub struct RconCodec;

impl Decoder for RconCodec {
    type Item = Packet;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut header = [0u8; 4];
        header.copy_from_slice(&src[..4]);
        let declared = i32::from_le_bytes(header);
        let len = usize::try_from(declared)
            .map_err(|_| AppError::Rcon(format!("negative packet length {declared}")))?;

        if len < MIN_PACKET_LEN {
            return Err(AppError::Rcon(format!("packet length {len} is too short")));
        }
        if len > MAX_PACKET_LEN {
            return Err(AppError::Rcon(format!(
                "packet too long: {len} exceeds {MAX_PACKET_LEN} bytes"
            )));
        }

        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }

        src.advance(4);
        let id = src.get_i32_le();
        let kind = src.get_i32_le();
        let body_len = len - MIN_PACKET_LEN;
        let body = String::from_utf8_lossy(&src[..body_len]).into_owned();
        src.advance(body_len + 2);

        Ok(Some(Packet { id, kind, body }))
    }
}

impl Encoder<Packet> for RconCodec {
    type Error = AppError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let body = item.body.as_bytes();
        if body.len() > MAX_COMMAND_BYTES {
            return Err(AppError::InvalidInput(format!(
                "command is {} bytes; RCON accepts at most {MAX_COMMAND_BYTES}",
                body.len()
            )));
        }

        let len = i32::try_from(body.len() + MIN_PACKET_LEN)
            .map_err(|_| AppError::Rcon("packet length overflow".into()))?;

        dst.reserve(4 + body.len() + MIN_PACKET_LEN);
        dst.put_i32_le(len);
        dst.put_i32_le(item.id);
        dst.put_i32_le(item.kind);
        dst.put_slice(body);
        dst.put_u8(0);
        dst.put_u8(0);
        Ok(())
    }
}
