//! Setup protocol framing -- length-prefixed, typed frames over one channel.
//!
//! Wire format: 2-byte big-endian length, one packet-type byte, then
//! `length - 1` bytes of JSON payload. Every channel carries exactly one
//! request frame and one response frame.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::SetupError;

/// Maximum frame body (type byte + payload), bounded by the u16 length prefix.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Length prefix size in bytes.
const LENGTH_PREFIX_SIZE: usize = 2;

/// Packet-type codes. Wire-visible and stable; never renumber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    CreateLoop = 0,
    CloseLoop = 1,
    AddRule = 2,
    RequestRouteId = 3,
    ConfirmLoop = 4,
    LoopClosed = 5,
    RespFailure = 6,
    RespSuccess = 7,
}

impl PacketType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PacketType::CreateLoop),
            1 => Some(PacketType::CloseLoop),
            2 => Some(PacketType::AddRule),
            3 => Some(PacketType::RequestRouteId),
            4 => Some(PacketType::ConfirmLoop),
            5 => Some(PacketType::LoopClosed),
            6 => Some(PacketType::RespFailure),
            7 => Some(PacketType::RespSuccess),
            _ => None,
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketType::CreateLoop => "CreateLoop",
            PacketType::CloseLoop => "CloseLoop",
            PacketType::AddRule => "AddRule",
            PacketType::RequestRouteId => "RequestRouteID",
            PacketType::ConfirmLoop => "ConfirmLoop",
            PacketType::LoopClosed => "LoopClosed",
            PacketType::RespFailure => "RespFailure",
            PacketType::RespSuccess => "RespSuccess",
        };
        f.write_str(name)
    }
}

/// A decoded frame. The packet type stays raw so dispatchers can answer
/// unknown codes instead of dropping the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: u8,
    pub payload: Vec<u8>,
}

/// Codec for framing setup packets over a byte stream.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = SetupError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let body_len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if body_len == 0 {
            return Err(SetupError::Protocol("empty frame".into()));
        }

        let total = LENGTH_PREFIX_SIZE + body_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let body = src.split_to(body_len);

        Ok(Some(Frame {
            packet_type: body[0],
            payload: body[1..].to_vec(),
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = SetupError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body_len = 1 + item.payload.len();
        if body_len > MAX_FRAME_SIZE {
            return Err(SetupError::Protocol(format!(
                "frame too large: {body_len} bytes (max {MAX_FRAME_SIZE})"
            )));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + body_len);
        dst.put_u16(body_len as u16);
        dst.put_u8(item.packet_type);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

/// One setup channel wrapped with frame IO and typed response mapping.
pub struct SetupProtocol<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SetupProtocol<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub async fn read_frame(&mut self) -> Result<Frame, SetupError> {
        let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
        self.stream.read_exact(&mut len_buf).await?;
        let body_len = u16::from_be_bytes(len_buf) as usize;
        if body_len == 0 {
            return Err(SetupError::Protocol("empty frame".into()));
        }

        let mut body = vec![0u8; body_len];
        self.stream.read_exact(&mut body).await?;

        Ok(Frame {
            packet_type: body[0],
            payload: body[1..].to_vec(),
        })
    }

    pub async fn write_frame(&mut self, packet_type: u8, payload: &[u8]) -> Result<(), SetupError> {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        codec.encode(Frame { packet_type, payload: payload.to_vec() }, &mut buf)?;
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn write_request<B: Serialize>(
        &mut self,
        packet_type: PacketType,
        body: &B,
    ) -> Result<(), SetupError> {
        let payload = serde_json::to_vec(body)?;
        self.write_frame(packet_type.code(), &payload).await
    }

    pub async fn write_success<B: Serialize>(&mut self, body: &B) -> Result<(), SetupError> {
        self.write_request(PacketType::RespSuccess, body).await
    }

    pub async fn write_failure(&mut self, message: &str) -> Result<(), SetupError> {
        self.write_request(PacketType::RespFailure, &message).await
    }

    /// Read one response frame: success decodes into `T`, failure surfaces
    /// the peer's message, anything else is a protocol violation.
    pub async fn read_response<T: DeserializeOwned>(&mut self) -> Result<T, SetupError> {
        let frame = self.read_frame().await?;
        match PacketType::from_code(frame.packet_type) {
            Some(PacketType::RespSuccess) => Ok(serde_json::from_slice(&frame.payload)?),
            Some(PacketType::RespFailure) => {
                let message: String = serde_json::from_slice(&frame.payload)?;
                Err(SetupError::Remote(message))
            }
            _ => Err(SetupError::Protocol(format!(
                "unexpected packet type {}",
                frame.packet_type
            ))),
        }
    }
}
