//! Wire codec for the MQTT 3.1.1 protocol: fixed/variable header parsing,
//! the length-prefixed primitive data types, and one encode/decode pair per
//! control packet.

mod binary_data;
mod bool_data;
mod byte_array;
mod connect_flags;
mod error;
mod header;
mod keep_alive;
mod packet_id;
mod protocol_level;
mod qos;
mod string_data;
pub mod topic;
pub mod utils;
mod v3;
mod var_int;

pub use binary_data::BinaryData;
pub use bool_data::BoolData;
pub use byte_array::{ByteArray, ByteArrayError};
pub use connect_flags::ConnectFlags;
pub use error::{DecodeError, EncodeError};
pub use header::{FixedHeader, Packet, PacketType};
pub use keep_alive::KeepAlive;
pub use packet_id::{PacketId, PacketIdAllocator};
pub use protocol_level::ProtocolLevel;
pub use qos::QoS;
pub use string_data::StringData;
pub use topic::{PubTopic, SubTopic};
pub use v3::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, DisconnectPacket, PingRequestPacket,
    PingResponsePacket, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, PublishReleasePacket, SubscribeAck, SubscribeAckPacket,
    SubscribePacket, SubscribeTopic, UnsubscribePacket, UnsubscribeAckPacket,
};
pub use u16_data::U16Data;
pub use u32_data::U32Data;
pub use var_int::{VarInt, VarIntError, MAX_PACKET_LEN};

mod u16_data;
mod u32_data;

/// Decode a value of `Self` from the front of a `ByteArray` cursor.
pub trait DecodePacket: Sized {
    /// # Errors
    ///
    /// Returns an error if the bytes remaining in `ba` do not hold a valid
    /// encoding of `Self`.
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError>;
}

/// Append the wire encoding of `self` to `buf`.
pub trait EncodePacket {
    /// # Errors
    ///
    /// Returns an error if `self` cannot be represented on the wire (e.g. a
    /// length field would overflow).
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError>;
}

/// A fully decoded MQTT 3.1.1 control packet, dispatched on `PacketType`.
///
/// Produced by a connection's read loop once a complete frame (fixed header
/// plus however many bytes `remaining_length` names) has been buffered.
#[derive(Clone, Debug, PartialEq)]
pub enum MqttPacket {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
}

impl MqttPacket {
    /// Decode exactly one packet from `ba`, which must hold precisely one
    /// frame (callers slice the frame out using the fixed header's
    /// `remaining_length` before calling this).
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed or its declared packet
    /// type has a body this codec does not decode (MQTT 5-only types).
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut ba = ByteArray::new(buf);
        let mut peek = ByteArray::new(buf);
        let fixed_header = FixedHeader::decode(&mut peek)?;
        match fixed_header.packet_type() {
            PacketType::Connect => Ok(Self::Connect(ConnectPacket::decode(&mut ba)?)),
            PacketType::ConnectAck => Ok(Self::ConnectAck(ConnectAckPacket::decode(&mut ba)?)),
            PacketType::Publish { .. } => Ok(Self::Publish(PublishPacket::decode(&mut ba)?)),
            PacketType::PublishAck => Ok(Self::PublishAck(PublishAckPacket::decode(&mut ba)?)),
            PacketType::PublishReceived => {
                Ok(Self::PublishReceived(PublishReceivedPacket::decode(&mut ba)?))
            }
            PacketType::PublishRelease => {
                Ok(Self::PublishRelease(PublishReleasePacket::decode(&mut ba)?))
            }
            PacketType::PublishComplete => {
                Ok(Self::PublishComplete(PublishCompletePacket::decode(&mut ba)?))
            }
            PacketType::Subscribe => Ok(Self::Subscribe(SubscribePacket::decode(&mut ba)?)),
            PacketType::SubscribeAck => Ok(Self::SubscribeAck(SubscribeAckPacket::decode(&mut ba)?)),
            PacketType::Unsubscribe => Ok(Self::Unsubscribe(UnsubscribePacket::decode(&mut ba)?)),
            PacketType::UnsubscribeAck => {
                Ok(Self::UnsubscribeAck(UnsubscribeAckPacket::decode(&mut ba)?))
            }
            PacketType::PingRequest => Ok(Self::PingRequest(PingRequestPacket::decode(&mut ba)?)),
            PacketType::PingResponse => Ok(Self::PingResponse(PingResponsePacket::decode(&mut ba)?)),
            PacketType::Disconnect => Ok(Self::Disconnect(DisconnectPacket::decode(&mut ba)?)),
            PacketType::Auth => Err(DecodeError::InvalidPacketType),
        }
    }
}

impl EncodePacket for MqttPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        match self {
            Self::Connect(p) => p.encode(buf),
            Self::ConnectAck(p) => p.encode(buf),
            Self::Publish(p) => p.encode(buf),
            Self::PublishAck(p) => p.encode(buf),
            Self::PublishReceived(p) => p.encode(buf),
            Self::PublishRelease(p) => p.encode(buf),
            Self::PublishComplete(p) => p.encode(buf),
            Self::Subscribe(p) => p.encode(buf),
            Self::SubscribeAck(p) => p.encode(buf),
            Self::Unsubscribe(p) => p.encode(buf),
            Self::UnsubscribeAck(p) => p.encode(buf),
            Self::PingRequest(p) => p.encode(buf),
            Self::PingResponse(p) => p.encode(buf),
            Self::Disconnect(p) => p.encode(buf),
        }
    }
}

/// Protocol name carried by every CONNECT packet: MQTT 3.1.1 §3.1.2.1.
pub const PROTOCOL_NAME: &str = "MQTT";

/// Read a complete frame (fixed header + `remaining_length` bytes) off the
/// front of `buf` if one is fully buffered yet, without consuming partial
/// frames. Returns the frame length in bytes, so the caller can split it off
/// and hand it to [`MqttPacket::decode`].
///
/// # Errors
///
/// Returns an error if the bytes already buffered are not a valid fixed
/// header (e.g. a malformed varint).
pub fn next_frame_len(buf: &[u8]) -> Result<Option<usize>, DecodeError> {
    next_frame_len_limited(buf, None)
}

/// As [`next_frame_len`], but inspects the fixed header's `remaining_length`
/// before the payload is fully buffered and fails fast with
/// [`DecodeError::MessageTooLarge`] once it exceeds `max_remaining_length`
/// (spec.md §4.1's size-limit predicate: enforced on the header alone, so an
/// oversized frame is rejected without waiting for the rest of it to arrive).
/// `None` disables the check.
///
/// # Errors
///
/// Returns an error if the bytes already buffered are not a valid fixed
/// header, or the header declares a `remaining_length` over the limit.
pub fn next_frame_len_limited(
    buf: &[u8],
    max_remaining_length: Option<u32>,
) -> Result<Option<usize>, DecodeError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut ba = ByteArray::new(buf);
    match FixedHeader::decode(&mut ba) {
        Ok(fixed_header) => {
            if let Some(limit) = max_remaining_length {
                if limit > 0 && fixed_header.remaining_length() as u64 > u64::from(limit) {
                    return Err(DecodeError::MessageTooLarge);
                }
            }
            let total = fixed_header.bytes() + fixed_header.remaining_length();
            if total <= buf.len() {
                Ok(Some(total))
            } else {
                Ok(None)
            }
        }
        Err(DecodeError::OutOfRangeError) => Ok(None),
        Err(e) => Err(e),
    }
}
