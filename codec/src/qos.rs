// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::DecodeError;

/// Level of assurance for delivery of a packet.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QoS {
    /// At most once delivery, aka fire and forget.
    #[default]
    AtMostOnce = 0,

    /// At least once delivery, acknowledged by `PublishAckPacket`.
    AtLeastOnce = 1,

    /// Exactly once delivery, acknowledged by the `PublishReceived`/`PublishRelease`/
    /// `PublishComplete` handshake.
    ExactOnce = 2,
}

impl QoS {
    /// Number of bytes this value occupies on the wire.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactOnce),
            _ => Err(DecodeError::InvalidQoS),
        }
    }
}
