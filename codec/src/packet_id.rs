// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::fmt;

use byteorder::{BigEndian, WriteBytesExt};

use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket};

/// 16-bit packet identifier used to correlate `QoS` 1/2 acknowledgements and
/// subscribe/unsubscribe requests with their replies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketId(u16);

impl PacketId {
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Number of bytes this value occupies on the wire.
    #[must_use]
    pub const fn bytes() -> usize {
        2
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for PacketId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl DecodePacket for PacketId {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let id = ba.read_u16()?;
        Ok(Self(id))
    }
}

impl EncodePacket for PacketId {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.write_u16::<BigEndian>(self.0)?;
        Ok(Self::bytes())
    }
}

/// Allocates packet identifiers for a single connection. Packet identifiers
/// must be non-zero and are not reused while an exchange using them is in
/// flight; this allocator simply wraps around `u16::MAX`, skipping zero.
#[derive(Debug, Default)]
pub struct PacketIdAllocator {
    next: u16,
}

impl PacketIdAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Hand out the next packet id, skipping the reserved `0` value.
    pub fn next(&mut self) -> PacketId {
        self.next = self.next.wrapping_add(1);
        if self.next == 0 {
            self.next = 1;
        }
        PacketId::new(self.next)
    }
}
