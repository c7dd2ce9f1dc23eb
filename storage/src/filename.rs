// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_codec::{PacketId, QoS};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, ErrorKind};

/// A queued/in-flight message's on-disk name decoded back into its parts,
/// without reading the file body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMessageName {
    pub packet_id: PacketId,
    pub size: usize,
    pub qos: QoS,
    pub ts_secs: u64,
    pub ts_micros: u32,
}

fn now_parts() -> (u64, u32) {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (since_epoch.as_secs(), since_epoch.subsec_micros())
}

/// Build the `<id>-<size>-<qos>-<ts_s>-<ts_us>` file name for a queued
/// message. Timestamps serve only as ordering tiebreakers, per spec.
#[must_use]
pub fn message_file_name(packet_id: PacketId, size: usize, qos: QoS) -> String {
    let (ts_secs, ts_micros) = now_parts();
    format!(
        "{}-{}-{}-{}-{}",
        packet_id.value(),
        size,
        qos as u8,
        ts_secs,
        ts_micros
    )
}

/// Parse a message file name produced by [`message_file_name`].
///
/// # Errors
///
/// Returns an error if `name` does not have exactly five `-`-separated
/// numeric fields.
pub fn decode_message_file_name(name: &str) -> Result<DecodedMessageName, Error> {
    let mut parts = name.split('-');
    let mut next = || {
        parts
            .next()
            .ok_or_else(|| Error::new(ErrorKind::MalformedFileName, name.to_string()))
    };
    let packet_id: u16 = next()?
        .parse()
        .map_err(|_| Error::new(ErrorKind::MalformedFileName, name.to_string()))?;
    let size: usize = next()?
        .parse()
        .map_err(|_| Error::new(ErrorKind::MalformedFileName, name.to_string()))?;
    let qos_raw: u8 = next()?
        .parse()
        .map_err(|_| Error::new(ErrorKind::MalformedFileName, name.to_string()))?;
    let ts_secs: u64 = next()?
        .parse()
        .map_err(|_| Error::new(ErrorKind::MalformedFileName, name.to_string()))?;
    let ts_micros: u32 = next()?
        .parse()
        .map_err(|_| Error::new(ErrorKind::MalformedFileName, name.to_string()))?;
    if parts.next().is_some() {
        return Err(Error::new(ErrorKind::MalformedFileName, name.to_string()));
    }
    let qos = QoS::try_from(qos_raw)
        .map_err(|_| Error::new(ErrorKind::MalformedFileName, name.to_string()))?;
    Ok(DecodedMessageName {
        packet_id: PacketId::new(packet_id),
        size,
        qos,
        ts_secs,
        ts_micros,
    })
}

/// Encode a topic name or topic filter as a file name stable across calls,
/// so writing the same key twice (re-subscribing a filter, re-retaining a
/// topic) overwrites the same file rather than accumulating duplicates.
/// `QoS` is not part of the key; it is carried in the file's contents.
#[must_use]
pub fn topic_key_file_name(key: &str) -> String {
    hex_encode(key.as_bytes())
}

/// Parse a file name produced by [`topic_key_file_name`] back into its
/// topic name or topic filter.
///
/// # Errors
///
/// Returns an error if `name` is not valid hex, or does not decode to
/// valid UTF-8.
pub fn decode_topic_key_file_name(name: &str) -> Result<String, Error> {
    let bytes = hex_decode(name)
        .ok_or_else(|| Error::new(ErrorKind::MalformedFileName, name.to_string()))?;
    String::from_utf8(bytes).map_err(|_| Error::new(ErrorKind::MalformedFileName, name.to_string()))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        decode_message_file_name, decode_topic_key_file_name, message_file_name,
        topic_key_file_name,
    };
    use myqtt_codec::{PacketId, QoS};

    #[test]
    fn test_message_round_trip() {
        let name = message_file_name(PacketId::new(42), 128, QoS::AtLeastOnce);
        let decoded = decode_message_file_name(&name).unwrap();
        assert_eq!(decoded.packet_id, PacketId::new(42));
        assert_eq!(decoded.size, 128);
        assert_eq!(decoded.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_topic_key_round_trip() {
        let name = topic_key_file_name("a/b/+/#");
        let filter = decode_topic_key_file_name(&name).unwrap();
        assert_eq!(filter, "a/b/+/#");
    }

    #[test]
    fn test_malformed_message_name_rejected() {
        assert!(decode_message_file_name("not-a-valid-name").is_err());
    }
}
