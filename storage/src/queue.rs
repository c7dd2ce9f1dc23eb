// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_codec::{PacketId, QoS};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::filename;

/// Opaque handle to a stored message's file, returned by [`store`] and
/// consumed by [`release`]. Callers must not depend on its path layout.
#[derive(Debug, Clone)]
pub struct MessageHandle {
    path: PathBuf,
    size: usize,
}

impl MessageHandle {
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A message recovered from `<client_id>/msgs/` by [`flush`], ready to be
/// resubmitted to the delivery engine.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub packet_id: PacketId,
    pub qos: QoS,
    pub payload: Vec<u8>,
    pub handle: MessageHandle,
}

fn msgs_dir(root: &Path, client_id: &str) -> PathBuf {
    root.join(client_id).join("msgs")
}

/// Persist `payload` for `client_id`, contributing its size to quota
/// accounting (the caller tracks the running total; this just writes the
/// file).
///
/// # Errors
///
/// Returns an error on I/O failure.
pub fn store(
    root: &Path,
    client_id: &str,
    packet_id: PacketId,
    qos: QoS,
    payload: &[u8],
) -> Result<MessageHandle, Error> {
    let dir = msgs_dir(root, client_id);
    fs::create_dir_all(&dir)?;
    let name = filename::message_file_name(packet_id, payload.len(), qos);
    let final_path = dir.join(&name);
    let tmp_path = dir.join(format!(".{name}.tmp"));
    fs::write(&tmp_path, payload)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(MessageHandle {
        path: final_path,
        size: payload.len(),
    })
}

/// Unlink a stored message. Missing files are treated as idempotent
/// success, per the storage contract.
///
/// # Errors
///
/// Returns an error on an I/O failure other than the file already being
/// gone.
pub fn release(handle: &MessageHandle) -> Result<(), Error> {
    match fs::remove_file(&handle.path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Enumerate `<client_id>/msgs/`, decoding each file name and reading its
/// body, ordered by the timestamp embedded in the name (oldest first).
///
/// # Errors
///
/// Returns an error if the directory (when present) cannot be read, or a
/// file's body cannot be read. Malformed file names are skipped rather than
/// failing the whole flush.
pub fn flush(root: &Path, client_id: &str) -> Result<Vec<QueuedMessage>, Error> {
    let dir = msgs_dir(root, client_id);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut decoded = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let Ok(parsed) = filename::decode_message_file_name(name) else {
            continue;
        };
        decoded.push((parsed, entry.path()));
    }
    decoded.sort_by_key(|(parsed, _)| (parsed.ts_secs, parsed.ts_micros));

    let mut out = Vec::with_capacity(decoded.len());
    for (parsed, path) in decoded {
        let payload = fs::read(&path)?;
        out.push(QueuedMessage {
            packet_id: parsed.packet_id,
            qos: parsed.qos,
            handle: MessageHandle {
                path,
                size: parsed.size,
            },
            payload,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{flush, release, store};
    use myqtt_codec::{PacketId, QoS};

    #[test]
    fn test_store_flush_release_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let handle = store(dir.path(), "client-1", PacketId::new(7), QoS::AtLeastOnce, b"payload").unwrap();
        assert_eq!(handle.size(), 7);

        let queued = flush(dir.path(), "client-1").unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].packet_id, PacketId::new(7));
        assert_eq!(queued[0].payload, b"payload");

        release(&queued[0].handle).unwrap();
        assert!(flush(dir.path(), "client-1").unwrap().is_empty());
    }

    #[test]
    fn test_release_missing_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = store(dir.path(), "client-1", PacketId::new(1), QoS::AtMostOnce, b"x").unwrap();
        release(&handle).unwrap();
        assert!(release(&handle).is_ok());
    }

    #[test]
    fn test_flush_empty_client_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(flush(dir.path(), "nobody").unwrap().is_empty());
    }
}
