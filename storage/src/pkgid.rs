// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_codec::PacketId;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Error;

fn lock_path(root: &Path, client_id: &str, packet_id: PacketId) -> PathBuf {
    root.join(client_id).join("pkgids").join(packet_id.value().to_string())
}

/// Atomically claim `packet_id` for `client_id`, used to deduplicate a
/// QoS 2 PUBLISH on first occurrence: two racing locks for the same id can
/// never both succeed.
///
/// Returns `true` if this call created the lock (the id was free), `false`
/// if it already existed (the id is in use — a duplicate delivery).
///
/// # Errors
///
/// Returns an error on an I/O failure other than the lock already existing.
pub fn lock(root: &Path, client_id: &str, packet_id: PacketId) -> Result<bool, Error> {
    let path = lock_path(root, client_id, packet_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Release a previously locked packet id. Missing locks are idempotent
/// success.
///
/// # Errors
///
/// Returns an error on an I/O failure other than the lock already being
/// gone.
pub fn unlock(root: &Path, client_id: &str, packet_id: PacketId) -> Result<(), Error> {
    let path = lock_path(root, client_id, packet_id);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::{lock, unlock};
    use myqtt_codec::PacketId;

    #[test]
    fn test_lock_rejects_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        assert!(lock(dir.path(), "c1", PacketId::new(5)).unwrap());
        assert!(!lock(dir.path(), "c1", PacketId::new(5)).unwrap());
        unlock(dir.path(), "c1", PacketId::new(5)).unwrap();
        assert!(lock(dir.path(), "c1", PacketId::new(5)).unwrap());
    }

    #[test]
    fn test_unlock_missing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(unlock(dir.path(), "c1", PacketId::new(1)).is_ok());
    }
}
