// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_codec::QoS;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::filename;
use crate::hash::bucket_of;

/// A subscription persisted for a `clean_session=false` client, recovered
/// at domain startup to rebuild the offline subscriber tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSubscription {
    pub client_id: String,
    pub filter: String,
    pub qos: QoS,
}

fn file_path(root: &Path, client_id: &str, filter: &str, buckets: u32) -> PathBuf {
    let bucket = bucket_of(filter, buckets);
    root.join(client_id)
        .join("subs")
        .join(bucket.to_string())
        .join(filename::topic_key_file_name(filter))
}

/// Persist `(client_id, filter) -> qos`. Idempotent: re-subscribing the
/// same filter overwrites the existing entry's granted QoS.
///
/// # Errors
///
/// Returns an error on I/O failure.
pub fn record(
    root: &Path,
    client_id: &str,
    filter: &str,
    qos: QoS,
    buckets: u32,
) -> Result<(), Error> {
    let path = file_path(root, client_id, filter, buckets);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, [qos as u8])?;
    Ok(())
}

/// Remove a persisted subscription. Missing entries are idempotent
/// success.
///
/// # Errors
///
/// Returns an error on an I/O failure other than the entry already being
/// gone.
pub fn remove(root: &Path, client_id: &str, filter: &str, buckets: u32) -> Result<(), Error> {
    let path = file_path(root, client_id, filter, buckets);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Scan every `<client_id>/subs/` directory under `root`, rebuilding the
/// full set of persisted subscriptions across all offline clients. Called
/// exactly once per domain at startup.
///
/// # Errors
///
/// Returns an error if `root` cannot be listed.
pub fn scan_all(root: &Path) -> Result<Vec<PersistedSubscription>, Error> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for client_entry in fs::read_dir(root)? {
        let client_entry = client_entry?;
        if !client_entry.file_type()?.is_dir() {
            continue;
        }
        let Some(client_id) = client_entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if client_id == "retained" {
            continue;
        }
        let subs_dir = client_entry.path().join("subs");
        if !subs_dir.exists() {
            continue;
        }
        for bucket_entry in fs::read_dir(&subs_dir)? {
            let bucket_entry = bucket_entry?;
            if !bucket_entry.file_type()?.is_dir() {
                continue;
            }
            for file_entry in fs::read_dir(bucket_entry.path())? {
                let file_entry = file_entry?;
                let name = file_entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                let Ok(filter) = filename::decode_topic_key_file_name(name) else {
                    continue;
                };
                let contents = fs::read(file_entry.path())?;
                let Some(&qos_byte) = contents.first() else {
                    continue;
                };
                let Ok(qos) = QoS::try_from(qos_byte) else {
                    continue;
                };
                out.push(PersistedSubscription {
                    client_id: client_id.clone(),
                    filter,
                    qos,
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{record, remove, scan_all};
    use myqtt_codec::QoS;

    #[test]
    fn test_record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "c1", "a/b", QoS::AtLeastOnce, 16).unwrap();
        record(dir.path(), "c1", "a/b", QoS::ExactOnce, 16).unwrap();
        let all = scan_all(dir.path()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].qos, QoS::ExactOnce);
    }

    #[test]
    fn test_remove_then_scan_empty() {
        let dir = tempfile::tempdir().unwrap();
        record(dir.path(), "c1", "a/b", QoS::AtMostOnce, 16).unwrap();
        remove(dir.path(), "c1", "a/b", 16).unwrap();
        assert!(scan_all(dir.path()).unwrap().is_empty());
        assert!(remove(dir.path(), "c1", "a/b", 16).is_ok());
    }
}
