// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_codec::QoS;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::Error;
use crate::filename::{self};
use crate::hash::bucket_of;

/// A retained message for a single topic, as replayed to new subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedMessage {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
}

/// In-memory index over `<root>/retained/`, backed by one file per topic.
///
/// A topic's retained entry lives at
/// `retained/<bucket>/<hex(topic)>`, whose contents are a single QoS byte
/// followed by the raw payload. Writes and deletes go through this index so
/// lookups never touch disk.
pub struct RetainedStore {
    root: PathBuf,
    buckets: u32,
    index: Mutex<HashMap<String, RetainedMessage>>,
}

impl RetainedStore {
    pub(crate) fn new(root: PathBuf, buckets: u32) -> Self {
        Self {
            root,
            buckets,
            index: Mutex::new(HashMap::new()),
        }
    }

    fn file_path(&self, topic: &str) -> PathBuf {
        let bucket = bucket_of(topic, self.buckets);
        self.root
            .join("retained")
            .join(bucket.to_string())
            .join(filename::topic_key_file_name(topic))
    }

    /// Rebuild the in-memory index from `<root>/retained/`. Called once at
    /// domain startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the retained directory tree cannot be read.
    pub(crate) fn load(&self) -> Result<(), Error> {
        let retained_root = self.root.join("retained");
        if !retained_root.exists() {
            return Ok(());
        }
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        for bucket_entry in fs::read_dir(&retained_root)? {
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
                let Ok(topic) = filename::decode_topic_key_file_name(name) else {
                    continue;
                };
                let bytes = fs::read(file_entry.path())?;
                if let Some((&qos_byte, payload)) = bytes.split_first() {
                    if let Ok(qos) = QoS::try_from(qos_byte) {
                        index.insert(
                            topic.clone(),
                            RetainedMessage {
                                topic,
                                qos,
                                payload: payload.to_vec(),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Replace (or delete, if `payload` is empty) the retained message for
    /// `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure writing or removing the entry.
    pub fn upsert(&self, topic: &str, qos: QoS, payload: &[u8]) -> Result<(), Error> {
        let path = self.file_path(topic);
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());

        if path.exists() {
            fs::remove_file(&path)?;
        }
        index.remove(topic);

        if payload.is_empty() {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::with_capacity(payload.len() + 1);
        contents.push(qos as u8);
        contents.extend_from_slice(payload);
        fs::write(&path, &contents)?;

        index.insert(
            topic.to_string(),
            RetainedMessage {
                topic: topic.to_string(),
                qos,
                payload: payload.to_vec(),
            },
        );
        Ok(())
    }

    /// All retained messages whose topic satisfies `matches` (typically a
    /// subscription filter's match predicate).
    #[must_use]
    pub fn matching(&self, matches: impl Fn(&str) -> bool) -> Vec<RetainedMessage> {
        let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index
            .values()
            .filter(|m| matches(&m.topic))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::RetainedStore;
    use myqtt_codec::QoS;

    #[test]
    fn test_upsert_and_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = RetainedStore::new(dir.path().to_path_buf(), 16);
        store.upsert("a/b", QoS::AtLeastOnce, b"hello").unwrap();
        let found = store.matching(|t| t == "a/b");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].payload, b"hello");

        store.upsert("a/b", QoS::AtMostOnce, b"").unwrap();
        assert!(store.matching(|t| t == "a/b").is_empty());
    }

    #[test]
    fn test_load_recovers_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RetainedStore::new(dir.path().to_path_buf(), 16);
            store.upsert("x/y", QoS::ExactOnce, b"payload").unwrap();
        }
        let store = RetainedStore::new(dir.path().to_path_buf(), 16);
        store.load().unwrap();
        let found = store.matching(|t| t == "x/y");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].qos, QoS::ExactOnce);
    }
}
