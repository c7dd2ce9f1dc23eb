//! On-disk storage for a single MQTT broker domain: queued/in-flight
//! PUBLISH messages, persisted subscriptions, retained messages, and
//! packet-id lock files, rooted at a configurable directory.

mod config;
mod error;
mod filename;
mod hash;
mod pkgid;
mod queue;
mod retained;
mod storage;
mod subscriptions;

pub use config::StorageConfig;
pub use error::{Error, ErrorKind};
pub use queue::{MessageHandle, QueuedMessage};
pub use retained::RetainedMessage;
pub use storage::{LoadedState, Storage};
pub use subscriptions::PersistedSubscription;
