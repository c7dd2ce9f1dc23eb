// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Error;

mod domain;
mod general;
mod listener;
mod log;
mod security;
mod storage;

pub use self::log::{Log, LogLevel};
pub use domain::{DomainDecl, DomainSettings, GLOBAL_SETTINGS};
pub use general::General;
pub use listener::{Listener, Protocol};
pub use security::Security;
pub use storage::Storage;

/// Server main config.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "General::default")]
    general: General,

    #[serde(default = "Listener::default_listeners")]
    listeners: Vec<Listener>,

    #[serde(default = "Security::default")]
    security: Security,

    #[serde(default = "Storage::default")]
    storage: Storage,

    #[serde(default = "Log::default")]
    log: Log,

    /// Tenants this broker accepts connections for.
    ///
    /// Default is empty, meaning every connection is dispatched to a single
    /// implicit default domain named `"default"`.
    #[serde(default)]
    domains: Vec<DomainDecl>,

    /// Named `[domain_settings.*]` bundles, referenced by `[[domains]]`
    /// entries via `use_settings`.
    #[serde(default)]
    domain_settings: HashMap<String, DomainSettings>,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    #[must_use]
    pub const fn security(&self) -> &Security {
        &self.security
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    #[must_use]
    pub fn domains(&self) -> &[DomainDecl] {
        &self.domains
    }

    #[must_use]
    pub fn domain_settings(&self) -> &HashMap<String, DomainSettings> {
        &self.domain_settings
    }

    /// Resolve the named `[domain_settings.*]` bundle, falling back to the
    /// implicit `global-settings` default when absent.
    #[must_use]
    pub fn settings_for(&self, name: &str) -> DomainSettings {
        self.domain_settings
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if some options in config is invalid.
    pub fn validate(&self, bind_address: bool) -> Result<(), Error> {
        for listener in &self.listeners {
            listener.validate(bind_address)?;
        }

        self.storage.validate()?;
        self.log.validate()
    }
}
