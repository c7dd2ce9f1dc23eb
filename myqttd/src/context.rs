// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Global broker state: the domain table and the facilities every
//! connection needs regardless of which domain it lands in. Exactly one
//! [`Context`] exists per process, built once in `main` and shared via
//! `Arc` rather than a `static` (spec.md §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use myqtt_codec::QoS;
use tokio::sync::Notify;

use crate::config::{Config, DomainDecl, DomainSettings};
use crate::domain::Domain;
use crate::error::Error;
use crate::reactor::Scheduler;

/// Name of the implicit domain every connection lands in when `[[domains]]`
/// is empty.
pub const DEFAULT_DOMAIN: &str = "default";

/// Tunables from `[general]` that connection handling consults directly,
/// copied out of [`crate::config::General`] so sessions don't need to hold
/// a reference to the whole parsed config.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub message_size_limit: u32,
    pub maximum_keep_alive: u32,
    pub maximum_qos: QoS,
    pub sys_interval: std::time::Duration,
}

/// Global, per-process broker state.
pub struct Context {
    domains: HashMap<String, Arc<Domain>>,
    limits: Limits,
    scheduler: Scheduler,
    shutdown: Notify,
}

impl Context {
    /// Build the domain table from `config`, opening each domain's storage
    /// tree and, when `[[domains]]` is empty, an implicit `default` domain
    /// backed by `[security]`/`[storage]`.
    ///
    /// # Errors
    ///
    /// Returns an error if any domain's storage tree or users database
    /// cannot be opened.
    pub fn build(config: &Config) -> Result<Self, Error> {
        let mut domains = HashMap::new();
        let hash_buckets = config.storage().hash_buckets();
        let quota_bytes = Some(config.storage().quota_limit());

        if config.domains().is_empty() {
            let decl = DomainDecl::implicit_default(
                config.storage().root_dir().join(DEFAULT_DOMAIN),
                config.security().password_file().map(std::path::Path::to_path_buf),
            );
            let mut settings = DomainSettings::default();
            if !config.security().allow_anonymous() {
                settings = DomainSettings::with_require_auth(settings);
            }
            let domain = Domain::open(&decl, settings, hash_buckets, quota_bytes)?;
            domains.insert(DEFAULT_DOMAIN.to_string(), Arc::new(domain));
        } else {
            for decl in config.domains() {
                if !decl.is_active() {
                    continue;
                }
                let settings = config.settings_for(decl.use_settings());
                let domain = Domain::open(decl, settings, hash_buckets, quota_bytes)?;
                domains.insert(decl.name().to_string(), Arc::new(domain));
            }
        }

        Ok(Self {
            domains,
            limits: Limits {
                message_size_limit: config.general().message_size_limit(),
                maximum_keep_alive: config.general().maximum_keep_alive(),
                maximum_qos: config.general().maximum_qos(),
                sys_interval: config.general().sys_interval(),
            },
            scheduler: Scheduler::spawn(),
            shutdown: Notify::new(),
        })
    }

    #[must_use]
    pub const fn limits(&self) -> Limits {
        self.limits
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Every currently active domain, in no particular order. Used by
    /// [`crate::sys`] to fan `$SYS` broker-status messages out to each
    /// domain's own subscribers.
    pub fn domains(&self) -> impl Iterator<Item = &Arc<Domain>> {
        self.domains.values()
    }

    /// Dispatch a connecting client to a domain, per spec.md §4.7's stable
    /// resolution order: an exact virtual-host match on `sni`, else the
    /// first domain whose users database recognizes `(username, password)`,
    /// else the implicit/anonymous default domain, else (if exactly one
    /// domain exists at all) that domain.
    #[must_use]
    pub fn resolve_domain_for(
        &self,
        sni: Option<&str>,
        username: Option<&str>,
        password: &[u8],
    ) -> Option<Arc<Domain>> {
        if let Some(name) = sni {
            if let Some(domain) = self.domains.get(name) {
                return Some(Arc::clone(domain));
            }
        }
        if let Some(username) = username {
            if let Some(domain) = self
                .domains
                .values()
                .find(|domain| domain.recognizes_credentials(username, password))
            {
                return Some(Arc::clone(domain));
            }
        }
        if let Some(domain) = self.domains.get(DEFAULT_DOMAIN) {
            return Some(Arc::clone(domain));
        }
        self.domains.values().next().map(Arc::clone)
    }

    /// Signal every listener and session to begin a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Resolves once [`Context::shutdown`] has been called.
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await;
    }
}
