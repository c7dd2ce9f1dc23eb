// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the implicit settings bundle applied to a domain that does not
/// set `use_settings` (spec.md §6).
pub const GLOBAL_SETTINGS: &str = "global-settings";

/// One entry of `[[domains]]`: declares a tenant the broker will accept
/// connections for, independent of the teacher's single-tenant model.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DomainDecl {
    /// Unique domain name, matched against TLS SNI or a configured default.
    name: String,

    /// Directory `myqtt-storage` persists this domain's queues, retained
    /// messages and subscriptions under.
    storage: PathBuf,

    /// Path to a `myqtt-passwd`-format users database for this domain.
    ///
    /// Default is None, meaning the domain has no local users database
    /// (anonymous access only, subject to `[domain_settings].require_auth`).
    #[serde(default = "DomainDecl::default_users_db")]
    users_db: Option<PathBuf>,

    /// Name of the `[domain_settings.<name>]` bundle this domain uses.
    ///
    /// Default is `global-settings`.
    #[serde(default = "DomainDecl::default_use_settings")]
    use_settings: String,

    /// Whether this domain currently accepts new connections.
    ///
    /// Default is true.
    #[serde(default = "DomainDecl::default_is_active")]
    is_active: bool,
}

impl DomainDecl {
    /// Build the implicit `default` domain used when `[[domains]]` is empty,
    /// rooted at `storage` and authenticating against `users_db` (normally
    /// `[security].password_file`) if given.
    #[must_use]
    pub fn implicit_default(storage: PathBuf, users_db: Option<PathBuf>) -> Self {
        Self {
            name: crate::context::DEFAULT_DOMAIN.to_string(),
            storage,
            users_db,
            use_settings: Self::default_use_settings(),
            is_active: true,
        }
    }

    #[must_use]
    pub const fn default_users_db() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub fn default_use_settings() -> String {
        GLOBAL_SETTINGS.to_string()
    }

    #[must_use]
    pub const fn default_is_active() -> bool {
        true
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn storage(&self) -> &PathBuf {
        &self.storage
    }

    #[must_use]
    pub fn users_db(&self) -> Option<&PathBuf> {
        self.users_db.as_ref()
    }

    #[must_use]
    pub fn use_settings(&self) -> &str {
        &self.use_settings
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }
}

/// A `[domain_settings.<name>]` bundle: per-tenant limits and policies that
/// one or more `[[domains]]` entries share by name (spec.md §4.7).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DomainSettings {
    /// Reject CONNECT packets that carry no username/password when true.
    ///
    /// Default is false.
    #[serde(default = "DomainSettings::default_require_auth")]
    require_auth: bool,

    /// Restrict accepted client ids to those present in the domain's users
    /// database, even when authentication itself succeeds anonymously.
    ///
    /// Default is false.
    #[serde(default = "DomainSettings::default_restrict_ids")]
    restrict_ids: bool,

    /// Close an existing connection when a new CONNECT arrives reusing its
    /// client id, per MQTT-3.1.4-2. When false, the new connection is
    /// refused instead.
    ///
    /// Default is true.
    #[serde(default = "DomainSettings::default_drop_conn_same_client_id")]
    drop_conn_same_client_id: bool,

    /// Reject SUBSCRIBE filters containing `+` or `#` when true.
    ///
    /// Default is false.
    #[serde(default = "DomainSettings::default_disable_wildcard_support")]
    disable_wildcard_support: bool,

    /// Maximum concurrent connections for this domain. 0 means unlimited.
    ///
    /// Default is 0.
    #[serde(default = "DomainSettings::default_conn_limit")]
    conn_limit: i64,

    /// Maximum PUBLISH application-payload size accepted, in bytes. 0 falls
    /// back to `[general].message_size_limit`.
    ///
    /// Default is 0.
    #[serde(default = "DomainSettings::default_message_size_limit")]
    message_size_limit: i64,

    /// Maximum number of messages `myqtt-storage` queues per client. 0 means
    /// unlimited.
    ///
    /// Default is 0.
    #[serde(default = "DomainSettings::default_storage_messages_limit")]
    storage_messages_limit: i64,

    /// Maximum bytes `myqtt-storage` queues per client. 0 falls back to
    /// `[storage].quota_limit`.
    ///
    /// Default is 0.
    #[serde(default = "DomainSettings::default_storage_quota_limit")]
    storage_quota_limit: i64,

    /// Maximum inbound messages accepted per client per 30-day window. 0
    /// means unlimited.
    ///
    /// Default is 0.
    #[serde(default = "DomainSettings::default_month_message_quota")]
    month_message_quota: i64,

    /// Maximum inbound messages accepted per client per day. 0 means
    /// unlimited.
    ///
    /// Default is 0.
    #[serde(default = "DomainSettings::default_day_message_quota")]
    day_message_quota: i64,
}

impl DomainSettings {
    /// Return `settings` with `require_auth` forced to true, used to fold
    /// `[security].allow_anonymous = false` into the implicit default
    /// domain's settings bundle.
    #[must_use]
    pub const fn with_require_auth(mut settings: Self) -> Self {
        settings.require_auth = true;
        settings
    }

    #[must_use]
    pub const fn default_require_auth() -> bool {
        false
    }

    #[must_use]
    pub const fn default_restrict_ids() -> bool {
        false
    }

    #[must_use]
    pub const fn default_drop_conn_same_client_id() -> bool {
        true
    }

    #[must_use]
    pub const fn default_disable_wildcard_support() -> bool {
        false
    }

    #[must_use]
    pub const fn default_conn_limit() -> i64 {
        0
    }

    #[must_use]
    pub const fn default_message_size_limit() -> i64 {
        0
    }

    #[must_use]
    pub const fn default_storage_messages_limit() -> i64 {
        0
    }

    #[must_use]
    pub const fn default_storage_quota_limit() -> i64 {
        0
    }

    #[must_use]
    pub const fn default_month_message_quota() -> i64 {
        0
    }

    #[must_use]
    pub const fn default_day_message_quota() -> i64 {
        0
    }

    #[must_use]
    pub const fn require_auth(&self) -> bool {
        self.require_auth
    }

    #[must_use]
    pub const fn restrict_ids(&self) -> bool {
        self.restrict_ids
    }

    #[must_use]
    pub const fn drop_conn_same_client_id(&self) -> bool {
        self.drop_conn_same_client_id
    }

    #[must_use]
    pub const fn disable_wildcard_support(&self) -> bool {
        self.disable_wildcard_support
    }

    #[must_use]
    pub const fn conn_limit(&self) -> i64 {
        self.conn_limit
    }

    #[must_use]
    pub const fn message_size_limit(&self) -> i64 {
        self.message_size_limit
    }

    #[must_use]
    pub const fn storage_messages_limit(&self) -> i64 {
        self.storage_messages_limit
    }

    #[must_use]
    pub const fn storage_quota_limit(&self) -> i64 {
        self.storage_quota_limit
    }

    #[must_use]
    pub const fn month_message_quota(&self) -> i64 {
        self.month_message_quota
    }

    #[must_use]
    pub const fn day_message_quota(&self) -> i64 {
        self.day_message_quota
    }
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            require_auth: Self::default_require_auth(),
            restrict_ids: Self::default_restrict_ids(),
            drop_conn_same_client_id: Self::default_drop_conn_same_client_id(),
            disable_wildcard_support: Self::default_disable_wildcard_support(),
            conn_limit: Self::default_conn_limit(),
            message_size_limit: Self::default_message_size_limit(),
            storage_messages_limit: Self::default_storage_messages_limit(),
            storage_quota_limit: Self::default_storage_quota_limit(),
            month_message_quota: Self::default_month_message_quota(),
            day_message_quota: Self::default_day_message_quota(),
        }
    }
}
