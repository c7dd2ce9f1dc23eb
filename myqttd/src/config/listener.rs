// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::net::{TcpListener, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Binding protocol for a listener. Websocket and QUIC transports are not
/// implemented (spec.md §1 Non-goals); only plain and TLS-wrapped TCP are.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Raw MQTT over TCP.
    #[serde(alias = "mqtt")]
    Mqtt,

    /// Raw MQTT over TCP with TLS encryption.
    #[serde(alias = "mqtts")]
    Mqtts,
}

/// A listener represents one ip/port combination and its connection policy.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Listener {
    /// The maximum number of client connections to this listener allowed.
    ///
    /// Default is 0, which means unlimited connections.
    #[serde(default = "Listener::default_maximum_connections")]
    maximum_connections: usize,

    /// Binding protocol.
    ///
    /// Default is mqtt.
    #[serde(default = "Listener::default_protocol")]
    protocol: Protocol,

    /// Binding address, including host and port.
    ///
    /// Common addresses are:
    /// - 0.0.0.0:1883, for mqtt
    /// - 0.0.0.0:8883, for mqtts
    ///
    /// Default is 0.0.0.0:1883
    #[serde(default = "Listener::default_address")]
    address: String,

    /// Path to TLS cert file. Required when `protocol` is `mqtts`.
    ///
    /// Default is None.
    #[serde(default = "Listener::default_cert_file")]
    cert_file: Option<PathBuf>,

    /// Path to TLS private key file. Required when `protocol` is `mqtts`.
    ///
    /// Default is None.
    #[serde(default = "Listener::default_key_file")]
    key_file: Option<PathBuf>,

    /// Set `username_as_client_id` to true to replace the client id that a
    /// client connected with with its username.
    ///
    /// This allows authentication to be tied to the client id, which means
    /// that it is possible to prevent one client disconnecting another
    /// by using the same client id.
    /// If a client connects with no username it will be disconnected as not
    /// authorised when this option is set to true.
    ///
    /// Default is false.
    #[serde(default = "Listener::default_username_as_client_id")]
    username_as_client_id: bool,

    /// Connection keep alive timeout in seconds, used when a client's
    /// CONNECT packet requests a keep-alive of 0.
    ///
    /// Default is 60.
    #[serde(default = "Listener::default_keep_alive")]
    keep_alive: u16,

    /// Timeout value in seconds before receiving the CONNECT packet from a
    /// client. The timer is armed as soon as the transport (and, for
    /// `mqtts`, the TLS handshake) completes.
    ///
    /// Default is 60s.
    #[serde(default = "Listener::default_connect_timeout")]
    connect_timeout: u16,

    /// MAY allow a client to supply a `ClientId` of zero length. The broker
    /// then assigns a unique client id, if this flag is true.
    ///
    /// Otherwise a `RefusedIdentifierRejected` CONNACK is sent.
    ///
    /// Default is false.
    #[serde(default = "Listener::default_allow_empty_client_id")]
    allow_empty_client_id: bool,

    /// The maximum number of QoS 1 and 2 messages currently inflight per
    /// client, including those being retried.
    ///
    /// Defaults to 20.
    #[serde(default = "Listener::default_maximum_inflight_messages")]
    maximum_inflight_messages: u16,
}

impl Listener {
    #[must_use]
    pub fn default_listeners() -> Vec<Self> {
        vec![Self::default()]
    }

    #[must_use]
    pub const fn default_maximum_connections() -> usize {
        0
    }

    #[must_use]
    pub const fn default_protocol() -> Protocol {
        Protocol::Mqtt
    }

    #[must_use]
    pub fn default_address() -> String {
        "0.0.0.0:1883".to_string()
    }

    #[must_use]
    pub const fn default_cert_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_key_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_username_as_client_id() -> bool {
        false
    }

    #[must_use]
    pub const fn default_keep_alive() -> u16 {
        60
    }

    #[must_use]
    pub const fn default_connect_timeout() -> u16 {
        60
    }

    #[must_use]
    pub const fn default_allow_empty_client_id() -> bool {
        false
    }

    #[must_use]
    pub const fn default_maximum_inflight_messages() -> u16 {
        20
    }

    #[must_use]
    pub const fn maximum_connections(&self) -> usize {
        self.maximum_connections
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    #[must_use]
    pub const fn username_as_client_id(&self) -> bool {
        self.username_as_client_id
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> u16 {
        self.connect_timeout
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    #[must_use]
    pub const fn maximum_inflight_messages(&self) -> u16 {
        self.maximum_inflight_messages
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the socket address is invalid, already in use, or
    /// the protocol is `mqtts` and no cert/key pair is configured.
    pub fn validate(&self, bind_address: bool) -> Result<(), Error> {
        if bind_address {
            let _socket = TcpListener::bind(&self.address).map_err(|err| {
                Error::from_string(
                    ErrorKind::ConfigError,
                    format!(
                        "Failed to bind to address {} for listener, err: {:?}",
                        &self.address, err
                    ),
                )
            })?;
        } else {
            let _addr = self.address.to_socket_addrs().map_err(|err| {
                Error::from_string(
                    ErrorKind::ConfigError,
                    format!("Invalid socket address: {}, err: {:?}", &self.address, err),
                )
            })?;
        }

        if self.protocol == Protocol::Mqtts && (self.cert_file.is_none() || self.key_file.is_none())
        {
            return Err(Error::new(
                ErrorKind::ConfigError,
                "mqtts listener requires both cert_file and key_file",
            ));
        }

        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            maximum_connections: Self::default_maximum_connections(),
            protocol: Self::default_protocol(),
            address: Self::default_address(),
            cert_file: Self::default_cert_file(),
            key_file: Self::default_key_file(),
            username_as_client_id: Self::default_username_as_client_id(),
            keep_alive: Self::default_keep_alive(),
            connect_timeout: Self::default_connect_timeout(),
            allow_empty_client_id: Self::default_allow_empty_client_id(),
            maximum_inflight_messages: Self::default_maximum_inflight_messages(),
        }
    }
}
