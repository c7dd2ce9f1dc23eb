// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use myqtt_codec::QoS;

/// How the client's TLS stack decides whether to trust the broker's
/// certificate. `WebPkiRoots` trusts the bundled Mozilla root store
/// (`webpki-roots`), the way a client talking to a public broker would;
/// `CustomCa` trusts only the certificates in a given PEM file, for
/// talking to a broker using a self-signed certificate such as the one
/// `myqttd`'s own integration tests generate with `rcgen`.
#[derive(Clone, Debug)]
pub enum TlsTrust {
    WebPkiRoots,
    CustomCa(PathBuf),
}

impl Default for TlsTrust {
    fn default() -> Self {
        Self::WebPkiRoots
    }
}

/// TLS parameters for an `mqtts` connection.
#[derive(Clone, Debug, Default)]
pub struct TlsOptions {
    /// Hostname used for the TLS `ServerName`/SNI extension. Required even
    /// when `address` is an IP literal, since rustls always verifies
    /// against a `ServerName`, never a bare socket address.
    pub domain: String,
    pub trust: TlsTrust,
}

#[derive(Clone, Debug)]
pub enum ConnectType {
    Mqtt,
    Mqtts(TlsOptions),
}

/// A Will message to be published by the broker if this client disconnects
/// uncleanly.
#[derive(Clone, Debug)]
pub struct LastWill {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    address: SocketAddr,
    connect_type: ConnectType,
    client_id: String,
    clean_session: bool,
    keep_alive: Duration,
    connect_timeout: Duration,
    username: Option<String>,
    password: Option<Vec<u8>>,
    last_will: Option<LastWill>,
}

impl ConnectOptions {
    /// Builds a new set of options for a plain `mqtt` connection.
    ///
    /// `client_id` is mandatory: the wire codec has no helper for
    /// generating a random identifier, so callers must supply their own
    /// (empty strings are rejected at CONNECT-encode time unless the
    /// broker is configured to allow them).
    pub fn new<A: ToSocketAddrs>(address: A, client_id: &str) -> io::Result<Self> {
        let mut addrs = address.to_socket_addrs()?;
        let address = addrs.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve")
        })?;
        Ok(Self {
            address,
            connect_type: ConnectType::Mqtt,
            client_id: client_id.to_owned(),
            clean_session: true,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            username: None,
            password: None,
            last_will: None,
        })
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    pub fn set_connect_type(&mut self, connect_type: ConnectType) -> &mut Self {
        self.connect_type = connect_type;
        self
    }

    pub fn connect_type(&self) -> &ConnectType {
        &self.connect_type
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn set_credentials(&mut self, username: &str, password: &[u8]) -> &mut Self {
        self.username = Some(username.to_owned());
        self.password = Some(password.to_owned());
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    pub fn set_last_will(&mut self, last_will: LastWill) -> &mut Self {
        self.last_will = Some(last_will);
        self
    }

    pub fn last_will(&self) -> Option<&LastWill> {
        self.last_will.as_ref()
    }
}
