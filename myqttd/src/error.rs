// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;

/// Broad category a broker-level [`Error`] falls into, mirroring the error
/// kinds spec.md §7 assigns to the core (the CONNACK-mapped kinds live as
/// `myqtt_codec` return codes instead and are not duplicated here).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error occurred while performing I/O on a listener or connection socket.
    IoError,

    /// A frame could not be decoded, or violated a protocol invariant the
    /// codec itself does not check (e.g. a second CONNECT on one Conn).
    ProtocolError,

    /// `myqtt-storage` reported a failure (disk I/O, corrupt layout, ...).
    StorageError,

    /// No domain could be resolved for a connecting client, or a domain
    /// config entry is invalid.
    DomainError,

    /// TOML config file is malformed or fails validation.
    ConfigError,

    /// A password-file entry or CLI argument is malformed.
    FormatError,

    /// Invalid value supplied to a management operation (e.g. `myqtt-passwd`).
    ParameterError,

    /// A channel between tasks was closed unexpectedly.
    ChannelError,

    /// TLS certificate/key material could not be loaded.
    CertError,
}

#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub const fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, format!("io error: {err}"))
    }
}

impl From<myqtt_codec::DecodeError> for Error {
    fn from(err: myqtt_codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::ProtocolError, format!("decode error: {err}"))
    }
}

impl From<myqtt_codec::EncodeError> for Error {
    fn from(err: myqtt_codec::EncodeError) -> Self {
        Self::from_string(ErrorKind::ProtocolError, format!("encode error: {err}"))
    }
}

impl From<myqtt_storage::Error> for Error {
    fn from(err: myqtt_storage::Error) -> Self {
        Self::from_string(ErrorKind::StorageError, format!("storage error: {err}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::from_string(ErrorKind::ConfigError, format!("invalid config: {err}"))
    }
}
