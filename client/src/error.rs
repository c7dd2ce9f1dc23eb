// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;

/// Broad category an [`Error`] falls into, mirroring `myqttd::error::ErrorKind`'s
/// shape so both halves of the workspace report failures the same way. The
/// websocket/QUIC transport error variants the teacher's client carried do
/// not apply here (spec.md keeps this client to TCP/TLS).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O failure on the underlying TCP or TLS stream.
    IoError,

    /// TLS handshake or certificate loading failed.
    CertError,

    /// A frame could not be decoded or encoded.
    ProtocolError,

    /// The broker refused the CONNECT or closed the connection unexpectedly.
    ConnectionError,

    /// A request was made after the event loop already shut down.
    Disconnected,
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
