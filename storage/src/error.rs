// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::fmt;
use std::io;

/// Represent the types of errors a storage operation can fail with.
#[derive(Debug)]
pub enum ErrorKind {
    /// Error occurred while performing I/O on the storage root.
    IoError,

    /// A message file name did not match the `<id>-<size>-<qos>-<ts_s>-<ts_us>` schema.
    MalformedFileName,

    /// Packet payload failed to encode/decode while flushing or storing.
    CodecError,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::IoError, err.to_string())
    }
}

impl From<myqtt_codec::EncodeError> for Error {
    fn from(err: myqtt_codec::EncodeError) -> Self {
        Self::new(ErrorKind::CodecError, format!("{err}"))
    }
}

impl From<myqtt_codec::DecodeError> for Error {
    fn from(err: myqtt_codec::DecodeError) -> Self {
        Self::new(ErrorKind::CodecError, format!("{err}"))
    }
}
