// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! An async MQTT 3.1.1 client over plain or TLS-wrapped TCP.

pub mod client;
pub mod connect_options;
pub mod error;
pub mod stream;

pub use client::{AsyncClient, Event, EventLoop};
pub use connect_options::{ConnectOptions, ConnectType, LastWill, TlsOptions, TlsTrust};
pub use error::{Error, ErrorKind};
