// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! The transport byte-pipe underneath a connection: either a plain TCP
//! socket or one wrapped in TLS. WebSocket and QUIC transports the teacher
//! carried do not apply here (spec.md keeps this client to TCP/TLS).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{self, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::connect_options::{ConnectType, TlsTrust};
use crate::error::{Error, ErrorKind};

pub enum Stream {
    Mqtt(TcpStream),
    Mqtts(Box<TlsStream<TcpStream>>),
}

impl Stream {
    pub async fn connect(address: &SocketAddr, connect_type: &ConnectType) -> Result<Self, Error> {
        match connect_type {
            ConnectType::Mqtt => {
                let socket = TcpStream::connect(address).await?;
                Ok(Self::Mqtt(socket))
            }
            ConnectType::Mqtts(tls_options) => {
                let connector = build_connector(&tls_options.trust)?;
                let server_name = ServerName::try_from(tls_options.domain.clone()).map_err(|err| {
                    Error::from_string(ErrorKind::CertError, format!("invalid TLS server name {}: {err}", tls_options.domain))
                })?;
                let socket = TcpStream::connect(address).await?;
                let socket = connector.connect(server_name, socket).await.map_err(|err| {
                    Error::from_string(ErrorKind::CertError, format!("TLS handshake failed: {err}"))
                })?;
                Ok(Self::Mqtts(Box::new(socket)))
            }
        }
    }

    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            Self::Mqtt(socket) => socket.read_buf(buf).await,
            Self::Mqtts(socket) => socket.read_buf(buf).await,
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Mqtt(socket) => socket.write_all(buf).await,
            Self::Mqtts(socket) => socket.write_all(buf).await,
        }
    }
}

/// `Stream` delegates `AsyncRead`/`AsyncWrite` by hand rather than deriving
/// them, since the two variants wrap unrelated concrete types
/// (`tokio::net::TcpStream` and `tokio_rustls::client::TlsStream`) with no
/// common trait object the teacher's equivalent enum could poll through.
impl AsyncRead for Stream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Mqtt(socket) => std::pin::Pin::new(socket).poll_read(cx, buf),
            Self::Mqtts(socket) => std::pin::Pin::new(socket.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Mqtt(socket) => std::pin::Pin::new(socket).poll_write(cx, buf),
            Self::Mqtts(socket) => std::pin::Pin::new(socket.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Mqtt(socket) => std::pin::Pin::new(socket).poll_flush(cx),
            Self::Mqtts(socket) => std::pin::Pin::new(socket.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Mqtt(socket) => std::pin::Pin::new(socket).poll_shutdown(cx),
            Self::Mqtts(socket) => std::pin::Pin::new(socket.as_mut()).poll_shutdown(cx),
        }
    }
}

fn build_connector(trust: &TlsTrust) -> Result<TlsConnector, Error> {
    let mut root_store = RootCertStore::empty();
    match trust {
        TlsTrust::WebPkiRoots => {
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
        TlsTrust::CustomCa(path) => {
            let file = std::fs::File::open(path).map_err(|err| {
                Error::from_string(ErrorKind::CertError, format!("failed to open {}: {err}", path.display()))
            })?;
            let mut reader = io::BufReader::new(file);
            let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
                .collect::<Result<_, _>>()
                .map_err(|err| Error::from_string(ErrorKind::CertError, format!("invalid CA cert {}: {err}", path.display())))?;
            for cert in certs {
                root_store
                    .add(cert)
                    .map_err(|err| Error::from_string(ErrorKind::CertError, format!("invalid CA cert: {err}")))?;
            }
        }
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}
