// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Accept loop for one configured `[[listeners]]` entry: binds the address,
//! optionally wraps each accepted socket in TLS, and spawns a
//! [`crate::session::run`] task per connection. The teacher's listener code
//! (`RustRobotics-hebo/myqttd/src/listener/`) dispatched over `Uds`/`Ws`/
//! `Wss`/`Quic` transports none of which survive into spec.md's scope; this
//! keeps its accept-loop-plus-spawn shape for the two transports that do.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener as TokioTcpListener;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig as TlsServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::config::{Listener, Protocol};
use crate::context::Context;
use crate::error::{Error, ErrorKind};

/// Build a `rustls` server config from a PEM cert chain and private key,
/// the same `rustls-pemfile` parsing idiom `myqtt-client` uses on the
/// connecting side.
fn load_tls_acceptor(listener: &Listener) -> Result<TlsAcceptor, Error> {
    let cert_path = listener
        .cert_file()
        .ok_or_else(|| Error::new(ErrorKind::CertError, "mqtts listener missing cert_file"))?;
    let key_path = listener
        .key_file()
        .ok_or_else(|| Error::new(ErrorKind::CertError, "mqtts listener missing key_file"))?;

    let cert_file = std::fs::File::open(cert_path)
        .map_err(|err| Error::from_string(ErrorKind::CertError, format!("failed to open {}: {err}", cert_path.display())))?;
    let mut cert_reader = io::BufReader::new(cert_file);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|err| Error::from_string(ErrorKind::CertError, format!("invalid cert chain: {err}")))?;

    let key_file = std::fs::File::open(key_path)
        .map_err(|err| Error::from_string(ErrorKind::CertError, format!("failed to open {}: {err}", key_path.display())))?;
    let mut key_reader = io::BufReader::new(key_file);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|err| Error::from_string(ErrorKind::CertError, format!("invalid private key: {err}")))?
        .ok_or_else(|| Error::new(ErrorKind::CertError, "no private key found in key_file"))?;

    let tls_config = TlsServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| Error::from_string(ErrorKind::CertError, format!("invalid cert/key pair: {err}")))?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

/// Bind `listener`'s address and accept connections until `context` signals
/// shutdown, spawning one [`crate::session::run`] task per connection.
///
/// # Errors
///
/// Returns an error if the address cannot be bound, or (for `mqtts`) the
/// cert/key pair cannot be loaded.
pub async fn serve(listener: Listener, context: Arc<Context>) -> Result<(), Error> {
    let tcp = TokioTcpListener::bind(listener.address()).await.map_err(|err| {
        Error::from_string(
            ErrorKind::IoError,
            format!("failed to bind {}: {err}", listener.address()),
        )
    })?;

    let acceptor = match listener.protocol() {
        Protocol::Mqtt => None,
        Protocol::Mqtts => Some(load_tls_acceptor(&listener)?),
    };

    log::info!(
        "listener ready: address={}, protocol={:?}",
        listener.address(),
        listener.protocol()
    );

    let connect_timeout = Duration::from_secs(u64::from(listener.connect_timeout()));
    let active_connections = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    loop {
        tokio::select! {
            () = context.shutdown_requested() => {
                log::info!("listener {} shutting down", listener.address());
                return Ok(());
            }
            accepted = tcp.accept() => {
                let (socket, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("accept failed on {}: {err}", listener.address());
                        continue;
                    }
                };

                if listener.maximum_connections() > 0
                    && active_connections.load(std::sync::atomic::Ordering::Relaxed) >= listener.maximum_connections()
                {
                    log::warn!("listener {} at capacity, refusing {peer}", listener.address());
                    drop(socket);
                    continue;
                }
                let _ = socket.set_nodelay(true);

                let context = Arc::clone(&context);
                let acceptor = acceptor.clone();
                let keep_alive = listener.keep_alive();
                let allow_empty_client_id = listener.allow_empty_client_id();
                let maximum_inflight = listener.maximum_inflight_messages();
                let active_connections = Arc::clone(&active_connections);

                active_connections.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tokio::spawn(async move {
                    let result = match acceptor {
                        Some(acceptor) => match acceptor.accept(socket).await {
                            Ok(tls_stream) => {
                                // SNI drives domain dispatch (spec.md §4.7
                                // step 1) before any CONNECT bytes are read.
                                let sni = tls_stream.get_ref().1.server_name().map(str::to_string);
                                crate::session::run(
                                    tls_stream,
                                    peer,
                                    context,
                                    sni,
                                    keep_alive,
                                    connect_timeout,
                                    allow_empty_client_id,
                                    maximum_inflight,
                                )
                                .await
                            }
                            Err(err) => {
                                log::warn!("{peer}: TLS handshake failed: {err}");
                                Ok(())
                            }
                        },
                        None => {
                            crate::session::run(
                                socket,
                                peer,
                                context,
                                None,
                                keep_alive,
                                connect_timeout,
                                allow_empty_client_id,
                                maximum_inflight,
                            )
                            .await
                        }
                    };
                    if let Err(err) = result {
                        log::warn!("{peer}: session ended with error: {err}");
                    }
                    active_connections.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                });
            }
        }
    }
}
