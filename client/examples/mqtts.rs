// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Connects to a broker over TLS, trusting a self-signed certificate such
//! as the one `myqttd`'s own integration tests generate with `rcgen` (see
//! `myqttd/examples/generate-cert.rs`). Pass a path to that certificate's
//! PEM file as the first argument.

use std::path::PathBuf;

use myqtt_client::{AsyncClient, ConnectOptions, ConnectType, Event, TlsOptions, TlsTrust};

#[tokio::main]
async fn main() -> Result<(), myqtt_client::Error> {
    std::env::set_var("RUST_LOG", "info");
    env_logger::init();

    let ca_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .expect("usage: mqtts <path-to-ca-cert.pem>");

    let mut options = ConnectOptions::new("127.0.0.1:8883", "myqtt-client-example")?;
    options.set_connect_type(ConnectType::Mqtts(TlsOptions {
        domain: "localhost".to_owned(),
        trust: TlsTrust::CustomCa(ca_path),
    }));

    let (client, mut event_loop) = AsyncClient::connect(options).await?;
    match event_loop.handshake().await? {
        Event::ConnAck { return_code, .. } => log::info!("connected: {return_code:?}"),
        other => log::warn!("unexpected handshake event: {other:?}"),
    }

    client.disconnect()?;
    let _ = event_loop.poll().await?;
    Ok(())
}
