// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Connects to a local broker over plain TCP, subscribes to a topic, and
//! publishes one message to it.

use myqtt_client::{AsyncClient, ConnectOptions, Event};
use myqtt_codec::QoS;

#[tokio::main]
async fn main() -> Result<(), myqtt_client::Error> {
    std::env::set_var("RUST_LOG", "info");
    env_logger::init();

    let options = ConnectOptions::new("127.0.0.1:1883", "myqtt-client-example")?;
    let (client, mut event_loop) = AsyncClient::connect(options).await?;

    match event_loop.handshake().await? {
        Event::ConnAck { return_code, .. } => log::info!("connected: {return_code:?}"),
        other => log::warn!("unexpected handshake event: {other:?}"),
    }

    client.subscribe("hello", QoS::AtMostOnce)?;
    client.publish("hello", QoS::AtMostOnce, false, b"Hello, world")?;

    loop {
        match event_loop.poll().await? {
            Event::Publish { topic, payload, .. } => {
                log::info!("{topic}: {}", String::from_utf8_lossy(&payload));
            }
            Event::Disconnected => {
                log::info!("disconnected");
                break;
            }
            event => log::info!("event: {event:?}"),
        }
    }

    Ok(())
}
