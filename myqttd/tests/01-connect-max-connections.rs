// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::time::Duration;

use myqtt_client::{AsyncClient, ConnectOptions};

mod common;
use common::{Server, ServerConfig};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn config(port: u16, storage: &str) -> String {
    format!(
        r#"
[general]
sys_interval = 0

[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:{port}"
maximum_connections = 1

[security]
allow_anonymous = true

[storage]
root_dir = "{storage}"

[log]
console_log = false
"#
    )
}

/// A listener's `maximum_connections` cap is enforced at accept time, before
/// any MQTT handshake: an over-limit connection is dropped without a
/// CONNACK (`myqttd::listener::serve`), so the extra client observes the
/// handshake itself failing rather than a refusal return code.
#[tokio::test]
async fn test_connect_max_connections() -> TestResult {
    let storage = tempfile::tempdir()?;
    let config = ServerConfig::new(
        "/tmp/myqttd-tests/01-connect-max-connections.toml",
        &config(18893, storage.path().to_str().unwrap()),
    )?;
    let server = Server::start(config.filename())?;

    let first = ConnectOptions::new("127.0.0.1:18893", "max-conn-first")?;
    let (_first_client, mut first_loop) = AsyncClient::connect(first).await?;
    let event = first_loop.handshake().await?;
    assert!(matches!(
        event,
        myqtt_client::Event::ConnAck {
            return_code: myqtt_codec::ConnectReturnCode::Accepted,
            ..
        }
    ));

    // Keep the first connection alive so the listener's active-connection
    // count stays at the configured cap while the second client connects.
    let keepalive = tokio::spawn(async move {
        loop {
            if first_loop.poll().await.is_err() {
                return;
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;

    let second = ConnectOptions::new("127.0.0.1:18893", "max-conn-second")?;
    let (_second_client, mut second_loop) = AsyncClient::connect(second).await?;
    let result = second_loop.handshake().await;
    assert!(
        result.is_err(),
        "connection beyond maximum_connections should be refused"
    );

    keepalive.abort();
    server.terminate();
    Ok(())
}
