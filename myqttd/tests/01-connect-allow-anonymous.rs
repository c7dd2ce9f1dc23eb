// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use myqtt_client::{AsyncClient, ConnectOptions};

mod common;
use common::{Server, ServerConfig};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn config(port: u16, storage: &str, allow_anonymous: bool) -> String {
    format!(
        r#"
[general]
sys_interval = 0

[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:{port}"

[security]
allow_anonymous = {allow_anonymous}

[storage]
root_dir = "{storage}"

[log]
console_log = false
"#
    )
}

#[tokio::test]
async fn test_conn_allow_anonymous() -> TestResult {
    let storage = tempfile::tempdir()?;
    let config = ServerConfig::new(
        "/tmp/myqttd-tests/01-connect-allow-anonymous.toml",
        &config(18891, storage.path().to_str().unwrap(), true),
    )?;
    let server = Server::start(config.filename())?;

    let options = ConnectOptions::new("127.0.0.1:18891", "allow-anon-client")?;
    let (_client, mut event_loop) = AsyncClient::connect(options).await?;
    let event = event_loop.handshake().await?;
    match event {
        myqtt_client::Event::ConnAck { return_code, .. } => {
            assert_eq!(return_code, myqtt_codec::ConnectReturnCode::Accepted);
        }
        other => panic!("expected ConnAck, got {other:?}"),
    }

    server.terminate();
    Ok(())
}

#[tokio::test]
async fn test_conn_deny_anonymous() -> TestResult {
    let storage = tempfile::tempdir()?;
    let config = ServerConfig::new(
        "/tmp/myqttd-tests/01-connect-deny-anonymous.toml",
        &config(18892, storage.path().to_str().unwrap(), false),
    )?;
    let server = Server::start(config.filename())?;

    let options = ConnectOptions::new("127.0.0.1:18892", "deny-anon-client")?;
    let (_client, mut event_loop) = AsyncClient::connect(options).await?;
    let result = event_loop.handshake().await;
    assert!(result.is_err(), "anonymous connect should be refused when allow_anonymous = false");

    server.terminate();
    Ok(())
}
