// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Verifies that a CONNECT requesting a keep-alive above
//! `[general].maximum_keep_alive` is clamped rather than rejected (MQTT 3.1.1
//! has no CONNACK field to tell the client a different keep-alive was
//! chosen, unlike MQTT 5's Server Keep Alive property), and that the broker
//! then actually enforces the clamped value rather than the one the client
//! asked for.

use std::time::Duration;

use myqtt_client::{AsyncClient, ConnectOptions};

mod common;
use common::{Server, ServerConfig};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const MAXIMUM_KEEP_ALIVE_SECS: u32 = 2;

fn config(port: u16, storage: &str) -> String {
    format!(
        r#"
[general]
sys_interval = 0
maximum_keep_alive = {MAXIMUM_KEEP_ALIVE_SECS}

[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:{port}"

[security]
allow_anonymous = true

[storage]
root_dir = "{storage}"

[log]
console_log = false
"#
    )
}

#[tokio::test]
async fn test_connect_max_keepalive() -> TestResult {
    let storage = tempfile::tempdir()?;
    let config = ServerConfig::new(
        "/tmp/myqttd-tests/01-connect-max-keepalive.toml",
        &config(18894, storage.path().to_str().unwrap()),
    )?;
    let server = Server::start(config.filename())?;

    let mut options = ConnectOptions::new("127.0.0.1:18894", "max-keepalive-client")?;
    options.set_keep_alive(Duration::from_secs(3600));
    let (_client, mut event_loop) = AsyncClient::connect(options).await?;

    // The over-long keep-alive is clamped, not rejected: CONNACK still
    // reports Accepted.
    let event = event_loop.handshake().await?;
    assert!(matches!(
        event,
        myqtt_client::Event::ConnAck {
            return_code: myqtt_codec::ConnectReturnCode::Accepted,
            ..
        }
    ));

    // The broker enforces 1.5x the *clamped* keep-alive, not the 3600s the
    // client asked for: staying idle past that should get the connection
    // closed, well before a real 3600s keep-alive would ever time out.
    let enforced_deadline = Duration::from_millis(u64::from(MAXIMUM_KEEP_ALIVE_SECS) * 1500);
    let event = tokio::time::timeout(enforced_deadline * 3, event_loop.poll())
        .await
        .expect("broker should have closed the idle connection well inside this window");
    assert!(matches!(event, Ok(myqtt_client::Event::Disconnected)));

    server.terminate();
    Ok(())
}
