// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Periodic `$SYS` broker-status publisher, wiring up `[general].sys_interval`
//! (carried from the teacher's own `Metrics`/`sys_interval` config field,
//! `RustRobotics-hebo/hebo/src/server/init.rs`, which drove a full metrics
//! actor this workspace has no counterpart for). Every interval, one message
//! per domain is published on `$SYS/broker/<domain>/clients/connected`
//! reporting that domain's live connection count, and once on startup on
//! `$SYS/broker/version`. `$`-prefixed topics are excluded from `+`/`#`
//! wildcard matching at level 0 (`myqtt_codec::topic`), so these never reach
//! a client unless it subscribes to `$SYS/#` or the exact topic.

use std::sync::Arc;
use std::time::Duration;

use myqtt_codec::{PubTopic, QoS};

use crate::context::Context;
use crate::domain::Domain;

const BROKER_VERSION: &str = concat!("myqttd/", env!("CARGO_PKG_VERSION"));

fn publish_sys(domain: &Domain, topic: &str, payload: &[u8]) {
    let Ok(pub_topic) = PubTopic::new(topic) else {
        return;
    };
    for (subscriber, _granted_qos) in domain.router().matching(&pub_topic, QoS::AtMostOnce) {
        if let Some(sender) = &subscriber.sender {
            let delivery = crate::session::Delivery {
                topic: topic.to_string(),
                qos: QoS::AtMostOnce,
                payload: payload.to_vec(),
                retain: false,
            };
            let _ = sender.try_send(crate::session::ToSession::Publish(delivery));
        }
    }
}

async fn tick(context: &Arc<Context>) {
    for domain in context.domains() {
        let topic = format!("$SYS/broker/{}/clients/connected", domain.name());
        publish_sys(domain, &topic, domain.connection_count().to_string().as_bytes());
    }
}

/// Spawn the `$SYS` publisher task. A no-op (spawns nothing) when
/// `[general].sys_interval` is `0`, per its doc comment ("0 disables them").
/// Stops when `context` signals shutdown.
pub fn spawn(context: Arc<Context>) {
    let interval = context.limits().sys_interval;
    if interval == Duration::ZERO {
        return;
    }
    tokio::spawn(async move {
        for domain in context.domains() {
            let topic = format!("$SYS/broker/{}/version", domain.name());
            publish_sys(domain, &topic, BROKER_VERSION.as_bytes());
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = context.shutdown_requested() => return,
                _ = ticker.tick() => tick(&context).await,
            }
        }
    });
}
