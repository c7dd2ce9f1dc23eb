// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! Per-connection state machine: one tokio task per accepted socket, from
//! the CONNECT handshake through to an orderly or abnormal close
//! (spec.md §4.4). Owns the only mutable view of its own inflight QoS 1/2
//! exchanges and keep-alive clock; every other task reaches it exclusively
//! through its [`ToSession`] channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use myqtt_codec::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, EncodePacket, MqttPacket, PacketId,
    PacketIdAllocator, PingResponsePacket, PubTopic, PublishAckPacket, PublishCompletePacket,
    PublishPacket, PublishReceivedPacket, PublishReleasePacket, QoS, SubTopic, SubscribeAck,
    SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket, UnsubscribePacket,
};
use myqtt_storage::MessageHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::context::Context;
use crate::domain::Domain;
use crate::router::Subscriber;

/// A message routed to this session by the domain's router or replayed
/// from storage on reconnect.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// Messages a session task can receive from the rest of the broker.
pub enum ToSession {
    /// Deliver an application message, at the QoS already negotiated by the
    /// router against this subscriber's granted level.
    Publish(Delivery),
    /// Periodic wake-up from [`crate::reactor::Scheduler`]: check keep-alive
    /// and retry any timed-out QoS 1/2 exchanges.
    Tick,
    /// A newer connection has taken over this client id; close at once
    /// without sending the Will message (this is not an abnormal close).
    Kick,
}

struct Inflight {
    packet: PublishPacket,
    handle: Option<MessageHandle>,
    last_sent: Instant,
    attempts: u32,
}

struct Will {
    topic: String,
    qos: QoS,
    retain: bool,
    payload: Vec<u8>,
}

const MAX_REDELIVERY_ATTEMPTS: u32 = 12;

/// Drive one accepted connection to completion.
///
/// # Errors
///
/// Returns an error only for unrecoverable I/O failures on the underlying
/// transport; protocol violations are handled by closing the connection
/// and returning `Ok(())`.
pub async fn run<S>(
    mut stream: S,
    peer: std::net::SocketAddr,
    context: Arc<Context>,
    default_domain_hint: Option<String>,
    listener_keep_alive: u16,
    connect_timeout: Duration,
    allow_empty_client_id: bool,
    maximum_inflight: u16,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut read_buf = [0_u8; 4096];
    let limits = context.limits();

    let connect_packet = match tokio::time::timeout(
        connect_timeout,
        read_one_packet(&mut stream, &mut buf, &mut read_buf, Some(limits.message_size_limit)),
    )
    .await
    {
        Ok(Ok(Some(MqttPacket::Connect(packet)))) => packet,
        Ok(Ok(Some(_))) => {
            log::warn!("{peer}: first packet was not CONNECT");
            return Ok(());
        }
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(err)) => {
            log::warn!("{peer}: failed to decode CONNECT: {err}");
            return Ok(());
        }
        Err(_) => {
            log::warn!("{peer}: timed out waiting for CONNECT");
            return Ok(());
        }
    };

    let connect_flags = connect_packet.connect_flags();
    let connect_username = connect_flags.has_username().then(|| connect_packet.username());
    let connect_password = if connect_flags.has_password() { connect_packet.password() } else { &[] };
    let domain = context.resolve_domain_for(default_domain_hint.as_deref(), connect_username, connect_password);
    let Some(domain) = domain else {
        send_connack(&mut stream, ConnectReturnCode::ServerUnavailable).await?;
        return Ok(());
    };

    if domain.at_connection_limit() {
        send_connack(&mut stream, ConnectReturnCode::ServerUnavailable).await?;
        return Ok(());
    }

    let Some((client_id, clean_session, keep_alive, will)) = admit(
        &mut stream,
        &connect_packet,
        &domain,
        allow_empty_client_id,
        listener_keep_alive,
        limits.maximum_keep_alive,
    )
    .await?
    else {
        return Ok(());
    };

    if !domain.settings().drop_conn_same_client_id() && domain.client_sender(&client_id).is_some() {
        send_connack(&mut stream, ConnectReturnCode::IdentifierRejected).await?;
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel::<ToSession>(maximum_inflight.max(1) as usize * 2);
    if let Some(previous) = domain.register_client(&client_id, tx.clone()) {
        let _ = previous.send(ToSession::Kick).await;
    }
    // A resuming clean_session=false client's persisted subscriptions were
    // registered with no live sender (or had theirs cleared on the prior
    // disconnect); rebind them now so it need not re-SUBSCRIBE to resume
    // live delivery (MQTT-3.1.2.4).
    if !clean_session {
        domain.router().rebind_client(&client_id, &tx);
    }

    let session_present = !clean_session && has_persisted_state(&domain, &client_id);
    send_connack_present(&mut stream, ConnectReturnCode::Accepted, session_present).await?;
    log::info!("{peer}: client {client_id} connected (domain={})", domain.name());

    let tick_period = Duration::from_millis(u64::from(keep_alive) * 500).max(Duration::from_secs(1));
    let _ticket = context.scheduler().register(tick_period, tx.clone()).await;

    let message_size_limit = domain.message_size_limit(limits.message_size_limit);
    let result = drive(
        &mut stream,
        &mut buf,
        &mut read_buf,
        &domain,
        &client_id,
        clean_session,
        keep_alive,
        will,
        &mut rx,
        message_size_limit,
        limits.maximum_qos,
    )
    .await;

    domain.unregister_client(&client_id);
    if clean_session {
        domain.router().remove_client(&client_id);
    } else {
        domain.router().mark_client_offline(&client_id);
    }
    result
}

async fn read_one_packet<S>(
    stream: &mut S,
    buf: &mut Vec<u8>,
    read_buf: &mut [u8],
    message_size_limit: Option<u32>,
) -> Result<Option<MqttPacket>, crate::error::Error>
where
    S: tokio::io::AsyncRead + Unpin,
{
    loop {
        if let Some(len) = myqtt_codec::next_frame_len_limited(buf, message_size_limit)? {
            let frame = buf.drain(..len).collect::<Vec<u8>>();
            return Ok(Some(MqttPacket::decode(&frame)?));
        }
        let n = stream.read(read_buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&read_buf[..n]);
    }
}

async fn send_packet<S, P>(stream: &mut S, packet: &P) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
    P: EncodePacket,
{
    let mut out = Vec::with_capacity(64);
    packet.encode(&mut out)?;
    stream.write_all(&out).await?;
    Ok(())
}

async fn send_connack<S>(stream: &mut S, code: ConnectReturnCode) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    send_connack_present(stream, code, false).await
}

async fn send_connack_present<S>(
    stream: &mut S,
    code: ConnectReturnCode,
    session_present: bool,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    let ack = ConnectAckPacket::new(session_present, code);
    send_packet(stream, &ack).await
}

fn has_persisted_state(domain: &Domain, client_id: &str) -> bool {
    !domain.storage().flush_queued(client_id).unwrap_or_default().is_empty()
}

/// Validate the CONNECT packet against domain policy, replying with the
/// precise CONNACK failure code spec.md's CONNECT Open Question resolves
/// to, and return the negotiated session parameters on success.
async fn admit<S>(
    stream: &mut S,
    packet: &ConnectPacket,
    domain: &Arc<Domain>,
    allow_empty_client_id: bool,
    listener_keep_alive: u16,
    maximum_keep_alive: u32,
) -> Result<Option<(String, bool, u16, Option<Will>)>, crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    if packet.protocol_level() != myqtt_codec::ProtocolLevel::V4 {
        send_connack(stream, ConnectReturnCode::UnacceptedProtocol).await?;
        return Ok(None);
    }

    let mut client_id = packet.client_id().to_string();
    if client_id.is_empty() {
        if !allow_empty_client_id {
            send_connack(stream, ConnectReturnCode::IdentifierRejected).await?;
            return Ok(None);
        }
        client_id = format!("myqttd-{}", uuid_like());
    }

    let flags = packet.connect_flags();
    let username = flags.has_username().then(|| packet.username());
    let password = if flags.has_password() { packet.password() } else { &[] };

    if !domain.authenticate(username, password) {
        send_connack(stream, ConnectReturnCode::Unauthorized).await?;
        return Ok(None);
    }
    if !domain.accepts_client_id(username, &client_id) {
        send_connack(stream, ConnectReturnCode::IdentifierRejected).await?;
        return Ok(None);
    }

    let keep_alive = if packet.keep_alive() == 0 {
        listener_keep_alive
    } else {
        packet.keep_alive()
    };
    // MQTT 3.1.1 has no CONNACK field to tell the client a different
    // keep-alive, so an over-long request is silently clamped to the
    // server's ceiling rather than refused: the broker still enforces its
    // own (shorter) timeout via `keep_alive_deadline` in `drive`.
    let keep_alive = if maximum_keep_alive > 0 && u32::from(keep_alive) > maximum_keep_alive {
        u16::try_from(maximum_keep_alive).unwrap_or(u16::MAX)
    } else {
        keep_alive
    };

    let will = if flags.will() {
        let Some(topic) = packet.will_topic() else {
            send_connack(stream, ConnectReturnCode::ServerUnavailable).await?;
            return Ok(None);
        };
        Some(Will {
            topic: topic.to_string(),
            qos: flags.will_qos(),
            retain: flags.will_retain(),
            payload: packet.will_message().to_vec(),
        })
    } else {
        None
    };

    Ok(Some((client_id, flags.clean_session(), keep_alive, will)))
}

fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}")
}

#[allow(clippy::too_many_arguments)]
async fn drive<S>(
    stream: &mut S,
    buf: &mut Vec<u8>,
    read_buf: &mut [u8],
    domain: &Arc<Domain>,
    client_id: &str,
    clean_session: bool,
    keep_alive: u16,
    will: Option<Will>,
    rx: &mut mpsc::Receiver<ToSession>,
    message_size_limit: u32,
    max_qos: QoS,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut packet_ids = PacketIdAllocator::new();
    let mut inflight_out: HashMap<u16, Inflight> = HashMap::new();
    let mut last_activity = Instant::now();
    let keep_alive_deadline = Duration::from_millis(u64::from(keep_alive) * 1500).max(Duration::from_secs(1));

    if !clean_session {
        for queued in domain.storage().flush_queued(client_id)? {
            let (topic, payload) = decode_queued_payload(&queued.payload)?;
            send_publish(
                stream,
                domain,
                client_id,
                &mut packet_ids,
                &mut inflight_out,
                &topic,
                payload,
                queued.qos,
                false,
                Some(queued.handle),
            )
            .await?;
        }
    }

    let abnormal_close = loop {
        tokio::select! {
            incoming = read_one_packet(stream, buf, read_buf, Some(message_size_limit)) => {
                match incoming {
                    Ok(Some(packet)) => {
                        last_activity = Instant::now();
                        match handle_packet(stream, domain, client_id, &mut packet_ids, &mut inflight_out, packet, max_qos).await {
                            Ok(true) => {}
                            Ok(false) => break false,
                            Err(err) => {
                                log::warn!("{client_id}: protocol error: {err}");
                                break true;
                            }
                        }
                    }
                    Ok(None) => break true,
                    Err(err) => {
                        log::warn!("{client_id}: decode error: {err}");
                        break true;
                    }
                }
            }
            message = rx.recv() => {
                match message {
                    Some(ToSession::Publish(delivery)) => {
                        if let Err(err) = send_publish(
                            stream, domain, client_id, &mut packet_ids, &mut inflight_out,
                            &delivery.topic, delivery.payload, delivery.qos, delivery.retain, None,
                        ).await {
                            log::warn!("{client_id}: delivery failed: {err}");
                            break true;
                        }
                    }
                    Some(ToSession::Tick) => {
                        if keep_alive != 0 && last_activity.elapsed() > keep_alive_deadline {
                            log::info!("{client_id}: keep-alive timeout");
                            break true;
                        }
                        if let Err(err) = redeliver_timed_out(stream, &mut inflight_out).await {
                            log::warn!("{client_id}: redelivery failed: {err}");
                            break true;
                        }
                    }
                    Some(ToSession::Kick) => break false,
                    None => break true,
                }
            }
        }
    };

    if abnormal_close {
        if let Some(will) = will {
            publish_to_domain(domain, &will.topic, will.qos, &will.payload, will.retain)?;
        }
    }

    if clean_session {
        for (_, inflight) in inflight_out {
            if let Some(handle) = inflight.handle {
                let _ = domain.storage().release_message(client_id, &handle);
            }
        }
    }

    Ok(())
}

async fn redeliver_timed_out<S>(
    stream: &mut S,
    inflight: &mut HashMap<u16, Inflight>,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    for entry in inflight.values_mut() {
        if entry.last_sent.elapsed() < Duration::from_secs(10) {
            continue;
        }
        if entry.attempts >= MAX_REDELIVERY_ATTEMPTS {
            continue;
        }
        entry.packet.set_dup(true).ok();
        send_packet(stream, &entry.packet).await?;
        entry.last_sent = Instant::now();
        entry.attempts += 1;
    }
    Ok(())
}

/// `myqtt-storage` persists a queued QoS 1/2 payload with no associated
/// topic; prefix it with a length-delimited topic so a flushed message can
/// be replayed as a proper PUBLISH after a `clean_session=false` reconnect.
fn encode_queued_payload(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + topic.len() + payload.len());
    out.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    out.extend_from_slice(topic.as_bytes());
    out.extend_from_slice(payload);
    out
}

fn decode_queued_payload(raw: &[u8]) -> Result<(String, Vec<u8>), crate::error::Error> {
    if raw.len() < 2 {
        return Err(crate::error::Error::new(
            crate::error::ErrorKind::StorageError,
            "queued payload missing topic header",
        ));
    }
    let topic_len = u16::from_be_bytes([raw[0], raw[1]]) as usize;
    let rest = &raw[2..];
    if rest.len() < topic_len {
        return Err(crate::error::Error::new(
            crate::error::ErrorKind::StorageError,
            "queued payload truncated",
        ));
    }
    let topic = String::from_utf8_lossy(&rest[..topic_len]).into_owned();
    let payload = rest[topic_len..].to_vec();
    Ok((topic, payload))
}

#[allow(clippy::too_many_arguments)]
async fn send_publish<S>(
    stream: &mut S,
    domain: &Arc<Domain>,
    client_id: &str,
    packet_ids: &mut PacketIdAllocator,
    inflight: &mut HashMap<u16, Inflight>,
    topic: &str,
    payload: Vec<u8>,
    qos: QoS,
    retain: bool,
    handle: Option<MessageHandle>,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    let mut packet = PublishPacket::new(topic, qos, &payload)?;
    packet.set_retain(retain);
    if qos != QoS::AtMostOnce {
        let packet_id = packet_ids.next();
        packet.set_packet_id(packet_id);
        send_packet(stream, &packet).await?;
        let stored_handle = match handle {
            Some(h) => Some(h),
            None => {
                let queued = encode_queued_payload(topic, &payload);
                Some(domain.storage().store_message(client_id, packet_id, qos, &queued)?)
            }
        };
        inflight.insert(
            packet_id.value(),
            Inflight {
                packet,
                handle: stored_handle,
                last_sent: Instant::now(),
                attempts: 0,
            },
        );
    } else {
        send_packet(stream, &packet).await?;
    }
    Ok(())
}

fn publish_to_domain(
    domain: &Arc<Domain>,
    topic: &str,
    qos: QoS,
    payload: &[u8],
    retain: bool,
) -> Result<(), crate::error::Error> {
    if retain {
        domain.storage().upsert_retained(topic, qos, payload)?;
    }
    let pub_topic = PubTopic::new(topic)?;
    let subscribers = domain.router().matching(&pub_topic, qos);
    for (subscriber, granted_qos) in subscribers {
        route_to_subscriber(domain, &subscriber, topic, granted_qos, payload)?;
    }
    Ok(())
}

fn route_to_subscriber(
    domain: &Arc<Domain>,
    subscriber: &Subscriber,
    topic: &str,
    qos: QoS,
    payload: &[u8],
) -> Result<(), crate::error::Error> {
    match &subscriber.sender {
        Some(sender) => {
            let delivery = Delivery {
                topic: topic.to_string(),
                qos,
                payload: payload.to_vec(),
                retain: false,
            };
            let _ = sender.try_send(ToSession::Publish(delivery));
        }
        None => {
            if qos != QoS::AtMostOnce {
                let queued = encode_queued_payload(topic, payload);
                if domain.storage().would_reject_store(&subscriber.client_id, queued.len() as u64) {
                    log::warn!(
                        "{}: offline queue over quota/message-count limit, dropping queued message for topic {topic}",
                        subscriber.client_id
                    );
                    return Ok(());
                }
                let packet_id = next_queue_packet_id();
                domain.storage().store_message(&subscriber.client_id, packet_id, qos, &queued)?;
            }
        }
    }
    Ok(())
}

/// Packet ids for messages queued while a `clean_session=false` subscriber
/// is offline never correlate with an in-flight exchange, so a single
/// process-wide counter (distinct from any session's own allocator) is
/// enough to keep `myqtt-storage`'s file names from colliding.
fn next_queue_packet_id() -> PacketId {
    use std::sync::atomic::{AtomicU16, Ordering};
    static COUNTER: AtomicU16 = AtomicU16::new(1);
    let mut value = COUNTER.fetch_add(1, Ordering::Relaxed);
    if value == 0 {
        value = COUNTER.fetch_add(1, Ordering::Relaxed);
    }
    PacketId::new(value)
}

async fn handle_packet<S>(
    stream: &mut S,
    domain: &Arc<Domain>,
    client_id: &str,
    packet_ids: &mut PacketIdAllocator,
    inflight: &mut HashMap<u16, Inflight>,
    packet: MqttPacket,
    max_qos: QoS,
) -> Result<bool, crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    match packet {
        MqttPacket::Publish(publish) => {
            handle_inbound_publish(stream, domain, client_id, publish, max_qos).await?;
            Ok(true)
        }
        MqttPacket::PublishAck(ack) => {
            if let Some(entry) = inflight.remove(&ack.packet_id().value()) {
                if let Some(handle) = entry.handle {
                    domain.storage().release_message(client_id, &handle)?;
                }
            }
            Ok(true)
        }
        MqttPacket::PublishReceived(received) => {
            let rel = PublishReleasePacket::new(received.packet_id());
            send_packet(stream, &rel).await?;
            Ok(true)
        }
        MqttPacket::PublishRelease(release) => {
            domain.storage().unlock_packet_id(client_id, release.packet_id())?;
            let comp = PublishCompletePacket::new(release.packet_id());
            send_packet(stream, &comp).await?;
            Ok(true)
        }
        MqttPacket::PublishComplete(complete) => {
            if let Some(entry) = inflight.remove(&complete.packet_id().value()) {
                if let Some(handle) = entry.handle {
                    domain.storage().release_message(client_id, &handle)?;
                }
            }
            Ok(true)
        }
        MqttPacket::Subscribe(subscribe) => {
            handle_subscribe(stream, domain, client_id, packet_ids, inflight, subscribe, max_qos).await?;
            Ok(true)
        }
        MqttPacket::Unsubscribe(unsubscribe) => {
            handle_unsubscribe(stream, domain, client_id, unsubscribe).await?;
            Ok(true)
        }
        MqttPacket::PingRequest(_) => {
            send_packet(stream, &PingResponsePacket::new()).await?;
            Ok(true)
        }
        MqttPacket::Disconnect(_) => Ok(false),
        MqttPacket::Connect(_) | MqttPacket::ConnectAck(_) | MqttPacket::SubscribeAck(_)
        | MqttPacket::UnsubscribeAck(_) | MqttPacket::PingResponse(_) => {
            Err(crate::error::Error::new(
                crate::error::ErrorKind::ProtocolError,
                "unexpected packet type from client",
            ))
        }
    }
}

async fn handle_inbound_publish<S>(
    stream: &mut S,
    domain: &Arc<Domain>,
    client_id: &str,
    publish: PublishPacket,
    max_qos: QoS,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    if publish.qos() > max_qos {
        return Err(crate::error::Error::new(
            crate::error::ErrorKind::ProtocolError,
            "PUBLISH QoS exceeds [general].maximum_qos",
        ));
    }

    // spec.md §4.5 "on-store hook": a client over its own storage quota or
    // message-count limit has its QoS 1/2 PUBLISH dropped with no ACK at
    // all, so the client's own retransmit timer resubmits it later instead
    // of the broker acknowledging work it never actually queued.
    if publish.qos() != QoS::AtMostOnce
        && domain.storage().would_reject_store(client_id, publish.message().len() as u64)
    {
        log::warn!("{client_id}: storage quota/message-count limit exceeded, dropping PUBLISH without ACK");
        return Ok(());
    }

    match publish.qos() {
        QoS::AtMostOnce => {
            publish_to_domain(domain, publish.topic(), publish.qos(), publish.message(), publish.retain())?;
        }
        QoS::AtLeastOnce => {
            publish_to_domain(domain, publish.topic(), publish.qos(), publish.message(), publish.retain())?;
            send_packet(stream, &PublishAckPacket::new(publish.packet_id())).await?;
        }
        QoS::ExactOnce => {
            let first_time = domain.storage().lock_packet_id(client_id, publish.packet_id())?;
            if first_time {
                publish_to_domain(domain, publish.topic(), publish.qos(), publish.message(), publish.retain())?;
            }
            send_packet(stream, &PublishReceivedPacket::new(publish.packet_id())).await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_subscribe<S>(
    stream: &mut S,
    domain: &Arc<Domain>,
    client_id: &str,
    packet_ids: &mut PacketIdAllocator,
    inflight: &mut HashMap<u16, Inflight>,
    subscribe: SubscribePacket,
    max_qos: QoS,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    let disable_wildcards = domain.settings().disable_wildcard_support();
    let mut acks = Vec::with_capacity(subscribe.topics().len());
    let mut replay: Vec<(String, QoS)> = Vec::new();

    for topic in subscribe.topics() {
        if disable_wildcards && (topic.topic().contains('+') || topic.topic().contains('#')) {
            acks.push(SubscribeAck::Failed);
            continue;
        }
        let Ok(filter) = SubTopic::new(topic.topic()) else {
            acks.push(SubscribeAck::Failed);
            continue;
        };
        let granted = topic.qos().min(max_qos);
        domain.storage().record_subscription(client_id, filter.as_ref(), granted)?;
        if let Some(sender) = domain.client_sender(client_id) {
            domain.router().subscribe(client_id, filter.clone(), granted, sender);
        }
        acks.push(SubscribeAck::QoS(granted));
        replay.push((filter.as_ref().to_string(), granted));
    }

    let ack_packet = SubscribeAckPacket::with_vec(subscribe.packet_id(), acks);
    send_packet(stream, &ack_packet).await?;

    for (filter, qos) in replay {
        let sub_topic = SubTopic::new(&filter)?;
        for retained in domain.storage().retained_matching(|t| sub_topic.matches(t)) {
            let qos = retained.qos.min(qos);
            send_publish(
                stream,
                domain,
                client_id,
                packet_ids,
                inflight,
                &retained.topic,
                retained.payload,
                qos,
                true,
                None,
            )
            .await?;
        }
    }

    Ok(())
}

async fn handle_unsubscribe<S>(
    stream: &mut S,
    domain: &Arc<Domain>,
    client_id: &str,
    unsubscribe: UnsubscribePacket,
) -> Result<(), crate::error::Error>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    for topic in unsubscribe.topics() {
        domain.router().unsubscribe(client_id, topic.as_ref());
        domain.storage().remove_subscription(client_id, topic.as_ref())?;
    }
    send_packet(stream, &UnsubscribeAckPacket::new(unsubscribe.packet_id())).await
}
