// Copyright (c) 2024 MyQtt contributors. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

//! A cheaply-clonable `AsyncClient` handle paired with an `EventLoop` that
//! owns the transport. This replaces the teacher's single-struct
//! `AsyncClient` (which owned the socket directly and drove it from a
//! borrowed `&mut self`, making it impossible to hand out a handle other
//! tasks could publish/subscribe through); the split mirrors the
//! single-task-owns-the-socket idiom `myqttd::session::run` already uses on
//! the broker side, generalized so a second task (the caller) can drive the
//! connection through a channel instead of calling methods directly.

use std::collections::HashMap;
use std::time::Duration;

use myqtt_codec::{
    ConnectFlags, ConnectPacket, ConnectReturnCode, DisconnectPacket, EncodePacket, MqttPacket,
    PacketId, PacketIdAllocator, PingRequestPacket, ProtocolLevel, PublishCompletePacket,
    PublishPacket, PublishReleasePacket, QoS, SubscribePacket, SubscribeTopic, UnsubscribePacket,
};
use tokio::sync::mpsc;

use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::stream::Stream;

/// A request the `EventLoop` acts on. `AsyncClient` is nothing more than a
/// `Sender<Request>`, so cloning a client and calling it from several tasks
/// is safe.
enum Request {
    Publish {
        topic: String,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    },
    Subscribe {
        topic: String,
        qos: QoS,
    },
    Unsubscribe {
        topic: String,
    },
    Disconnect,
}

/// Something the `EventLoop` observed: either an incoming packet from the
/// broker worth surfacing to the caller, or a terminal condition.
#[derive(Debug, Clone)]
pub enum Event {
    /// The broker accepted our CONNECT.
    ConnAck {
        session_present: bool,
        return_code: ConnectReturnCode,
    },
    /// An application message delivered by the broker.
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },
    /// A previously sent QoS 1 PUBLISH was acknowledged.
    PublishAck { packet_id: PacketId },
    /// A previously sent QoS 2 PUBLISH completed the handshake.
    PublishComplete { packet_id: PacketId },
    /// A SUBSCRIBE was acknowledged.
    SubscribeAck { packet_id: PacketId },
    /// An UNSUBSCRIBE was acknowledged.
    UnsubscribeAck { packet_id: PacketId },
    /// The connection to the broker ended, cleanly or otherwise.
    Disconnected,
}

/// A cheap, cloneable handle for publishing and subscribing. Holds no
/// socket of its own; every call sends a [`Request`] to the paired
/// [`EventLoop`] over an unbounded channel and returns as soon as it is
/// enqueued, not once the broker has acknowledged it.
#[derive(Clone)]
pub struct AsyncClient {
    requests: mpsc::UnboundedSender<Request>,
}

impl AsyncClient {
    /// Builds a connected client. Returns the handle together with the
    /// [`EventLoop`] that must be driven (via [`EventLoop::handshake`] then
    /// repeated [`EventLoop::poll`]) for the connection to make any
    /// progress at all — nothing happens in the background on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP/TLS connection cannot be established.
    pub async fn connect(options: ConnectOptions) -> Result<(Self, EventLoop), Error> {
        let stream = Stream::connect(options.address(), options.connect_type()).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self { requests: tx };
        let event_loop = EventLoop::new(stream, options, rx);
        Ok((client, event_loop))
    }

    /// # Errors
    ///
    /// Returns an error if the paired `EventLoop` has already shut down.
    pub fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: &[u8]) -> Result<(), Error> {
        self.requests
            .send(Request::Publish {
                topic: topic.to_owned(),
                qos,
                retain,
                payload: payload.to_owned(),
            })
            .map_err(|_| Error::new(ErrorKind::Disconnected, "event loop has shut down"))
    }

    /// # Errors
    ///
    /// Returns an error if the paired `EventLoop` has already shut down.
    pub fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), Error> {
        self.requests
            .send(Request::Subscribe {
                topic: topic.to_owned(),
                qos,
            })
            .map_err(|_| Error::new(ErrorKind::Disconnected, "event loop has shut down"))
    }

    /// # Errors
    ///
    /// Returns an error if the paired `EventLoop` has already shut down.
    pub fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        self.requests
            .send(Request::Unsubscribe { topic: topic.to_owned() })
            .map_err(|_| Error::new(ErrorKind::Disconnected, "event loop has shut down"))
    }

    /// # Errors
    ///
    /// Returns an error if the paired `EventLoop` has already shut down.
    pub fn disconnect(&self) -> Result<(), Error> {
        self.requests
            .send(Request::Disconnect)
            .map_err(|_| Error::new(ErrorKind::Disconnected, "event loop has shut down"))
    }
}

/// Owns the transport and drives the connection: sends the CONNECT
/// handshake, services `Request`s from its paired `AsyncClient`, answers
/// keep-alive with PINGREQ, and tracks inflight QoS 1/2 publishes by
/// packet id until they are acknowledged.
pub struct EventLoop {
    stream: Stream,
    options: ConnectOptions,
    requests: mpsc::UnboundedReceiver<Request>,
    packet_ids: PacketIdAllocator,
    inflight_qos1: HashMap<PacketId, PublishPacket>,
    inflight_qos2: HashMap<PacketId, PublishPacket>,
    subscribing: HashMap<PacketId, Vec<SubscribeTopic>>,
    unsubscribing: HashMap<PacketId, Vec<String>>,
    read_buf: Vec<u8>,
    connected: bool,
}

impl EventLoop {
    fn new(stream: Stream, options: ConnectOptions, requests: mpsc::UnboundedReceiver<Request>) -> Self {
        Self {
            stream,
            options,
            requests,
            packet_ids: PacketIdAllocator::new(),
            inflight_qos1: HashMap::new(),
            inflight_qos2: HashMap::new(),
            subscribing: HashMap::new(),
            unsubscribing: HashMap::new(),
            read_buf: Vec::with_capacity(4096),
            connected: false,
        }
    }

    /// Sends the CONNECT handshake and waits for the broker's CONNACK.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake cannot be written, the broker
    /// closes the connection before replying, or replies with anything but
    /// `Accepted`.
    pub async fn handshake(&mut self) -> Result<Event, Error> {
        let mut connect_flags = ConnectFlags::default();
        connect_flags.set_clean_session(self.options.clean_session());
        if let Some(username) = self.options.username() {
            connect_flags.set_has_username(!username.is_empty());
        }
        if self.options.password().is_some() {
            connect_flags.set_has_password(true);
        }
        if let Some(will) = self.options.last_will() {
            connect_flags.set_will(true);
            connect_flags.set_will_qos(will.qos);
            connect_flags.set_will_retain(will.retain);
        }

        let mut packet = ConnectPacket::new(self.options.client_id())?;
        packet.set_protcol_level(ProtocolLevel::V4);
        packet.set_connect_flags(connect_flags);
        packet.set_keep_alive(u16::try_from(self.options.keep_alive().as_secs()).unwrap_or(u16::MAX));
        if let Some(username) = self.options.username() {
            packet.set_username(username)?;
        }
        if let Some(password) = self.options.password() {
            packet.set_password(password)?;
        }
        if let Some(will) = self.options.last_will() {
            packet.set_will_topic(&will.topic)?;
            packet.set_will_message(&will.message)?;
        }

        self.send(&MqttPacket::Connect(packet)).await?;

        let timeout = self.options.connect_timeout();
        let packet = tokio::time::timeout(timeout, self.read_one_packet())
            .await
            .map_err(|_| Error::new(ErrorKind::ConnectionError, "timed out waiting for CONNACK"))??
            .ok_or_else(|| Error::new(ErrorKind::ConnectionError, "connection closed before CONNACK"))?;

        match packet {
            MqttPacket::ConnectAck(ack) => {
                if ack.return_code() == ConnectReturnCode::Accepted {
                    self.connected = true;
                    Ok(Event::ConnAck {
                        session_present: ack.session_present(),
                        return_code: ack.return_code(),
                    })
                } else {
                    Err(Error::from_string(
                        ErrorKind::ConnectionError,
                        format!("broker refused CONNECT: {:?}", ack.return_code()),
                    ))
                }
            }
            _ => Err(Error::new(ErrorKind::ConnectionError, "expected CONNACK as first packet")),
        }
    }

    /// Services exactly one of: an incoming packet from the broker, a
    /// request from the paired [`AsyncClient`], or the keep-alive timer,
    /// returning the next [`Event`] worth surfacing to the caller.
    ///
    /// Callers should loop on this until it returns `Ok(Event::Disconnected)`
    /// or an error.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a malformed frame from the
    /// broker.
    pub async fn poll(&mut self) -> Result<Event, Error> {
        let keep_alive = self.options.keep_alive();
        let ping_every = if keep_alive.is_zero() { Duration::from_secs(u64::MAX / 2) } else { keep_alive };

        loop {
            tokio::select! {
                result = self.read_one_packet() => {
                    match result? {
                        Some(packet) => {
                            if let Some(event) = self.handle_incoming(packet).await? {
                                return Ok(event);
                            }
                        }
                        None => {
                            self.connected = false;
                            return Ok(Event::Disconnected);
                        }
                    }
                }
                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.handle_request(request).await?,
                        None => {
                            self.send(&MqttPacket::Disconnect(DisconnectPacket::new())).await?;
                            self.connected = false;
                            return Ok(Event::Disconnected);
                        }
                    }
                }
                () = tokio::time::sleep(ping_every) => {
                    self.send(&MqttPacket::PingRequest(PingRequestPacket::new())).await?;
                }
            }
        }
    }

    async fn handle_request(&mut self, request: Request) -> Result<(), Error> {
        match request {
            Request::Publish { topic, qos, retain, payload } => {
                let mut packet = PublishPacket::new(&topic, qos, &payload)?;
                packet.set_retain(retain);
                if qos != QoS::AtMostOnce {
                    let packet_id = self.packet_ids.next();
                    packet.set_packet_id(packet_id);
                    match qos {
                        QoS::AtLeastOnce => {
                            self.inflight_qos1.insert(packet_id, packet.clone());
                        }
                        QoS::ExactOnce => {
                            self.inflight_qos2.insert(packet_id, packet.clone());
                        }
                        QoS::AtMostOnce => unreachable!(),
                    }
                }
                self.send(&MqttPacket::Publish(packet)).await
            }
            Request::Subscribe { topic, qos } => {
                let packet_id = self.packet_ids.next();
                let subscribe_topic = SubscribeTopic::new(&topic, qos)?;
                let packet = SubscribePacket::new(&topic, qos, packet_id)?;
                self.subscribing.insert(packet_id, vec![subscribe_topic]);
                self.send(&MqttPacket::Subscribe(packet)).await
            }
            Request::Unsubscribe { topic } => {
                let packet_id = self.packet_ids.next();
                let packet = UnsubscribePacket::new(&topic, packet_id)?;
                self.unsubscribing.insert(packet_id, vec![topic]);
                self.send(&MqttPacket::Unsubscribe(packet)).await
            }
            Request::Disconnect => {
                self.send(&MqttPacket::Disconnect(DisconnectPacket::new())).await
            }
        }
    }

    async fn handle_incoming(&mut self, packet: MqttPacket) -> Result<Option<Event>, Error> {
        match packet {
            MqttPacket::Publish(packet) => Ok(Some(Event::Publish {
                topic: packet.topic().to_owned(),
                payload: packet.message().to_owned(),
                qos: packet.qos(),
                retain: packet.retain(),
            })),
            MqttPacket::PublishAck(packet) => {
                let packet_id = packet.packet_id();
                self.inflight_qos1.remove(&packet_id);
                Ok(Some(Event::PublishAck { packet_id }))
            }
            MqttPacket::PublishReceived(packet) => {
                let release = PublishReleasePacket::new(packet.packet_id());
                self.send(&MqttPacket::PublishRelease(release)).await?;
                Ok(None)
            }
            MqttPacket::PublishRelease(packet) => {
                let complete = PublishCompletePacket::new(packet.packet_id());
                self.send(&MqttPacket::PublishComplete(complete)).await?;
                Ok(None)
            }
            MqttPacket::PublishComplete(packet) => {
                let packet_id = packet.packet_id();
                self.inflight_qos2.remove(&packet_id);
                Ok(Some(Event::PublishComplete { packet_id }))
            }
            MqttPacket::SubscribeAck(packet) => {
                let packet_id = packet.packet_id();
                self.subscribing.remove(&packet_id);
                Ok(Some(Event::SubscribeAck { packet_id }))
            }
            MqttPacket::UnsubscribeAck(packet) => {
                let packet_id = packet.packet_id();
                self.unsubscribing.remove(&packet_id);
                Ok(Some(Event::UnsubscribeAck { packet_id }))
            }
            MqttPacket::PingResponse(_) => Ok(None),
            MqttPacket::Disconnect(_) | MqttPacket::Connect(_) | MqttPacket::ConnectAck(_) => {
                log::warn!("unexpected packet from broker: {packet:?}");
                Ok(None)
            }
        }
    }

    async fn send(&mut self, packet: &MqttPacket) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;
        Ok(())
    }

    async fn read_one_packet(&mut self) -> Result<Option<MqttPacket>, Error> {
        loop {
            if let Some(len) = myqtt_codec::next_frame_len(&self.read_buf)? {
                let frame = self.read_buf.drain(..len).collect::<Vec<u8>>();
                return Ok(Some(MqttPacket::decode(&frame)?));
            }
            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(None);
            }
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}
