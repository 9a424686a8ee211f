//! The connection task
//!
//! One spawned task owns everything connection-scoped for a single camera:
//! the transport, the session state machine, the frame decoder, the consumer
//! router, and every timer (keep-alive, placeholder injection, playback
//! retry, reconnect backoff, talkback idle). All interaction happens over
//! the command channel, so no locks are involved anywhere.
//!
//! The select loop resolves to a [`Wake`] value first and mutates state
//! afterwards, which keeps the borrow story simple: timer deadlines are
//! copied out before the select, and branches that do not apply (no
//! connection, no armed timer) park on a pending future.

use std::future::Future;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::error::Result;
use crate::media::PlaceholderFrames;
use crate::protocol::constants::{
    end_reason, error_code, packet_type, StreamProfile, NAL_START, PING_INTERVAL,
    PLACEHOLDER_INTERVAL, PLAYBACK_RETRY_DELAY, TALKBACK_IDLE_TIMEOUT,
};
use crate::protocol::frame::{encode_frame, Frame, FrameDecoder};
use crate::protocol::message::{
    encode_audio_payload, encode_authorize_request, encode_stop_playback, Credential,
    ErrorMessage, Hello, PlaybackBegin, PlaybackEnd, PlaybackPacket, Redirect, StartPlayback,
};
use crate::router::{
    AudioSource, ConsumerRouter, LiveConsumer, MediaKind, MediaSink, RecorderHandle, TimedBuffer,
};
use crate::session::SessionState;

use super::camera::{CameraDescriptor, CameraUpdate};
use super::config::StreamerConfig;
use super::transport::{Transport, TransportEvent};

const RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
const RECONNECT_FAILURE_THRESHOLD: u32 = 5;

/// Request sent from the [`NexusStreamer`](super::streamer::NexusStreamer)
/// handle into the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    StartBuffering {
        window: Duration,
    },
    StartLive {
        id: u64,
        video: Option<MediaSink>,
        audio: Option<MediaSink>,
        talkback: Option<AudioSource>,
    },
    StartRecord {
        id: u64,
        recorder: RecorderHandle,
        video: Option<MediaSink>,
        audio: Option<MediaSink>,
    },
    StopLive {
        id: u64,
    },
    StopRecord {
        id: u64,
    },
    StopBuffering,
    Update {
        credential: Option<Credential>,
        camera: CameraUpdate,
    },
    /// Talkback chunk looped back from a forwarder task
    TalkbackData {
        id: u64,
        chunk: Bytes,
    },
    Shutdown,
}

/// Out-of-band notification published by the connection task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamerEvent {
    /// The camera reported a non-recoverable protocol error
    ProtocolError { code: u64, message: String },
    /// The camera ended playback with the given reason code
    PlaybackEnded { reason: u64 },
    /// The camera redirected us to a different host
    Redirected { host: String },
    /// Consecutive reconnect attempts reached the failure threshold;
    /// attempts continue at the maximum backoff
    ReconnectFailed { attempts: u32 },
}

/// Seam for establishing transports, so tests can swap TLS sockets for
/// in-memory duplex streams.
pub(crate) trait Connector: Send + 'static {
    fn connect(
        &mut self,
        host: &str,
    ) -> impl Future<Output = Result<(Transport, mpsc::Receiver<TransportEvent>)>> + Send;
}

/// Production connector: TLS to `<host>:1443`
#[derive(Debug, Default)]
pub(crate) struct TlsConnect;

impl Connector for TlsConnect {
    async fn connect(
        &mut self,
        host: &str,
    ) -> Result<(Transport, mpsc::Receiver<TransportEvent>)> {
        Transport::connect(host).await
    }
}

/// Connection-scoped state, recreated on every (re)connect
struct Conn {
    transport: Transport,
    events: mpsc::Receiver<TransportEvent>,
    session: SessionState,
    decoder: FrameDecoder,
    ping: Interval,
    /// Armed by a transient PLAYBACK_END; fires a single delayed restart
    retry_at: Option<Instant>,
}

/// What the select loop woke up for
enum Wake {
    Command(Option<Command>),
    Transport(Option<TransportEvent>),
    Ping,
    PlaceholderTick,
    PlaybackRetry,
    Reconnect,
    TalkbackIdle(u64),
}

/// The per-camera connection task
pub(crate) struct StreamerTask<C> {
    connector: C,
    config: StreamerConfig,
    camera: CameraDescriptor,
    placeholders: PlaceholderFrames,
    router: ConsumerRouter,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Handed to talkback forwarder tasks. Weak so the task still notices
    /// the public handle going away.
    loopback: mpsc::WeakUnboundedSender<Command>,
    events: mpsc::UnboundedSender<StreamerEvent>,
    conn: Option<Conn>,
    /// Survives redirects and reconnects; cleared on graceful teardown
    session_id: Option<u64>,
    /// Host currently in use (diverges from the camera default after a
    /// redirect)
    host: String,
    placeholder_tick: Interval,
    reconnect_at: Option<Instant>,
    reconnect_delay: Duration,
    reconnect_failures: u32,
}

impl<C: Connector> StreamerTask<C> {
    /// Must be called inside a tokio runtime
    pub(crate) fn new(
        connector: C,
        config: StreamerConfig,
        camera: CameraDescriptor,
        commands: mpsc::UnboundedReceiver<Command>,
        loopback: mpsc::WeakUnboundedSender<Command>,
        events: mpsc::UnboundedSender<StreamerEvent>,
    ) -> Self {
        let placeholders = match &config.asset_dir {
            Some(dir) => PlaceholderFrames::load(dir),
            None => PlaceholderFrames::default(),
        };
        let host = camera.host.clone();
        let mut placeholder_tick =
            time::interval_at(Instant::now() + PLACEHOLDER_INTERVAL, PLACEHOLDER_INTERVAL);
        placeholder_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            connector,
            config,
            camera,
            placeholders,
            router: ConsumerRouter::new(),
            commands,
            loopback,
            events,
            conn: None,
            session_id: None,
            host,
            placeholder_tick,
            reconnect_at: None,
            reconnect_delay: RECONNECT_INITIAL_DELAY,
            reconnect_failures: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(camera = %self.camera.uuid, "Streamer task started");
        loop {
            match self.next_wake().await {
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => break,
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Transport(Some(TransportEvent::Data(chunk))) => {
                    self.handle_data(chunk).await
                }
                Wake::Transport(Some(TransportEvent::Error(e))) => {
                    tracing::warn!(error = %e, "Transport error");
                    self.handle_disconnect();
                }
                Wake::Transport(_) => self.handle_disconnect(),
                Wake::Ping => self.send_message(packet_type::PING, Bytes::new()),
                Wake::PlaceholderTick => {
                    // Periodic check of the camera flags: substitute frames
                    // while unavailable, reconnect once streamable again
                    self.inject_placeholder();
                    self.ensure_connected().await;
                }
                Wake::PlaybackRetry => {
                    if let Some(conn) = self.conn.as_mut() {
                        conn.retry_at = None;
                    }
                    self.request_playback();
                }
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    self.open_connection().await;
                }
                Wake::TalkbackIdle(id) => self.talkback_idle(id),
            }
        }
        self.close_connection();
        self.router.clear();
        tracing::debug!(camera = %self.camera.uuid, "Streamer task stopped");
    }

    async fn next_wake(&mut self) -> Wake {
        let talkback = self.router.next_talkback_deadline();
        let reconnect_at = self.reconnect_at;
        let (conn_events, ping, retry_at) = match self.conn.as_mut() {
            Some(conn) => (Some(&mut conn.events), Some(&mut conn.ping), conn.retry_at),
            None => (None, None, None),
        };
        tokio::select! {
            command = self.commands.recv() => Wake::Command(command),
            event = recv_or_pending(conn_events) => Wake::Transport(event),
            _ = tick_or_pending(ping) => Wake::Ping,
            _ = self.placeholder_tick.tick() => Wake::PlaceholderTick,
            _ = sleep_or_pending(retry_at) => Wake::PlaybackRetry,
            _ = sleep_or_pending(reconnect_at) => Wake::Reconnect,
            _ = sleep_or_pending(talkback.map(|(_, at)| at)) => {
                Wake::TalkbackIdle(talkback.map(|(id, _)| id).unwrap_or(0))
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartBuffering { window } => {
                if self.router.add_buffer(TimedBuffer::new(window)) {
                    self.ensure_connected().await;
                }
            }
            Command::StartLive {
                id,
                video,
                audio,
                talkback,
            } => {
                let talkback_forwarder =
                    talkback.map(|source| self.spawn_talkback_forwarder(id, source));
                self.router.add_live(LiveConsumer {
                    id,
                    video,
                    audio,
                    talkback_deadline: None,
                    talkback_forwarder,
                });
                self.ensure_connected().await;
            }
            Command::StartRecord {
                id,
                recorder,
                video,
                audio,
            } => {
                self.router.add_record(id, recorder, video, audio);
                self.ensure_connected().await;
            }
            Command::StopLive { id } => {
                if self.router.remove_live(id) {
                    self.maybe_teardown();
                }
            }
            Command::StopRecord { id } => {
                if self.router.remove_record(id) {
                    self.maybe_teardown();
                }
            }
            Command::StopBuffering => {
                if self.router.remove_buffer() {
                    self.maybe_teardown();
                }
            }
            Command::Update { credential, camera } => {
                self.handle_update(credential, camera).await
            }
            Command::TalkbackData { id, chunk } => self.talkback_data(id, chunk),
            // Handled by the run loop
            Command::Shutdown => {}
        }
    }

    fn spawn_talkback_forwarder(&self, id: u64, mut source: AudioSource) -> JoinHandle<()> {
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            while let Some(chunk) = source.recv().await {
                let Some(sender) = loopback.upgrade() else { break };
                if sender.send(Command::TalkbackData { id, chunk }).is_err() {
                    break;
                }
            }
        })
    }

    async fn ensure_connected(&mut self) {
        if self.conn.is_some() || self.reconnect_at.is_some() {
            return;
        }
        self.open_connection().await;
    }

    async fn open_connection(&mut self) {
        if self.conn.is_some() || self.router.is_empty() {
            return;
        }
        // The placeholder injector covers unavailable cameras; a later
        // update restores the connection.
        if !self.camera.can_stream() {
            return;
        }
        // Cameras expect a small numeric session id
        let session_id = *self
            .session_id
            .get_or_insert_with(|| rand::thread_rng().gen_range(0..100));
        tracing::debug!(host = %self.host, session_id, "Connecting");
        match self.connector.connect(&self.host).await {
            Ok((transport, events)) => {
                let mut session = SessionState::new(session_id);
                session.on_transport_open();
                let mut ping = time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
                ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.conn = Some(Conn {
                    transport,
                    events,
                    session,
                    decoder: FrameDecoder::new(),
                    ping,
                    retry_at: None,
                });
                self.reset_backoff();
                self.send_hello();
                self.request_playback();
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "Connect failed");
                self.schedule_reconnect();
            }
        }
    }

    fn send_hello(&mut self) {
        let payload = Hello {
            camera_uuid: &self.camera.uuid,
            serial: &self.camera.serial,
            credential: &self.config.credential,
        }
        .encode();
        self.send_message(packet_type::HELLO, payload);
    }

    /// Compose the profile negotiation and send START_PLAYBACK (queued if
    /// authorization is still pending).
    fn request_playback(&mut self) {
        if !self.camera.can_stream() {
            return;
        }
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if conn.session.start_in_flight {
            return;
        }
        conn.session.start_in_flight = true;
        let session_id = conn.session.session_id;

        let primary = self.config.quality.code();
        let mut other_profiles = Vec::new();
        if self.camera.audio_enabled {
            other_profiles.push(StreamProfile::AudioAac.code());
        }
        for profile in self.camera.capability_profiles() {
            let code = profile.code();
            if code != primary && !other_profiles.contains(&code) {
                other_profiles.push(code);
            }
        }
        tracing::debug!(session_id, profile = primary, "Requesting playback");
        let payload = StartPlayback {
            session_id,
            profile: primary,
            other_profiles,
        }
        .encode();
        self.send_message(packet_type::START_PLAYBACK, payload);
    }

    /// Send a message, or queue it until authorization completes
    fn send_message(&mut self, packet_type_code: u8, payload: Bytes) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if conn.session.must_queue(packet_type_code == packet_type::HELLO) {
            conn.session.queue(packet_type_code, payload);
            return;
        }
        conn.transport.send(encode_frame(packet_type_code, &payload));
    }

    async fn handle_data(&mut self, chunk: Bytes) {
        if let Some(conn) = self.conn.as_mut() {
            conn.decoder.extend(&chunk);
        }
        // A handler may replace the connection (redirect), at which point
        // the fresh decoder is empty and the loop ends.
        loop {
            let frame = match self.conn.as_mut() {
                Some(conn) => conn.decoder.next_frame(),
                None => None,
            };
            let Some(frame) = frame else { break };
            self.handle_frame(frame).await;
        }
    }

    async fn handle_frame(&mut self, frame: Frame) {
        match frame.packet_type {
            packet_type::OK => self.on_authorized(),
            packet_type::ERROR => self.on_error(&frame.payload),
            packet_type::PLAYBACK_BEGIN => self.on_playback_begin(&frame.payload),
            packet_type::PLAYBACK_PACKET | packet_type::LONG_PLAYBACK_PACKET => {
                self.on_playback_packet(&frame.payload)
            }
            packet_type::PLAYBACK_END => self.on_playback_end(&frame.payload),
            packet_type::REDIRECT => self.on_redirect(&frame.payload).await,
            packet_type::PING => {}
            other => tracing::debug!(packet_type = other, "Ignoring unhandled packet"),
        }
    }

    fn on_authorized(&mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        tracing::info!(session_id = conn.session.session_id, "Authorized");
        for (packet_type_code, payload) in conn.session.on_authorized() {
            conn.transport.send(encode_frame(packet_type_code, &payload));
        }
    }

    fn on_error(&mut self, payload: &[u8]) {
        let message = match ErrorMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable ERROR payload");
                return;
            }
        };
        if message.code == error_code::AUTHORIZATION_FAILED {
            tracing::info!("Authorization rejected, refreshing");
            self.reauthorize();
        } else {
            tracing::warn!(code = message.code, message = %message.message, "Camera reported error");
            let _ = self.events.send(StreamerEvent::ProtocolError {
                code: message.code,
                message: message.message,
            });
        }
    }

    /// Refresh authorization on the open connection. The AUTHORIZE_REQUEST
    /// itself bypasses the pending queue it reopens.
    fn reauthorize(&mut self) {
        let payload = encode_authorize_request(&self.config.credential);
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        conn.session.on_reauthorize();
        conn.transport
            .send(encode_frame(packet_type::AUTHORIZE_REQUEST, &payload));
    }

    fn on_playback_begin(&mut self, payload: &[u8]) {
        let begin = match PlaybackBegin::decode(payload) {
            Ok(begin) => begin,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable PLAYBACK_BEGIN payload");
                return;
            }
        };
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if conn.session.resolve_channels(begin.session_id, &begin.channels) {
            tracing::info!(
                session_id = begin.session_id,
                video_channel = ?conn.session.video_channel,
                audio_channel = ?conn.session.audio_channel,
                "Playback began"
            );
        } else {
            tracing::debug!(session_id = begin.session_id, "Foreign PLAYBACK_BEGIN ignored");
        }
    }

    fn on_playback_packet(&mut self, payload: &[u8]) {
        let packet = match PlaybackPacket::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable media packet");
                return;
            }
        };
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        if packet.session_id != conn.session.session_id {
            return;
        }
        let kind = if Some(packet.channel_id) == conn.session.video_channel {
            MediaKind::Video
        } else if Some(packet.channel_id) == conn.session.audio_channel {
            MediaKind::Audio
        } else {
            // Metadata channels and anything not negotiated
            return;
        };
        let data = match kind {
            MediaKind::Video => {
                let mut buf = BytesMut::with_capacity(NAL_START.len() + packet.payload.len());
                buf.put_slice(&NAL_START);
                buf.put_slice(&packet.payload);
                buf.freeze()
            }
            MediaKind::Audio => packet.payload,
        };
        self.router.route(Instant::now(), kind, data);
    }

    fn on_playback_end(&mut self, payload: &[u8]) {
        let end = match PlaybackEnd::decode(payload) {
            Ok(end) => end,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable PLAYBACK_END payload");
                return;
            }
        };
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        if end.session_id != conn.session.session_id {
            return;
        }
        conn.session.start_in_flight = false;
        if end.reason != 0 && end.reason != end_reason::TIME_NOT_AVAILABLE {
            tracing::debug!(reason = end.reason, "Playback ended, retrying shortly");
            conn.retry_at = Some(Instant::now() + PLAYBACK_RETRY_DELAY);
        } else {
            tracing::debug!(reason = end.reason, "Playback ended");
        }
        let _ = self
            .events
            .send(StreamerEvent::PlaybackEnded { reason: end.reason });
    }

    async fn on_redirect(&mut self, payload: &[u8]) {
        let redirect = match Redirect::decode(payload) {
            Ok(redirect) => redirect,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable REDIRECT payload");
                return;
            }
        };
        if redirect.new_host.is_empty() || redirect.new_host == self.host {
            return;
        }
        tracing::info!(host = %redirect.new_host, "Redirected");
        let _ = self.events.send(StreamerEvent::Redirected {
            host: redirect.new_host.clone(),
        });
        // Consumers and the session id stay; only the transport moves.
        self.close_connection();
        self.host = redirect.new_host;
        self.open_connection().await;
    }

    async fn handle_update(&mut self, credential: Option<Credential>, update: CameraUpdate) {
        if let Some(credential) = credential {
            if credential != self.config.credential {
                self.config.credential = credential;
                if self.conn.is_some() {
                    tracing::debug!("Credential changed, re-authorizing");
                    self.reauthorize();
                }
            }
        }
        let changes = update.apply(&mut self.camera);
        if changes.host && !self.router.is_empty() {
            // Applies whether connected or sitting in a reconnect backoff;
            // a pending retry against the old host is cancelled.
            tracing::debug!(host = %self.camera.host, "Camera host changed, reconnecting");
            self.close_connection();
            self.host = self.camera.host.clone();
            self.reconnect_at = None;
            self.reset_backoff();
            self.open_connection().await;
        } else if changes.availability && self.conn.is_none() && !self.router.is_empty() {
            self.host = self.camera.host.clone();
            self.reconnect_at = None;
            self.reset_backoff();
            self.ensure_connected().await;
        }
    }

    fn talkback_data(&mut self, id: u64, chunk: Bytes) {
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        let payload = encode_audio_payload(conn.session.session_id, &chunk);
        self.send_message(packet_type::AUDIO_PAYLOAD, payload);
        if let Some(live) = self.router.live_mut(id) {
            live.talkback_deadline = Some(Instant::now() + TALKBACK_IDLE_TIMEOUT);
        }
    }

    /// No talkback audio for a while: disarm the timer and mark the gap
    /// with an empty payload.
    fn talkback_idle(&mut self, id: u64) {
        if let Some(live) = self.router.live_mut(id) {
            live.talkback_deadline = None;
        }
        let Some(conn) = self.conn.as_ref() else {
            return;
        };
        let payload = encode_audio_payload(conn.session.session_id, &[]);
        self.send_message(packet_type::AUDIO_PAYLOAD, payload);
    }

    /// Substitute a still frame into the video path while the camera is
    /// offline or has streaming disabled.
    fn inject_placeholder(&mut self) {
        if self.router.is_empty() {
            return;
        }
        let frame = if !self.camera.online {
            self.placeholders.offline()
        } else if !self.camera.streaming_enabled {
            self.placeholders.streaming_off()
        } else {
            return;
        };
        let Some(frame) = frame else { return };
        let mut buf = BytesMut::with_capacity(NAL_START.len() + frame.len());
        buf.put_slice(&NAL_START);
        buf.put_slice(frame);
        let data = buf.freeze();
        self.router.route(Instant::now(), MediaKind::Video, data);
    }

    /// Last consumer gone: tear the connection down gracefully and forget
    /// the session.
    fn maybe_teardown(&mut self) {
        if !self.router.is_empty() {
            return;
        }
        tracing::debug!("Last consumer removed, closing connection");
        self.close_connection();
        self.session_id = None;
        self.host = self.camera.host.clone();
        self.reconnect_at = None;
        self.reset_backoff();
    }

    fn close_connection(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if !conn.session.must_queue(false) {
            conn.transport.send(encode_frame(
                packet_type::STOP_PLAYBACK,
                &encode_stop_playback(conn.session.session_id),
            ));
        }
        conn.session.begin_close();
        // Dropping the transport drains queued frames before shutdown
    }

    fn handle_disconnect(&mut self) {
        if self.conn.take().is_none() {
            return;
        }
        tracing::warn!(host = %self.host, "Connection lost");
        if self.router.is_empty() {
            self.session_id = None;
            return;
        }
        // Always retry against the camera's default host
        self.host = self.camera.host.clone();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_failures += 1;
        if self.reconnect_failures == RECONNECT_FAILURE_THRESHOLD {
            let _ = self.events.send(StreamerEvent::ReconnectFailed {
                attempts: self.reconnect_failures,
            });
        }
        tracing::debug!(
            delay_ms = self.reconnect_delay.as_millis() as u64,
            attempt = self.reconnect_failures,
            "Scheduling reconnect"
        );
        self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
        self.reconnect_delay = (self.reconnect_delay * 2).min(RECONNECT_MAX_DELAY);
    }

    fn reset_backoff(&mut self) {
        self.reconnect_delay = RECONNECT_INITIAL_DELAY;
        self.reconnect_failures = 0;
    }
}

async fn recv_or_pending(
    events: Option<&mut mpsc::Receiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn tick_or_pending(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
