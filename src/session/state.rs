//! Connection and authentication state machine
//!
//! Tracks one NexusTalk connection from transport open through
//! authorization, and owns the pending-outbound queue of messages composed
//! before authorization completed.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::protocol::constants::codec;
use crate::protocol::message::ChannelInfo;

/// Connection lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No transport
    Disconnected,
    /// Transport connect in progress
    Connecting,
    /// Transport open, HELLO sent, waiting for the camera's OK
    AwaitingAuth,
    /// Camera acknowledged authorization
    Authorized,
    /// Graceful teardown in progress (we asked to close)
    Closing,
}

/// State for one connection
#[derive(Debug)]
pub struct SessionState {
    /// Current phase
    pub phase: ConnectionPhase,

    /// Connection-scoped random session id; survives re-authorization and
    /// redirects, regenerated only on a fresh connection
    pub session_id: u64,

    /// Channel carrying H.264 video, resolved from PLAYBACK_BEGIN
    pub video_channel: Option<u64>,

    /// Channel carrying AAC audio, resolved from PLAYBACK_BEGIN
    pub audio_channel: Option<u64>,

    /// Whether a START_PLAYBACK is in flight and unanswered
    pub start_in_flight: bool,

    /// Messages composed before authorization completed, flushed exactly
    /// once, in enqueue order, the instant authorization succeeds
    pending: VecDeque<(u8, Bytes)>,
}

impl SessionState {
    /// Create state for a new connection attempt
    pub fn new(session_id: u64) -> Self {
        Self {
            phase: ConnectionPhase::Connecting,
            session_id,
            video_channel: None,
            audio_channel: None,
            start_in_flight: false,
            pending: VecDeque::new(),
        }
    }

    /// Transport opened; HELLO goes out next
    pub fn on_transport_open(&mut self) {
        if self.phase == ConnectionPhase::Connecting {
            self.phase = ConnectionPhase::AwaitingAuth;
        }
    }

    /// Positive acknowledgement received; drain the pending queue
    ///
    /// Returns the queued messages in original enqueue order. The queue is
    /// emptied so nothing is ever flushed twice.
    pub fn on_authorized(&mut self) -> Vec<(u8, Bytes)> {
        self.phase = ConnectionPhase::Authorized;
        self.pending.drain(..).collect()
    }

    /// Authorization must be refreshed (auth failure or credential change)
    pub fn on_reauthorize(&mut self) {
        if self.phase == ConnectionPhase::Authorized {
            self.phase = ConnectionPhase::AwaitingAuth;
        }
    }

    /// We initiated teardown; an ensuing transport close is expected
    pub fn begin_close(&mut self) {
        self.phase = ConnectionPhase::Closing;
    }

    /// Whether the teardown in progress was requested by us
    pub fn is_closing(&self) -> bool {
        self.phase == ConnectionPhase::Closing
    }

    /// Whether a message of this type must be queued instead of sent.
    ///
    /// Everything except the initial HELLO waits for authorization; HELLO
    /// itself waits only for the transport.
    pub fn must_queue(&self, is_hello: bool) -> bool {
        match self.phase {
            ConnectionPhase::Connecting | ConnectionPhase::Disconnected => true,
            ConnectionPhase::AwaitingAuth => !is_hello,
            ConnectionPhase::Authorized | ConnectionPhase::Closing => false,
        }
    }

    /// Queue a message for flush on authorization
    pub fn queue(&mut self, packet_type: u8, payload: Bytes) {
        self.pending.push_back((packet_type, payload));
    }

    /// Record the channel→codec mapping from a PLAYBACK_BEGIN reply
    ///
    /// Replies for a different session id are discarded.
    pub fn resolve_channels(&mut self, session_id: u64, channels: &[ChannelInfo]) -> bool {
        if session_id != self.session_id {
            return false;
        }
        for channel in channels {
            if channel.codec_type == codec::H264 {
                self.video_channel = Some(channel.channel_id);
            } else if channel.codec_type == codec::AAC {
                self.audio_channel = Some(channel.channel_id);
            }
        }
        self.start_in_flight = false;
        true
    }

    /// Number of queued pending messages
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::packet_type;

    #[test]
    fn test_phase_transitions() {
        let mut state = SessionState::new(42);
        assert_eq!(state.phase, ConnectionPhase::Connecting);

        state.on_transport_open();
        assert_eq!(state.phase, ConnectionPhase::AwaitingAuth);

        state.on_authorized();
        assert_eq!(state.phase, ConnectionPhase::Authorized);

        state.on_reauthorize();
        assert_eq!(state.phase, ConnectionPhase::AwaitingAuth);
    }

    #[test]
    fn test_pending_flushed_once_in_order() {
        let mut state = SessionState::new(42);
        state.on_transport_open();

        state.queue(packet_type::START_PLAYBACK, Bytes::from_static(b"a"));
        state.queue(packet_type::PING, Bytes::from_static(b"b"));
        state.queue(packet_type::PING, Bytes::from_static(b"c"));

        let flushed = state.on_authorized();
        assert_eq!(
            flushed.iter().map(|(_, p)| &p[..]).collect::<Vec<_>>(),
            vec![b"a".as_slice(), b"b", b"c"]
        );

        // Nothing left for a second flush
        assert!(state.on_authorized().is_empty());
    }

    #[test]
    fn test_must_queue_rules() {
        let mut state = SessionState::new(1);
        // Connecting: everything queues, even HELLO
        assert!(state.must_queue(true));
        assert!(state.must_queue(false));

        state.on_transport_open();
        // AwaitingAuth: only HELLO passes
        assert!(!state.must_queue(true));
        assert!(state.must_queue(false));

        state.on_authorized();
        assert!(!state.must_queue(false));
    }

    #[test]
    fn test_resolve_channels_matching_session() {
        let mut state = SessionState::new(42);
        let channels = vec![
            ChannelInfo {
                channel_id: 10,
                codec_type: codec::H264,
                ..Default::default()
            },
            ChannelInfo {
                channel_id: 11,
                codec_type: codec::AAC,
                ..Default::default()
            },
            ChannelInfo {
                channel_id: 12,
                codec_type: codec::META,
                ..Default::default()
            },
        ];
        assert!(state.resolve_channels(42, &channels));
        assert_eq!(state.video_channel, Some(10));
        assert_eq!(state.audio_channel, Some(11));
    }

    #[test]
    fn test_resolve_channels_ignores_foreign_session() {
        let mut state = SessionState::new(42);
        let channels = vec![ChannelInfo {
            channel_id: 10,
            codec_type: codec::H264,
            ..Default::default()
        }];
        assert!(!state.resolve_channels(7, &channels));
        assert_eq!(state.video_channel, None);
    }
}
