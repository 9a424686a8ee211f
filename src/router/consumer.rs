//! Consumer types for media fan-out
//!
//! Three kinds of consumer can be registered against a streamer: a single
//! rolling pre-roll buffer, any number of live viewers, and any number of
//! recording sessions. Sinks are opaque byte endpoints; the router only
//! ever writes to them.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::buffer::TimedBuffer;

/// Kind of a demultiplexed media unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Opaque byte-stream endpoint media is written to
///
/// Sends never block the connection task; a dropped receiver is treated
/// like a closed pipe and skipped silently.
pub type MediaSink = mpsc::UnboundedSender<Bytes>;

/// Opaque byte-stream source for talkback (return) audio
pub type AudioSource = mpsc::UnboundedReceiver<Bytes>;

/// Opaque handle identifying the external recorder of a record consumer
///
/// Carried for correlation only; the core never inspects it.
pub type RecorderHandle = u64;

/// A live viewer: sinks plus optional talkback state
#[derive(Debug)]
pub struct LiveConsumer {
    pub id: u64,
    pub video: Option<MediaSink>,
    pub audio: Option<MediaSink>,
    /// Deadline for the talkback idle gap marker; armed on every received
    /// chunk, disarmed once it fires
    pub talkback_deadline: Option<Instant>,
    /// Task forwarding the audio source into the connection task
    pub talkback_forwarder: Option<JoinHandle<()>>,
}

impl Drop for LiveConsumer {
    fn drop(&mut self) {
        if let Some(forwarder) = self.talkback_forwarder.take() {
            forwarder.abort();
        }
    }
}

/// A recording session: sinks plus the external recorder handle
#[derive(Debug)]
pub struct RecordConsumer {
    pub id: u64,
    pub recorder: RecorderHandle,
    pub video: Option<MediaSink>,
    pub audio: Option<MediaSink>,
}

/// A registered consumer
#[derive(Debug)]
pub enum Consumer {
    /// Rolling pre-roll buffer (at most one)
    Buffer(TimedBuffer),
    /// Live viewer
    Live(LiveConsumer),
    /// Recording session
    Record(RecordConsumer),
}

impl Consumer {
    /// Sink for the given media kind, if the consumer has one
    pub fn sink(&self, kind: MediaKind) -> Option<&MediaSink> {
        let (video, audio) = match self {
            Consumer::Buffer(_) => return None,
            Consumer::Live(live) => (&live.video, &live.audio),
            Consumer::Record(record) => (&record.video, &record.audio),
        };
        match kind {
            MediaKind::Video => video.as_ref(),
            MediaKind::Audio => audio.as_ref(),
        }
    }
}
