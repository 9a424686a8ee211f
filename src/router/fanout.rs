//! Consumer fan-out router
//!
//! Routes every demultiplexed media unit to the registered consumers: the
//! buffer first, then every live/record sink of the matching kind in
//! registration order. Also handles pre-roll: a record consumer started
//! while the buffer holds data receives the buffered units, oldest first,
//! before any newly routed unit.

use bytes::Bytes;
use tokio::time::Instant;

use super::buffer::TimedBuffer;
use super::consumer::{
    Consumer, LiveConsumer, MediaKind, MediaSink, RecordConsumer, RecorderHandle,
};

/// The set of active consumers for one streamer
#[derive(Debug, Default)]
pub struct ConsumerRouter {
    /// Registration order is delivery order
    consumers: Vec<Consumer>,
}

impl ConsumerRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no consumers are registered
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }

    /// Total number of registered consumers
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Whether a buffer consumer is registered
    pub fn has_buffer(&self) -> bool {
        self.consumers
            .iter()
            .any(|c| matches!(c, Consumer::Buffer(_)))
    }

    /// Register the buffer consumer
    ///
    /// At most one buffer may exist; returns false if one is already
    /// registered.
    pub fn add_buffer(&mut self, buffer: TimedBuffer) -> bool {
        if self.has_buffer() {
            return false;
        }
        tracing::debug!(window_ms = buffer.window().as_millis() as u64, "Buffer consumer added");
        self.consumers.push(Consumer::Buffer(buffer));
        true
    }

    /// Register a live consumer
    pub fn add_live(&mut self, live: LiveConsumer) {
        tracing::debug!(id = live.id, "Live consumer added");
        self.consumers.push(Consumer::Live(live));
    }

    /// Register a record consumer, draining any buffered pre-roll into its
    /// sinks first so buffered and live-routed data join with no gap and no
    /// duplication.
    pub fn add_record(
        &mut self,
        id: u64,
        recorder: RecorderHandle,
        video: Option<MediaSink>,
        audio: Option<MediaSink>,
    ) {
        let preroll = self.buffer_mut().map(|buffer| {
            let units: Vec<_> = buffer.drain().collect();
            units
        });
        if let Some(units) = preroll {
            tracing::debug!(id, units = units.len(), "Draining pre-roll into recorder");
            for unit in units {
                let sink = match unit.kind {
                    MediaKind::Video => video.as_ref(),
                    MediaKind::Audio => audio.as_ref(),
                };
                if let Some(sink) = sink {
                    let _ = sink.send(unit.data);
                }
            }
        }
        tracing::debug!(id, recorder, "Record consumer added");
        self.consumers.push(Consumer::Record(RecordConsumer {
            id,
            recorder,
            video,
            audio,
        }));
    }

    /// Remove the buffer consumer; returns true if one existed
    pub fn remove_buffer(&mut self) -> bool {
        let before = self.consumers.len();
        self.consumers
            .retain(|c| !matches!(c, Consumer::Buffer(_)));
        before != self.consumers.len()
    }

    /// Remove a live consumer by id; its talkback forwarder is aborted
    pub fn remove_live(&mut self, id: u64) -> bool {
        let before = self.consumers.len();
        self.consumers
            .retain(|c| !matches!(c, Consumer::Live(live) if live.id == id));
        before != self.consumers.len()
    }

    /// Remove a record consumer by id
    pub fn remove_record(&mut self, id: u64) -> bool {
        let before = self.consumers.len();
        self.consumers
            .retain(|c| !matches!(c, Consumer::Record(record) if record.id == id));
        before != self.consumers.len()
    }

    /// Route one media unit to every consumer
    ///
    /// Buffer append happens alongside sink delivery: live and record
    /// consumers receive the unit now, the buffer retains it for future
    /// pre-roll. Missing sinks and closed receivers are skipped.
    pub fn route(&mut self, now: Instant, kind: MediaKind, data: Bytes) {
        for consumer in &mut self.consumers {
            match consumer {
                Consumer::Buffer(buffer) => buffer.push(now, kind, data.clone()),
                other => {
                    if let Some(sink) = other.sink(kind) {
                        let _ = sink.send(data.clone());
                    }
                }
            }
        }
    }

    /// Mutable access to a live consumer (talkback bookkeeping)
    pub fn live_mut(&mut self, id: u64) -> Option<&mut LiveConsumer> {
        self.consumers.iter_mut().find_map(|c| match c {
            Consumer::Live(live) if live.id == id => Some(live),
            _ => None,
        })
    }

    /// Earliest armed talkback idle deadline across live consumers
    pub fn next_talkback_deadline(&self) -> Option<(u64, Instant)> {
        self.consumers
            .iter()
            .filter_map(|c| match c {
                Consumer::Live(live) => live.talkback_deadline.map(|at| (live.id, at)),
                _ => None,
            })
            .min_by_key(|(_, at)| *at)
    }

    /// Drop every consumer (streamer shutdown)
    pub fn clear(&mut self) {
        self.consumers.clear();
    }

    fn buffer_mut(&mut self) -> Option<&mut TimedBuffer> {
        self.consumers.iter_mut().find_map(|c| match c {
            Consumer::Buffer(buffer) => Some(buffer),
            _ => None,
        })
    }
}
