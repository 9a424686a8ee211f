//! Time-windowed media buffer for pre-roll
//!
//! Holds the most recent media units inside a configurable retention
//! window. When a recording starts, the buffer is drained oldest-first into
//! the recorder's sinks so the recording covers the seconds leading up to
//! the event with no gap.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::consumer::MediaKind;

/// One buffered media unit
#[derive(Debug, Clone)]
pub struct BufferedUnit {
    /// When the unit was routed
    pub at: Instant,
    /// Video or audio
    pub kind: MediaKind,
    /// Opaque payload bytes (cheap to clone)
    pub data: Bytes,
}

/// Rolling buffer with time-based FIFO eviction
#[derive(Debug)]
pub struct TimedBuffer {
    window: Duration,
    entries: VecDeque<BufferedUnit>,
}

impl TimedBuffer {
    /// Create a buffer retaining `window` worth of media
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
        }
    }

    /// Retention window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Append a unit and evict everything older than the window
    ///
    /// Eviction is age-based and from the front only, so chronological
    /// order is preserved and the oldest entries always leave first.
    pub fn push(&mut self, now: Instant, kind: MediaKind, data: Bytes) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.at) > self.window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
        self.entries.push_back(BufferedUnit { at: now, kind, data });
    }

    /// Drain all buffered units, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = BufferedUnit> + '_ {
        self.entries.drain(..)
    }

    /// Number of retained units
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_eviction() {
        let mut buffer = TimedBuffer::new(Duration::from_secs(2));

        buffer.push(Instant::now(), MediaKind::Video, unit(b"a"));
        tokio::time::advance(Duration::from_secs(1)).await;
        buffer.push(Instant::now(), MediaKind::Video, unit(b"b"));
        tokio::time::advance(Duration::from_secs(1)).await;
        buffer.push(Instant::now(), MediaKind::Audio, unit(b"c"));
        assert_eq!(buffer.len(), 3);

        // "a" is now 3s old, beyond the 2s window
        tokio::time::advance(Duration::from_secs(1)).await;
        buffer.push(Instant::now(), MediaKind::Video, unit(b"d"));
        let retained: Vec<_> = buffer.drain().map(|u| u.data).collect();
        assert_eq!(retained, vec![unit(b"b"), unit(b"c"), unit(b"d")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_oldest_first() {
        let mut buffer = TimedBuffer::new(Duration::from_secs(10));
        for data in [b"1", b"2", b"3"] {
            buffer.push(Instant::now(), MediaKind::Video, Bytes::copy_from_slice(data));
            tokio::time::advance(Duration::from_millis(100)).await;
        }

        let order: Vec<_> = buffer.drain().map(|u| u.data).collect();
        assert_eq!(order, vec![unit(b"1"), unit(b"2"), unit(b"3")]);
        assert!(buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_entries_younger_than_window() {
        let mut buffer = TimedBuffer::new(Duration::from_millis(500));
        for _ in 0..20 {
            buffer.push(Instant::now(), MediaKind::Audio, unit(b"x"));
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        let now = Instant::now();
        buffer.push(now, MediaKind::Audio, unit(b"x"));
        for entry in buffer.drain() {
            assert!(now.duration_since(entry.at) <= Duration::from_millis(500));
        }
    }
}
