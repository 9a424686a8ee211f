//! Placeholder video frames
//!
//! Pre-encoded H.264 still frames substituted into the video path when the
//! camera is offline or has streaming disabled, so downstream consumers
//! never have to special-case "no real video available". A missing asset
//! file degrades that substitution to a no-op; it never fails setup.

use std::path::Path;

use bytes::Bytes;

/// File name of the camera-offline still frame
pub const OFFLINE_FRAME_FILE: &str = "offline.h264";

/// File name of the streaming-disabled still frame
pub const STREAMING_OFF_FRAME_FILE: &str = "streaming_off.h264";

/// The two placeholder frames, loaded once at construction
#[derive(Debug, Clone, Default)]
pub struct PlaceholderFrames {
    offline: Option<Bytes>,
    streaming_off: Option<Bytes>,
}

impl PlaceholderFrames {
    /// Load both frames from `dir`; absent files yield `None`
    pub fn load(dir: &Path) -> Self {
        Self {
            offline: read_frame(&dir.join(OFFLINE_FRAME_FILE)),
            streaming_off: read_frame(&dir.join(STREAMING_OFF_FRAME_FILE)),
        }
    }

    /// Construct directly from byte buffers (used in tests and by callers
    /// that embed the assets)
    pub fn from_frames(offline: Option<Bytes>, streaming_off: Option<Bytes>) -> Self {
        Self {
            offline,
            streaming_off,
        }
    }

    /// Frame shown while the camera is offline
    pub fn offline(&self) -> Option<&Bytes> {
        self.offline.as_ref()
    }

    /// Frame shown while camera streaming is disabled
    pub fn streaming_off(&self) -> Option<&Bytes> {
        self.streaming_off.as_ref()
    }
}

fn read_frame(path: &Path) -> Option<Bytes> {
    match std::fs::read(path) {
        Ok(data) => Some(Bytes::from(data)),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Placeholder frame not loaded");
            None
        }
    }
}
