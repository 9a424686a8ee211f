//! Camera descriptor
//!
//! Metadata about the camera being streamed, supplied externally and
//! mutated only through the streamer's `update` operation. Host,
//! online/streaming flags, and capabilities drive reconnection and
//! placeholder decisions.

use crate::protocol::constants::{StreamProfile, CAPABILITY_PROFILE_PREFIX};

/// Externally supplied camera metadata
#[derive(Debug, Clone)]
pub struct CameraDescriptor {
    /// Default NexusTalk host for this camera
    pub host: String,

    /// Camera UUID sent in HELLO
    pub uuid: String,

    /// Serial number sent in HELLO
    pub serial: String,

    /// Whether the camera is reachable
    pub online: bool,

    /// Whether streaming is enabled on the camera
    pub streaming_enabled: bool,

    /// Whether the camera has audio enabled (adds AAC to negotiation)
    pub audio_enabled: bool,

    /// Advertised capability strings
    /// (e.g. `streaming.cameraprofile.VIDEO_H264_530KBIT_L31`)
    pub capabilities: Vec<String>,
}

impl CameraDescriptor {
    /// Whether a live connection can be established right now
    pub fn can_stream(&self) -> bool {
        self.online && self.streaming_enabled
    }

    /// Profile codes advertised through capability strings
    ///
    /// Strips the capability prefix and maps known names to profiles;
    /// unknown capability strings are ignored.
    pub fn capability_profiles(&self) -> impl Iterator<Item = StreamProfile> + '_ {
        self.capabilities.iter().filter_map(|capability| {
            capability
                .strip_prefix(CAPABILITY_PROFILE_PREFIX)
                .and_then(StreamProfile::from_capability)
        })
    }
}

/// Delta applied to a [`CameraDescriptor`] via `update`
///
/// Unset fields leave the current value untouched.
#[derive(Debug, Clone, Default)]
pub struct CameraUpdate {
    pub host: Option<String>,
    pub online: Option<bool>,
    pub streaming_enabled: Option<bool>,
    pub audio_enabled: Option<bool>,
    pub capabilities: Option<Vec<String>>,
}

impl CameraUpdate {
    /// Apply the delta, returning which reconnect-relevant fields changed
    pub fn apply(self, camera: &mut CameraDescriptor) -> CameraChanges {
        let mut changes = CameraChanges::default();
        if let Some(host) = self.host {
            if host != camera.host {
                camera.host = host;
                changes.host = true;
            }
        }
        if let Some(online) = self.online {
            if online != camera.online {
                camera.online = online;
                changes.availability = true;
            }
        }
        if let Some(streaming_enabled) = self.streaming_enabled {
            if streaming_enabled != camera.streaming_enabled {
                camera.streaming_enabled = streaming_enabled;
                changes.availability = true;
            }
        }
        if let Some(audio_enabled) = self.audio_enabled {
            camera.audio_enabled = audio_enabled;
        }
        if let Some(capabilities) = self.capabilities {
            camera.capabilities = capabilities;
        }
        changes
    }
}

/// Which reconnect-relevant camera fields an update touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraChanges {
    /// Host changed (treated like a redirect while streaming)
    pub host: bool,
    /// Online or streaming-enabled flipped
    pub availability: bool,
}
