//! Client library for the NexusTalk camera streaming protocol
//!
//! NexusTalk is the TLS-framed, protobuf-payload protocol Nest cameras use
//! for live streaming. This crate implements the client side:
//!
//! - Frame and payload codecs for the wire format
//! - The authentication handshake (HELLO / AUTHORIZE_REQUEST) with Nest and
//!   Google credentials
//! - Playback negotiation and media demultiplexing into raw H.264 and AAC
//!   elementary streams
//! - Consumer fan-out with rolling pre-roll buffering for recorders
//! - Talkback (return audio) toward the camera
//! - Reconnect, redirect, and re-authorization handling
//!
//! One [`NexusStreamer`] drives one camera. Consumers attach byte-stream
//! sinks and receive demultiplexed media; all protocol work happens on a
//! single spawned task.
//!
//! ```no_run
//! use nexustalk::{Credential, CameraDescriptor, NexusStreamer, StreamerConfig};
//!
//! # async fn example() {
//! let config = StreamerConfig::new(Credential::Nest("session-token".into()));
//! let camera = CameraDescriptor {
//!     host: "stream-ir1.dropcam.com".into(),
//!     uuid: "camera-uuid".into(),
//!     serial: "camera-serial".into(),
//!     online: true,
//!     streaming_enabled: true,
//!     audio_enabled: true,
//!     capabilities: vec!["streaming.cameraprofile.VIDEO_H264_2MBIT_L40".into()],
//! };
//! let (streamer, mut events) = NexusStreamer::new(config, camera);
//!
//! let (video_tx, mut video_rx) = tokio::sync::mpsc::unbounded_channel();
//! streamer.start_live_stream(1, Some(video_tx), None, None).unwrap();
//! while let Some(unit) = video_rx.recv().await {
//!     // Annex B H.264, one NAL-prefixed unit per message
//!     let _ = unit;
//! }
//! # }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod router;
pub mod session;

pub use client::{
    CameraChanges, CameraDescriptor, CameraUpdate, NexusStreamer, StreamerConfig, StreamerEvent,
};
pub use error::{Error, Result};
pub use protocol::{Credential, StreamProfile};
pub use router::{AudioSource, MediaKind, MediaSink, RecorderHandle};
