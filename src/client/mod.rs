//! NexusTalk client implementation
//!
//! Provides the per-camera streaming client:
//! - Connecting and authenticating against a camera's NexusTalk endpoint
//! - Negotiating playback and demultiplexing media to consumers
//! - Reacting to redirects, errors, and camera metadata updates

pub mod camera;
pub mod config;
pub mod streamer;

pub(crate) mod task;
pub(crate) mod transport;

pub use camera::{CameraChanges, CameraDescriptor, CameraUpdate};
pub use config::StreamerConfig;
pub use streamer::{NexusStreamer, StreamerEvent};
