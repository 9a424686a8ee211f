//! Public streamer handle
//!
//! [`NexusStreamer`] is a cheap handle over the spawned connection task.
//! Every method posts a command; the task applies it in order with the rest
//! of the connection traffic, so callers never race the protocol state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::message::Credential;
use crate::router::{AudioSource, MediaSink, RecorderHandle};

use super::camera::{CameraDescriptor, CameraUpdate};
use super::config::StreamerConfig;
use super::task::{Command, Connector, StreamerTask, TlsConnect};

pub use super::task::StreamerEvent;

/// Handle to one camera's streaming task
///
/// Created with [`NexusStreamer::new`] alongside the event receiver. The
/// task keeps running until [`shutdown`](NexusStreamer::shutdown) or until
/// the handle is dropped.
pub struct NexusStreamer {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl NexusStreamer {
    /// Spawn the streaming task for a camera
    ///
    /// Must be called inside a tokio runtime. The returned receiver carries
    /// out-of-band [`StreamerEvent`] notifications.
    pub fn new(
        config: StreamerConfig,
        camera: CameraDescriptor,
    ) -> (Self, mpsc::UnboundedReceiver<StreamerEvent>) {
        Self::with_connector(TlsConnect, config, camera)
    }

    pub(crate) fn with_connector<C: Connector>(
        connector: C,
        config: StreamerConfig,
        camera: CameraDescriptor,
    ) -> (Self, mpsc::UnboundedReceiver<StreamerEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = StreamerTask::new(
            connector,
            config,
            camera,
            command_rx,
            command_tx.downgrade(),
            event_tx,
        );
        let task = tokio::spawn(task.run());
        (
            Self {
                commands: command_tx,
                task,
            },
            event_rx,
        )
    }

    /// Start the rolling pre-roll buffer with the given retention window
    ///
    /// Connects to the camera if this is the first consumer. At most one
    /// buffer exists; further calls are no-ops.
    pub fn start_buffering(&self, window: Duration) -> Result<()> {
        self.send(Command::StartBuffering { window })
    }

    /// Attach a live viewer
    ///
    /// Demultiplexed video/audio is written to the given sinks. If a
    /// `talkback` source is supplied, audio read from it is forwarded to
    /// the camera as return audio.
    pub fn start_live_stream(
        &self,
        id: u64,
        video: Option<MediaSink>,
        audio: Option<MediaSink>,
        talkback: Option<AudioSource>,
    ) -> Result<()> {
        self.send(Command::StartLive {
            id,
            video,
            audio,
            talkback,
        })
    }

    /// Attach a recording session
    ///
    /// If the pre-roll buffer holds data, it is drained into the recorder's
    /// sinks before any live media.
    pub fn start_record_stream(
        &self,
        id: u64,
        recorder: RecorderHandle,
        video: Option<MediaSink>,
        audio: Option<MediaSink>,
    ) -> Result<()> {
        self.send(Command::StartRecord {
            id,
            recorder,
            video,
            audio,
        })
    }

    /// Detach a live viewer; closes the connection if it was the last
    /// consumer
    pub fn stop_live_stream(&self, id: u64) -> Result<()> {
        self.send(Command::StopLive { id })
    }

    /// Detach a recording session
    pub fn stop_record_stream(&self, id: u64) -> Result<()> {
        self.send(Command::StopRecord { id })
    }

    /// Drop the pre-roll buffer and its contents
    pub fn stop_buffering(&self) -> Result<()> {
        self.send(Command::StopBuffering)
    }

    /// Apply a credential refresh and/or camera metadata delta
    pub fn update(&self, credential: Option<Credential>, camera: CameraUpdate) -> Result<()> {
        self.send(Command::Update { credential, camera })
    }

    /// Stop streaming and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        let _ = self.task.await;
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::Closed)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::constants::NAL_START;

    fn offline_camera() -> CameraDescriptor {
        CameraDescriptor {
            host: "cam1.example".into(),
            uuid: "uuid-1".into(),
            serial: "serial-1".into(),
            online: false,
            streaming_enabled: true,
            audio_enabled: false,
            capabilities: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_assets_loaded_from_disk() {
        let dir = std::env::temp_dir().join(format!("nexustalk-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("offline.h264"), [0x11, 0x22]).unwrap();

        let config =
            StreamerConfig::new(Credential::Nest("token".into())).asset_dir(dir.clone());
        let (streamer, _events) = NexusStreamer::new(config, offline_camera());

        let (video, mut video_rx) = tokio::sync::mpsc::unbounded_channel::<Bytes>();
        streamer.start_live_stream(1, Some(video), None, None).unwrap();

        // Offline camera: no connection, just the placeholder every tick
        let unit = video_rx.recv().await.unwrap();
        assert_eq!(&unit[..4], &NAL_START);
        assert_eq!(&unit[4..], &[0x11, 0x22]);

        streamer.shutdown().await;
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_commands_accepted_while_running() {
        let config = StreamerConfig::new(Credential::Nest("token".into()));
        let (streamer, _events) = NexusStreamer::new(config, offline_camera());

        assert!(streamer.start_buffering(Duration::from_secs(15)).is_ok());
        assert!(streamer.stop_buffering().is_ok());
        assert!(streamer
            .update(None, CameraUpdate::default())
            .is_ok());
        streamer.shutdown().await;
    }
}
