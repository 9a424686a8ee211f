//! Byte-stream transport to the camera
//!
//! Production connections are TLS sockets to `<host>:1443`. The transport is
//! split into a reader pump and a writer pump so the connection task only
//! ever sees channels; tests drive the same task over an in-memory duplex
//! stream. Dropping the [`Transport`] handle stops the reader immediately
//! and lets the writer drain queued frames before shutting the socket down.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::{Error, Result};
use crate::protocol::constants::NEXUS_PORT;

const READ_CHUNK_SIZE: usize = 8 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification from the transport pumps
#[derive(Debug)]
pub enum TransportEvent {
    /// A chunk of inbound bytes (arbitrary framing)
    Data(Bytes),
    /// The peer closed the stream
    Closed,
    /// The stream failed
    Error(std::io::Error),
}

/// Handle to an open transport
///
/// Outbound frames are queued to the writer pump; inbound data arrives on
/// the event receiver returned alongside the handle.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
}

impl Transport {
    /// Open a TLS connection to the camera's NexusTalk endpoint
    pub async fn connect(host: &str) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect((host, NEXUS_PORT)).await?;
        tcp.set_nodelay(true)?;
        let server_name =
            ServerName::try_from(host.to_owned()).map_err(|e| Error::Tls(e.to_string()))?;
        let stream = connector.connect(server_name, tcp).await?;

        tracing::debug!(host, "Transport connected");
        Ok(Self::spawn(stream))
    }

    /// Wrap an already-open byte stream in transport pumps
    ///
    /// Used by `connect` and, in tests, with `tokio::io::duplex`.
    pub fn spawn<S>(stream: S) -> (Self, mpsc::Receiver<TransportEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut read_half, mut write_half) = tokio::io::split(stream);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();

        let reader = tokio::spawn(async move {
            let mut buf = BytesMut::new();
            loop {
                buf.reserve(READ_CHUNK_SIZE);
                match read_half.read_buf(&mut buf).await {
                    Ok(0) => {
                        let _ = event_tx.send(TransportEvent::Closed).await;
                        break;
                    }
                    Ok(_) => {
                        let chunk = buf.split().freeze();
                        if event_tx.send(TransportEvent::Data(chunk)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e)).await;
                        break;
                    }
                }
            }
        });

        // Writer exits once the Transport handle (and with it the outbound
        // sender) is dropped, after draining queued frames.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if write_half.write_all(&frame).await.is_err() {
                    return;
                }
            }
            let _ = write_half.shutdown().await;
        });

        (
            Self {
                outbound: outbound_tx,
                reader,
            },
            event_rx,
        )
    }

    /// Queue an encoded frame for sending
    pub fn send(&self, frame: Bytes) {
        let _ = self.outbound.send(frame);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplex_roundtrip() {
        let (near, mut far) = tokio::io::duplex(4096);
        let (transport, mut events) = Transport::spawn(near);

        transport.send(Bytes::from_static(&[1, 2, 3]));
        let mut buf = [0u8; 3];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, &[1, 2, 3]);

        far.write_all(&[9, 8]).await.unwrap();
        match events.recv().await.unwrap() {
            TransportEvent::Data(data) => assert_eq!(&data[..], &[9, 8]),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_close_reports_closed() {
        let (near, far) = tokio::io::duplex(4096);
        let (_transport, mut events) = Transport::spawn(near);
        drop(far);
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Closed)
        ));
    }

    #[tokio::test]
    async fn test_drop_flushes_queued_frames() {
        let (near, mut far) = tokio::io::duplex(4096);
        let (transport, _events) = Transport::spawn(near);

        transport.send(Bytes::from_static(b"bye"));
        drop(transport);

        let mut buf = Vec::new();
        far.read_to_end(&mut buf).await.unwrap();
        assert_eq!(&buf, b"bye");
    }
}
