//! Live stream dump example
//!
//! Connects to a camera and writes the raw Annex B H.264 elementary stream
//! to stdout, suitable for piping into a player:
//!
//!   NEXUS_TOKEN=<session token> \
//!     cargo run --example live_stream -- <host> <uuid> <serial> | ffplay -f h264 -
//!
//! The token is sent as a Nest session token by default; append `--google`
//! to send it as a Google assertion instead. Logs go to stderr so stdout
//! stays a clean video stream.

use std::io::Write;

use nexustalk::{CameraDescriptor, Credential, NexusStreamer, StreamerConfig};

fn print_usage() {
    eprintln!("Usage: live_stream <host> <uuid> <serial> [--google]");
    eprintln!();
    eprintln!("The NEXUS_TOKEN environment variable must hold the access token.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let (Some(host), Some(uuid), Some(serial)) = (args.next(), args.next(), args.next()) else {
        print_usage();
        std::process::exit(1);
    };
    let google = args.next().as_deref() == Some("--google");

    let token = match std::env::var("NEXUS_TOKEN") {
        Ok(token) => token,
        Err(_) => {
            eprintln!("Error: NEXUS_TOKEN is not set");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };
    let credential = if google {
        Credential::Google(token)
    } else {
        Credential::Nest(token)
    };

    // Initialize logging on stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nexustalk=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = StreamerConfig::new(credential);
    let camera = CameraDescriptor {
        host,
        uuid,
        serial,
        online: true,
        streaming_enabled: true,
        audio_enabled: false,
        capabilities: Vec::new(),
    };
    let (streamer, mut events) = NexusStreamer::new(config, camera);

    let (video_tx, mut video_rx) = tokio::sync::mpsc::unbounded_channel();
    streamer.start_live_stream(1, Some(video_tx), None, None)?;

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            unit = video_rx.recv() => {
                let Some(unit) = unit else { break };
                stdout.write_all(&unit)?;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                eprintln!("event: {:?}", event);
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down...");
                break;
            }
        }
    }

    streamer.shutdown().await;
    Ok(())
}
