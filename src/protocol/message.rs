//! Typed NexusTalk payloads
//!
//! Builders for every message we send and parsers for every control/media
//! packet we act on. Field numbers are fixed by the protocol; parsers skip
//! unknown fields so newer camera firmware stays compatible.

use bytes::Bytes;

use crate::error::ProtocolError;

use super::constants::{codec, CLIENT_TYPE_WEB, PROTOCOL_VERSION, TALKBACK_SAMPLE_RATE, USER_AGENT};
use super::wire::{MessageReader, MessageWriter};

/// Authentication credential embedded in HELLO / AUTHORIZE_REQUEST
///
/// The two credential kinds use different wire encodings: Nest session
/// tokens travel as a top-level string field, Google (olive) tokens as a
/// nested token submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Nest-account session token
    Nest(String),
    /// Google-account olive token
    Google(String),
}

/// HELLO packet: protocol version, camera identity, client identity,
/// and the embedded credential.
#[derive(Debug, Clone)]
pub struct Hello<'a> {
    pub camera_uuid: &'a str,
    pub serial: &'a str,
    pub credential: &'a Credential,
}

impl Hello<'_> {
    pub fn encode(&self) -> Bytes {
        let mut w = MessageWriter::new();
        w.varint_field(1, PROTOCOL_VERSION)
            .string_field(2, self.camera_uuid)
            .bool_field(3, false)
            .string_field(6, self.serial)
            .string_field(7, USER_AGENT)
            .varint_field(9, CLIENT_TYPE_WEB);
        match self.credential {
            Credential::Nest(token) => {
                w.string_field(4, token);
            }
            Credential::Google(token) => {
                let mut nested = MessageWriter::new();
                nested.string_field(4, token);
                w.message_field(12, nested);
            }
        }
        w.finish()
    }
}

/// AUTHORIZE_REQUEST packet: credential only, sent to refresh authorization
/// on an already-open connection.
pub fn encode_authorize_request(credential: &Credential) -> Bytes {
    let mut w = MessageWriter::new();
    match credential {
        Credential::Nest(token) => {
            w.string_field(1, token);
        }
        Credential::Google(token) => {
            w.string_field(4, token);
        }
    }
    w.finish()
}

/// START_PLAYBACK packet: session id, primary profile, and the camera's
/// other supported profiles.
#[derive(Debug, Clone)]
pub struct StartPlayback {
    pub session_id: u64,
    pub profile: u64,
    pub other_profiles: Vec<u64>,
}

impl StartPlayback {
    pub fn encode(&self) -> Bytes {
        let mut w = MessageWriter::new();
        w.varint_field(1, self.session_id).varint_field(2, self.profile);
        for profile in &self.other_profiles {
            w.varint_field(6, *profile);
        }
        w.finish()
    }
}

/// STOP_PLAYBACK packet: session id only.
pub fn encode_stop_playback(session_id: u64) -> Bytes {
    let mut w = MessageWriter::new();
    w.varint_field(1, session_id);
    w.finish()
}

/// AUDIO_PAYLOAD packet carrying talkback audio toward the camera.
///
/// An empty payload marks a gap in the return audio stream.
pub fn encode_audio_payload(session_id: u64, payload: &[u8]) -> Bytes {
    let mut w = MessageWriter::new();
    w.bytes_field(1, payload)
        .varint_field(2, session_id)
        .varint_field(3, codec::SPEEX)
        .varint_field(4, TALKBACK_SAMPLE_RATE);
    w.finish()
}

/// One channel descriptor from PLAYBACK_BEGIN
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelInfo {
    pub channel_id: u64,
    pub codec_type: u64,
    pub sample_rate: u64,
    pub profile: u64,
}

/// PLAYBACK_BEGIN packet: session id plus per-channel descriptors.
#[derive(Debug, Clone, Default)]
pub struct PlaybackBegin {
    pub session_id: u64,
    pub channels: Vec<ChannelInfo>,
}

impl PlaybackBegin {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut message = Self::default();
        let mut r = MessageReader::new(payload);
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => message.session_id = r.read_varint()?,
                2 => {
                    let mut channel = ChannelInfo::default();
                    let mut nested = r.read_message()?;
                    while let Some((field, wire_type)) = nested.next_field()? {
                        match field {
                            1 => channel.channel_id = nested.read_varint()?,
                            2 => channel.codec_type = nested.read_varint()?,
                            3 => channel.sample_rate = nested.read_varint()?,
                            8 => channel.profile = nested.read_varint()?,
                            _ => nested.skip(wire_type)?,
                        }
                    }
                    message.channels.push(channel);
                }
                _ => r.skip(wire_type)?,
            }
        }
        Ok(message)
    }
}

/// PLAYBACK_PACKET / LONG_PLAYBACK_PACKET media payload.
#[derive(Debug, Clone, Default)]
pub struct PlaybackPacket {
    pub session_id: u64,
    pub channel_id: u64,
    pub timestamp_delta: i64,
    pub payload: Bytes,
}

impl PlaybackPacket {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut message = Self::default();
        let mut r = MessageReader::new(payload);
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => message.session_id = r.read_varint()?,
                2 => message.channel_id = r.read_varint()?,
                3 => message.timestamp_delta = r.read_svarint()?,
                4 => message.payload = Bytes::copy_from_slice(r.read_bytes()?),
                _ => r.skip(wire_type)?,
            }
        }
        Ok(message)
    }
}

/// PLAYBACK_END packet: session id and reason code.
#[derive(Debug, Clone, Default)]
pub struct PlaybackEnd {
    pub session_id: u64,
    pub reason: u64,
}

impl PlaybackEnd {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut message = Self::default();
        let mut r = MessageReader::new(payload);
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => message.session_id = r.read_varint()?,
                2 => message.reason = r.read_varint()?,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(message)
    }
}

/// REDIRECT packet: new host to reconnect to.
#[derive(Debug, Clone, Default)]
pub struct Redirect {
    pub new_host: String,
    pub is_transcode: bool,
}

impl Redirect {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut message = Self::default();
        let mut r = MessageReader::new(payload);
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => message.new_host = r.read_string()?.to_owned(),
                2 => message.is_transcode = r.read_bool()?,
                _ => r.skip(wire_type)?,
            }
        }
        Ok(message)
    }
}

/// ERROR packet: numeric code plus a human-readable message.
#[derive(Debug, Clone, Default)]
pub struct ErrorMessage {
    pub code: u64,
    pub message: String,
}

impl ErrorMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut message = Self::default();
        let mut r = MessageReader::new(payload);
        while let Some((field, wire_type)) = r.next_field()? {
            match field {
                1 => message.code = r.read_varint()?,
                2 => message.message = r.read_string()?.to_owned(),
                _ => r.skip(wire_type)?,
            }
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::error_code;

    #[test]
    fn test_hello_nest_credential_is_top_level_string() {
        let credential = Credential::Nest("token-abc".into());
        let hello = Hello {
            camera_uuid: "uuid-1",
            serial: "serial-1",
            credential: &credential,
        };
        let payload = hello.encode();

        let mut r = MessageReader::new(&payload);
        let mut token_field = None;
        while let Some((field, wt)) = r.next_field().unwrap() {
            match field {
                4 => token_field = Some(r.read_string().unwrap().to_owned()),
                _ => r.skip(wt).unwrap(),
            }
        }
        assert_eq!(token_field.as_deref(), Some("token-abc"));
    }

    #[test]
    fn test_hello_google_credential_is_nested() {
        let credential = Credential::Google("olive-xyz".into());
        let hello = Hello {
            camera_uuid: "uuid-1",
            serial: "serial-1",
            credential: &credential,
        };
        let payload = hello.encode();

        let mut r = MessageReader::new(&payload);
        let mut nested_token = None;
        while let Some((field, wt)) = r.next_field().unwrap() {
            match field {
                12 => {
                    let mut nested = r.read_message().unwrap();
                    while let Some((field, wt)) = nested.next_field().unwrap() {
                        match field {
                            4 => nested_token = Some(nested.read_string().unwrap().to_owned()),
                            _ => nested.skip(wt).unwrap(),
                        }
                    }
                }
                _ => r.skip(wt).unwrap(),
            }
        }
        assert_eq!(nested_token.as_deref(), Some("olive-xyz"));
    }

    #[test]
    fn test_authorize_request_field_by_credential_kind() {
        let payload = encode_authorize_request(&Credential::Nest("n".into()));
        let mut r = MessageReader::new(&payload);
        assert_eq!(r.next_field().unwrap().unwrap().0, 1);

        let payload = encode_authorize_request(&Credential::Google("g".into()));
        let mut r = MessageReader::new(&payload);
        assert_eq!(r.next_field().unwrap().unwrap().0, 4);
    }

    #[test]
    fn test_start_playback_repeats_other_profiles() {
        let payload = StartPlayback {
            session_id: 42,
            profile: 9,
            other_profiles: vec![3, 7],
        }
        .encode();

        let mut r = MessageReader::new(&payload);
        let mut others = Vec::new();
        let mut primary = 0;
        while let Some((field, wt)) = r.next_field().unwrap() {
            match field {
                2 => primary = r.read_varint().unwrap(),
                6 => others.push(r.read_varint().unwrap()),
                _ => r.skip(wt).unwrap(),
            }
        }
        assert_eq!(primary, 9);
        assert_eq!(others, vec![3, 7]);
    }

    #[test]
    fn test_playback_begin_roundtrip() {
        let mut channel_a = MessageWriter::new();
        channel_a
            .varint_field(1, 10)
            .varint_field(2, codec::H264)
            .varint_field(3, 90_000)
            .varint_field(8, 9);
        let mut channel_b = MessageWriter::new();
        channel_b
            .varint_field(1, 11)
            .varint_field(2, codec::AAC)
            .varint_field(3, 16_000)
            // unknown field inside a channel must be skipped
            .double_field(5, 123.0);
        let mut w = MessageWriter::new();
        w.varint_field(1, 42);
        w.message_field(2, channel_a);
        w.message_field(2, channel_b);

        let decoded = PlaybackBegin::decode(&w.finish()).unwrap();
        assert_eq!(decoded.session_id, 42);
        assert_eq!(decoded.channels.len(), 2);
        assert_eq!(decoded.channels[0].channel_id, 10);
        assert_eq!(decoded.channels[0].codec_type, codec::H264);
        assert_eq!(decoded.channels[1].channel_id, 11);
        assert_eq!(decoded.channels[1].codec_type, codec::AAC);
    }

    #[test]
    fn test_playback_packet_decode() {
        let mut w = MessageWriter::new();
        w.varint_field(1, 42)
            .varint_field(2, 10)
            .svarint_field(3, -33)
            .bytes_field(4, &[0x65, 0x88]);

        let decoded = PlaybackPacket::decode(&w.finish()).unwrap();
        assert_eq!(decoded.session_id, 42);
        assert_eq!(decoded.channel_id, 10);
        assert_eq!(decoded.timestamp_delta, -33);
        assert_eq!(&decoded.payload[..], &[0x65, 0x88]);
    }

    #[test]
    fn test_redirect_decode() {
        let mut w = MessageWriter::new();
        w.string_field(1, "cam2.example").bool_field(2, true);
        let decoded = Redirect::decode(&w.finish()).unwrap();
        assert_eq!(decoded.new_host, "cam2.example");
        assert!(decoded.is_transcode);
    }

    #[test]
    fn test_error_decode() {
        let mut w = MessageWriter::new();
        w.varint_field(1, error_code::AUTHORIZATION_FAILED)
            .string_field(2, "auth expired");
        let decoded = ErrorMessage::decode(&w.finish()).unwrap();
        assert_eq!(decoded.code, error_code::AUTHORIZATION_FAILED);
        assert_eq!(decoded.message, "auth expired");
    }

    #[test]
    fn test_audio_payload_empty_marks_gap() {
        let payload = encode_audio_payload(42, &[]);
        let mut r = MessageReader::new(&payload);
        let (field, _) = r.next_field().unwrap().unwrap();
        assert_eq!(field, 1);
        assert!(r.read_bytes().unwrap().is_empty());
    }
}
