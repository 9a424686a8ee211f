//! NexusTalk protocol constants
//!
//! All values here are fixed by the wire protocol.

use std::time::Duration;

/// Default port for the NexusTalk endpoint
pub const NEXUS_PORT: u16 = 1443;

/// Client identifier sent in the HELLO packet
pub const USER_AGENT: &str = "iPhone iOS 15.4 Dropcam/5.67.0.6 com.nestlabs.jasper.release Darwin";

/// Interval between keep-alive PING packets while connected
pub const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Tick for the placeholder-frame injector while the camera is off/offline
pub const PLACEHOLDER_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before restarting playback after a transient PLAYBACK_END
pub const PLAYBACK_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Talkback audio idle timeout before an empty payload marks a gap
pub const TALKBACK_IDLE_TIMEOUT: Duration = Duration::from_millis(500);

/// Sample rate tagged on outgoing talkback audio payloads
pub const TALKBACK_SAMPLE_RATE: u64 = 16_000;

/// H.264 Annex B NAL unit start marker, prepended to every video payload
pub const NAL_START: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Protocol version advertised in HELLO
pub const PROTOCOL_VERSION: u64 = 3;

/// Client type advertised in HELLO (web client)
pub const CLIENT_TYPE_WEB: u64 = 3;

/// Packet type codes
///
/// One byte on the wire, directly before the length field.
pub mod packet_type {
    pub const PING: u8 = 1;
    pub const HELLO: u8 = 100;
    pub const AUDIO_PAYLOAD: u8 = 102;
    pub const START_PLAYBACK: u8 = 103;
    pub const STOP_PLAYBACK: u8 = 104;
    pub const OK: u8 = 200;
    pub const ERROR: u8 = 201;
    pub const PLAYBACK_BEGIN: u8 = 202;
    pub const PLAYBACK_END: u8 = 203;
    pub const PLAYBACK_PACKET: u8 = 204;
    /// 0xCD. The only packet type framed with a 4-byte length field.
    pub const LONG_PLAYBACK_PACKET: u8 = 205;
    pub const REDIRECT: u8 = 207;
    pub const AUTHORIZE_REQUEST: u8 = 212;
}

/// Codec ids carried in channel descriptors and audio payloads
pub mod codec {
    pub const SPEEX: u64 = 0;
    pub const PCM_S16_LE: u64 = 1;
    pub const H264: u64 = 2;
    pub const AAC: u64 = 3;
    pub const OPUS: u64 = 4;
    pub const META: u64 = 5;
}

/// ERROR packet codes
pub mod error_code {
    pub const CAMERA_NOT_CONNECTED: u64 = 1;
    pub const ILLEGAL_PACKET: u64 = 2;
    pub const AUTHORIZATION_FAILED: u64 = 3;
    pub const NO_TRANSCODER_AVAILABLE: u64 = 4;
    pub const TRANSCODE_PROXY_ERROR: u64 = 5;
    pub const INTERNAL: u64 = 6;
}

/// PLAYBACK_END reason codes
pub mod end_reason {
    pub const TIME_NOT_AVAILABLE: u64 = 1;
    pub const PROFILE_NOT_AVAILABLE: u64 = 2;
    pub const TRANSCODE_NOT_AVAILABLE: u64 = 3;
    pub const SESSION_COMPLETE: u64 = 128;
}

/// Prefix stripped from camera capability strings to map them to profiles
pub const CAPABILITY_PROFILE_PREFIX: &str = "streaming.cameraprofile.";

/// Named quality/codec configurations requested during negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProfile {
    AudioAac,
    AudioSpeex,
    AudioOpus,
    AudioOpusLive,
    VideoH264_50KbitL12,
    VideoH264_530KbitL31,
    VideoH264_100KbitL30,
    VideoH264_2MbitL40,
    VideoH264_50KbitL12Thumbnail,
    Meta,
    DirectorsCut,
    VideoH264L31,
    VideoH264L40,
    AvProfileMobile1,
    AvProfileHdMain1,
}

impl StreamProfile {
    /// Wire code sent in START_PLAYBACK
    pub fn code(self) -> u64 {
        match self {
            StreamProfile::AvProfileMobile1 => 1,
            StreamProfile::AvProfileHdMain1 => 2,
            StreamProfile::AudioAac => 3,
            StreamProfile::AudioSpeex => 4,
            StreamProfile::AudioOpus => 5,
            StreamProfile::VideoH264_50KbitL12 => 6,
            StreamProfile::VideoH264_530KbitL31 => 7,
            StreamProfile::VideoH264_100KbitL30 => 8,
            StreamProfile::VideoH264_2MbitL40 => 9,
            StreamProfile::VideoH264_50KbitL12Thumbnail => 10,
            StreamProfile::Meta => 11,
            StreamProfile::DirectorsCut => 12,
            StreamProfile::AudioOpusLive => 13,
            StreamProfile::VideoH264L31 => 14,
            StreamProfile::VideoH264L40 => 15,
        }
    }

    /// Map a camera capability string (with the capability prefix already
    /// stripped) to a profile. Unknown names yield `None`.
    pub fn from_capability(name: &str) -> Option<Self> {
        match name {
            "AUDIO_AAC" => Some(StreamProfile::AudioAac),
            "AUDIO_SPEEX" => Some(StreamProfile::AudioSpeex),
            "AUDIO_OPUS" => Some(StreamProfile::AudioOpus),
            "AUDIO_OPUS_LIVE" => Some(StreamProfile::AudioOpusLive),
            "VIDEO_H264_50KBIT_L12" => Some(StreamProfile::VideoH264_50KbitL12),
            "VIDEO_H264_530KBIT_L31" => Some(StreamProfile::VideoH264_530KbitL31),
            "VIDEO_H264_100KBIT_L30" => Some(StreamProfile::VideoH264_100KbitL30),
            "VIDEO_H264_2MBIT_L40" => Some(StreamProfile::VideoH264_2MbitL40),
            "VIDEO_H264_50KBIT_L12_THUMBNAIL" => {
                Some(StreamProfile::VideoH264_50KbitL12Thumbnail)
            }
            "META" => Some(StreamProfile::Meta),
            "DIRECTORS_CUT" => Some(StreamProfile::DirectorsCut),
            "VIDEO_H264_L31" => Some(StreamProfile::VideoH264L31),
            "VIDEO_H264_L40" => Some(StreamProfile::VideoH264L40),
            "AVPROFILE_MOBILE_1" => Some(StreamProfile::AvProfileMobile1),
            "AVPROFILE_HD_MAIN_1" => Some(StreamProfile::AvProfileHdMain1),
            _ => None,
        }
    }
}
