//! Streamer configuration

use std::path::PathBuf;

use crate::protocol::constants::StreamProfile;
use crate::protocol::message::Credential;

/// Configuration for one streamer instance
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Credential embedded in the authentication handshake
    pub credential: Credential,

    /// Primary quality profile requested at negotiation
    pub quality: StreamProfile,

    /// Directory holding the placeholder frame assets, if any
    pub asset_dir: Option<PathBuf>,
}

impl StreamerConfig {
    /// Create a config with the default quality profile
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            quality: StreamProfile::VideoH264_2MbitL40,
            asset_dir: None,
        }
    }

    /// Set the primary quality profile
    pub fn quality(mut self, quality: StreamProfile) -> Self {
        self.quality = quality;
        self
    }

    /// Set the placeholder asset directory
    pub fn asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quality() {
        let config = StreamerConfig::new(Credential::Nest("t".into()));
        assert_eq!(config.quality, StreamProfile::VideoH264_2MbitL40);
        assert!(config.asset_dir.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let config = StreamerConfig::new(Credential::Google("t".into()))
            .quality(StreamProfile::VideoH264_530KbitL31)
            .asset_dir("/tmp/assets");
        assert_eq!(config.quality, StreamProfile::VideoH264_530KbitL31);
        assert_eq!(config.asset_dir.as_deref().map(|p| p.to_str()), Some(Some("/tmp/assets")));
    }
}
