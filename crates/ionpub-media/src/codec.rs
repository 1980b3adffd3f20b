//! Codec capabilities for published tracks

use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};

/// Opus pages in the Ogg container are paced at this interval
pub const OGG_PAGE_DURATION: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCodec {
    Vp8,
    Opus,
}

impl MediaCodec {
    pub fn kind(&self) -> RTPCodecType {
        match self {
            MediaCodec::Vp8 => RTPCodecType::Video,
            MediaCodec::Opus => RTPCodecType::Audio,
        }
    }

    pub fn clock_rate(&self) -> u32 {
        match self {
            MediaCodec::Vp8 => 90_000,
            MediaCodec::Opus => 48_000,
        }
    }

    /// RTP capability used when creating the local track
    pub fn capability(&self) -> RTCRtpCodecCapability {
        match self {
            MediaCodec::Vp8 => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: self.clock_rate(),
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            MediaCodec::Opus => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: self.clock_rate(),
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
        }
    }
}
