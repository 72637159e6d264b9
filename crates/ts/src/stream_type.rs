/// Elementary stream types found in PMT entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// MPEG-1 Video
    Mpeg1Video,
    /// MPEG-2 Video
    Mpeg2Video,
    /// MPEG-1 Audio
    Mpeg1Audio,
    /// MPEG-2 Audio
    Mpeg2Audio,
    /// MPEG-2 Private PES packets
    Mpeg2PrivatePes,
    /// ADTS AAC Audio
    AdtsAac,
    /// MPEG-4 Visual
    Mpeg4Visual,
    /// LATM AAC Audio
    LatmAac,
    /// AVC video stream (ITU-T Rec. H.264 | ISO/IEC 14496-10)
    H264,
    /// HEVC video stream (ITU-T Rec. H.265 | ISO/IEC 23008-2)
    H265,
    /// VVC video stream (ITU-T Rec. H.266 | ISO/IEC 23090-3)
    H266,
    /// AC-3 audio stream (ATSC A/52B)
    Ac3,
    /// E-AC-3 audio stream (ATSC A/52B)
    EAc3,
    /// DTS audio stream
    Dts,
    /// DigiCipher II video
    Dc2Video,
    Unknown(u8),
}

impl From<u8> for StreamType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => StreamType::Mpeg1Video,
            0x02 => StreamType::Mpeg2Video,
            0x03 => StreamType::Mpeg1Audio,
            0x04 => StreamType::Mpeg2Audio,
            0x06 => StreamType::Mpeg2PrivatePes,
            0x0F => StreamType::AdtsAac,
            0x10 => StreamType::Mpeg4Visual,
            0x11 => StreamType::LatmAac,
            0x1B => StreamType::H264,
            0x24 => StreamType::H265,
            0x33 => StreamType::H266,
            0x80 => StreamType::Dc2Video,
            0x81 => StreamType::Ac3,
            0x82 => StreamType::Dts,
            0x87 => StreamType::EAc3,
            other => StreamType::Unknown(other),
        }
    }
}

impl From<StreamType> for u8 {
    fn from(value: StreamType) -> Self {
        match value {
            StreamType::Mpeg1Video => 0x01,
            StreamType::Mpeg2Video => 0x02,
            StreamType::Mpeg1Audio => 0x03,
            StreamType::Mpeg2Audio => 0x04,
            StreamType::Mpeg2PrivatePes => 0x06,
            StreamType::AdtsAac => 0x0F,
            StreamType::Mpeg4Visual => 0x10,
            StreamType::LatmAac => 0x11,
            StreamType::H264 => 0x1B,
            StreamType::H265 => 0x24,
            StreamType::H266 => 0x33,
            StreamType::Dc2Video => 0x80,
            StreamType::Ac3 => 0x81,
            StreamType::Dts => 0x82,
            StreamType::EAc3 => 0x87,
            StreamType::Unknown(other) => other,
        }
    }
}

impl StreamType {
    pub fn is_video(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Video
                | StreamType::Mpeg2Video
                | StreamType::Mpeg4Visual
                | StreamType::H264
                | StreamType::H265
                | StreamType::H266
                | StreamType::Dc2Video
        )
    }

    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            StreamType::Mpeg1Audio
                | StreamType::Mpeg2Audio
                | StreamType::AdtsAac
                | StreamType::LatmAac
                | StreamType::Ac3
                | StreamType::EAc3
                | StreamType::Dts
        )
    }

    /// Short codec name used in logs and container descriptions
    pub fn codec_name(&self) -> &'static str {
        match self {
            StreamType::Mpeg1Video => "MPEG1-Video",
            StreamType::Mpeg2Video | StreamType::Dc2Video => "MPEG2-Video",
            StreamType::Mpeg1Audio => "MPEG1-Audio",
            StreamType::Mpeg2Audio => "MPEG2-Audio",
            StreamType::Mpeg2PrivatePes => "Private",
            StreamType::AdtsAac | StreamType::LatmAac => "AAC",
            StreamType::Mpeg4Visual => "MPEG4-Video",
            StreamType::H264 => "H.264",
            StreamType::H265 => "H.265",
            StreamType::H266 => "H.266",
            StreamType::Ac3 => "AC3",
            StreamType::EAc3 => "EAC3",
            StreamType::Dts => "DTS",
            StreamType::Unknown(_) => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_type_round_trip_known_values() {
        for raw in [0x01u8, 0x02, 0x1B, 0x24, 0x81, 0x87] {
            assert_eq!(u8::from(StreamType::from(raw)), raw);
        }
        assert_eq!(StreamType::from(0x99), StreamType::Unknown(0x99));
    }

    #[test]
    fn test_classification() {
        assert!(StreamType::H264.is_video());
        assert!(StreamType::Mpeg2Video.is_video());
        assert!(!StreamType::Ac3.is_video());
        assert!(StreamType::Ac3.is_audio());
        assert!(!StreamType::Unknown(0x05).is_audio());
    }
}
