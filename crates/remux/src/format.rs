//! Formats exchanged between the session and the remux engine.

use std::fmt;

use ts::{CodecFamily, StreamType};

/// Container kind on either side of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum RemuxFormat {
    /// MPEG-2 transport stream
    #[default]
    Ts,
    /// MPEG-2 program stream
    Ps,
}

impl fmt::Display for RemuxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemuxFormat::Ts => write!(f, "MPEG2-TS"),
            RemuxFormat::Ps => write!(f, "MPEG2-PS"),
        }
    }
}

/// Kind of capture device feeding the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureKind {
    /// Broadcast TV tuner
    Tv,
    /// Any other capture source
    #[default]
    Other,
}

impl CaptureKind {
    pub fn stream_format(self) -> StreamFormat {
        match self {
            CaptureKind::Tv => StreamFormat::Atsc,
            CaptureKind::Other => StreamFormat::Free,
        }
    }
}

/// Broadcast standard hint passed through to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    Atsc,
    Dvb,
    #[default]
    Free,
}

/// Delivery system hint passed through to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SubFormat {
    #[default]
    Unknown,
    Terrestrial,
    Cable,
    Satellite,
}

/// How the tuning fields should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TuneKind {
    /// `channel` is a plain channel (program index) number
    #[default]
    Channel,
    /// `data` holds a major-minor-physical triple
    Triple,
}

/// Opaque tuning parameters handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TuneDescriptor {
    pub kind: TuneKind,
    pub channel: u16,
    /// Explicit program number; 0 lets the engine choose
    pub program: u16,
    pub data: [u32; 3],
}

impl TuneDescriptor {
    /// Let the engine pick whatever it finds first
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn program(program: u16) -> Self {
        Self {
            program,
            ..Self::default()
        }
    }

    pub fn channel(channel: u16) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    pub fn is_auto(&self) -> bool {
        *self == Self::auto()
    }
}

impl fmt::Display for TuneDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TuneKind::Channel => write!(f, "channel={} program={}", self.channel, self.program),
            TuneKind::Triple => write!(
                f,
                "{}-{}-{} program={}",
                self.data[0], self.data[1], self.data[2], self.program
            ),
        }
    }
}

/// Video codecs the session cares about when choosing cut points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    Mpeg1,
    Mpeg2,
    H264,
    Hevc,
    Other(StreamType),
}

impl From<StreamType> for VideoCodec {
    fn from(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Mpeg1Video => VideoCodec::Mpeg1,
            StreamType::Mpeg2Video | StreamType::Dc2Video => VideoCodec::Mpeg2,
            StreamType::H264 => VideoCodec::H264,
            StreamType::H265 => VideoCodec::Hevc,
            other => VideoCodec::Other(other),
        }
    }
}

impl VideoCodec {
    /// Codec family whose access-unit markers can be searched for
    pub fn family(self) -> Option<CodecFamily> {
        match self {
            VideoCodec::H264 => Some(CodecFamily::H264),
            VideoCodec::Mpeg2 => Some(CodecFamily::Mpeg2),
            _ => None,
        }
    }

    /// Whether a program stream can carry this codec
    pub fn fits_program_stream(self) -> bool {
        matches!(self, VideoCodec::Mpeg1 | VideoCodec::Mpeg2)
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoCodec::Mpeg1 => write!(f, "MPEG1-Video"),
            VideoCodec::Mpeg2 => write!(f, "MPEG2-Video"),
            VideoCodec::H264 => write!(f, "H.264"),
            VideoCodec::Hevc => write!(f, "HEVC"),
            VideoCodec::Other(stream_type) => write!(f, "{}", stream_type.codec_name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub codec: VideoCodec,
    pub pid: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStream {
    pub stream_type: StreamType,
    pub pid: u16,
}

/// Container layout reported by the engine once detection succeeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFormat {
    pub container: RemuxFormat,
    pub program_number: Option<u16>,
    pub video: Option<VideoFormat>,
    pub audio: Vec<AudioStream>,
}

impl ContainerFormat {
    pub fn video_codec(&self) -> Option<VideoCodec> {
        self.video.map(|v| v.codec)
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.container)?;
        if let Some(program) = self.program_number {
            write!(f, " program {program}")?;
        }
        if let Some(video) = &self.video {
            write!(f, ", video {} on PID 0x{:04X}", video.codec, video.pid)?;
        }
        for audio in &self.audio {
            write!(
                f,
                ", audio {} on PID 0x{:04X}",
                audio.stream_type.codec_name(),
                audio.pid
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_kind_maps_to_stream_format() {
        assert_eq!(CaptureKind::Tv.stream_format(), StreamFormat::Atsc);
        assert_eq!(CaptureKind::Other.stream_format(), StreamFormat::Free);
    }

    #[test]
    fn test_codec_families() {
        assert_eq!(
            VideoCodec::from(StreamType::H264).family(),
            Some(CodecFamily::H264)
        );
        assert_eq!(
            VideoCodec::from(StreamType::Dc2Video).family(),
            Some(CodecFamily::Mpeg2)
        );
        assert_eq!(VideoCodec::Mpeg1.family(), None);
        assert!(VideoCodec::Mpeg1.fits_program_stream());
        assert!(!VideoCodec::H264.fits_program_stream());
    }

    #[test]
    fn test_auto_tuning() {
        assert!(TuneDescriptor::auto().is_auto());
        assert!(!TuneDescriptor::program(3).is_auto());
    }

    #[test]
    fn test_container_display() {
        let format = ContainerFormat {
            container: RemuxFormat::Ts,
            program_number: Some(1),
            video: Some(VideoFormat {
                codec: VideoCodec::H264,
                pid: 0x100,
            }),
            audio: vec![],
        };
        assert_eq!(
            format.to_string(),
            "MPEG2-TS program 1, video H.264 on PID 0x0100"
        );
    }
}
