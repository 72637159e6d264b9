//! Cut-point selection for destination switches.
//!
//! A switch should start the new destination on something a player can decode
//! from: an intra picture for transport streams, or a pack that carries a
//! sequence entry point for program streams. The policy only looks at
//! container bytes and a handful of well-known start codes.

use memchr::memmem;
use tracing::trace;
use ts::{CodecFamily, PACK_START_CODE, SYNC_BYTE, TS_PACKET_SIZE, TsPacketRef, find_sync};

use crate::format::RemuxFormat;

/// What the cut search knows about the current output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutPolicy {
    pub output: RemuxFormat,
    /// Codec family of the detected video stream, if splice markers exist for it
    pub codec: Option<CodecFamily>,
    pub video_pid: Option<u16>,
    /// Bytes after a pack header searched for an entry marker
    pub pack_window: usize,
}

impl CutPolicy {
    pub fn new(output: RemuxFormat, pack_window: usize) -> Self {
        Self {
            output,
            codec: None,
            video_pid: None,
            pack_window,
        }
    }

    /// Offset in `view` at which the new destination should begin.
    ///
    /// `Some(0)` means the cut can happen right away. `None` means no safe
    /// point was found in this view.
    pub fn find_cut_point(&self, view: &[u8]) -> Option<usize> {
        let Some(codec) = self.codec else {
            return Some(0);
        };
        match self.output {
            RemuxFormat::Ts => match self.video_pid {
                Some(pid) => find_ts_cut(view, codec, pid),
                None => Some(0),
            },
            RemuxFormat::Ps => find_ps_cut(view, codec, self.pack_window),
        }
    }
}

/// First video packet starting a PES whose payload carries an intra marker
pub fn find_ts_cut(view: &[u8], codec: CodecFamily, video_pid: u16) -> Option<usize> {
    let mut offset = find_sync(view, TS_PACKET_SIZE)?;

    while offset + TS_PACKET_SIZE <= view.len() {
        if view[offset] != SYNC_BYTE {
            offset += 1 + find_sync(&view[offset + 1..], TS_PACKET_SIZE)?;
            continue;
        }

        let Ok(packet) = TsPacketRef::parse(&view[offset..offset + TS_PACKET_SIZE]) else {
            offset += TS_PACKET_SIZE;
            continue;
        };
        if packet.pid == video_pid
            && packet.payload_unit_start_indicator
            && !packet.transport_error_indicator
            && packet
                .payload()
                .is_some_and(|payload| codec.find_intra_marker(payload).is_some())
        {
            trace!(offset, "Intra picture found for cut");
            return Some(offset);
        }
        offset += TS_PACKET_SIZE;
    }
    None
}

/// First pack header followed, within `window` bytes, by an entry marker
pub fn find_ps_cut(view: &[u8], codec: CodecFamily, window: usize) -> Option<usize> {
    memmem::find_iter(view, &PACK_START_CODE).find(|&start| {
        let end = start.saturating_add(window).min(view.len());
        codec.find_entry_marker(&view[start..end]).is_some()
    })
}

/// An outstanding request to move the recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRequest {
    pub name: String,
    pub token: u32,
    /// Bytes searched for a cut point since the request was accepted
    pub scanned: u64,
}

impl SwitchRequest {
    pub fn new(name: impl Into<String>, token: u32) -> Self {
        Self {
            name: name.into(),
            token,
            scanned: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TsStreamBuilder, VIDEO_PID};
    use ts::marker::H264_INTRA_AUD;
    use ts::pack::PackHeader;

    #[test]
    fn test_no_codec_cuts_immediately() {
        let policy = CutPolicy::new(RemuxFormat::Ts, 2048);
        assert_eq!(policy.find_cut_point(&[1, 2, 3]), Some(0));
    }

    #[test]
    fn test_ts_cut_on_marked_packet() {
        let stream = TsStreamBuilder::new()
            .video_packets(5)
            .h264_intra_packet()
            .video_packets(3)
            .build();
        let policy = CutPolicy {
            codec: Some(CodecFamily::H264),
            video_pid: Some(VIDEO_PID),
            ..CutPolicy::new(RemuxFormat::Ts, 2048)
        };
        assert_eq!(policy.find_cut_point(&stream), Some(5 * TS_PACKET_SIZE));
    }

    #[test]
    fn test_ts_cut_ignores_other_pids() {
        let stream = TsStreamBuilder::new()
            .video_packets(3)
            .h264_intra_packet()
            .video_packets(3)
            .build();
        assert_eq!(find_ts_cut(&stream, CodecFamily::H264, 0x200), None);
    }

    #[test]
    fn test_ts_cut_after_misaligned_lead() {
        let packets = TsStreamBuilder::new()
            .video_packets(4)
            .mpeg2_intra_packet()
            .video_packets(2)
            .build();
        let mut view = vec![0x00; 10];
        view.extend_from_slice(&packets);
        assert_eq!(
            find_ts_cut(&view, CodecFamily::Mpeg2, VIDEO_PID),
            Some(10 + 4 * TS_PACKET_SIZE)
        );
    }

    #[test]
    fn test_ps_cut_on_pack_with_entry_marker() {
        let mut view = vec![0xAA; 50];
        view.extend_from_slice(&PackHeader::new(0, 1).to_bytes());
        view.extend_from_slice(&[0x11; 40]);
        let second = view.len();
        view.extend_from_slice(&PackHeader::new(3_000, 1).to_bytes());
        view.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]);
        view.extend_from_slice(&H264_INTRA_AUD);

        // The first pack's window ends before the second pack's marker
        assert_eq!(find_ps_cut(&view, CodecFamily::H264, 60), Some(second));
        assert_eq!(find_ps_cut(&view, CodecFamily::H264, 2048), Some(50));
        assert_eq!(find_ps_cut(&view, CodecFamily::Mpeg2, 2048), None);
    }

    #[test]
    fn test_ps_window_is_bounded() {
        let mut view = PackHeader::new(0, 1).to_bytes().to_vec();
        view.extend_from_slice(&[0x22; 100]);
        view.extend_from_slice(&[0x00, 0x00, 0x01, 0xB3]);
        assert_eq!(find_ps_cut(&view, CodecFamily::Mpeg2, 64), None);
        assert_eq!(find_ps_cut(&view, CodecFamily::Mpeg2, 2048), Some(0));
    }
}
