//! Access-unit boundary markers used to pick splice points.
//!
//! These are byte patterns on the elementary stream, found without decoding:
//! an H.264 access unit delimiter announcing an I picture, an MPEG-2 picture
//! start code whose coding type is I, and the MPEG-2 sequence header.

use memchr::memmem;

/// H.264 access unit delimiter with `primary_pic_type = 0` (I slices only)
pub const H264_INTRA_AUD: [u8; 7] = [0x00, 0x00, 0x00, 0x01, 0x09, 0x10, 0x00];
/// MPEG-1/2 picture start code
pub const MPEG2_PICTURE_START: [u8; 4] = [0x00, 0x00, 0x01, 0x00];
/// MPEG-1/2 sequence header start code
pub const MPEG2_SEQUENCE_HEADER: [u8; 4] = [0x00, 0x00, 0x01, 0xB3];

/// Video codec families a splice point can be found for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    H264,
    Mpeg2,
}

impl CodecFamily {
    /// Offset of the first intra access-unit marker in `view`
    pub fn find_intra_marker(self, view: &[u8]) -> Option<usize> {
        match self {
            CodecFamily::H264 => find_h264_intra_aud(view),
            CodecFamily::Mpeg2 => find_mpeg2_intra_picture(view),
        }
    }

    /// Offset of the marker that makes a program stream pack a clean entry
    pub fn find_entry_marker(self, view: &[u8]) -> Option<usize> {
        match self {
            CodecFamily::H264 => find_h264_intra_aud(view),
            CodecFamily::Mpeg2 => memmem::find(view, &MPEG2_SEQUENCE_HEADER),
        }
    }
}

#[inline]
pub fn find_h264_intra_aud(view: &[u8]) -> Option<usize> {
    memmem::find(view, &H264_INTRA_AUD)
}

/// Picture start code followed by `picture_coding_type == 1`
pub fn find_mpeg2_intra_picture(view: &[u8]) -> Option<usize> {
    memmem::find_iter(view, &MPEG2_PICTURE_START)
        .find(|&start| view.get(start + 5).is_some_and(|b| b & 0x38 == 0x08))
}
