use crate::{Result, TsError};

/// Stream id of the program stream padding stream
pub const STREAM_ID_PADDING: u8 = 0xBE;
/// Stream id of private stream 2
pub const STREAM_ID_PRIVATE_2: u8 = 0xBF;

/// Fixed part of a PES header: start code prefix, stream id and length
pub const PES_FIXED_HEADER_LEN: usize = 6;

/// Parsed PES packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    /// Value of PES_packet_length; 0 means unbounded (video in TS)
    pub packet_length: u16,
    /// Total header size including optional fields
    pub header_len: usize,
    /// Presentation timestamp in 90 kHz units
    pub pts: Option<u64>,
    /// Decoding timestamp in 90 kHz units
    pub dts: Option<u64>,
}

impl PesHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PES_FIXED_HEADER_LEN {
            return Err(TsError::InsufficientData {
                expected: PES_FIXED_HEADER_LEN,
                actual: data.len(),
            });
        }
        if data[..3] != [0x00, 0x00, 0x01] {
            return Err(TsError::InvalidStartCode(u32::from_be_bytes([
                data[0], data[1], data[2], data[3],
            ])));
        }

        let stream_id = data[3];
        let packet_length = u16::from_be_bytes([data[4], data[5]]);

        if !has_optional_header(stream_id) {
            return Ok(PesHeader {
                stream_id,
                packet_length,
                header_len: PES_FIXED_HEADER_LEN,
                pts: None,
                dts: None,
            });
        }

        if data.len() < 9 {
            return Err(TsError::InsufficientData {
                expected: 9,
                actual: data.len(),
            });
        }
        let flags = data[7];
        let header_len = 9 + data[8] as usize;
        if data.len() < header_len {
            return Err(TsError::InsufficientData {
                expected: header_len,
                actual: data.len(),
            });
        }
        if packet_length != 0 && (packet_length as usize) < header_len - PES_FIXED_HEADER_LEN {
            return Err(TsError::ParseError(format!(
                "PES packet length {packet_length} is shorter than its {header_len} byte header"
            )));
        }

        let pts = if flags & 0x80 != 0 && header_len >= 14 {
            Some(read_timestamp(&data[9..14]))
        } else {
            None
        };
        let dts = if flags & 0xC0 == 0xC0 && header_len >= 19 {
            Some(read_timestamp(&data[14..19]))
        } else {
            None
        };

        Ok(PesHeader {
            stream_id,
            packet_length,
            header_len,
            pts,
            dts,
        })
    }

    /// Size of the whole PES packet when bounded
    pub fn total_len(&self) -> Option<usize> {
        (self.packet_length != 0).then(|| PES_FIXED_HEADER_LEN + self.packet_length as usize)
    }
}

/// Whether a stream id carries the MPEG-2 optional PES header
pub fn has_optional_header(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        0xBC | STREAM_ID_PADDING | STREAM_ID_PRIVATE_2 | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF
    )
}

/// Decode a 33 bit PTS/DTS from its 5 byte marker-bit encoding
pub fn read_timestamp(bytes: &[u8]) -> u64 {
    (((bytes[0] as u64) >> 1) & 0x07) << 30
        | (bytes[1] as u64) << 22
        | ((bytes[2] as u64) >> 1) << 15
        | (bytes[3] as u64) << 7
        | (bytes[4] as u64) >> 1
}

/// Encode a 33 bit timestamp with the given 4 bit prefix
pub fn write_timestamp(prefix: u8, ts: u64) -> [u8; 5] {
    [
        (prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 0x01,
        (ts >> 22) as u8,
        (((ts >> 15) as u8) << 1) | 0x01,
        (ts >> 7) as u8,
        ((ts as u8) << 1) | 0x01,
    ]
}

/// Build the header of a PES continuation packet that carries no timestamps
pub fn continuation_header(stream_id: u8, payload_len: usize) -> Vec<u8> {
    if has_optional_header(stream_id) {
        let length = (payload_len + 3) as u16;
        let mut header = vec![0x00, 0x00, 0x01, stream_id];
        header.extend_from_slice(&length.to_be_bytes());
        header.extend_from_slice(&[0x80, 0x00, 0x00]);
        header
    } else {
        let mut header = vec![0x00, 0x00, 0x01, stream_id];
        header.extend_from_slice(&(payload_len as u16).to_be_bytes());
        header
    }
}
