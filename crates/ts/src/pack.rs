//! MPEG-2 program stream pack headers.

use crate::{Result, TsError};

/// `00 00 01 BA`
pub const PACK_START_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xBA];
/// `00 00 01 B9`
pub const PROGRAM_END_CODE: [u8; 4] = [0x00, 0x00, 0x01, 0xB9];
/// Pack header size without stuffing
pub const PACK_HEADER_LEN: usize = 14;
/// Size of a DVD style pack; packs are kept within this bound
pub const PACK_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    /// System clock reference base, 90 kHz
    pub scr_base: u64,
    pub scr_extension: u16,
    /// Multiplex rate in units of 50 bytes/s
    pub mux_rate: u32,
    /// Header length including stuffing bytes
    pub header_len: usize,
}

impl PackHeader {
    pub fn new(scr_base: u64, mux_rate: u32) -> Self {
        Self {
            scr_base: scr_base & 0x1_FFFF_FFFF,
            scr_extension: 0,
            mux_rate: mux_rate & 0x3F_FFFF,
            header_len: PACK_HEADER_LEN,
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PACK_HEADER_LEN {
            return Err(TsError::InsufficientData {
                expected: PACK_HEADER_LEN,
                actual: data.len(),
            });
        }
        if data[..4] != PACK_START_CODE {
            return Err(TsError::InvalidStartCode(u32::from_be_bytes([
                data[0], data[1], data[2], data[3],
            ])));
        }
        if data[4] & 0xC0 != 0x40 {
            return Err(TsError::ParseError(
                "MPEG-1 pack headers are not supported".to_string(),
            ));
        }

        let b = &data[4..PACK_HEADER_LEN];
        let scr_base = (((b[0] as u64) >> 3) & 0x07) << 30
            | ((b[0] as u64) & 0x03) << 28
            | (b[1] as u64) << 20
            | ((b[2] as u64) >> 3) << 15
            | ((b[2] as u64) & 0x03) << 13
            | (b[3] as u64) << 5
            | (b[4] as u64) >> 3;
        let scr_extension = (((b[4] as u16) & 0x03) << 7) | ((b[5] as u16) >> 1);
        let mux_rate = ((b[6] as u32) << 14) | ((b[7] as u32) << 6) | ((b[8] as u32) >> 2);
        let header_len = PACK_HEADER_LEN + (b[9] & 0x07) as usize;

        Ok(Self {
            scr_base,
            scr_extension,
            mux_rate,
            header_len,
        })
    }

    pub fn to_bytes(&self) -> [u8; PACK_HEADER_LEN] {
        let scr = self.scr_base;
        let ext = self.scr_extension;
        let rate = self.mux_rate;
        [
            PACK_START_CODE[0],
            PACK_START_CODE[1],
            PACK_START_CODE[2],
            PACK_START_CODE[3],
            0x44 | (((scr >> 30) as u8 & 0x07) << 3) | ((scr >> 28) as u8 & 0x03),
            (scr >> 20) as u8,
            0x04 | (((scr >> 15) as u8 & 0x1F) << 3) | ((scr >> 13) as u8 & 0x03),
            (scr >> 5) as u8,
            (((scr as u8) & 0x1F) << 3) | 0x04 | ((ext >> 7) as u8 & 0x03),
            ((ext as u8) << 1) | 0x01,
            (rate >> 14) as u8,
            (rate >> 6) as u8,
            ((rate as u8) << 2) | 0x03,
            0xF8,
        ]
    }
}

/// Whether `view` starts with a pack start code
#[inline]
pub fn is_pack_start(view: &[u8]) -> bool {
    view.starts_with(&PACK_START_CODE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_header_fields_survive_encoding() {
        let header = PackHeader::new(0x1_8765_4321, 25_200);
        let bytes = header.to_bytes();
        assert!(is_pack_start(&bytes));
        assert_eq!(PackHeader::parse(&bytes).unwrap(), header);
    }

    #[test]
    fn test_rejects_other_start_codes() {
        let mut bytes = PackHeader::new(0, 1).to_bytes();
        bytes[3] = 0xBB;
        assert!(PackHeader::parse(&bytes).is_err());
        assert!(!is_pack_start(&bytes));
    }
}
