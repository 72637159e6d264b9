use crate::{Result, TsError};

/// Transport stream packet length in bytes
pub const TS_PACKET_SIZE: usize = 188;

/// First byte of every transport stream packet
pub const SYNC_BYTE: u8 = 0x47;

/// PAT PID (always 0x0000)
pub const PID_PAT: u16 = 0x0000;

/// NULL PID (always 0x1FFF)
pub const PID_NULL: u16 = 0x1FFF;

/// Zero-copy view over a single 188 byte transport stream packet
#[derive(Debug, Clone, Copy)]
pub struct TsPacketRef<'data> {
    data: &'data [u8],
    pub transport_error_indicator: bool,
    pub payload_unit_start_indicator: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub transport_scrambling_control: u8,
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
    /// Offset to adaptation field length byte (if present)
    adaptation_field_offset: Option<usize>,
    /// Offset to payload (if present)
    payload_offset: Option<usize>,
}

impl<'data> TsPacketRef<'data> {
    /// Parse a TS packet header from exactly 188 bytes without copying
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        if data.len() != TS_PACKET_SIZE {
            return Err(TsError::InvalidPacketSize {
                expected: TS_PACKET_SIZE,
                actual: data.len(),
            });
        }

        if data[0] != SYNC_BYTE {
            return Err(TsError::InvalidSyncByte(data[0]));
        }

        let byte1 = data[1];
        let byte2 = data[2];
        let byte3 = data[3];

        let adaptation_field_control = (byte3 >> 4) & 0x03;

        let mut offset = 4;
        let mut adaptation_field_offset = None;
        let mut payload_offset = None;

        if adaptation_field_control & 0x02 != 0 {
            let adaptation_field_length = data[offset] as usize;
            if offset + 1 + adaptation_field_length > data.len() {
                return Err(TsError::InsufficientData {
                    expected: offset + 1 + adaptation_field_length,
                    actual: data.len(),
                });
            }
            adaptation_field_offset = Some(offset);
            offset += 1 + adaptation_field_length;
        }

        if adaptation_field_control & 0x01 != 0 && offset < data.len() {
            payload_offset = Some(offset);
        }

        Ok(TsPacketRef {
            data,
            transport_error_indicator: (byte1 & 0x80) != 0,
            payload_unit_start_indicator: (byte1 & 0x40) != 0,
            transport_priority: (byte1 & 0x20) != 0,
            pid: ((byte1 as u16 & 0x1F) << 8) | byte2 as u16,
            transport_scrambling_control: (byte3 >> 6) & 0x03,
            adaptation_field_control,
            continuity_counter: byte3 & 0x0F,
            adaptation_field_offset,
            payload_offset,
        })
    }

    /// Adaptation field body, without its length byte
    #[inline]
    pub fn adaptation_field(&self) -> Option<&'data [u8]> {
        let offset = self.adaptation_field_offset?;
        let length = self.data[offset] as usize;
        Some(&self.data[offset + 1..offset + 1 + length])
    }

    #[inline]
    pub fn payload(&self) -> Option<&'data [u8]> {
        self.payload_offset.map(|offset| &self.data[offset..])
    }

    /// PSI section payload (skips the pointer field when PUSI is set)
    pub fn psi_payload(&self) -> Option<&'data [u8]> {
        let payload = self.payload()?;
        if !self.payload_unit_start_indicator {
            return Some(payload);
        }
        let pointer_field = *payload.first()? as usize;
        payload.get(1 + pointer_field..).filter(|p| !p.is_empty())
    }

    /// Program clock reference base (90 kHz units), if this packet carries one
    pub fn pcr_base(&self) -> Option<u64> {
        let af = self.adaptation_field()?;
        if af.len() < 7 || af[0] & 0x10 == 0 {
            return None;
        }
        Some(
            ((af[1] as u64) << 25)
                | ((af[2] as u64) << 17)
                | ((af[3] as u64) << 9)
                | ((af[4] as u64) << 1)
                | ((af[5] as u64) >> 7),
        )
    }
}

/// Write a 4 byte TS header into `out`
pub fn write_header(out: &mut [u8; 4], pid: u16, pusi: bool, adaptation: u8, cc: u8) {
    out[0] = SYNC_BYTE;
    out[1] = ((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0 };
    out[2] = pid as u8;
    out[3] = ((adaptation & 0x03) << 4) | (cc & 0x0F);
}
