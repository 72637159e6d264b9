use crate::{Result, StreamType, TsError};

/// PAT table id
pub const TABLE_ID_PAT: u8 = 0x00;
/// PMT table id
pub const TABLE_ID_PMT: u8 = 0x02;

/// Read the 12 bit section length and make sure the whole section is present
fn section_bounds(data: &[u8], table_id: u8, min_length: u16) -> Result<usize> {
    if data.len() < 3 {
        return Err(TsError::InsufficientData {
            expected: 3,
            actual: data.len(),
        });
    }
    if data[0] != table_id {
        return Err(TsError::InvalidTableId {
            expected: table_id,
            actual: data[0],
        });
    }
    if data[1] & 0x80 == 0 {
        return Err(TsError::ParseError(format!(
            "table 0x{table_id:02x} must have section syntax indicator set"
        )));
    }

    let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;
    if section_length < min_length {
        return Err(TsError::InvalidSectionLength(section_length));
    }
    let end = 3 + section_length as usize;
    if data.len() < end {
        return Err(TsError::InsufficientData {
            expected: end,
            actual: data.len(),
        });
    }
    // Exclude CRC32
    Ok(end - 4)
}

/// Zero-copy PAT view over a PSI section
#[derive(Debug, Clone)]
pub struct PatRef<'data> {
    programs: &'data [u8],
    pub transport_stream_id: u16,
    pub version_number: u8,
    pub current_next_indicator: bool,
}

impl<'data> PatRef<'data> {
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        let end = section_bounds(data, TABLE_ID_PAT, 9)?;

        Ok(PatRef {
            programs: &data[8..end],
            transport_stream_id: ((data[3] as u16) << 8) | data[4] as u16,
            version_number: (data[5] >> 1) & 0x1F,
            current_next_indicator: (data[5] & 0x01) != 0,
        })
    }

    /// Iterate `(program_number, pmt_pid)` pairs, skipping the network PID entry
    pub fn programs(&self) -> impl Iterator<Item = PatProgram> + 'data {
        self.programs
            .chunks_exact(4)
            .map(|entry| PatProgram {
                program_number: ((entry[0] as u16) << 8) | entry[1] as u16,
                pmt_pid: ((entry[2] as u16 & 0x1F) << 8) | entry[3] as u16,
            })
            .filter(|program| program.program_number != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatProgram {
    pub program_number: u16,
    pub pmt_pid: u16,
}

/// Zero-copy PMT view over a PSI section
#[derive(Debug, Clone)]
pub struct PmtRef<'data> {
    streams: &'data [u8],
    pub program_number: u16,
    pub version_number: u8,
    pub pcr_pid: u16,
}

impl<'data> PmtRef<'data> {
    pub fn parse(data: &'data [u8]) -> Result<Self> {
        let end = section_bounds(data, TABLE_ID_PMT, 13)?;

        let program_info_length = (((data[10] as u16 & 0x0F) << 8) | data[11] as u16) as usize;
        let streams_offset = 12 + program_info_length;
        if streams_offset > end {
            return Err(TsError::InsufficientData {
                expected: streams_offset,
                actual: end,
            });
        }

        Ok(PmtRef {
            streams: &data[streams_offset..end],
            program_number: ((data[3] as u16) << 8) | data[4] as u16,
            version_number: (data[5] >> 1) & 0x1F,
            pcr_pid: ((data[8] as u16 & 0x1F) << 8) | data[9] as u16,
        })
    }

    pub fn streams(&self) -> PmtStreamIter<'data> {
        PmtStreamIter {
            data: self.streams,
            offset: 0,
        }
    }
}

/// Iterator over PMT elementary stream entries
#[derive(Debug)]
pub struct PmtStreamIter<'data> {
    data: &'data [u8],
    offset: usize,
}

impl<'data> Iterator for PmtStreamIter<'data> {
    type Item = Result<PmtStream>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.data.get(self.offset..self.offset + 5)?;
        let stream_type = StreamType::from(entry[0]);
        let elementary_pid = ((entry[1] as u16 & 0x1F) << 8) | entry[2] as u16;
        let es_info_length = (((entry[3] as u16 & 0x0F) << 8) | entry[4] as u16) as usize;

        let next = self.offset + 5 + es_info_length;
        if next > self.data.len() {
            // Stop iterating after reporting a truncated entry
            self.offset = self.data.len();
            return Some(Err(TsError::InsufficientData {
                expected: next,
                actual: self.data.len(),
            }));
        }
        self.offset = next;

        Some(Ok(PmtStream {
            stream_type,
            elementary_pid,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: StreamType,
    pub elementary_pid: u16,
}

/// CRC-32/MPEG-2 as used by PSI sections
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn finish_section(mut section: Vec<u8>) -> Vec<u8> {
    let section_length = section.len() - 3 + 4;
    section[1] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
    section[2] = section_length as u8;
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

/// Build a single-section PAT
pub fn build_pat_section(transport_stream_id: u16, version: u8, programs: &[PatProgram]) -> Vec<u8> {
    let mut section = vec![TABLE_ID_PAT, 0, 0];
    section.extend_from_slice(&transport_stream_id.to_be_bytes());
    section.push(0xC1 | ((version & 0x1F) << 1));
    section.extend_from_slice(&[0x00, 0x00]);
    for program in programs {
        section.extend_from_slice(&program.program_number.to_be_bytes());
        section.extend_from_slice(&(0xE000 | program.pmt_pid).to_be_bytes());
    }
    finish_section(section)
}

/// Build a single-section PMT without descriptors
pub fn build_pmt_section(
    program_number: u16,
    version: u8,
    pcr_pid: u16,
    streams: &[PmtStream],
) -> Vec<u8> {
    let mut section = vec![TABLE_ID_PMT, 0, 0];
    section.extend_from_slice(&program_number.to_be_bytes());
    section.push(0xC1 | ((version & 0x1F) << 1));
    section.extend_from_slice(&[0x00, 0x00]);
    section.extend_from_slice(&(0xE000 | pcr_pid).to_be_bytes());
    section.extend_from_slice(&[0xF0, 0x00]);
    for stream in streams {
        section.push(stream.stream_type.into());
        section.extend_from_slice(&(0xE000 | stream.elementary_pid).to_be_bytes());
        section.extend_from_slice(&[0xF0, 0x00]);
    }
    finish_section(section)
}
