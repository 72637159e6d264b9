//! Incremental PAT/PMT probe.
//!
//! Tracks PSI versions the same way a demuxer would, but only keeps the
//! program layout. Sections are expected to fit in one packet, which holds for
//! every broadcast PAT/PMT seen in practice.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::packet::{PID_PAT, TS_PACKET_SIZE, TsPacketRef};
use crate::psi::{PatProgram, PatRef, PmtRef, PmtStream, TABLE_ID_PAT, TABLE_ID_PMT};

/// Which program of a multi-program stream to lock onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgramSelection {
    /// First program carrying video, or the first program if none does
    #[default]
    Auto,
    /// Program with this program number
    ProgramNumber(u16),
    /// N-th program in PAT order, 1 based
    Index(usize),
}

/// Layout of the selected program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramInfo {
    pub program_number: u16,
    pub pmt_pid: u16,
    pub pcr_pid: u16,
    pub streams: Vec<PmtStream>,
}

impl ProgramInfo {
    /// First video elementary stream of the program
    pub fn video_stream(&self) -> Option<&PmtStream> {
        self.streams.iter().find(|s| s.stream_type.is_video())
    }

    pub fn audio_streams(&self) -> impl Iterator<Item = &PmtStream> {
        self.streams.iter().filter(|s| s.stream_type.is_audio())
    }

    /// Whether `pid` belongs to this program (PSI included)
    pub fn contains_pid(&self, pid: u16) -> bool {
        pid == PID_PAT
            || pid == self.pmt_pid
            || pid == self.pcr_pid
            || self.streams.iter().any(|s| s.elementary_pid == pid)
    }
}

#[derive(Debug, Default)]
pub struct ProgramProbe {
    selection: ProgramSelection,
    pat_version: Option<u8>,
    programs: Vec<PatProgram>,
    /// program_number -> parsed layout
    layouts: HashMap<u16, ProgramInfo>,
    selected: Option<ProgramInfo>,
}

impl ProgramProbe {
    pub fn new(selection: ProgramSelection) -> Self {
        Self {
            selection,
            ..Self::default()
        }
    }

    /// Feed packet-aligned data; trailing partial packets are ignored
    pub fn push(&mut self, data: &[u8]) -> Option<&ProgramInfo> {
        for chunk in data.chunks_exact(TS_PACKET_SIZE) {
            if let Ok(packet) = TsPacketRef::parse(chunk) {
                self.push_packet(&packet);
            }
        }
        self.selected.as_ref()
    }

    pub fn push_packet(&mut self, packet: &TsPacketRef<'_>) {
        if !packet.payload_unit_start_indicator {
            return;
        }
        let Some(section) = packet.psi_payload() else {
            return;
        };

        match (packet.pid, section.first()) {
            (PID_PAT, Some(&TABLE_ID_PAT)) => self.on_pat(section),
            (pid, Some(&TABLE_ID_PMT)) if self.is_pmt_pid(pid) => self.on_pmt(pid, section),
            _ => {}
        }
    }

    fn is_pmt_pid(&self, pid: u16) -> bool {
        self.programs.iter().any(|p| p.pmt_pid == pid)
    }

    fn on_pat(&mut self, section: &[u8]) {
        let pat = match PatRef::parse(section) {
            Ok(pat) => pat,
            Err(e) => {
                trace!("Ignoring malformed PAT: {e}");
                return;
            }
        };
        if self.pat_version == Some(pat.version_number) {
            return;
        }

        debug!(
            transport_stream_id = pat.transport_stream_id,
            version = pat.version_number,
            "PAT updated"
        );
        self.pat_version = Some(pat.version_number);
        self.programs = pat.programs().collect();
        self.layouts.clear();
        self.selected = None;
    }

    fn on_pmt(&mut self, pid: u16, section: &[u8]) {
        let pmt = match PmtRef::parse(section) {
            Ok(pmt) => pmt,
            Err(e) => {
                trace!("Ignoring malformed PMT on PID 0x{pid:04X}: {e}");
                return;
            }
        };
        let streams: Vec<PmtStream> = pmt.streams().filter_map(Result::ok).collect();

        let info = ProgramInfo {
            program_number: pmt.program_number,
            pmt_pid: pid,
            pcr_pid: pmt.pcr_pid,
            streams,
        };
        if self.layouts.get(&info.program_number) == Some(&info) {
            return;
        }
        debug!(
            program = info.program_number,
            streams = info.streams.len(),
            "PMT updated"
        );
        self.layouts.insert(info.program_number, info);
        self.select();
    }

    fn select(&mut self) {
        let chosen = match self.selection {
            ProgramSelection::ProgramNumber(number) => self.layouts.get(&number),
            ProgramSelection::Index(index) => index
                .checked_sub(1)
                .and_then(|i| self.programs.get(i))
                .and_then(|p| self.layouts.get(&p.program_number)),
            ProgramSelection::Auto => {
                let with_video = self
                    .programs
                    .iter()
                    .filter_map(|p| self.layouts.get(&p.program_number))
                    .find(|info| info.video_stream().is_some());
                let all_known = self
                    .programs
                    .iter()
                    .all(|p| self.layouts.contains_key(&p.program_number));
                with_video.or_else(|| {
                    all_known
                        .then(|| self.programs.first())
                        .flatten()
                        .and_then(|p| self.layouts.get(&p.program_number))
                })
            }
        };
        self.selected = chosen.cloned();
    }

    pub fn selected(&self) -> Option<&ProgramInfo> {
        self.selected.as_ref()
    }

    pub fn reset(&mut self) {
        self.pat_version = None;
        self.programs.clear();
        self.layouts.clear();
        self.selected = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamType;
    use crate::packet::write_header;
    use crate::psi::{build_pat_section, build_pmt_section};

    fn psi_packet(pid: u16, section: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xFFu8; TS_PACKET_SIZE];
        let mut header = [0u8; 4];
        write_header(&mut header, pid, true, 0x01, 0);
        packet[..4].copy_from_slice(&header);
        packet[4] = 0; // pointer field
        packet[5..5 + section.len()].copy_from_slice(section);
        packet
    }

    fn two_program_stream() -> Vec<u8> {
        let pat = build_pat_section(
            1,
            0,
            &[
                PatProgram {
                    program_number: 3,
                    pmt_pid: 0x30,
                },
                PatProgram {
                    program_number: 4,
                    pmt_pid: 0x40,
                },
            ],
        );
        let radio = build_pmt_section(
            3,
            0,
            0x31,
            &[PmtStream {
                stream_type: StreamType::Mpeg1Audio,
                elementary_pid: 0x31,
            }],
        );
        let tv = build_pmt_section(
            4,
            0,
            0x41,
            &[
                PmtStream {
                    stream_type: StreamType::Mpeg2Video,
                    elementary_pid: 0x41,
                },
                PmtStream {
                    stream_type: StreamType::Ac3,
                    elementary_pid: 0x42,
                },
            ],
        );
        let mut data = psi_packet(PID_PAT, &pat);
        data.extend(psi_packet(0x30, &radio));
        data.extend(psi_packet(0x40, &tv));
        data
    }

    #[test]
    fn test_auto_prefers_video_program() {
        let mut probe = ProgramProbe::new(ProgramSelection::Auto);
        let info = probe.push(&two_program_stream()).cloned().unwrap();
        assert_eq!(info.program_number, 4);
        assert_eq!(info.video_stream().unwrap().elementary_pid, 0x41);
        assert!(info.contains_pid(0x42));
        assert!(!info.contains_pid(0x31));
    }

    #[test]
    fn test_explicit_program_number() {
        let mut probe = ProgramProbe::new(ProgramSelection::ProgramNumber(3));
        let info = probe.push(&two_program_stream()).unwrap();
        assert_eq!(info.program_number, 3);
        assert!(info.video_stream().is_none());
    }

    #[test]
    fn test_program_index() {
        let mut probe = ProgramProbe::new(ProgramSelection::Index(2));
        assert_eq!(
            probe.push(&two_program_stream()).unwrap().program_number,
            4
        );
    }

    #[test]
    fn test_no_psi_never_selects() {
        let mut probe = ProgramProbe::default();
        let mut data = vec![0u8; TS_PACKET_SIZE * 4];
        for chunk in data.chunks_exact_mut(TS_PACKET_SIZE) {
            chunk[0] = 0x47;
        }
        assert!(probe.push(&data).is_none());
    }

    #[test]
    fn test_missing_program_never_selects() {
        let mut probe = ProgramProbe::new(ProgramSelection::ProgramNumber(9));
        assert!(probe.push(&two_program_stream()).is_none());
        probe.reset();
        assert!(probe.selected().is_none());
    }
}
