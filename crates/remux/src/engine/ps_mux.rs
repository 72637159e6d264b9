use tracing::trace;
use ts::pack::{PACK_HEADER_LEN, PACK_SIZE, PROGRAM_END_CODE};
use ts::pes::{PES_FIXED_HEADER_LEN, continuation_header};
use ts::{PackHeader, PesHeader, ProgramInfo, TsPacketRef};

/// Multiplex rate written to pack headers, in units of 50 bytes/s
const MUX_RATE: u32 = 25_200;
/// SCR lead over the decode timestamp when no PCR has been seen, 90 kHz
const SCR_LEAD: u64 = 9_000;
const MAX_PACK_PAYLOAD: usize = PACK_SIZE - PACK_HEADER_LEN;

#[derive(Debug)]
struct PesAssembler {
    pid: u16,
    data: Vec<u8>,
    started: bool,
}

/// Rebuilds the PES packets of one program and frames them in packs
#[derive(Debug, Default)]
pub(crate) struct PsMuxer {
    streams: Vec<PesAssembler>,
    pcr_pid: Option<u16>,
    pcr_seen: bool,
    scr: u64,
}

impl PsMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow the elementary streams of `info`, keeping partial PES data of
    /// streams that are still present
    pub fn set_program(&mut self, info: &ProgramInfo) {
        let pids: Vec<u16> = info
            .streams
            .iter()
            .filter(|s| s.stream_type.is_video() || s.stream_type.is_audio())
            .map(|s| s.elementary_pid)
            .collect();
        self.streams.retain(|s| pids.contains(&s.pid));
        for pid in pids {
            if !self.streams.iter().any(|s| s.pid == pid) {
                self.streams.push(PesAssembler {
                    pid,
                    data: Vec::new(),
                    started: false,
                });
            }
        }
        self.pcr_pid = Some(info.pcr_pid);
    }

    pub fn push_packet(&mut self, packet: &TsPacketRef<'_>, out: &mut Vec<u8>) {
        if Some(packet.pid) == self.pcr_pid {
            if let Some(pcr) = packet.pcr_base() {
                self.scr = self.scr.max(pcr);
                self.pcr_seen = true;
            }
        }

        let Some(index) = self.streams.iter().position(|s| s.pid == packet.pid) else {
            return;
        };
        let Some(payload) = packet.payload() else {
            return;
        };

        if packet.payload_unit_start_indicator {
            let mut pending = std::mem::take(&mut self.streams[index].data);
            if !pending.is_empty() {
                self.emit(&pending, out);
                pending.clear();
            }
            let stream = &mut self.streams[index];
            stream.data = pending;
            stream.data.extend_from_slice(payload);
            stream.started = true;
        } else if self.streams[index].started {
            self.streams[index].data.extend_from_slice(payload);
        } else {
            return;
        }

        // Bounded PES packets (audio) can go out as soon as they are complete
        let complete = PesHeader::parse(&self.streams[index].data)
            .ok()
            .and_then(|header| header.total_len())
            .is_some_and(|total| self.streams[index].data.len() >= total);
        if complete {
            let pending = std::mem::take(&mut self.streams[index].data);
            self.emit(&pending, out);
            self.streams[index].started = false;
        }
    }

    /// Emit every partially assembled PES packet and the program end code
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        for index in 0..self.streams.len() {
            let pending = std::mem::take(&mut self.streams[index].data);
            if !pending.is_empty() {
                self.emit(&pending, out);
            }
            self.streams[index].started = false;
        }
        out.extend_from_slice(&PROGRAM_END_CODE);
    }

    fn emit(&mut self, pes: &[u8], out: &mut Vec<u8>) {
        let header = match PesHeader::parse(pes) {
            Ok(header) => header,
            Err(e) => {
                trace!("Dropping PES data without a usable header: {e}");
                return;
            }
        };
        if !self.pcr_seen {
            if let Some(timestamp) = header.dts.or(header.pts) {
                self.scr = self.scr.max(timestamp.saturating_sub(SCR_LEAD));
            }
        }

        let end = header.total_len().map_or(pes.len(), |total| total.min(pes.len()));
        let (head, payload) = pes[..end].split_at(header.header_len);

        let first_len = payload.len().min(MAX_PACK_PAYLOAD - head.len());
        let length = (head.len() - PES_FIXED_HEADER_LEN + first_len) as u16;
        self.write_pack_header(out);
        out.extend_from_slice(&head[..4]);
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&head[PES_FIXED_HEADER_LEN..]);
        out.extend_from_slice(&payload[..first_len]);

        let continuation_len = continuation_header(header.stream_id, 0).len();
        for chunk in payload[first_len..].chunks(MAX_PACK_PAYLOAD - continuation_len) {
            self.write_pack_header(out);
            out.extend_from_slice(&continuation_header(header.stream_id, chunk.len()));
            out.extend_from_slice(chunk);
        }
    }

    fn write_pack_header(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&PackHeader::new(self.scr, MUX_RATE).to_bytes());
    }
}
