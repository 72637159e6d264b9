//! Helpers shared by unit and integration tests: in-memory destinations, a
//! scripted engine and a synthetic transport stream builder.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use ts::packet::write_header;
use ts::pes::write_timestamp;
use ts::psi::{build_pat_section, build_pmt_section};
use ts::{PID_NULL, PID_PAT, PatProgram, PmtStream, StreamType, TS_PACKET_SIZE};

use crate::destination::{Destination, DestinationOpener};
use crate::engine::{EngineFactory, EngineParams, RemuxEngine, RemuxSink};
use crate::format::{AudioStream, ContainerFormat, VideoCodec, VideoFormat};
use crate::{RemuxError, Result};

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

// Re-export the macro
pub use crate::init_test_tracing;

pub const PROGRAM_NUMBER: u16 = 1;
pub const PMT_PID: u16 = 0x1000;
pub const VIDEO_PID: u16 = 0x0100;
pub const AUDIO_PID: u16 = 0x0101;
pub const PCR_PID: u16 = VIDEO_PID;

#[derive(Debug, Default)]
struct MemoryFileState {
    data: Vec<u8>,
    position: usize,
    rewinds: usize,
    closed: bool,
}

/// Inspection side of a [`MemoryDestination`]
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    state: Arc<Mutex<MemoryFileState>>,
}

impl MemoryFile {
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    pub fn rewinds(&self) -> usize {
        self.state.lock().rewinds
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Destination writing into memory, with file-like positioning
#[derive(Debug)]
pub struct MemoryDestination {
    path: PathBuf,
    file: MemoryFile,
}

impl MemoryDestination {
    pub fn new(path: impl Into<PathBuf>) -> (Self, MemoryFile) {
        let file = MemoryFile::default();
        (
            Self {
                path: path.into(),
                file: file.clone(),
            },
            file,
        )
    }
}

impl Write for MemoryDestination {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.file.state.lock();
        let start = state.position;
        let end = start + buf.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(buf);
        state.position = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Destination for MemoryDestination {
    fn path(&self) -> &Path {
        &self.path
    }

    fn rewind(&mut self) -> io::Result<()> {
        let mut state = self.file.state.lock();
        state.position = 0;
        state.rewinds += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.state.lock().closed = true;
        Ok(())
    }
}

pub fn memory_destination(path: impl Into<PathBuf>) -> (Box<dyn Destination>, MemoryFile) {
    let (destination, file) = MemoryDestination::new(path);
    (Box::new(destination), file)
}

/// Opener handing out [`MemoryDestination`]s
#[derive(Debug, Default)]
pub struct MemoryOpener {
    files: Mutex<HashMap<PathBuf, MemoryFile>>,
    opened: Mutex<Vec<(String, u32)>>,
    fail_next: AtomicBool,
}

impl MemoryOpener {
    /// Make the next open fail with an I/O error
    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn file(&self, name: impl AsRef<Path>) -> Option<MemoryFile> {
        self.files.lock().get(name.as_ref()).cloned()
    }

    /// Names and tokens of successful opens, in order
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().clone()
    }
}

impl DestinationOpener for MemoryOpener {
    fn open(&self, name: &str, token: u32) -> io::Result<Box<dyn Destination>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(io::Error::other(format!("refusing to open {name}")));
        }
        let (destination, file) = MemoryDestination::new(name);
        self.files.lock().insert(PathBuf::from(name), file);
        self.opened.lock().push((name.to_string(), token));
        Ok(Box::new(destination))
    }
}

/// Sink that keeps everything written to it
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    state: Arc<Mutex<(Vec<u8>, usize)>>,
}

impl CollectingSink {
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().0.clone()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().1
    }
}

impl RemuxSink for CollectingSink {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.state.lock().0.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.state.lock().1 += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Detection {
    Never,
    /// Detected once this many bytes went through the analysis path
    After(usize),
    FailOpen,
}

/// Factory for [`ScriptedEngine`]s, which detect on a byte count and pass
/// remux data through unchanged
#[derive(Debug)]
pub struct ScriptedFactory {
    detection: Detection,
    reopened: Option<usize>,
    video: Option<VideoFormat>,
    opened: Mutex<Vec<EngineParams>>,
}

impl ScriptedFactory {
    pub fn never() -> Self {
        Self::with(Detection::Never)
    }

    pub fn detect_after(bytes: usize) -> Self {
        Self::with(Detection::After(bytes))
    }

    pub fn failing() -> Self {
        Self::with(Detection::FailOpen)
    }

    fn with(detection: Detection) -> Self {
        Self {
            detection,
            reopened: None,
            video: Some(VideoFormat {
                codec: VideoCodec::H264,
                pid: VIDEO_PID,
            }),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Report this video stream once detected
    pub fn video(mut self, codec: VideoCodec) -> Self {
        self.video = Some(VideoFormat {
            codec,
            pid: VIDEO_PID,
        });
        self
    }

    /// Engines opened after the first detect once this many bytes went
    /// through their analysis path
    pub fn on_reopen(mut self, bytes: usize) -> Self {
        self.reopened = Some(bytes);
        self
    }

    /// Parameters of every engine opened so far
    pub fn opened(&self) -> Vec<EngineParams> {
        self.opened.lock().clone()
    }
}

impl EngineFactory for ScriptedFactory {
    fn open(
        &self,
        params: &EngineParams,
        sink: Box<dyn RemuxSink>,
    ) -> Result<Box<dyn RemuxEngine>> {
        if let Detection::FailOpen = self.detection {
            return Err(RemuxError::EngineOpen("scripted failure".to_string()));
        }
        let mut opened = self.opened.lock();
        let detection = match self.reopened {
            Some(bytes) if !opened.is_empty() => Detection::After(bytes),
            _ => self.detection,
        };
        opened.push(*params);
        drop(opened);
        let format = ContainerFormat {
            container: params.output,
            program_number: Some(PROGRAM_NUMBER),
            video: self.video,
            audio: vec![AudioStream {
                stream_type: StreamType::Mpeg1Audio,
                pid: AUDIO_PID,
            }],
        };
        Ok(Box::new(ScriptedEngine {
            sink,
            detection,
            analysed: 0,
            format,
        }))
    }
}

pub struct ScriptedEngine {
    sink: Box<dyn RemuxSink>,
    detection: Detection,
    analysed: usize,
    format: ContainerFormat,
}

impl RemuxEngine for ScriptedEngine {
    fn push_init_data(&mut self, data: &[u8]) -> bool {
        self.analysed += data.len();
        self.container_format().is_some()
    }

    fn push_remux_data(&mut self, data: &[u8]) {
        let _ = self.sink.write(data);
    }

    fn container_format(&self) -> Option<ContainerFormat> {
        match self.detection {
            Detection::After(bytes) if self.analysed >= bytes => Some(self.format.clone()),
            _ => None,
        }
    }

    fn close(&mut self) {
        let _ = self.sink.flush();
    }
}

/// Builds synthetic single-program transport streams packet by packet
#[derive(Debug, Default)]
pub struct TsStreamBuilder {
    data: Vec<u8>,
    continuity: HashMap<u16, u8>,
    pts: u64,
}

impl TsStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// PAT and PMT for one program with a video and an audio stream
    pub fn psi(mut self, video: StreamType) -> Self {
        let pat = build_pat_section(
            1,
            0,
            &[PatProgram {
                program_number: PROGRAM_NUMBER,
                pmt_pid: PMT_PID,
            }],
        );
        let pmt = build_pmt_section(
            PROGRAM_NUMBER,
            0,
            PCR_PID,
            &[
                PmtStream {
                    stream_type: video,
                    elementary_pid: VIDEO_PID,
                },
                PmtStream {
                    stream_type: StreamType::Mpeg1Audio,
                    elementary_pid: AUDIO_PID,
                },
            ],
        );
        self.psi_packet(PID_PAT, &pat);
        self.psi_packet(PMT_PID, &pmt);
        self
    }

    /// Video payload continuation packets without any start code
    pub fn video_packets(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.packet(VIDEO_PID, false, &[]);
        }
        self
    }

    /// Start of an H.264 access unit announced as intra by its delimiter
    pub fn h264_intra_packet(self) -> Self {
        self.video_start(&[0x00, 0x00, 0x00, 0x01, 0x09, 0x10, 0x00])
    }

    /// Start of an H.264 access unit with P slices
    pub fn h264_predicted_packet(self) -> Self {
        self.video_start(&[0x00, 0x00, 0x00, 0x01, 0x09, 0x30, 0x00])
    }

    /// MPEG-2 sequence header followed by an I picture start
    pub fn mpeg2_intra_packet(self) -> Self {
        self.video_start(&[
            0x00, 0x00, 0x01, 0xB3, 0x2D, 0x01, 0xE0, 0x24, 0xFF, 0xFF, 0xE0, 0x18, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x0F, 0xFF, 0xF8,
        ])
    }

    /// A bounded audio PES with `len` payload bytes in a single packet
    pub fn audio_pes(mut self, len: usize) -> Self {
        let mut payload = vec![0x00, 0x00, 0x01, 0xC0];
        payload.extend_from_slice(&((len + 3) as u16).to_be_bytes());
        payload.extend_from_slice(&[0x80, 0x00, 0x00]);
        payload.extend(std::iter::repeat_n(0xAA, len));
        self.packet(AUDIO_PID, true, &payload);
        self
    }

    /// Adaptation-only packet carrying a PCR on the PCR PID
    pub fn pcr_packet(mut self, pcr_base: u64) -> Self {
        let cc = self.next_cc(PCR_PID);
        let mut packet = [0xFFu8; TS_PACKET_SIZE];
        let mut header = [0u8; 4];
        write_header(&mut header, PCR_PID, false, 0x02, cc);
        packet[..4].copy_from_slice(&header);
        packet[4] = (TS_PACKET_SIZE - 5) as u8;
        packet[5] = 0x10;
        packet[6] = (pcr_base >> 25) as u8;
        packet[7] = (pcr_base >> 17) as u8;
        packet[8] = (pcr_base >> 9) as u8;
        packet[9] = (pcr_base >> 1) as u8;
        packet[10] = (((pcr_base & 0x01) as u8) << 7) | 0x7E;
        packet[11] = 0x00;
        self.data.extend_from_slice(&packet);
        self
    }

    pub fn null_packets(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.packet(PID_NULL, false, &[]);
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    fn video_start(mut self, es: &[u8]) -> Self {
        self.pts += 3003;
        let mut payload = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x80, 0x05];
        payload.extend_from_slice(&write_timestamp(0x2, self.pts));
        payload.extend_from_slice(es);
        self.packet(VIDEO_PID, true, &payload);
        self
    }

    fn psi_packet(&mut self, pid: u16, section: &[u8]) {
        let mut payload = vec![0x00];
        payload.extend_from_slice(section);
        self.packet(pid, true, &payload);
    }

    fn packet(&mut self, pid: u16, pusi: bool, payload: &[u8]) {
        let cc = self.next_cc(pid);
        let mut packet = [0xFFu8; TS_PACKET_SIZE];
        let mut header = [0u8; 4];
        write_header(&mut header, pid, pusi, 0x01, cc);
        packet[..4].copy_from_slice(&header);
        packet[4..4 + payload.len()].copy_from_slice(payload);
        self.data.extend_from_slice(&packet);
    }

    fn next_cc(&mut self, pid: u16) -> u8 {
        let cc = self.continuity.entry(pid).or_insert(0);
        let current = *cc;
        *cc = (*cc + 1) & 0x0F;
        current
    }
}
