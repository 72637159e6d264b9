//! Built-in engine for transport stream captures.
//!
//! Detection runs a PAT/PMT probe over the pushed packets. Transport stream
//! output passes the packets through, limited to the selected program when
//! one was asked for; program stream output rebuilds the PES packets of the
//! selected program and frames them in packs.

use tracing::{debug, info, warn};
use ts::{ProgramInfo, ProgramProbe, ProgramSelection, TS_PACKET_SIZE, TsPacketRef};

use super::ps_mux::PsMuxer;
use super::{EngineFactory, EngineParams, RemuxEngine, RemuxSink};
use crate::format::{
    AudioStream, ContainerFormat, RemuxFormat, TuneDescriptor, TuneKind, VideoCodec, VideoFormat,
};
use crate::{RemuxError, Result};

/// Opens [`MpegRemuxEngine`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct MpegEngineFactory;

impl EngineFactory for MpegEngineFactory {
    fn open(
        &self,
        params: &EngineParams,
        sink: Box<dyn RemuxSink>,
    ) -> Result<Box<dyn RemuxEngine>> {
        if params.input != RemuxFormat::Ts {
            return Err(RemuxError::UnsupportedFormat(format!(
                "{} input is not supported",
                params.input
            )));
        }
        Ok(Box::new(MpegRemuxEngine::new(params, sink)))
    }
}

pub struct MpegRemuxEngine {
    sink: Box<dyn RemuxSink>,
    output: RemuxFormat,
    probe: ProgramProbe,
    /// Only pass the selected program through
    filter_program: bool,
    program: Option<ProgramInfo>,
    ps: PsMuxer,
    scratch: Vec<u8>,
    closed: bool,
}

impl MpegRemuxEngine {
    pub fn new(params: &EngineParams, sink: Box<dyn RemuxSink>) -> Self {
        let selection = selection_for(&params.tune);
        debug!(
            output = %params.output,
            tune = %params.tune,
            "Opening MPEG remux engine with {selection:?}"
        );
        Self {
            sink,
            output: params.output,
            probe: ProgramProbe::new(selection),
            filter_program: selection != ProgramSelection::Auto,
            program: None,
            ps: PsMuxer::new(),
            scratch: Vec::new(),
            closed: false,
        }
    }

    fn track_program(&mut self) {
        let Some(selected) = self.probe.selected() else {
            return;
        };
        if self.program.as_ref() == Some(selected) {
            return;
        }
        info!(
            program = selected.program_number,
            streams = selected.streams.len(),
            "Program layout detected"
        );
        self.ps.set_program(selected);
        self.program = Some(selected.clone());
    }

    fn passes_filter(&self, pid: u16) -> bool {
        !self.filter_program
            || self
                .program
                .as_ref()
                .is_some_and(|program| program.contains_pid(pid))
    }

    fn write_scratch(&mut self) {
        if self.scratch.is_empty() {
            return;
        }
        if let Err(e) = self.sink.write(&self.scratch) {
            warn!("Remux sink rejected {} bytes: {e}", self.scratch.len());
        }
        self.scratch.clear();
    }
}

impl RemuxEngine for MpegRemuxEngine {
    fn push_init_data(&mut self, data: &[u8]) -> bool {
        self.probe.push(data);
        self.track_program();
        self.program.is_some()
    }

    fn push_remux_data(&mut self, data: &[u8]) {
        if self.closed {
            return;
        }
        for chunk in data.chunks_exact(TS_PACKET_SIZE) {
            let Ok(packet) = TsPacketRef::parse(chunk) else {
                continue;
            };
            self.probe.push_packet(&packet);
            if packet.payload_unit_start_indicator {
                self.track_program();
            }

            match self.output {
                RemuxFormat::Ts => {
                    if self.passes_filter(packet.pid) {
                        self.scratch.extend_from_slice(chunk);
                    }
                }
                RemuxFormat::Ps => self.ps.push_packet(&packet, &mut self.scratch),
            }
        }
        self.write_scratch();
    }

    fn container_format(&self) -> Option<ContainerFormat> {
        self.program
            .as_ref()
            .map(|program| describe(program, self.output))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.output == RemuxFormat::Ps && self.program.is_some() {
            self.ps.finish(&mut self.scratch);
        }
        self.write_scratch();
        if let Err(e) = self.sink.flush() {
            warn!("Failed to flush remux sink on close: {e}");
        }
    }
}

impl Drop for MpegRemuxEngine {
    fn drop(&mut self) {
        self.close();
    }
}

fn selection_for(tune: &TuneDescriptor) -> ProgramSelection {
    if tune.program != 0 {
        ProgramSelection::ProgramNumber(tune.program)
    } else if tune.kind == TuneKind::Channel && tune.channel != 0 {
        ProgramSelection::Index(tune.channel as usize)
    } else {
        ProgramSelection::Auto
    }
}

fn describe(program: &ProgramInfo, output: RemuxFormat) -> ContainerFormat {
    ContainerFormat {
        container: output,
        program_number: Some(program.program_number),
        video: program.video_stream().map(|stream| VideoFormat {
            codec: VideoCodec::from(stream.stream_type),
            pid: stream.elementary_pid,
        }),
        audio: program
            .audio_streams()
            .map(|stream| AudioStream {
                stream_type: stream.stream_type,
                pid: stream.elementary_pid,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CaptureKind;
    use crate::test_utils::{CollectingSink, TsStreamBuilder, VIDEO_PID};
    use ts::StreamType;
    use ts::pack::is_pack_start;

    fn open(output: RemuxFormat, tune: TuneDescriptor) -> (Box<dyn RemuxEngine>, CollectingSink) {
        let sink = CollectingSink::default();
        let params = EngineParams {
            tune,
            ..EngineParams::new(output, CaptureKind::Tv)
        };
        let engine = MpegEngineFactory.open(&params, Box::new(sink.clone())).unwrap();
        (engine, sink)
    }

    #[test]
    fn test_detects_h264_program() {
        let stream = TsStreamBuilder::new()
            .psi(StreamType::H264)
            .video_packets(4)
            .build();
        let (mut engine, sink) = open(RemuxFormat::Ts, TuneDescriptor::auto());
        assert!(engine.container_format().is_none());
        assert!(engine.push_init_data(&stream));

        let format = engine.container_format().unwrap();
        assert_eq!(
            format.video,
            Some(VideoFormat {
                codec: VideoCodec::H264,
                pid: VIDEO_PID
            })
        );
        assert_eq!(format.audio.len(), 1);
        assert!(sink.contents().is_empty());
    }

    #[test]
    fn test_ts_passthrough_is_byte_exact() {
        let stream = TsStreamBuilder::new()
            .psi(StreamType::H264)
            .video_packets(10)
            .null_packets(2)
            .build();
        let (mut engine, sink) = open(RemuxFormat::Ts, TuneDescriptor::auto());
        engine.push_init_data(&stream);
        engine.push_remux_data(&stream);
        engine.close();
        assert_eq!(sink.contents(), stream);
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn test_explicit_program_filters_other_pids() {
        let stream = TsStreamBuilder::new()
            .psi(StreamType::H264)
            .video_packets(3)
            .null_packets(2)
            .build();
        let (mut engine, sink) = open(RemuxFormat::Ts, TuneDescriptor::program(1));
        engine.push_init_data(&stream);
        engine.push_remux_data(&stream);
        assert_eq!(sink.contents(), &stream[..5 * TS_PACKET_SIZE]);
    }

    #[test]
    fn test_ps_output_is_packed() {
        let stream = TsStreamBuilder::new()
            .psi(StreamType::Mpeg2Video)
            .mpeg2_intra_packet()
            .video_packets(20)
            .build();
        let (mut engine, sink) = open(RemuxFormat::Ps, TuneDescriptor::auto());
        assert!(engine.push_init_data(&stream));
        engine.push_remux_data(&stream);
        engine.close();
        assert!(is_pack_start(&sink.contents()));
    }

    #[test]
    fn test_rejects_program_stream_input() {
        let params = EngineParams {
            input: RemuxFormat::Ps,
            ..EngineParams::new(RemuxFormat::Ts, CaptureKind::Other)
        };
        let result = MpegEngineFactory.open(&params, Box::new(CollectingSink::default()));
        assert!(matches!(result, Err(RemuxError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_tuning_selection() {
        assert_eq!(
            selection_for(&TuneDescriptor::auto()),
            ProgramSelection::Auto
        );
        assert_eq!(
            selection_for(&TuneDescriptor::channel(2)),
            ProgramSelection::Index(2)
        );
        assert_eq!(
            selection_for(&TuneDescriptor {
                channel: 2,
                program: 7,
                ..TuneDescriptor::auto()
            }),
            ProgramSelection::ProgramNumber(7)
        );
    }
}
