use std::sync::Arc;

use remux::format::VideoCodec;
use remux::init_test_tracing;
use remux::test_utils::{MemoryOpener, ScriptedFactory, TsStreamBuilder, memory_destination};
use remux::{
    FileDestination, FileOpener, MpegEngineFactory, RemuxConfig, RemuxFormat, RemuxSession,
};
use tempfile::TempDir;
use ts::{StreamType, TS_PACKET_SIZE};

const MIB: usize = 1024 * 1024;

#[test]
fn test_detection_buffer_growth_is_bounded() {
    init_test_tracing!(INFO);
    let config = RemuxConfig::default();
    let max = config.max_detection_size;
    let factory = Arc::new(ScriptedFactory::never());
    let (destination, file) = memory_destination("undetected.ts");
    let mut session =
        RemuxSession::builder(destination, factory.clone(), Arc::new(MemoryOpener::default()))
            .build()
            .unwrap();

    let stream = TsStreamBuilder::new()
        .null_packets(3 * max / TS_PACKET_SIZE)
        .build();
    assert_eq!(stream.len(), 3 * max);

    let mut capacities = vec![session.detection_stats().capacity];
    for part in stream.chunks(MIB) {
        assert_eq!(session.feed(part), Some(part.len()));
        let capacity = session.detection_stats().capacity;
        assert!(capacity <= max);
        if capacities.last() != Some(&capacity) {
            capacities.push(capacity);
        }
    }

    assert_eq!(capacities, vec![5_242_944, 10_485_888, 20_971_400]);
    let stats = session.detection_stats();
    assert_eq!(stats.growths, 2);
    assert_eq!(stats.resets, 3);
    assert_eq!(stats.engine_opens, 4);
    assert!(!session.is_initialized());

    session.close();
    assert!(file.contents().is_empty());
    assert_eq!(factory.opened().len(), 4);
}

#[test]
fn test_reset_returns_to_automatic_tuning() {
    let config = RemuxConfig::builder()
        .transfer_packets(4)
        .initial_detection_size(10 * TS_PACKET_SIZE)
        .max_detection_size(40 * TS_PACKET_SIZE)
        .build();
    let factory = Arc::new(ScriptedFactory::never());
    let (destination, _file) = memory_destination("tuned.ts");
    let mut session =
        RemuxSession::builder(destination, factory.clone(), Arc::new(MemoryOpener::default()))
            .tune(remux::TuneDescriptor::program(5))
            .config(config)
            .build()
            .unwrap();

    session.feed(&TsStreamBuilder::new().null_packets(40).build());

    let opened = factory.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[0].tune.program, 5);
    assert!(opened[1].tune.is_auto());
}

#[test]
fn test_program_stream_request_falls_back_for_h264() {
    init_test_tracing!();
    let factory = Arc::new(ScriptedFactory::detect_after(20 * TS_PACKET_SIZE));
    let (destination, file) = memory_destination("capture.mpg");
    let mut session =
        RemuxSession::builder(destination, factory.clone(), Arc::new(MemoryOpener::default()))
            .output_format(RemuxFormat::Ps)
            .config(
                RemuxConfig::builder()
                    .transfer_packets(8)
                    .initial_detection_size(64 * TS_PACKET_SIZE)
                    .max_detection_size(256 * TS_PACKET_SIZE)
                    .build(),
            )
            .build()
            .unwrap();

    let stream = TsStreamBuilder::new().null_packets(100).build();
    for part in stream.chunks(1_000) {
        session.feed(part);
    }
    assert!(session.is_initialized());
    assert_eq!(session.output_format(), RemuxFormat::Ts);
    assert_eq!(
        session.container_format().map(|format| format.container),
        Some(RemuxFormat::Ts)
    );

    let stats = session.detection_stats();
    assert_eq!(stats.format_corrections, 1);
    assert_eq!(stats.engine_opens, 2);

    let outputs: Vec<_> = factory.opened().iter().map(|params| params.output).collect();
    assert_eq!(outputs, vec![RemuxFormat::Ps, RemuxFormat::Ts]);

    session.close();
    assert_eq!(file.contents(), stream);
}

#[test]
fn test_failed_redetect_retries_on_later_calls() {
    init_test_tracing!();
    let factory = Arc::new(
        ScriptedFactory::detect_after(20 * TS_PACKET_SIZE).on_reopen(80 * TS_PACKET_SIZE),
    );
    let (destination, file) = memory_destination("capture.mpg");
    let mut session =
        RemuxSession::builder(destination, factory.clone(), Arc::new(MemoryOpener::default()))
            .output_format(RemuxFormat::Ps)
            .config(
                RemuxConfig::builder()
                    .transfer_packets(8)
                    .initial_detection_size(64 * TS_PACKET_SIZE)
                    .max_detection_size(256 * TS_PACKET_SIZE)
                    .build(),
            )
            .build()
            .unwrap();

    let stream = TsStreamBuilder::new().null_packets(200).build();
    let mut parts = stream.chunks(30 * TS_PACKET_SIZE);

    // The first engine detects, the transport stream engine needs more data
    let first = parts.next().unwrap();
    assert_eq!(session.feed(first), Some(first.len()));
    assert!(!session.is_initialized());
    assert_eq!(session.output_format(), RemuxFormat::Ts);
    assert_eq!(session.detection_stats().format_corrections, 1);

    for part in parts {
        assert_eq!(session.feed(part), Some(part.len()));
    }
    assert!(session.is_initialized());
    let stats = session.detection_stats();
    assert_eq!(stats.engine_opens, 2);
    assert_eq!(stats.format_corrections, 1);

    session.close();
    assert_eq!(session.dropped_bytes(), 0);
    assert_eq!(file.contents(), stream);
}

#[test]
fn test_program_stream_kept_for_mpeg2() {
    let factory =
        Arc::new(ScriptedFactory::detect_after(TS_PACKET_SIZE).video(VideoCodec::Mpeg2));
    let (destination, _file) = memory_destination("capture.mpg");
    let mut session =
        RemuxSession::builder(destination, factory.clone(), Arc::new(MemoryOpener::default()))
            .output_format(RemuxFormat::Ps)
            .build()
            .unwrap();

    session.feed(&TsStreamBuilder::new().null_packets(400).build());
    assert!(session.is_initialized());
    assert_eq!(session.output_format(), RemuxFormat::Ps);
    assert_eq!(session.detection_stats().format_corrections, 0);
    assert_eq!(factory.opened().len(), 1);
}

#[test]
fn test_h264_capture_recorded_as_transport_stream() {
    init_test_tracing!();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("h264.mpg");
    let mut session = RemuxSession::builder(
        Box::new(FileDestination::create(&path).unwrap()),
        Arc::new(MpegEngineFactory),
        Arc::new(FileOpener::new().with_base_dir(dir.path())),
    )
    .output_format(RemuxFormat::Ps)
    .build()
    .unwrap();

    let stream = TsStreamBuilder::new()
        .psi(StreamType::H264)
        .h264_intra_packet()
        .video_packets(200)
        .audio_pes(120)
        .h264_predicted_packet()
        .video_packets(200)
        .build();
    for part in stream.chunks(4_096) {
        session.feed(part);
    }
    assert_eq!(session.output_format(), RemuxFormat::Ts);
    session.close();

    assert_eq!(std::fs::read(&path).unwrap(), stream);
    assert_eq!(session.total_bytes_written(), stream.len() as u64);
}

#[test]
fn test_mpeg2_capture_recorded_as_program_stream() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mpeg2.mpg");
    let mut session = RemuxSession::builder(
        Box::new(FileDestination::create(&path).unwrap()),
        Arc::new(MpegEngineFactory),
        Arc::new(FileOpener::new()),
    )
    .output_format(RemuxFormat::Ps)
    .build()
    .unwrap();

    let mut builder = TsStreamBuilder::new().psi(StreamType::Mpeg2Video);
    for _ in 0..8 {
        builder = builder.mpeg2_intra_packet().video_packets(49);
    }
    session.feed(&builder.build());
    assert!(session.is_initialized());
    assert_eq!(session.output_format(), RemuxFormat::Ps);
    session.close();

    let recorded = std::fs::read(&path).unwrap();
    assert!(recorded.starts_with(&[0x00, 0x00, 0x01, 0xBA]));
    assert!(recorded.ends_with(&[0x00, 0x00, 0x01, 0xB9]));
}

#[test]
fn test_garbage_before_capture_is_not_recorded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("noisy.ts");
    let mut session = RemuxSession::builder(
        Box::new(FileDestination::create(&path).unwrap()),
        Arc::new(MpegEngineFactory),
        Arc::new(FileOpener::new()),
    )
    .build()
    .unwrap();

    let stream = TsStreamBuilder::new()
        .psi(StreamType::H264)
        .h264_intra_packet()
        .video_packets(400)
        .build();
    let mut noisy = vec![0x33; 50];
    noisy.extend_from_slice(&stream);
    session.feed(&noisy);
    session.close();

    assert_eq!(session.dropped_bytes(), 50);
    assert_eq!(std::fs::read(&path).unwrap(), stream);
}
